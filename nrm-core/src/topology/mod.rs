// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Topology model: channel tables, components/ports, port-pairs, and the
//! flow-in/flow-out graph (spec.md §3, §4.1).
//!
//! XML parsing walks a `roxmltree::Document` by tag name, the way
//! `FastDdsLoader::parse_xml` walks FastDDS profile XML in the teacher.

pub mod channel;
pub mod component;
pub mod portpair;

pub use channel::{Channel, ChannelTable, ChannelTableKind, SupportChannel, SupportSet};
pub use component::{AvailableConnection, Component, Port, PortIo};
pub use portpair::PortPair;

use crate::error::{NrmError, Result};
use roxmltree::Document;
use std::collections::HashMap;
use std::path::Path;

pub struct Topology {
    pub channel_tables: HashMap<String, ChannelTable>,
    pub components: HashMap<String, Component>,
    pub portpairs: Vec<PortPair>,
}

impl Topology {
    /// Parse the topology XML under the fixed schema (spec.md §6) and run
    /// the canonical construction order from spec.md §4.1:
    /// channel tables -> components+ports -> supported-table set per
    /// component -> AC files -> port-pairs from nets -> flow graph.
    pub fn load(path: &Path, ac_loader: impl Fn(&str) -> Option<AvailableConnection>) -> Result<Self> {
        let xml = std::fs::read_to_string(path)?;
        let doc = Document::parse(&xml).map_err(|e| NrmError::Topology(e.to_string()))?;
        let root = doc.root_element();

        let channel_tables = Self::parse_channel_tables(&root)?;
        let mut components = Self::parse_components(&root, &channel_tables)?;
        Self::attach_ac(&mut components, &ac_loader);
        let portpairs = Self::parse_nets(&root, &components)?;
        Self::populate_connected(&mut components, &portpairs);

        let mut topo = Topology {
            channel_tables,
            components,
            portpairs,
        };
        topo.build_flow_graph();
        Ok(topo)
    }

    fn parse_channel_tables(root: &roxmltree::Node) -> Result<HashMap<String, ChannelTable>> {
        let mut tables = HashMap::new();
        let channel_info = root
            .descendants()
            .find(|n| n.tag_name().name() == "channelInfo");
        let Some(channel_info) = channel_info else {
            return Ok(tables);
        };
        for table_node in channel_info
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "channelTable")
        {
            let id = table_node
                .attribute("id")
                .ok_or_else(|| NrmError::Topology("channelTable missing id".into()))?
                .to_string();
            let type_attr = table_node.attribute("type").unwrap_or("optical");
            if type_attr != "optical" {
                // Non-optical channel tables are out of scope; skip them.
                continue;
            }
            let mut channels = Vec::new();
            for ch_node in table_node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "channel")
            {
                let no: i64 = ch_node
                    .attribute("no")
                    .ok_or_else(|| NrmError::Topology("channel missing no".into()))?
                    .parse()
                    .map_err(|_| NrmError::Topology("channel no not an integer".into()))?;
                channels.push(Channel {
                    table_id: id.clone(),
                    number: no,
                });
            }
            let table = ChannelTable {
                id: id.clone(),
                kind: ChannelTableKind::Optical,
                channels,
            };
            table.validate().map_err(NrmError::Topology)?;
            tables.insert(id, table);
        }
        Ok(tables)
    }

    fn parse_components(
        root: &roxmltree::Node,
        _channel_tables: &HashMap<String, ChannelTable>,
    ) -> Result<HashMap<String, Component>> {
        let mut components = HashMap::new();
        let comps_node = root
            .descendants()
            .find(|n| n.tag_name().name() == "components");
        let Some(comps_node) = comps_node else {
            return Ok(components);
        };

        for comp_node in comps_node
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "comp")
        {
            let name = comp_node
                .attribute("ref")
                .ok_or_else(|| NrmError::Topology("comp missing ref".into()))?
                .to_string();

            let mut model = None;
            let mut glpk = None;
            let mut controller = None;
            let mut socket = None;
            let mut cost = serde_json::Value::Null;
            let mut out_of_service = serde_json::Value::Null;

            for field in comp_node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "field")
            {
                let field_name = field.attribute("name").unwrap_or_default();
                let text = field.text().unwrap_or_default().to_string();
                match field_name {
                    "Model" => model = Some(text),
                    "GLPK" => glpk = Some(text),
                    "Controller" => controller = Some(text),
                    "Socket" => socket = text.parse().ok(),
                    "Cost" => cost = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null),
                    "OutOfService" => {
                        out_of_service = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null)
                    }
                    _ => {}
                }
            }

            let mut ports = HashMap::new();
            let mut support_ids: Vec<String> = Vec::new();
            let mut support_any = false;

            let ports_node = comp_node
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "ports");
            if let Some(ports_node) = ports_node {
                for port_node in ports_node
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "port")
                {
                    let number: i64 = port_node
                        .attribute("number")
                        .ok_or_else(|| NrmError::Topology("port missing number".into()))?
                        .parse()
                        .map_err(|_| NrmError::Topology("port number not an integer".into()))?;
                    let pname = port_node.attribute("name").unwrap_or_default().to_string();
                    let io = match port_node.attribute("io").unwrap_or("input") {
                        "output" => PortIo::Output,
                        "bidi" | "BiDi" => PortIo::BiDi,
                        _ => PortIo::Input,
                    };
                    let support_channel = match port_node.attribute("supportChannel") {
                        Some("ANY") | None => SupportChannel::Any,
                        Some(id) => {
                            if !support_ids.contains(&id.to_string()) {
                                support_ids.push(id.to_string());
                            }
                            SupportChannel::Table(id.to_string())
                        }
                    };
                    if matches!(support_channel, SupportChannel::Any) {
                        support_any = true;
                    }
                    ports.insert(
                        number,
                        Port {
                            pin: number,
                            name: pname,
                            io,
                            support_channel,
                            component: name.clone(),
                            connected: Default::default(),
                            flow_in: Default::default(),
                            flow_out: Default::default(),
                        },
                    );
                }
            }

            let support_tables = if support_any {
                SupportSet::Any
            } else {
                SupportSet::Tables(support_ids)
            };

            components.insert(
                name.clone(),
                Component {
                    name,
                    model,
                    glpk,
                    controller,
                    socket,
                    cost,
                    out_of_service,
                    support_tables,
                    ports,
                    ac: None,
                },
            );
        }

        Ok(components)
    }

    fn attach_ac(
        components: &mut HashMap<String, Component>,
        ac_loader: &impl Fn(&str) -> Option<AvailableConnection>,
    ) {
        // AC tables are shared across components with the same model name
        // (spec.md §4.1); cache one lookup per model.
        let mut by_model: HashMap<String, Option<AvailableConnection>> = HashMap::new();
        for comp in components.values_mut() {
            let Some(model) = comp.model.clone() else {
                continue;
            };
            let ac = by_model
                .entry(model.clone())
                .or_insert_with(|| ac_loader(&model))
                .clone();
            comp.ac = ac;
        }
    }

    fn parse_nets(
        root: &roxmltree::Node,
        components: &HashMap<String, Component>,
    ) -> Result<Vec<PortPair>> {
        let mut pairs = Vec::new();
        let nets_node = root.descendants().find(|n| n.tag_name().name() == "nets");
        let Some(nets_node) = nets_node else {
            return Ok(pairs);
        };

        for net_node in nets_node
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "net")
        {
            let net_name = net_node.attribute("name").unwrap_or_default();
            let cost: f64 = net_node
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "cost")
                .and_then(|n| n.text())
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(0.0);

            let nodes: Vec<(&str, i64)> = net_node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "node")
                .filter_map(|n| {
                    let r = n.attribute("ref")?;
                    let pin: i64 = n.attribute("pin")?.parse().ok()?;
                    Some((r, pin))
                })
                .collect();

            if nodes.len() != 2 {
                return Err(NrmError::Topology(format!(
                    "net {} must have exactly two endpoints",
                    net_name
                )));
            }

            let (ref_a, pin_a) = nodes[0];
            let (ref_b, pin_b) = nodes[1];
            let full_a = format!("{}_{}", ref_a, pin_a);
            let full_b = format!("{}_{}", ref_b, pin_b);

            if let (Some(ca), Some(cb)) = (components.get(ref_a), components.get(ref_b)) {
                if let (Some(pa), Some(pb)) = (ca.ports.get(&pin_a), cb.ports.get(&pin_b)) {
                    if pa.support_channel != pb.support_channel
                        && !pa.support_channel.compatible(&pb.support_channel)
                    {
                        return Err(NrmError::Topology(format!(
                            "net {} connects incompatible support channels",
                            net_name
                        )));
                    }
                }
            }

            let pair_key = PortPair::pair_key_from_net_name(net_name);
            pairs.push(PortPair {
                src: full_a,
                dst: full_b,
                cost,
                pair_key: pair_key.clone(),
            });
        }
        Ok(pairs)
    }

    fn populate_connected(components: &mut HashMap<String, Component>, pairs: &[PortPair]) {
        for pair in pairs {
            Self::connect(components, &pair.src, &pair.dst);
            Self::connect(components, &pair.dst, &pair.src);
        }
    }

    fn connect(components: &mut HashMap<String, Component>, from: &str, to: &str) {
        if let Some((comp, pin)) = split_full_name(from) {
            if let Some(c) = components.get_mut(comp) {
                if let Some(p) = c.ports.get_mut(&pin) {
                    p.connected.insert(to.to_string());
                }
            }
        }
    }

    /// Flow graph rule (spec.md §4.1): for each component and each
    /// (src,dst) pair within it, decide inclusion from the AC table (or
    /// the input/output rule when there is none), plus external-net edges
    /// (and the reverse edge when the destination is BiDi).
    fn build_flow_graph(&mut self) {
        let component_names: Vec<String> = self.components.keys().cloned().collect();
        let mut edges: Vec<(String, String)> = Vec::new();

        for name in &component_names {
            let comp = &self.components[name];
            if comp.is_pseudo() {
                continue;
            }
            let pins: Vec<i64> = comp.ports.keys().copied().collect();
            for &src_pin in &pins {
                for &dst_pin in &pins {
                    if src_pin == dst_pin {
                        continue;
                    }
                    let include = if let Some(ac) = &comp.ac {
                        ac.allows_pins(src_pin, dst_pin)
                    } else {
                        let src = &comp.ports[&src_pin];
                        let dst = &comp.ports[&dst_pin];
                        src.is_input() && dst.is_output()
                    };
                    if include {
                        let src_full = format!("{}_{}", name, src_pin);
                        let dst_full = format!("{}_{}", name, dst_pin);
                        edges.push((src_full, dst_full));
                    }
                }
            }
        }

        for pair in self.portpairs.clone() {
            edges.push((pair.src.clone(), pair.dst.clone()));
            if let Some((comp, pin)) = split_full_name(&pair.dst) {
                if let Some(c) = self.components.get(comp) {
                    if let Some(p) = c.ports.get(&pin) {
                        if p.is_bidi() {
                            edges.push((pair.dst.clone(), pair.src.clone()));
                        }
                    }
                }
            }
        }

        for (src, dst) in edges {
            if let Some((comp, pin)) = split_full_name(&src) {
                if let Some(c) = self.components.get_mut(comp) {
                    if let Some(p) = c.ports.get_mut(&pin) {
                        p.flow_out.insert(dst.clone());
                    }
                }
            }
            if let Some((comp, pin)) = split_full_name(&dst) {
                if let Some(c) = self.components.get_mut(comp) {
                    if let Some(p) = c.ports.get_mut(&pin) {
                        p.flow_in.insert(src.clone());
                    }
                }
            }
        }
    }

    // -- lookups (spec.md §4.1: all total, returning None when absent) --

    pub fn port_by_name(&self, full_name: &str) -> Option<&Port> {
        let (comp, pin) = split_full_name(full_name)?;
        self.components.get(comp)?.ports.get(&pin)
    }

    pub fn channel_by_fullno(&self, full_no: &str) -> Option<&Channel> {
        let (table_id, number) = full_no.rsplit_once('_')?;
        let number: i64 = number.parse().ok()?;
        self.channel_tables.get(table_id)?.channel(number)
    }

    pub fn component_by_name(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    pub fn component_by_port(&self, full_name: &str) -> Option<&Component> {
        let (comp, _) = split_full_name(full_name)?;
        self.components.get(comp)
    }

    pub fn channeltable_by_id(&self, id: &str) -> Option<&ChannelTable> {
        self.channel_tables.get(id)
    }

    /// Returns the other direction of a pair-keyed net, if both ports
    /// participate in one.
    pub fn find_portpair(&self, src: &str, dst: &str) -> Option<&PortPair> {
        let forward = self
            .portpairs
            .iter()
            .find(|p| p.src == src && p.dst == dst)?;
        let key = forward.pair_key.as_ref()?;
        self.portpairs
            .iter()
            .find(|p| p.pair_key.as_deref() == Some(key) && !(p.src == src && p.dst == dst))
    }

    pub fn get_support_comps(&self, table_id: &str) -> Vec<&Component> {
        self.components
            .values()
            .filter(|c| c.support_tables.supports(table_id))
            .collect()
    }

    pub fn get_all_portpairs_list(&self) -> HashMap<String, Vec<&PortPair>> {
        let mut groups: HashMap<String, Vec<&PortPair>> = HashMap::new();
        for pair in &self.portpairs {
            if let Some(key) = &pair.pair_key {
                groups.entry(key.clone()).or_default().push(pair);
            }
        }
        groups
    }

    /// The opposite port of `port`: itself if BiDi; otherwise the
    /// same-support-channel port whose name differs only by IN<->OUT;
    /// otherwise the unique port of opposite io in the component
    /// (spec.md §3).
    pub fn opposite_port(&self, full_name: &str) -> Option<&Port> {
        let port = self.port_by_name(full_name)?;
        if port.is_bidi() {
            return Some(port);
        }
        let comp = self.components.get(&port.component)?;
        if let Some(candidate_name) = port.opposite_name_candidate() {
            if let Some(found) = comp
                .ports
                .values()
                .find(|p| p.name == candidate_name && p.support_channel == port.support_channel)
            {
                return Some(found);
            }
        }
        let opposite_io = match port.io {
            PortIo::Input => PortIo::Output,
            PortIo::Output => PortIo::Input,
            PortIo::BiDi => return Some(port),
        };
        let mut candidates = comp.ports.values().filter(|p| p.io == opposite_io);
        let first = candidates.next()?;
        if candidates.next().is_none() {
            Some(first)
        } else {
            None
        }
    }

    /// `has_connection` predicate (spec.md §4.4), used by the skeleton
    /// and overlay builders and by backward-path synthesis.
    pub fn has_connection(
        &self,
        in_port: &str,
        in_ch: &str,
        out_port: &str,
        out_ch: &str,
    ) -> bool {
        if in_port == out_port {
            return false;
        }
        let Some(pin) = self.port_by_name(in_port) else { return false };
        let Some(pout) = self.port_by_name(out_port) else { return false };

        if pin.component == pout.component {
            let comp = &self.components[&pin.component];
            return if let Some(ac) = &comp.ac {
                let Some(ch_in) = parse_ch_number(in_ch) else { return false };
                let Some(ch_out) = parse_ch_number(out_ch) else { return false };
                ac.allows(pin.pin, ch_in, pout.pin, ch_out)
            } else if comp.is_pseudo() {
                false
            } else {
                pin.is_input()
                    && pout.is_output()
                    && in_ch == out_ch
                    && pin.support_channel.compatible(&pout.support_channel)
            };
        }

        if in_ch != out_ch || !pin.support_channel.compatible(&pout.support_channel) {
            return false;
        }
        pin.connected.contains(out_port) || (pin.is_bidi() && pout.connected.contains(in_port))
    }
}

fn parse_ch_number(full_no: &str) -> Option<i64> {
    full_no.rsplit_once('_')?.1.parse().ok()
}

pub fn split_full_name(full_name: &str) -> Option<(&str, i64)> {
    let (comp, pin) = full_name.rsplit_once('_')?;
    let pin: i64 = pin.parse().ok()?;
    Some((comp, pin))
}
