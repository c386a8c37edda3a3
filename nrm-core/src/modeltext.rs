// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parser for the per-device "GLPK" constraint DSL (spec.md §4.2).
//!
//! A small regex-driven parser, per the design note in spec.md §9: sum
//! types for `SumCond`/`VarCond`, an immutable IR once parsed.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    Literals(Vec<i64>),
    Domain(Domain),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetDef {
    pub name: String,
    pub expr: SetExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    /// `var -> set name` clauses, e.g. `i in InputPort`.
    pub var_inset: Vec<(String, String)>,
    pub cond: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CondOp {
    Le,
    Ge,
    Eq,
}

impl CondOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "<=" => Some(CondOp::Le),
            ">=" => Some(CondOp::Ge),
            "=" => Some(CondOp::Eq),
            _ => None,
        }
    }
}

/// `sum{D} c[i,j,k,l] OP N`
#[derive(Debug, Clone, PartialEq)]
pub struct SumCond {
    pub sum_domain: String,
    pub indices: Vec<String>,
    pub op: CondOp,
    pub rhs: f64,
}

/// `c[i,j,k,l] OP (N | c[...])`
#[derive(Debug, Clone, PartialEq)]
pub struct VarCond {
    pub indices: Vec<String>,
    pub op: CondOp,
    pub rhs: VarCondRhs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarCondRhs {
    Number(f64),
    Indices(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StBody {
    Sum(SumCond),
    Var(VarCond),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StDef {
    pub name: String,
    pub domain: Domain,
    pub body: StBody,
}

/// `AvailableConnection` domains are canonicalized per spec.md §4.2.
pub fn canonical_available_connection_domain() -> Domain {
    Domain {
        var_inset: vec![
            ("i".into(), "InputPort".into()),
            ("j".into(), "Channels".into()),
            ("k".into(), "OutputPort".into()),
            ("l".into(), "Channels".into()),
        ],
        cond: Some("j = l".into()),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintText {
    pub sets: Vec<SetDef>,
    pub statements: Vec<StDef>,
}

fn re_set_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)set\s+(\w+)\s*:=\s*\{\s*([^{}]*?)\s*\}\s*;").unwrap()
    })
}

fn re_st_def() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)s\.t\.\s+(\w+)\s*\{\s*([^{}]*?)\s*\}\s*:\s*(.*?)\s*;").unwrap()
    })
}

fn re_sum_cond() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^sum\{([^}]*)\}\s*c\[([^\]]*)\]\s*(<=|>=|=)\s*([\d.+-]+)$").unwrap()
    })
}

fn re_var_cond() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^c\[([^\]]*)\]\s*(<=|>=|=)\s*(c\[([^\]]*)\]|([\d.+-]+))$").unwrap()
    })
}

fn re_range() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?\d+)\.\.(-?\d+)(?:\s+by\s+(-?\d+))?$").unwrap())
}

/// Expand `{a..b}` / `{a..b by s}` set expressions into explicit
/// enumerations (spec.md §4.2).
pub fn expand_range(expr: &str) -> Option<Vec<i64>> {
    let caps = re_range().captures(expr.trim())?;
    let a: i64 = caps[1].parse().ok()?;
    let b: i64 = caps[2].parse().ok()?;
    let step: i64 = caps
        .get(3)
        .map(|m| m.as_str().parse().unwrap_or(1))
        .unwrap_or(1);
    if step == 0 {
        return None;
    }
    let mut out = Vec::new();
    if step > 0 {
        let mut x = a;
        while x <= b {
            out.push(x);
            x += step;
        }
    } else {
        let mut x = a;
        while x >= b {
            out.push(x);
            x += step;
        }
    }
    Some(out)
}

fn parse_domain(text: &str) -> Domain {
    let (clauses_part, cond) = match text.split_once(':') {
        Some((c, rest)) => (c, Some(rest.trim().to_string())),
        None => (text, None),
    };
    let mut var_inset = Vec::new();
    for clause in clauses_part.split(',') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        if let Some((var, set)) = clause.split_once(" in ") {
            var_inset.push((var.trim().to_string(), set.trim().to_string()));
        }
    }
    Domain { var_inset, cond }
}

fn parse_indices(s: &str) -> Vec<String> {
    s.split(',').map(|x| x.trim().to_string()).collect()
}

fn parse_body(body: &str) -> Option<StBody> {
    let body = body.trim();
    if let Some(caps) = re_sum_cond().captures(body) {
        return Some(StBody::Sum(SumCond {
            sum_domain: caps[1].trim().to_string(),
            indices: parse_indices(&caps[2]),
            op: CondOp::parse(&caps[3])?,
            rhs: caps[4].parse().ok()?,
        }));
    }
    if let Some(caps) = re_var_cond().captures(body) {
        let rhs = if let Some(idx) = caps.get(4) {
            VarCondRhs::Indices(parse_indices(idx.as_str()))
        } else {
            VarCondRhs::Number(caps[5].parse().ok()?)
        };
        return Some(StBody::Var(VarCond {
            indices: parse_indices(&caps[1]),
            op: CondOp::parse(&caps[2])?,
            rhs,
        }));
    }
    None
}

/// Parse the full constraint text of a device's `GLPK` field.
pub fn parse(text: &str) -> ConstraintText {
    let mut sets = Vec::new();
    let mut statements = Vec::new();

    for caps in re_set_literal().captures_iter(text) {
        let name = caps[1].to_string();
        let body = caps[2].trim();
        let expr = if body.contains(" in ") || body.contains(':') {
            SetExpr::Domain(parse_domain(body))
        } else if let Some(nums) = expand_range(body) {
            SetExpr::Literals(nums)
        } else {
            let nums: Vec<i64> = body
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            SetExpr::Literals(nums)
        };
        sets.push(SetDef { name, expr });
    }

    for caps in re_st_def().captures_iter(text) {
        let name = caps[1].to_string();
        let mut domain = parse_domain(caps[2].trim());
        // An StDef whose domain names `AvailableConnection` uses the
        // canonical domain (spec.md §4.2).
        if domain
            .var_inset
            .iter()
            .any(|(_, set)| set == "AvailableConnection")
        {
            domain = canonical_available_connection_domain();
        }
        if let Some(body) = parse_body(&caps[3]) {
            statements.push(StDef { name, domain, body });
        }
    }

    ConstraintText { sets, statements }
}

/// Variables restricted to `InputPort*`/`OutputPort*` set names, the
/// basis for the skeleton builder's per-set emission (spec.md §4.4).
pub fn io_vars(domain: &Domain) -> HashMap<char, String> {
    let mut out = HashMap::new();
    for (var, set) in &domain.var_inset {
        if set.starts_with("InputPort") {
            out.insert('i', set.clone());
        } else if set.starts_with("OutputPort") {
            out.insert('k', set.clone());
        }
        let _ = var;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literal_set() {
        let text = "set Foo := { 1, 2, 3 };";
        let parsed = parse(text);
        assert_eq!(parsed.sets.len(), 1);
        assert_eq!(
            parsed.sets[0].expr,
            SetExpr::Literals(vec![1, 2, 3])
        );
    }

    #[test]
    fn expands_range_with_step() {
        assert_eq!(expand_range("1..5"), Some(vec![1, 2, 3, 4, 5]));
        assert_eq!(expand_range("0..10 by 2"), Some(vec![0, 2, 4, 6, 8, 10]));
    }

    #[test]
    fn parses_sum_cond_statement() {
        let text = "s.t. Bound { i in InputPort, j in Channels } : sum{j} c[i,j,k,l] <= 1;";
        let parsed = parse(text);
        assert_eq!(parsed.statements.len(), 1);
        match &parsed.statements[0].body {
            StBody::Sum(sum) => {
                assert_eq!(sum.op, CondOp::Le);
                assert_eq!(sum.rhs, 1.0);
            }
            _ => panic!("expected sum condition"),
        }
    }

    #[test]
    fn parses_var_cond_equality_between_vars() {
        let text = "s.t. Eq { i in InputPort, k in OutputPort } : c[i,j,k,l] = c[k,l,i,j];";
        let parsed = parse(text);
        match &parsed.statements[0].body {
            StBody::Var(v) => {
                assert_eq!(v.op, CondOp::Eq);
                assert_eq!(v.rhs, VarCondRhs::Indices(vec!["k".into(), "l".into(), "i".into(), "j".into()]));
            }
            _ => panic!("expected var condition"),
        }
    }

    #[test]
    fn available_connection_domain_is_canonicalized() {
        let text = "s.t. AC { i in InputPort, j in Channels, k in OutputPort, l in AvailableConnection } : c[i,j,k,l] <= 1;";
        let parsed = parse(text);
        assert_eq!(parsed.statements[0].domain, canonical_available_connection_domain());
    }

    #[test]
    fn io_vars_extracts_input_and_output_sets() {
        let domain = Domain {
            var_inset: vec![
                ("i".into(), "InputPort".into()),
                ("k".into(), "OutputPort".into()),
            ],
            cond: None,
        };
        let vars = io_vars(&domain);
        assert_eq!(vars.get(&'i'), Some(&"InputPort".to_string()));
        assert_eq!(vars.get(&'k'), Some(&"OutputPort".to_string()));
    }
}
