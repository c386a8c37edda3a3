// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CLI-to-config glue: `nrm_core::NrmConfig` already owns the JSON
//! environment file (spec.md §6); this module only applies command-line
//! overrides on top of it.

use nrm_core::NrmConfig;
use std::net::IpAddr;

/// Applies `--bind`/`--port` overrides (if given) to a loaded config and
/// re-validates.
pub fn apply_overrides(
    config: &mut NrmConfig,
    bind: Option<IpAddr>,
    port: Option<u16>,
) -> nrm_core::Result<()> {
    if let Some(bind) = bind {
        config.nrm_host = bind;
    }
    if let Some(port) = port {
        config.nrm_port = port;
    }
    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_config() -> NrmConfig {
        NrmConfig {
            logger: "tracing".to_string(),
            log_config: None,
            topo_xml: PathBuf::from("topo.xml"),
            glpk_dir: PathBuf::from("/tmp/glpk"),
            db_dir: PathBuf::from("/tmp/db"),
            nrm_host: "127.0.0.1".parse().unwrap(),
            nrm_port: 7401,
            pf_tmp_model: "pf".to_string(),
            solvec_tmp_model: "solvec".to_string(),
            num_comps: 2,
        }
    }

    #[test]
    fn overrides_apply_port_and_bind() {
        let mut config = base_config();
        apply_overrides(&mut config, Some("0.0.0.0".parse().unwrap()), Some(9000)).unwrap();
        assert_eq!(config.nrm_port, 9000);
        assert_eq!(config.nrm_host, "0.0.0.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn overrides_reject_invalid_port() {
        let mut config = base_config();
        assert!(apply_overrides(&mut config, None, Some(0)).is_err());
    }
}
