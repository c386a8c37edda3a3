// SPDX-License-Identifier: Apache-2.0 OR MIT

//! NRM environment/config file (spec.md §6).

use crate::error::{NrmError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NrmConfig {
    /// Logger backend name (e.g. "tracing").
    #[serde(default = "default_logger")]
    pub logger: String,

    /// Path to a logging configuration file, if any.
    #[serde(default)]
    pub log_config: Option<PathBuf>,

    /// Topology XML file.
    pub topo_xml: PathBuf,

    /// Directory holding GLPK model/data/`.conn.txt`/skeleton files.
    pub glpk_dir: PathBuf,

    /// Directory holding the durable reservation store.
    pub db_dir: PathBuf,

    /// Host to bind the NRM server to.
    #[serde(default = "default_host")]
    pub nrm_host: IpAddr,

    /// Port to bind the NRM server to.
    #[serde(default = "default_port")]
    pub nrm_port: u16,

    /// Template name for the `pf` (primary) ILP model file.
    #[serde(default = "default_pf_model")]
    pub pf_tmp_model: String,

    /// Template name for the `solvec` ILP model file.
    #[serde(default = "default_solvec_model")]
    pub solvec_tmp_model: String,

    /// Max components per solvec group (spec.md §4.8, default 2).
    #[serde(default = "default_num_comps")]
    pub num_comps: usize,
}

fn default_logger() -> String {
    "tracing".to_string()
}

fn default_host() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn default_port() -> u16 {
    7401
}

fn default_pf_model() -> String {
    "pf".to_string()
}

fn default_solvec_model() -> String {
    "solvec".to_string()
}

fn default_num_comps() -> usize {
    2
}

impl NrmConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NrmConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nrm_port == 0 {
            return Err(NrmError::Config("nrm_port cannot be 0".into()));
        }
        if self.num_comps == 0 {
            return Err(NrmError::Config("num_comps cannot be 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "topo_xml": "topo.xml",
            "glpk_dir": "/var/nrm/glpk",
            "db_dir": "/var/nrm/db"
        }"#
    }

    #[test]
    fn defaults_fill_in() {
        let config: NrmConfig = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(config.nrm_port, 7401);
        assert_eq!(config.num_comps, 2);
        assert_eq!(config.pf_tmp_model, "pf");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let mut config: NrmConfig = serde_json::from_str(sample_json()).unwrap();
        config.nrm_port = 0;
        assert!(config.validate().is_err());
    }
}
