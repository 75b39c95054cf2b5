//! Service configuration loaded from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use crate::api::server::ApiServerConfig;
use crate::downsample::DownsampleConfig;
use crate::pipeline::{PipelineConfig, ToolConfig, parse_stage_list};
use crate::retention::RetentionConfig;
use crate::{Error, Result};

/// Default directory published alignments are moved to.
pub const DEFAULT_PUBLISH_DIR: &str = "/var/www/html";
/// Default directory of the static web client.
pub const DEFAULT_STATIC_DIR: &str = "js/build";
/// Default directory for rotated log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Everything the service binary needs to start.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api: ApiServerConfig,
    pub pipeline: PipelineConfig,
    pub retention: RetentionConfig,
    pub publish_dir: PathBuf,
    pub static_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api: ApiServerConfig::default(),
            pipeline: PipelineConfig::default(),
            retention: RetentionConfig::default(),
            publish_dir: PathBuf::from(DEFAULT_PUBLISH_DIR),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl ServiceConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `WORK_DIR`, `PUBLISH_DIR`, `STATIC_DIR`, `LOG_DIR`
    /// - `REFERENCE_PATH`, `COUNT_LINES_BIN`
    /// - `DOWNSAMPLE_MAX_READS`, `DOWNSAMPLE_SEED`
    /// - `RETENTION_SECS`
    /// - `PIPELINE_ABORT_ON` (comma-separated stage names)
    /// - `API_BIND_ADDRESS`, `API_PORT`
    ///
    /// Blank values are treated as unset. Values that do not parse are an error.
    pub fn from_env_or_default() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env_or_default`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get("WORK_DIR") {
            config.pipeline.work_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("PUBLISH_DIR") {
            config.publish_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        let mut tools = ToolConfig::default();
        if let Some(reference) = get("REFERENCE_PATH") {
            tools.reference = PathBuf::from(reference);
        }
        if let Some(counter) = get("COUNT_LINES_BIN") {
            tools.counter = counter;
        }
        config.pipeline.tools = tools;

        let mut downsample = DownsampleConfig::default();
        if let Some(value) = get("DOWNSAMPLE_MAX_READS") {
            downsample.max_reads = parse_var("DOWNSAMPLE_MAX_READS", &value)?;
        }
        if let Some(value) = get("DOWNSAMPLE_SEED") {
            downsample.seed = parse_var("DOWNSAMPLE_SEED", &value)?;
        }
        config.pipeline.downsample = downsample;

        if let Some(value) = get("RETENTION_SECS") {
            let secs = parse_var("RETENTION_SECS", &value)?;
            config.retention = config.retention.with_max_age_secs(secs);
        }

        if let Some(value) = get("PIPELINE_ABORT_ON") {
            config.pipeline.abort_on = parse_stage_list(&value)?;
        }

        if let Some(address) = get("API_BIND_ADDRESS") {
            config.api.bind_address = address;
        }
        if let Some(value) = get("API_PORT") {
            config.api.port = parse_var("API_PORT", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.downsample.max_reads == 0 {
            return Err(Error::config("DOWNSAMPLE_MAX_READS must be greater than 0"));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid value for {key}: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.pipeline.work_dir, PathBuf::from("."));
        assert_eq!(config.publish_dir, PathBuf::from("/var/www/html"));
        assert_eq!(config.static_dir, PathBuf::from("js/build"));
        assert_eq!(config.pipeline.tools.reference, PathBuf::from("./ref.fa"));
        assert_eq!(config.pipeline.downsample.max_reads, 100_000);
        assert_eq!(config.pipeline.downsample.seed, 100);
        assert_eq!(config.retention.max_age_secs, 3600);
        assert!(config.pipeline.abort_on.is_empty());
        assert_eq!(config.api.port, 8000);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("WORK_DIR", "/data/work"),
            ("DOWNSAMPLE_MAX_READS", "5000"),
            ("RETENTION_SECS", "60"),
            ("PIPELINE_ABORT_ON", "align,sort"),
            ("API_PORT", "9000"),
            ("API_BIND_ADDRESS", "  "),
        ])
        .unwrap();

        assert_eq!(config.pipeline.work_dir, PathBuf::from("/data/work"));
        assert_eq!(config.pipeline.downsample.max_reads, 5000);
        assert_eq!(config.retention.max_age_secs, 60);
        assert_eq!(config.pipeline.abort_on, [Stage::Align, Stage::Sort]);
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(matches!(
            load(&[("API_PORT", "eighty")]),
            Err(Error::Configuration(_))
        ));
        assert!(load(&[("DOWNSAMPLE_SEED", "-1")]).is_err());
        assert!(load(&[("DOWNSAMPLE_MAX_READS", "0")]).is_err());
        assert!(load(&[("PIPELINE_ABORT_ON", "align,bogus")]).is_err());
    }
}
