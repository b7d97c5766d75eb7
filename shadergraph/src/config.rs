use flexi_logger::LoggerHandle;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `RUST_LOG`-style level spec handed to the logger.
    pub log_level: String,
    /// Log the timing tree of every top-level evaluation at debug level.
    pub report_benchmarks: bool,
    pub emit_status_events: bool,
    /// Upper bound on the iterations of a single loop evaluation.
    pub max_loop_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            log_level: "info".to_string(),
            report_benchmarks: false,
            emit_status_events: true,
            max_loop_iterations: 1_000_000,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> anyhow::Result<EngineConfig> {
        let config: EngineConfig = serde_yml::from_str(yaml)?;
        if config.max_loop_iterations == 0 {
            anyhow::bail!("max_loop_iterations must be positive");
        }

        Ok(config)
    }

    pub fn from_yaml_file(path: &str) -> anyhow::Result<EngineConfig> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Starts the file logger at `log_level`. Logging stops when the handle drops.
    pub fn setup_logging(&self) -> anyhow::Result<LoggerHandle> {
        common::log_setup::setup_logging(&self.log_level)
    }
}
