pub mod allowlist_config;
#[allow(clippy::module_inception)]
pub mod config;

pub use allowlist_config::AllowlistConfig;
pub use config::{
    ChainConfig, Config, ExecutorConfig, GasConfig, OrchestratorConfig, ProviderConfig,
    ThresholdConfig,
};
