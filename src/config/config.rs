use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub gas: GasConfig,
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// 键为链名（ethereum / arbitrum / ...）
    pub chains: HashMap<String, ChainConfig>,
}

/// RPC 重试配置
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub max_retries: usize,
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GasConfig {
    /// priority fee 占 base fee 的百分比
    #[serde(default = "default_priority_fee_percent")]
    pub priority_fee_percent: u64,
    /// 提交来源 → 费用倍率百分比（100 = 不调整）
    #[serde(default)]
    pub source_multipliers: HashMap<String, u64>,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            priority_fee_percent: default_priority_fee_percent(),
            source_multipliers: HashMap::new(),
        }
    }
}

fn default_priority_fee_percent() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutorConfig {
    pub gas_limit_buffer_percent: u64,
    pub confirmations: usize,
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    pub max_broadcast_retries: usize,
    pub broadcast_base_delay_ms: u64,
    pub allowlist_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrchestratorConfig {
    pub max_deferrals: u32,
    pub deferral_delay_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_deferrals: 0,
            deferral_delay_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub api_keys: String,
    /// 缺省时使用内置阈值
    pub thresholds: Option<ThresholdConfig>,
    /// RPC 不可用时使用的保守 base fee（gwei），缺省取 high 阈值
    pub fallback_base_fee_gwei: Option<f64>,
    #[serde(default)]
    pub native_price_usd: f64,
    /// 单笔交易 value 上限（wei，十进制字符串）
    pub max_value_wei: String,
}

/// gas 阈值（gwei）
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// 从指定文件加载（测试、嵌入式使用）
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(File::with_name(path))
            .build()?
            .try_deserialize()
    }
}
