// services/tx/types.rs

use crate::config::ExecutorConfig;
use crate::models::Chain;
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 执行器参数
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub gas_limit_buffer_percent: u64, // 百分比，例如 120 表示 +20%
    pub confirmations: usize,          // 所需确认数
    pub confirmation_timeout: Duration,
    pub max_broadcast_retries: usize,
    pub broadcast_base_delay: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            gas_limit_buffer_percent: 120,
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(300),
            max_broadcast_retries: 3,
            broadcast_base_delay: Duration::from_millis(500),
        }
    }
}

impl From<&ExecutorConfig> for ExecutorOptions {
    fn from(cfg: &ExecutorConfig) -> Self {
        Self {
            gas_limit_buffer_percent: cfg.gas_limit_buffer_percent,
            confirmations: cfg.confirmations,
            confirmation_timeout: Duration::from_secs(cfg.confirmation_timeout_secs),
            max_broadcast_retries: cfg.max_broadcast_retries,
            broadcast_base_delay: Duration::from_millis(cfg.broadcast_base_delay_ms),
        }
    }
}

/// 定价建议（准入控制）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Execute,
    Wait,
    /// 调用方要求越过 wait（如避免清算），仍使用实时定价
    Urgent,
}

/// 当前费用相对阈值的档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeLevel {
    Low,
    Normal,
    Elevated,
    Spike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSource {
    Live,
    /// RPC 不可用时的静态保守估算
    Fallback,
}

/// 每次请求重新计算，不缓存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasEstimate {
    pub chain: Chain,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub estimated_cost_wei: U256,
    /// 仅供参考
    pub estimated_cost_usd: f64,
    pub base_fee_gwei: f64,
    pub fee_level: FeeLevel,
    pub recommendation: Recommendation,
    pub source: FeeSource,
}

impl GasEstimate {
    /// 是否允许立即提交
    pub fn admits(&self) -> bool {
        match self.recommendation {
            Recommendation::Execute => true,
            Recommendation::Urgent => self.source == FeeSource::Live,
            Recommendation::Wait => false,
        }
    }
}
