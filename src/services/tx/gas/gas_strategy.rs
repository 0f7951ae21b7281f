// services/tx/gas/gas_strategy.rs

use crate::config::ThresholdConfig;
use crate::models::{Chain, Urgency};
use crate::services::tx::types::{FeeLevel, Recommendation};

/// 每条链的费用阈值（gwei）。不同链量级相差数个数量级，必须分链校准
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl GasThresholds {
    pub fn new(low: f64, medium: f64, high: f64) -> Self {
        Self { low, medium, high }
    }

    /// 内置默认值，配置缺省时使用
    pub fn default_for(chain: Chain) -> Self {
        match chain {
            Chain::Ethereum => Self::new(15.0, 30.0, 60.0),
            // rollup 的费用下限约为主网的千分之一
            Chain::Arbitrum | Chain::Optimism | Chain::Base => Self::new(0.015, 0.03, 0.06),
            Chain::Polygon => Self::new(50.0, 100.0, 300.0),
            Chain::Bsc => Self::new(1.0, 3.0, 5.0),
            Chain::Avalanche => Self::new(25.0, 35.0, 75.0),
        }
    }

    pub fn classify(&self, fee_gwei: f64) -> FeeLevel {
        if fee_gwei <= self.low {
            FeeLevel::Low
        } else if fee_gwei <= self.medium {
            FeeLevel::Normal
        } else if fee_gwei <= self.high {
            FeeLevel::Elevated
        } else {
            FeeLevel::Spike
        }
    }

    /// fee ≤ medium → execute；否则 wait，紧急调用方得到 urgent
    pub fn recommend(&self, fee_gwei: f64, urgency: Urgency) -> Recommendation {
        if fee_gwei <= self.medium {
            Recommendation::Execute
        } else if urgency == Urgency::Urgent {
            Recommendation::Urgent
        } else {
            Recommendation::Wait
        }
    }
}

impl From<ThresholdConfig> for GasThresholds {
    fn from(cfg: ThresholdConfig) -> Self {
        Self::new(cfg.low, cfg.medium, cfg.high)
    }
}

/// 来源倍率（百分比），只允许上调
pub fn effective_multiplier_percent(configured: Option<u128>) -> u128 {
    configured.unwrap_or(100).max(100)
}
