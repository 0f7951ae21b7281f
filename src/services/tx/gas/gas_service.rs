// services/tx/gas/gas_service.rs

use crate::config::GasConfig;
use crate::errors::AppError;
use crate::infrastructure::provider::ProviderTrait;
use crate::models::{Chain, Urgency};
use crate::services::tx::gas::gas_strategy::{GasThresholds, effective_multiplier_percent};
use crate::services::tx::types::{FeeSource, GasEstimate, Recommendation};
use crate::utils::{gwei_to_wei, scale_percent, wei_to_gwei, wei_to_usd};
use crate::{log_debug, log_warn};
use ethers_core::types::U256;
use std::collections::HashMap;
use std::sync::Arc;

/// 单条链的定价参数
#[derive(Debug, Clone, Copy)]
pub struct ChainGasProfile {
    pub thresholds: GasThresholds,
    /// RPC 不可用时使用的保守 base fee
    pub fallback_base_fee: U256,
}

impl ChainGasProfile {
    pub fn new(thresholds: GasThresholds, fallback_base_fee_gwei: Option<f64>) -> Self {
        Self {
            thresholds,
            fallback_base_fee: gwei_to_wei(fallback_base_fee_gwei.unwrap_or(thresholds.high)),
        }
    }

    fn default_for(chain: Chain) -> Self {
        Self::new(GasThresholds::default_for(chain), None)
    }
}

/// 一次定价请求
#[derive(Debug, Clone)]
pub struct GasQuery<'a> {
    pub chain: Chain,
    pub gas_limit: U256,
    pub native_price_usd: f64,
    /// 提交来源（如第三方聚合器），决定费用倍率
    pub source: Option<&'a str>,
    pub urgency: Urgency,
}

/// Gas 定价引擎（纯整数运算，无持久状态）
pub struct GasOptimizer {
    provider: Arc<dyn ProviderTrait>,
    profiles: HashMap<Chain, ChainGasProfile>,
    /// priority fee 占 base fee 的百分比
    priority_fee_percent: u128,
    source_multipliers: HashMap<String, u128>,
}

impl GasOptimizer {
    pub fn new(provider: Arc<dyn ProviderTrait>, config: &GasConfig) -> Self {
        Self {
            provider,
            profiles: HashMap::new(),
            priority_fee_percent: u128::from(config.priority_fee_percent),
            source_multipliers: config
                .source_multipliers
                .iter()
                .map(|(source, pct)| (source.clone(), u128::from(*pct)))
                .collect(),
        }
    }

    pub fn with_profile(mut self, chain: Chain, profile: ChainGasProfile) -> Self {
        self.profiles.insert(chain, profile);
        self
    }

    pub fn profile(&self, chain: Chain) -> ChainGasProfile {
        self.profiles
            .get(&chain)
            .copied()
            .unwrap_or_else(|| ChainGasProfile::default_for(chain))
    }

    pub fn multiplier_percent(&self, source: Option<&str>) -> u128 {
        effective_multiplier_percent(source.and_then(|s| self.source_multipliers.get(s).copied()))
    }

    /// 普通紧急度、无来源倍率的定价
    pub async fn estimate(&self, chain: Chain, gas_limit: U256, native_price_usd: f64) -> GasEstimate {
        self.estimate_with(&GasQuery {
            chain,
            gas_limit,
            native_price_usd,
            source: None,
            urgency: Urgency::Normal,
        })
        .await
    }

    /// 永不失败：RPC 不可用时返回保守的静态估算，建议强制为 wait
    pub async fn estimate_with(&self, query: &GasQuery<'_>) -> GasEstimate {
        let profile = self.profile(query.chain);

        match self.live_base_fee(query.chain).await {
            Ok(base_fee) => {
                let fee_gwei = wei_to_gwei(base_fee);
                let recommendation = profile.thresholds.recommend(fee_gwei, query.urgency);
                let (max_fee, priority_fee) = self.price(base_fee, query.source);
                let cost_wei = max_fee.saturating_mul(query.gas_limit);
                log_debug!(
                    "{} 定价: base={:.4} gwei, max_fee={}, tip={}, 建议={:?}",
                    query.chain,
                    fee_gwei,
                    max_fee,
                    priority_fee,
                    recommendation
                );
                GasEstimate {
                    chain: query.chain,
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                    estimated_cost_wei: cost_wei,
                    estimated_cost_usd: wei_to_usd(cost_wei, query.native_price_usd),
                    base_fee_gwei: fee_gwei,
                    fee_level: profile.thresholds.classify(fee_gwei),
                    recommendation,
                    source: FeeSource::Live,
                }
            }
            Err(e) => {
                log_warn!("{} 费用数据不可用，使用保守估算: {}", query.chain, e);
                let base_fee = profile.fallback_base_fee;
                let fee_gwei = wei_to_gwei(base_fee);
                let (max_fee, priority_fee) = self.price(base_fee, query.source);
                GasEstimate {
                    chain: query.chain,
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                    estimated_cost_wei: max_fee.saturating_mul(query.gas_limit),
                    // 没有可信数据，无法折算美元
                    estimated_cost_usd: 0.0,
                    base_fee_gwei: fee_gwei,
                    fee_level: profile.thresholds.classify(fee_gwei),
                    recommendation: Recommendation::Wait,
                    source: FeeSource::Fallback,
                }
            }
        }
    }

    async fn live_base_fee(&self, chain: Chain) -> Result<U256, AppError> {
        self.provider
            .get_fee_data(chain)
            .await
            .map(|fee| fee.base_fee)
            .map_err(|e| AppError::PricingUnavailable(e.to_string()))
    }

    /// priority = base × pct；max = base + priority；两者再按来源倍率上调
    fn price(&self, base_fee: U256, source: Option<&str>) -> (U256, U256) {
        let priority = scale_percent(base_fee, self.priority_fee_percent);
        let max_fee = base_fee.saturating_add(priority);
        let multiplier = self.multiplier_percent(source);
        (
            scale_percent(max_fee, multiplier),
            scale_percent(priority, multiplier),
        )
    }
}
