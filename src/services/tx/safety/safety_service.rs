// services/tx/safety/safety_service.rs

use crate::config::AllowlistConfig;
use crate::errors::AppError;
use crate::models::{Chain, TransactionPayload};
use ethers_core::types::{H160, U256};
use std::collections::HashMap;

/// 提交前的本地策略检查，不访问链
#[derive(Debug, Clone, Default)]
pub struct SafetyPolicy {
    allowlist: AllowlistConfig,
    /// 单笔 value 上限（wei）
    max_value: HashMap<Chain, U256>,
}

impl SafetyPolicy {
    pub fn new(allowlist: AllowlistConfig) -> Self {
        Self {
            allowlist,
            max_value: HashMap::new(),
        }
    }

    pub fn with_value_ceiling(mut self, chain: Chain, max_value: U256) -> Self {
        self.max_value.insert(chain, max_value);
        self
    }

    /// 从十进制字符串解析上限
    pub fn with_value_ceiling_str(self, chain: Chain, max_value_wei: &str) -> Result<Self, AppError> {
        let max_value = U256::from_dec_str(max_value_wei.trim())
            .map_err(|e| AppError::Config(format!("{} max_value_wei 无效: {}", chain, e)))?;
        Ok(self.with_value_ceiling(chain, max_value))
    }

    pub fn check(&self, payload: &TransactionPayload) -> Result<(), AppError> {
        let chain = payload.chain();

        let Some(ceiling) = self.max_value.get(&chain) else {
            return Err(AppError::SafetyRejected(format!(
                "no value ceiling configured for {}",
                chain
            )));
        };
        if payload.value() > *ceiling {
            return Err(AppError::SafetyRejected(format!(
                "value {} exceeds per-transaction ceiling {} on {}",
                payload.value(),
                ceiling,
                chain
            )));
        }

        let to = payload.to();
        if to == H160::zero() {
            return Err(AppError::SafetyRejected(
                "destination is the zero address".to_string(),
            ));
        }
        if !self.allowlist.is_allowed(chain, &to) {
            return Err(AppError::SafetyRejected(format!(
                "destination {:?} is not allow-listed on {}",
                to, chain
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::Bytes;

    fn vault() -> H160 {
        H160::repeat_byte(0xaa)
    }

    fn policy() -> SafetyPolicy {
        SafetyPolicy::new(AllowlistConfig::from_entries([(Chain::Ethereum, vault())]))
            .with_value_ceiling(Chain::Ethereum, U256::from(1_000u64))
    }

    #[test]
    fn accepts_allow_listed_destination_within_ceiling() {
        let payload = TransactionPayload::new(Chain::Ethereum, vault(), Bytes::default(), U256::from(1_000u64));
        assert!(policy().check(&payload).is_ok());
    }

    #[test]
    fn rejects_value_above_ceiling() {
        let payload = TransactionPayload::new(Chain::Ethereum, vault(), Bytes::default(), U256::from(1_001u64));
        assert!(matches!(policy().check(&payload), Err(AppError::SafetyRejected(_))));
    }

    #[test]
    fn rejects_unknown_destination_and_unconfigured_chain() {
        let stranger = TransactionPayload::new(Chain::Ethereum, H160::repeat_byte(0xbb), Bytes::default(), U256::zero());
        assert!(matches!(policy().check(&stranger), Err(AppError::SafetyRejected(_))));

        let other_chain = TransactionPayload::new(Chain::Base, vault(), Bytes::default(), U256::zero());
        assert!(matches!(policy().check(&other_chain), Err(AppError::SafetyRejected(_))));
    }

    #[test]
    fn parses_decimal_ceiling() {
        let policy = SafetyPolicy::default()
            .with_value_ceiling_str(Chain::Base, "5000000000000000000")
            .unwrap();
        assert_eq!(policy.max_value.get(&Chain::Base), Some(&U256::exp10(18).saturating_mul(U256::from(5u64))));
        assert!(SafetyPolicy::default().with_value_ceiling_str(Chain::Base, "-1").is_err());
    }
}
