use crate::models::domain::chain::Chain;
use ethers_core::types::{Bytes, H160, U256};
use serde::{Deserialize, Serialize};

/// 协议适配器产出的未签名交易描述，构建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    chain: Chain,
    to: H160,
    data: Bytes,
    value: U256,
    /// 适配器已知的 gas limit；为空时由执行器链上估算
    gas_limit: Option<U256>,
}

impl TransactionPayload {
    pub fn new(chain: Chain, to: H160, data: Bytes, value: U256) -> Self {
        Self {
            chain,
            to,
            data,
            value,
            gas_limit: None,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn to(&self) -> H160 {
        self.to
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn gas_limit(&self) -> Option<U256> {
        self.gas_limit
    }

    /// 函数选择器（前 4 字节），用于日志
    pub fn selector_hex(&self) -> String {
        if self.data.len() >= 4 {
            format!("0x{}", hex::encode(&self.data[..4]))
        } else {
            "0x".to_string()
        }
    }
}
