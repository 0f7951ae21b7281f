// services/strategy/adapter.rs

use crate::errors::AppError;
use crate::models::{Chain, TransactionPayload, TxRecord};
use async_trait::async_trait;
use ethers_core::types::{H160, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: H160,
    pub amount: U256,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepositParams {
    pub pool_id: String,
    #[serde(default)]
    pub tokens: Vec<TokenAmount>,
    /// 再平衡时为已确认的 withdraw 记录，存入金额从其转入事件推导
    #[serde(skip)]
    pub prior_steps: Vec<TxRecord>,
}

impl DepositParams {
    /// 以前序步骤实际转入的代币作为存入金额，同一代币累加
    pub fn from_prior_steps(pool_id: impl Into<String>, prior: &[TxRecord]) -> Self {
        let mut tokens: Vec<TokenAmount> = Vec::new();
        for transfer in prior
            .iter()
            .filter(|r| r.is_confirmed())
            .flat_map(|r| r.inbound_transfers())
        {
            match tokens.iter_mut().find(|t| t.token == transfer.token) {
                Some(existing) => existing.amount = existing.amount.saturating_add(transfer.amount),
                None => tokens.push(TokenAmount {
                    token: transfer.token,
                    amount: transfer.amount,
                }),
            }
        }
        Self {
            pool_id: pool_id.into(),
            tokens,
            prior_steps: prior.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawParams {
    pub pool_id: String,
    /// None 表示全部赎回
    #[serde(default)]
    pub shares: Option<U256>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwapParams {
    pub pool_id: String,
    pub token_in: H160,
    pub token_out: H160,
    pub amount_in: U256,
    pub min_amount_out: U256,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestParams {
    pub pool_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompoundParams {
    pub pool_id: String,
}

/// 协议适配器：只负责构造未签名交易，不参与控制流。
///
/// 所有方法统一返回交易序列（长度 ≥ 1）；protocol_id / chain 仅用于日志与元数据。
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn protocol_id(&self) -> &str;

    fn chain(&self) -> Chain;

    async fn build_deposit(&self, params: &DepositParams) -> Result<Vec<TransactionPayload>, AppError>;

    async fn build_withdraw(&self, params: &WithdrawParams) -> Result<Vec<TransactionPayload>, AppError>;

    async fn build_swap(&self, params: &SwapParams) -> Result<Vec<TransactionPayload>, AppError>;

    async fn build_harvest(&self, params: &HarvestParams) -> Result<Vec<TransactionPayload>, AppError>;

    async fn build_compound(&self, params: &CompoundParams) -> Result<Vec<TransactionPayload>, AppError>;
}
