use crate::models::domain::chain::Chain;
use crate::models::domain::intent::{IntentMetadata, TxIntent, TxType};
use chrono::{DateTime, Utc};
use ethers_core::types::{H160, H256, Log, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// 已广播，尚未确认（或等待超时）
    Pending,
    Confirmed,
    Failed,
    /// 定价建议 wait，未提交
    Deferred,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }
}

/// 回执中解析出的 ERC20 Transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub token: H160,
    pub from: H160,
    pub to: H160,
    pub amount: U256,
}

/// 链上回执摘要（由 provider 产出）
#[derive(Debug, Clone, Default)]
pub struct ReceiptSummary {
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub effective_gas_price: Option<U256>,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone)]
pub enum ReceiptOutcome {
    Confirmed(ReceiptSummary),
    Reverted(ReceiptSummary),
    /// 超时仍未上链，交易可能稍后确认
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_hash: Option<H256>,
    pub chain: Chain,
    pub account: H160,
    pub nonce: Option<u64>,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub to: H160,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub gas_limit: U256,
    pub gas_used: Option<U256>,
    /// 实际 gas 花费 = gas_used * effective_gas_price
    pub gas_cost_wei: Option<U256>,
    pub block_number: Option<u64>,
    pub estimated_usd: f64,
    pub transfers: Vec<TokenTransfer>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub metadata: IntentMetadata,
}

impl TxRecord {
    fn from_intent(intent: &TxIntent, account: H160, status: TxStatus) -> Self {
        Self {
            tx_hash: None,
            chain: intent.payload.chain(),
            account,
            nonce: None,
            tx_type: intent.tx_type,
            status,
            to: intent.payload.to(),
            max_fee_per_gas: U256::zero(),
            max_priority_fee_per_gas: U256::zero(),
            gas_limit: U256::zero(),
            gas_used: None,
            gas_cost_wei: None,
            block_number: None,
            estimated_usd: intent.estimated_usd,
            transfers: Vec::new(),
            failure_reason: None,
            created_at: Utc::now(),
            submitted_at: None,
            confirmed_at: None,
            metadata: intent.metadata.clone(),
        }
    }

    /// 定价建议等待，未占用 nonce
    pub(crate) fn deferred(
        intent: &TxIntent,
        account: H160,
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    ) -> Self {
        let mut record = Self::from_intent(intent, account, TxStatus::Deferred);
        record.max_fee_per_gas = max_fee_per_gas;
        record.max_priority_fee_per_gas = max_priority_fee_per_gas;
        record
    }

    /// 未能上链的失败记录（广播前失败或被节点拒绝）
    pub(crate) fn failed_unsubmitted(intent: &TxIntent, account: H160, reason: String) -> Self {
        let mut record = Self::from_intent(intent, account, TxStatus::Failed);
        record.metadata.extra.insert("failure_reason".to_string(), reason.clone());
        record.failure_reason = Some(reason);
        record
    }

    pub(crate) fn submitted(
        intent: &TxIntent,
        account: H160,
        tx_hash: H256,
        nonce: u64,
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
        gas_limit: U256,
    ) -> Self {
        let mut record = Self::from_intent(intent, account, TxStatus::Pending);
        record.tx_hash = Some(tx_hash);
        record.nonce = Some(nonce);
        record.max_fee_per_gas = max_fee_per_gas;
        record.max_priority_fee_per_gas = max_priority_fee_per_gas;
        record.gas_limit = gas_limit;
        record.submitted_at = Some(Utc::now());
        record
    }

    pub(crate) fn apply_receipt(&mut self, summary: &ReceiptSummary, confirmed: bool) {
        self.block_number = summary.block_number;
        self.gas_used = summary.gas_used;
        self.gas_cost_wei = match (summary.gas_used, summary.effective_gas_price) {
            (Some(used), Some(price)) => used.checked_mul(price),
            _ => None,
        };
        if confirmed {
            self.status = TxStatus::Confirmed;
            self.confirmed_at = Some(Utc::now());
        } else {
            self.mark_failed("transaction reverted on-chain".to_string());
        }
    }

    pub(crate) fn mark_failed(&mut self, reason: String) {
        self.status = TxStatus::Failed;
        self.metadata
            .extra
            .insert("failure_reason".to_string(), reason.clone());
        self.failure_reason = Some(reason);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == TxStatus::Confirmed
    }

    /// 转入指定账户的代币（用于后续步骤确定金额）
    pub fn inbound_transfers(&self) -> impl Iterator<Item = &TokenTransfer> {
        self.transfers.iter().filter(move |t| t.to == self.account)
    }
}
