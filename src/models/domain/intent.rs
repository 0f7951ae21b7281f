use crate::models::domain::payload::TransactionPayload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Supply,
    Withdraw,
    Swap,
    Harvest,
    Compound,
    Deposit,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxType::Supply => "supply",
            TxType::Withdraw => "withdraw",
            TxType::Swap => "swap",
            TxType::Harvest => "harvest",
            TxType::Compound => "compound",
            TxType::Deposit => "deposit",
        };
        f.write_str(s)
    }
}

/// 紧急程度：Urgent 可以越过 wait 建议，但仍使用实时定价
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Normal,
    Urgent,
}

/// 意图元数据，仅用于日志/审计，不参与控制流
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub protocol_id: String,
    pub pool_id: String,
    pub workflow_id: Option<String>,
    pub step_index: usize,
    /// 提交来源（如聚合器），决定 gas 倍率
    pub source: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct TxIntent {
    pub payload: TransactionPayload,
    pub tx_type: TxType,
    pub estimated_usd: f64,
    pub urgency: Urgency,
    /// 原生代币美元价格；为空时使用链配置中的静态价格
    pub native_price_usd: Option<f64>,
    pub metadata: IntentMetadata,
}

impl TxIntent {
    pub fn new(payload: TransactionPayload, tx_type: TxType, estimated_usd: f64) -> Self {
        Self {
            payload,
            tx_type,
            estimated_usd,
            urgency: Urgency::Normal,
            native_price_usd: None,
            metadata: IntentMetadata::default(),
        }
    }

    pub fn urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn metadata(mut self, metadata: IntentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn native_price_usd(mut self, price: f64) -> Self {
        self.native_price_usd = Some(price);
        self
    }
}
