use crate::models::domain::intent::TxType;
use crate::models::domain::record::{TxRecord, TxStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Harvest,
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    Supply,
    Compound,
    Rebalance,
}

impl WorkflowKind {
    pub fn is_simple(&self) -> bool {
        !matches!(self, WorkflowKind::Compound | WorkflowKind::Rebalance)
    }

    pub fn tx_type(&self) -> TxType {
        match self {
            WorkflowKind::Harvest => TxType::Harvest,
            WorkflowKind::Swap => TxType::Swap,
            WorkflowKind::AddLiquidity => TxType::Deposit,
            WorkflowKind::RemoveLiquidity => TxType::Withdraw,
            WorkflowKind::Supply => TxType::Supply,
            WorkflowKind::Compound => TxType::Compound,
            // 再平衡按步骤区分 withdraw/deposit
            WorkflowKind::Rebalance => TxType::Withdraw,
        }
    }

    /// 中途失败时资金停留的状态
    fn stranded_state(&self) -> Option<StrandedFunds> {
        match self {
            WorkflowKind::Compound => Some(StrandedFunds::RewardsClaimedNotRedeposited),
            WorkflowKind::Rebalance => Some(StrandedFunds::WithdrawnNotRedeployed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// 全部步骤已确认
    Completed,
    /// 前缀步骤已确认，后续步骤失败，资金可能停留在中间状态
    Partial,
    /// 没有任何步骤在链上确认
    Aborted,
    /// 某步骤等待确认超时或被定价延后，流程暂停
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrandedFunds {
    RewardsClaimedNotRedeposited,
    WithdrawnNotRedeployed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub kind: WorkflowKind,
    pub status: WorkflowStatus,
    pub records: Vec<TxRecord>,
    pub planned_steps: usize,
    /// 恢复执行时应从哪一步开始
    pub next_step: Option<usize>,
    pub stranded: Option<StrandedFunds>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowResult {
    /// 根据已有记录推导整体状态
    pub(crate) fn conclude(
        workflow_id: String,
        kind: WorkflowKind,
        records: Vec<TxRecord>,
        planned_steps: usize,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let confirmed = records.iter().take_while(|r| r.is_confirmed()).count();
        let last_status = records.last().map(|r| r.status);

        let status = if planned_steps > 0 && confirmed == planned_steps && error.is_none() {
            WorkflowStatus::Completed
        } else if matches!(last_status, Some(TxStatus::Pending | TxStatus::Deferred)) {
            WorkflowStatus::Pending
        } else if confirmed == 0 {
            WorkflowStatus::Aborted
        } else {
            WorkflowStatus::Partial
        };

        let next_step = match status {
            WorkflowStatus::Completed | WorkflowStatus::Aborted => None,
            _ => Some(confirmed),
        };
        let stranded = if confirmed > 0 && status != WorkflowStatus::Completed {
            kind.stranded_state()
        } else {
            None
        };

        Self {
            workflow_id,
            kind,
            status,
            records,
            planned_steps,
            next_step,
            stranded,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn confirmed_steps(&self) -> usize {
        self.records.iter().filter(|r| r.is_confirmed()).count()
    }
}
