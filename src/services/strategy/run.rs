// services/strategy/run.rs

use crate::config::OrchestratorConfig;
use crate::errors::AppError;
use crate::models::{
    IntentMetadata, TransactionPayload, TxIntent, TxRecord, TxStatus, TxType, Urgency, WorkflowKind,
    WorkflowResult,
};
use crate::services::tx::audit::TxTransition;
use crate::services::tx_executor::TxExecutor;
use crate::{log_info, log_warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// 被定价延后时的重试策略
#[derive(Debug, Clone, Copy)]
pub struct DeferralPolicy {
    pub max_deferrals: u32,
    pub delay: Duration,
}

impl Default for DeferralPolicy {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for DeferralPolicy {
    fn from(cfg: &OrchestratorConfig) -> Self {
        Self {
            max_deferrals: cfg.max_deferrals,
            delay: Duration::from_secs(cfg.deferral_delay_secs),
        }
    }
}

/// 每次工作流调用的公共参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowOptions {
    /// 为空时自动生成
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// 整个工作流的美元价值（审计/风控用）
    #[serde(default)]
    pub estimated_usd: f64,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub source: Option<String>,
}

/// 单步执行后是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Continue,
    Halt,
}

/// 一次工作流执行的状态：严格顺序执行步骤，汇总记录
pub(crate) struct WorkflowRun<'a> {
    executor: &'a TxExecutor,
    policy: DeferralPolicy,
    options: &'a WorkflowOptions,
    workflow_id: String,
    kind: WorkflowKind,
    started_at: DateTime<Utc>,
    records: Vec<TxRecord>,
    planned_steps: usize,
    error: Option<String>,
}

impl<'a> WorkflowRun<'a> {
    pub(crate) fn new(
        executor: &'a TxExecutor,
        policy: DeferralPolicy,
        kind: WorkflowKind,
        options: &'a WorkflowOptions,
    ) -> Self {
        let workflow_id = options
            .workflow_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        log_info!("工作流 {} ({:?}) 开始", workflow_id, kind);
        Self {
            executor,
            policy,
            options,
            workflow_id,
            kind,
            started_at: Utc::now(),
            records: Vec::new(),
            planned_steps: 0,
            error: None,
        }
    }

    pub(crate) fn plan(&mut self, steps: usize) {
        self.planned_steps = steps;
    }

    pub(crate) fn kind(&self) -> WorkflowKind {
        self.kind
    }

    pub(crate) fn options(&self) -> &WorkflowOptions {
        self.options
    }

    pub(crate) fn records(&self) -> &[TxRecord] {
        &self.records
    }

    /// 构造意图：元数据带上工作流 id 和步骤序号
    pub(crate) fn intent(
        &self,
        payload: TransactionPayload,
        tx_type: TxType,
        estimated_usd: f64,
        protocol_id: &str,
        pool_id: &str,
    ) -> TxIntent {
        TxIntent::new(payload, tx_type, estimated_usd)
            .urgency(self.options.urgency)
            .metadata(IntentMetadata {
                protocol_id: protocol_id.to_string(),
                pool_id: pool_id.to_string(),
                workflow_id: Some(self.workflow_id.clone()),
                step_index: self.records.len(),
                source: self.options.source.clone(),
                extra: Default::default(),
            })
    }

    /// 执行一步；只有确认的步骤才允许继续下一步
    pub(crate) async fn step(&mut self, intent: TxIntent) -> StepOutcome {
        let mut deferrals = 0u32;
        loop {
            match self.executor.execute(&intent).await {
                Ok(record) if record.status == TxStatus::Deferred && deferrals < self.policy.max_deferrals => {
                    deferrals += 1;
                    log_info!(
                        "工作流 {} 第 {} 步被延后 ({}/{})，{:?} 后重新定价",
                        self.workflow_id,
                        intent.metadata.step_index,
                        deferrals,
                        self.policy.max_deferrals,
                        self.policy.delay
                    );
                    sleep(self.policy.delay).await;
                }
                Ok(record) => {
                    let outcome = if record.is_confirmed() {
                        StepOutcome::Continue
                    } else {
                        StepOutcome::Halt
                    };
                    if outcome == StepOutcome::Halt {
                        log_warn!(
                            "工作流 {} 第 {} 步结束于 {:?}，停止后续步骤",
                            self.workflow_id,
                            intent.metadata.step_index,
                            record.status
                        );
                    }
                    self.records.push(record);
                    return outcome;
                }
                Err(e) => {
                    // 预检拒绝/提交失败：该步记为未上链的失败
                    log_warn!(
                        "工作流 {} 第 {} 步失败: {}",
                        self.workflow_id,
                        intent.metadata.step_index,
                        e
                    );
                    let record = TxRecord::failed_unsubmitted(&intent, self.executor.account(), e.to_string());
                    self.executor.audit().tx(TxTransition::Failed, &record);
                    self.records.push(record);
                    self.error = Some(e.to_string());
                    return StepOutcome::Halt;
                }
            }
        }
    }

    /// 在任何提交之前（或步骤之间）无法继续，例如适配器出错
    pub(crate) fn fail(&mut self, error: AppError) {
        log_warn!("工作流 {} 中止: {}", self.workflow_id, error);
        self.error = Some(error.to_string());
    }

    pub(crate) fn finish(self) -> WorkflowResult {
        let result = WorkflowResult::conclude(
            self.workflow_id,
            self.kind,
            self.records,
            self.planned_steps,
            self.error,
            self.started_at,
        );
        log_info!(
            "工作流 {} ({:?}) 结束: {:?}, 已确认 {}/{} 步",
            result.workflow_id,
            result.kind,
            result.status,
            result.confirmed_steps(),
            result.planned_steps
        );
        self.executor.audit().workflow_finished(&result);
        result
    }
}
