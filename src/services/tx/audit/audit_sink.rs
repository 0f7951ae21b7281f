// services/tx/audit/audit_sink.rs

use crate::models::{TxRecord, WorkflowResult};
use serde::Serialize;
use std::sync::Mutex;

/// TxRecord 状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxTransition {
    Submitted,
    Confirmed,
    Failed,
    Deferred,
    /// 等待确认超时，交易仍可能上链
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Tx {
        transition: TxTransition,
        record: TxRecord,
    },
    WorkflowFinished {
        result: WorkflowResult,
    },
}

/// 审计事件出口；持久化/报表等消费方在核心之外
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);

    fn tx(&self, transition: TxTransition, record: &TxRecord) {
        self.emit(AuditEvent::Tx {
            transition,
            record: record.clone(),
        });
    }

    fn workflow_finished(&self, result: &WorkflowResult) {
        self.emit(AuditEvent::WorkflowFinished {
            result: result.clone(),
        });
    }
}

/// 以 tracing 事件（target = "audit"）输出 JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let kind = match &event {
            AuditEvent::Tx { transition, .. } => match transition {
                TxTransition::Submitted => "tx_submitted",
                TxTransition::Confirmed => "tx_confirmed",
                TxTransition::Failed => "tx_failed",
                TxTransition::Deferred => "tx_deferred",
                TxTransition::TimedOut => "tx_timed_out",
            },
            AuditEvent::WorkflowFinished { .. } => "workflow_finished",
        };
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(target: "audit", event = kind, payload = %payload),
            Err(e) => tracing::error!(target: "audit", event = kind, error = %e, "audit serialization failed"),
        }
    }
}

/// 内存收集，用于测试与嵌入
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn tx_transitions(&self) -> Vec<TxTransition> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::Tx { transition, .. } => Some(transition),
                AuditEvent::WorkflowFinished { .. } => None,
            })
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
