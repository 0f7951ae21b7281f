pub mod audit_sink;

pub use audit_sink::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink, TxTransition};
