pub mod chain;
pub mod intent;
pub mod payload;
pub mod record;
pub mod workflow;

pub use chain::Chain;
pub use intent::{IntentMetadata, TxIntent, TxType, Urgency};
pub use payload::TransactionPayload;
pub use record::{ReceiptOutcome, ReceiptSummary, TokenTransfer, TxRecord, TxStatus};
pub use workflow::{StrandedFunds, WorkflowKind, WorkflowResult, WorkflowStatus};
