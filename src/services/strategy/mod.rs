pub mod adapter;
pub mod compound;
pub mod orchestrator;
pub mod rebalance;
pub mod run;
mod simple;

pub use adapter::{
    CompoundParams, DepositParams, HarvestParams, ProtocolAdapter, SwapParams, TokenAmount,
    WithdrawParams,
};
pub use compound::split_usd;
pub use orchestrator::StrategyOrchestrator;
pub use rebalance::RebalanceParams;
pub use run::{DeferralPolicy, WorkflowOptions};
