pub mod strategy;
pub mod tx;
pub mod tx_executor;

pub use strategy::StrategyOrchestrator;
pub use tx_executor::TxExecutor;
