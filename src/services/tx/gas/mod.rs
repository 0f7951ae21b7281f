pub mod gas_service;
pub mod gas_strategy;

pub use gas_service::{ChainGasProfile, GasOptimizer, GasQuery};
pub use gas_strategy::GasThresholds;
