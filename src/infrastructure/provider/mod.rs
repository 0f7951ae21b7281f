pub mod ethereum_provider;
mod retry_adapter;

pub use ethereum_provider::{ChainProviders, EthereumProvider, FeeData, ProviderTrait, receipt_outcome};
pub use retry_adapter::{RetryAdapter, backoff_delay};
