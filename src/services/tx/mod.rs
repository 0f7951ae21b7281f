pub mod audit;
pub mod gas;
pub mod nonce;
pub mod safety;
pub mod signer;
pub mod types;
