use crate::errors::AppError;
use async_trait::async_trait;
use ethers::types::{H160, Signature, transaction::eip2718::TypedTransaction};

/// 交易签名能力；chain_id 由交易本身携带
#[async_trait]
pub trait TxSigner: Send + Sync {
    async fn sign_tx(&self, tx: &TypedTransaction) -> Result<Signature, AppError>;
    fn address(&self) -> H160;
}
