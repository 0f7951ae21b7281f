// services/tx/signer/local_signer.rs

use crate::errors::AppError;
use crate::services::tx::signer::signer_trait::TxSigner;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{H160, Signature};
use ethers_signers::{LocalWallet, Signer};
use std::sync::Arc;

#[derive(Clone)]
pub struct LocalSigner {
    wallet: Arc<LocalWallet>,
}

impl LocalSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self {
            wallet: Arc::new(wallet),
        }
    }

    /// 从十六进制私钥构造（可带 0x 前缀）
    pub fn from_key(private_key: &str) -> Result<Self, AppError> {
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| AppError::Config(format!("私钥无效: {}", e)))?;
        Ok(Self::new(wallet))
    }
}

#[async_trait::async_trait]
impl TxSigner for LocalSigner {
    async fn sign_tx(&self, tx: &TypedTransaction) -> Result<Signature, AppError> {
        self.wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| AppError::Signing(e.to_string()))
    }

    fn address(&self) -> H160 {
        self.wallet.address()
    }
}
