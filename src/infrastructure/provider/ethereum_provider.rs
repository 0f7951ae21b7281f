use crate::config::ChainConfig;
use crate::errors::AppError;
use crate::log_info;
use crate::models::{Chain, ReceiptOutcome, ReceiptSummary};
use crate::utils::u256_to_u64;
use async_trait::async_trait;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{BlockNumber, Bytes, H160, H256, TransactionReceipt, U256};
use ethers_providers::{Http, Middleware, PendingTransaction, Provider};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// 链上费用数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeData {
    /// 最新区块的 base fee；非 EIP-1559 链为 gas price
    pub base_fee: U256,
}

/// 执行核心消费的链 RPC 能力（按链分派）
#[async_trait]
pub trait ProviderTrait: Send + Sync {
    async fn get_fee_data(&self, chain: Chain) -> Result<FeeData, AppError>;
    /// 包含 pending 交易的 nonce
    async fn get_account_nonce(&self, chain: Chain, account: H160) -> Result<u64, AppError>;
    async fn estimate_gas(&self, chain: Chain, tx: &TypedTransaction) -> Result<U256, AppError>;
    async fn broadcast(&self, chain: Chain, raw: Bytes) -> Result<H256, AppError>;
    async fn wait_for_receipt(
        &self,
        chain: Chain,
        tx_hash: H256,
        wait: Duration,
        confirmations: usize,
    ) -> Result<ReceiptOutcome, AppError>;
}

/// 单条链的 RPC 客户端，多个 api key 轮询
pub struct EthereumProvider {
    chain: Chain,
    providers: Vec<Arc<Provider<Http>>>,
    index: AtomicUsize,
    poll_interval: Duration,
}

impl EthereumProvider {
    pub fn new(chain: Chain, config: &ChainConfig, poll_interval: Duration) -> Result<Self, AppError> {
        let mut keys: Vec<&str> = config
            .api_keys
            .split(',')
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        // 无 api key 时直接使用 rpc_url
        if keys.is_empty() {
            keys.push("");
        }

        let providers = keys
            .into_iter()
            .map(|key| {
                let url = if key.is_empty() {
                    Url::parse(&config.rpc_url)
                } else if config.rpc_url.ends_with('/') {
                    Url::parse(&format!("{}{}", config.rpc_url, key))
                } else {
                    Url::parse(&config.rpc_url).map(|mut u| {
                        u.set_path(&format!("/{}", key));
                        u
                    })
                }
                .map_err(|e| AppError::Config(format!("{} RPC URL 无效: {}", chain, e)))?;
                Provider::<Http>::try_from(url.as_str())
                    .map(Arc::new)
                    .map_err(|e| AppError::Config(format!("{} RPC URL 无效: {}", chain, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        log_info!("链 {} 初始化 {} 个RPC Provider", chain, providers.len());

        Ok(Self {
            chain,
            providers,
            index: AtomicUsize::new(0),
            poll_interval,
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn get_provider(&self) -> Arc<Provider<Http>> {
        let i = self.index.fetch_add(1, Ordering::Relaxed);
        self.providers[i % self.providers.len()].clone()
    }

    pub async fn get_fee_data(&self) -> Result<FeeData, AppError> {
        let provider = self.get_provider();
        let block = provider.get_block(BlockNumber::Latest).await?;
        let base_fee = match block.and_then(|b| b.base_fee_per_gas) {
            Some(fee) => fee,
            None => provider.get_gas_price().await?,
        };
        Ok(FeeData { base_fee })
    }

    pub async fn get_account_nonce(&self, account: H160) -> Result<u64, AppError> {
        let count = self
            .get_provider()
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await?;
        u256_to_u64(count)
    }

    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, AppError> {
        Ok(self.get_provider().estimate_gas(tx, None).await?)
    }

    pub async fn broadcast(&self, raw: Bytes) -> Result<H256, AppError> {
        // PendingTransaction 借用 provider，需先绑定
        let provider = self.get_provider();
        let pending = provider.send_raw_transaction(raw).await?;
        Ok(pending.tx_hash())
    }

    pub async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        wait: Duration,
        confirmations: usize,
    ) -> Result<ReceiptOutcome, AppError> {
        // 持有 provider 的 Arc，确保整个 await 期间 Http Client 不被释放
        let provider = self.get_provider();
        let pending = PendingTransaction::new(tx_hash, provider.as_ref())
            .interval(self.poll_interval)
            .confirmations(confirmations);

        let receipt = match timeout(wait, pending).await {
            // 超时不是失败，交易可能稍后上链
            Err(_) => return Ok(ReceiptOutcome::Pending),
            Ok(result) => result?,
        };

        let Some(receipt) = receipt else {
            // 被 mempool 丢弃：可能已被同 nonce 交易替换，交由调用方处理
            return Ok(ReceiptOutcome::Pending);
        };

        Ok(receipt_outcome(&receipt))
    }
}

/// 回执 status == 0 视为链上 revert
pub fn receipt_outcome(receipt: &TransactionReceipt) -> ReceiptOutcome {
    let summary = ReceiptSummary {
        block_number: receipt.block_number.map(|n| n.as_u64()),
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        logs: receipt.logs.clone(),
    };
    match receipt.status {
        Some(status) if status.is_zero() => ReceiptOutcome::Reverted(summary),
        _ => ReceiptOutcome::Confirmed(summary),
    }
}

/// 多链 provider，按链分派到对应的 EthereumProvider
pub struct ChainProviders {
    chains: HashMap<Chain, EthereumProvider>,
}

impl ChainProviders {
    pub fn new(providers: impl IntoIterator<Item = EthereumProvider>) -> Self {
        Self {
            chains: providers.into_iter().map(|p| (p.chain(), p)).collect(),
        }
    }

    fn get(&self, chain: Chain) -> Result<&EthereumProvider, AppError> {
        self.chains
            .get(&chain)
            .ok_or_else(|| AppError::UnsupportedChain(chain.to_string()))
    }
}

#[async_trait]
impl ProviderTrait for ChainProviders {
    async fn get_fee_data(&self, chain: Chain) -> Result<FeeData, AppError> {
        self.get(chain)?.get_fee_data().await
    }

    async fn get_account_nonce(&self, chain: Chain, account: H160) -> Result<u64, AppError> {
        self.get(chain)?.get_account_nonce(account).await
    }

    async fn estimate_gas(&self, chain: Chain, tx: &TypedTransaction) -> Result<U256, AppError> {
        self.get(chain)?.estimate_gas(tx).await
    }

    async fn broadcast(&self, chain: Chain, raw: Bytes) -> Result<H256, AppError> {
        self.get(chain)?.broadcast(raw).await
    }

    async fn wait_for_receipt(
        &self,
        chain: Chain,
        tx_hash: H256,
        wait: Duration,
        confirmations: usize,
    ) -> Result<ReceiptOutcome, AppError> {
        self.get(chain)?
            .wait_for_receipt(tx_hash, wait, confirmations)
            .await
    }
}
