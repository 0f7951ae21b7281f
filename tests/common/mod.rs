#![allow(dead_code)]

use async_trait::async_trait;
use ethers_contract::EthEvent;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Bytes, H160, H256, Log, U256};
use ethers_core::utils::{keccak256, rlp};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use yield_executor::config::{AllowlistConfig, GasConfig};
use yield_executor::errors::AppError;
use yield_executor::infrastructure::provider::{FeeData, ProviderTrait};
use yield_executor::models::{
    Chain, ReceiptOutcome, ReceiptSummary, TransactionPayload, TxIntent, TxType,
};
use yield_executor::services::tx::audit::MemoryAuditSink;
use yield_executor::services::tx::gas::GasOptimizer;
use yield_executor::services::tx::nonce::NonceManager;
use yield_executor::services::tx::safety::SafetyPolicy;
use yield_executor::services::tx::signer::LocalSigner;
use yield_executor::services::tx::types::ExecutorOptions;
use yield_executor::services::tx_executor::{TransferEvent, TxExecutor};

/// anvil 默认账户 0
pub const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const GWEI: u64 = 1_000_000_000;

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::from(GWEI)
}

pub fn vault() -> H160 {
    H160::repeat_byte(0xaa)
}

pub fn target_pool() -> H160 {
    H160::repeat_byte(0xbb)
}

pub fn reward_token() -> H160 {
    H160::repeat_byte(0xcc)
}

pub fn payload_to(to: H160) -> TransactionPayload {
    TransactionPayload::new(Chain::Ethereum, to, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]), U256::zero())
}

pub fn intent(tx_type: TxType) -> TxIntent {
    TxIntent::new(payload_to(vault()), tx_type, 100.0)
}

/// 内存中的链：模拟 mempool / 出块 / nonce 规则，可按调用脚本注入错误
pub struct MockChain {
    base_fee: Mutex<Option<U256>>,
    /// 链上 pending nonce（包含 mempool）
    pending_nonce: AtomicU64,
    /// 低于该值的 nonce 已出块
    mined_floor: AtomicU64,
    broadcast_errors: Mutex<VecDeque<AppError>>,
    receipts: Mutex<VecDeque<ReceiptOutcome>>,
    gas_estimate: Mutex<Result<U256, String>>,
    sent: Mutex<Vec<(H256, u64, TypedTransaction)>>,
    hash_nonces: Mutex<HashMap<H256, u64>>,
    pub fee_calls: AtomicUsize,
    pub estimate_calls: AtomicUsize,
    pub broadcast_calls: AtomicUsize,
}

impl MockChain {
    pub fn new(base_fee: U256, nonce: u64) -> Self {
        Self {
            base_fee: Mutex::new(Some(base_fee)),
            pending_nonce: AtomicU64::new(nonce),
            mined_floor: AtomicU64::new(nonce),
            broadcast_errors: Mutex::new(VecDeque::new()),
            receipts: Mutex::new(VecDeque::new()),
            gas_estimate: Mutex::new(Ok(U256::from(100_000u64))),
            sent: Mutex::new(Vec::new()),
            hash_nonces: Mutex::new(HashMap::new()),
            fee_calls: AtomicUsize::new(0),
            estimate_calls: AtomicUsize::new(0),
            broadcast_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_base_fee(&self, fee: Option<U256>) {
        *self.base_fee.lock().unwrap() = fee;
    }

    /// 其它进程用同一账户发出并打包了交易
    pub fn advance_external(&self, nonce: u64) {
        self.pending_nonce.store(nonce, Ordering::SeqCst);
        self.mined_floor.store(nonce, Ordering::SeqCst);
    }

    pub fn fail_next_broadcast(&self, err: AppError) {
        self.broadcast_errors.lock().unwrap().push_back(err);
    }

    pub fn next_receipt(&self, outcome: ReceiptOutcome) {
        self.receipts.lock().unwrap().push_back(outcome);
    }

    pub fn fail_gas_estimate(&self, message: &str) {
        *self.gas_estimate.lock().unwrap() = Err(message.to_string());
    }

    /// 已接受广播的 nonce，按接受顺序
    pub fn sent_nonces(&self) -> Vec<u64> {
        self.sent.lock().unwrap().iter().map(|(_, n, _)| *n).collect()
    }

    pub fn sent_txs(&self) -> Vec<TypedTransaction> {
        self.sent.lock().unwrap().iter().map(|(_, _, tx)| tx.clone()).collect()
    }
}

pub fn confirmed_summary() -> ReceiptSummary {
    ReceiptSummary {
        block_number: Some(19_000_000),
        gas_used: Some(U256::from(80_000u64)),
        effective_gas_price: Some(gwei(21)),
        logs: Vec::new(),
    }
}

/// ERC20 Transfer 日志
pub fn transfer_log(token: H160, from: H160, to: H160, amount: U256) -> Log {
    let mut data = [0u8; 32];
    amount.to_big_endian(&mut data);
    Log {
        address: token,
        topics: vec![
            TransferEvent::signature(),
            H256::from(from),
            H256::from(to),
        ],
        data: Bytes::from(data.to_vec()),
        ..Default::default()
    }
}

#[async_trait]
impl ProviderTrait for MockChain {
    async fn get_fee_data(&self, _: Chain) -> Result<FeeData, AppError> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        match *self.base_fee.lock().unwrap() {
            Some(base_fee) => Ok(FeeData { base_fee }),
            None => Err(AppError::ProviderError("connection refused".to_string())),
        }
    }

    async fn get_account_nonce(&self, _: Chain, _: H160) -> Result<u64, AppError> {
        Ok(self.pending_nonce.load(Ordering::SeqCst))
    }

    async fn estimate_gas(&self, _: Chain, _: &TypedTransaction) -> Result<U256, AppError> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        self.gas_estimate
            .lock()
            .unwrap()
            .clone()
            .map_err(AppError::ProviderError)
    }

    async fn broadcast(&self, _: Chain, raw: Bytes) -> Result<H256, AppError> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        // 让出调度，放大并发交错
        tokio::task::yield_now().await;

        if let Some(err) = self.broadcast_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let (tx, _signature) = TypedTransaction::decode_signed(&rlp::Rlp::new(raw.as_ref()))
            .map_err(|e| AppError::ProviderError(format!("bad raw tx: {}", e)))?;
        let nonce = tx.nonce().map(|n| n.as_u64()).unwrap_or_default();

        if nonce < self.mined_floor.load(Ordering::SeqCst) {
            return Err(AppError::BroadcastRejected {
                kind: yield_executor::errors::BroadcastRejection::NonceTooLow,
                message: format!("nonce too low: tx nonce {}", nonce),
            });
        }

        let hash = H256::from(keccak256(raw.as_ref()));
        self.pending_nonce.fetch_max(nonce + 1, Ordering::SeqCst);
        self.hash_nonces.lock().unwrap().insert(hash, nonce);
        self.sent.lock().unwrap().push((hash, nonce, tx));
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        _: Chain,
        tx_hash: H256,
        _: Duration,
        _: usize,
    ) -> Result<ReceiptOutcome, AppError> {
        tokio::task::yield_now().await;
        let outcome = self
            .receipts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ReceiptOutcome::Confirmed(confirmed_summary()));
        if matches!(outcome, ReceiptOutcome::Confirmed(_) | ReceiptOutcome::Reverted(_)) {
            if let Some(nonce) = self.hash_nonces.lock().unwrap().get(&tx_hash) {
                self.mined_floor.fetch_max(nonce + 1, Ordering::SeqCst);
            }
        }
        Ok(outcome)
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub audit: Arc<MemoryAuditSink>,
    pub executor: Arc<TxExecutor>,
}

pub fn test_options() -> ExecutorOptions {
    ExecutorOptions {
        gas_limit_buffer_percent: 120,
        confirmations: 1,
        confirmation_timeout: Duration::from_secs(5),
        max_broadcast_retries: 3,
        broadcast_base_delay: Duration::from_millis(1),
    }
}

pub fn gas_config() -> GasConfig {
    GasConfig {
        priority_fee_percent: 10,
        source_multipliers: [("aggregator".to_string(), 130), ("discount".to_string(), 80)]
            .into_iter()
            .collect(),
    }
}

pub fn harness(chain: MockChain) -> Harness {
    let chain = Arc::new(chain);
    let provider: Arc<dyn ProviderTrait> = chain.clone();
    let audit = Arc::new(MemoryAuditSink::new());

    let safety = SafetyPolicy::new(AllowlistConfig::from_entries([
        (Chain::Ethereum, vault()),
        (Chain::Ethereum, target_pool()),
    ]))
    .with_value_ceiling(Chain::Ethereum, U256::exp10(19));

    let executor = TxExecutor::new(
        Arc::new(LocalSigner::from_key(DEV_KEY).unwrap()),
        Arc::new(NonceManager::new()),
        Arc::new(GasOptimizer::new(provider.clone(), &gas_config())),
        Arc::new(safety),
        provider,
        audit.clone(),
        test_options(),
    )
    .with_native_price(Chain::Ethereum, 3000.0);

    Harness {
        chain,
        audit,
        executor: Arc::new(executor),
    }
}
