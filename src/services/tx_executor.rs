// services/tx_executor.rs
use crate::errors::{AppError, BroadcastRejection};
use crate::infrastructure::provider::{ProviderTrait, backoff_delay};
use crate::models::{Chain, ReceiptOutcome, TokenTransfer, TransactionPayload, TxIntent, TxRecord};
use crate::services::tx::audit::{AuditSink, TxTransition};
use crate::services::tx::gas::{GasOptimizer, GasQuery};
use crate::services::tx::nonce::{NonceLease, NonceManager};
use crate::services::tx::safety::SafetyPolicy;
use crate::services::tx::signer::TxSigner;
use crate::services::tx::types::{ExecutorOptions, GasEstimate};
use crate::utils::scale_percent;
use crate::{log_error, log_info, log_warn};
use ethers_contract::EthEvent;
use ethers_core::abi::RawLog;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, Eip1559TransactionRequest, H160, H256, Log, U256};
use ethers_core::utils::keccak256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::sleep;

/// 替换交易要求的最低涨幅
const MIN_REPLACEMENT_BUMP_PERCENT: u128 = 110;

#[derive(EthEvent, Debug)]
#[ethevent(name = "Transfer", abi = "Transfer(address,address,uint256)")]
pub struct TransferEvent {
    #[ethevent(indexed)]
    pub from: Address,
    #[ethevent(indexed)]
    pub to: Address,
    pub value: U256,
}

/// 广播阶段的结果
enum Submission {
    Sent { tx_hash: H256, nonce: u64 },
    /// 节点明确拒绝（余额不足、nonce 冲突重试后仍失败等）
    Rejected(String),
}

/// 交易执行代理：安全检查 → 定价 → nonce 分配 → 广播 → 等待确认
pub struct TxExecutor {
    signer: Arc<dyn TxSigner>,
    nonce_mgr: Arc<NonceManager>,
    gas: Arc<GasOptimizer>,
    safety: Arc<SafetyPolicy>,
    provider: Arc<dyn ProviderTrait>,
    audit: Arc<dyn AuditSink>,
    native_prices: HashMap<Chain, f64>,
    options: ExecutorOptions,
}

impl TxExecutor {
    pub fn new(
        signer: Arc<dyn TxSigner>,
        nonce_mgr: Arc<NonceManager>,
        gas: Arc<GasOptimizer>,
        safety: Arc<SafetyPolicy>,
        provider: Arc<dyn ProviderTrait>,
        audit: Arc<dyn AuditSink>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            signer,
            nonce_mgr,
            gas,
            safety,
            provider,
            audit,
            native_prices: HashMap::new(),
            options,
        }
    }

    /// 意图未携带价格时使用的静态原生代币价格
    pub fn with_native_price(mut self, chain: Chain, price_usd: f64) -> Self {
        self.native_prices.insert(chain, price_usd);
        self
    }

    pub fn account(&self) -> H160 {
        self.signer.address()
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// 执行单笔意图。
    ///
    /// 安全检查失败返回 `SafetyRejected`；瞬时错误重试耗尽返回 `SubmissionFailed`；
    /// 其余情况返回 TxRecord，状态反映实际结果（deferred / pending / confirmed / failed）。
    pub async fn execute(&self, intent: &TxIntent) -> Result<TxRecord, AppError> {
        let chain = intent.payload.chain();
        let account = self.account();

        // 1. 预检（不访问链）
        if let Err(e) = self.safety.check(&intent.payload) {
            log_warn!(
                "{} {} 安全检查拒绝 (pool={}): {}",
                chain,
                intent.tx_type,
                intent.metadata.pool_id,
                e
            );
            return Err(e);
        }

        // 2. gas limit + 定价
        let gas_limit = self.resolve_gas_limit(&intent.payload, account).await?;
        let estimate = self.price(intent, gas_limit).await;

        if !estimate.admits() {
            log_info!(
                "{} {} 暂缓提交: base={:.4} gwei, 档位={:?}, 来源={:?}",
                chain,
                intent.tx_type,
                estimate.base_fee_gwei,
                estimate.fee_level,
                estimate.source
            );
            let record = TxRecord::deferred(
                intent,
                account,
                estimate.max_fee_per_gas,
                estimate.max_priority_fee_per_gas,
            );
            self.audit.tx(TxTransition::Deferred, &record);
            return Ok(record);
        }

        // 3+4. nonce 分配与广播（按账户串行）
        let (tx_hash, nonce) = match self.submit(intent, account, gas_limit, &estimate).await? {
            Submission::Sent { tx_hash, nonce } => (tx_hash, nonce),
            Submission::Rejected(reason) => {
                log_error!("{} {} 广播被拒绝: {}", chain, intent.tx_type, reason);
                let record = TxRecord::failed_unsubmitted(intent, account, reason);
                self.audit.tx(TxTransition::Failed, &record);
                return Ok(record);
            }
        };

        let mut record = TxRecord::submitted(
            intent,
            account,
            tx_hash,
            nonce,
            estimate.max_fee_per_gas,
            estimate.max_priority_fee_per_gas,
            gas_limit,
        );
        log_info!(
            "{} {} 已广播: hash={:?}, nonce={}, selector={}",
            chain,
            intent.tx_type,
            tx_hash,
            nonce,
            intent.payload.selector_hex()
        );
        self.audit.tx(TxTransition::Submitted, &record);

        // 5. 等待确认（不持有账户锁）
        self.await_confirmation(&mut record).await;
        Ok(record)
    }

    /// 对仍在 pending 的交易用同一 nonce 提价重发。
    ///
    /// 已终结的记录、已被确认消耗的 nonce 一律以 `NonceReused` 拒绝。
    pub async fn bump_fee(
        &self,
        record: &TxRecord,
        intent: &TxIntent,
        bump_percent: u128,
    ) -> Result<TxRecord, AppError> {
        let chain = record.chain;
        let Some(nonce) = record.nonce else {
            return Err(AppError::Internal(
                "record was never submitted, nothing to replace".to_string(),
            ));
        };
        if record.is_terminal() {
            return Err(AppError::NonceReused {
                chain: chain.to_string(),
                nonce,
            });
        }
        if record.account != self.account()
            || intent.payload.chain() != chain
            || intent.payload.to() != record.to
        {
            return Err(AppError::Internal(
                "replacement intent does not match the pending record".to_string(),
            ));
        }

        // 定价不持有账户锁
        let fresh = self.price(intent, record.gas_limit).await;
        let lease = self
            .nonce_mgr
            .lease_for_replacement(chain, record.account, nonce)
            .await?;

        let bump = bump_percent.max(MIN_REPLACEMENT_BUMP_PERCENT);
        let priority_fee = scale_percent(record.max_priority_fee_per_gas, bump)
            .max(fresh.max_priority_fee_per_gas);
        let max_fee = scale_percent(record.max_fee_per_gas, bump)
            .max(fresh.max_fee_per_gas)
            .max(priority_fee);

        let raw = self
            .sign_payload(&intent.payload, nonce, record.gas_limit, max_fee, priority_fee)
            .await?;

        let broadcast = self.broadcast_with_retry(chain, &raw).await;
        lease.release();
        let tx_hash = match broadcast {
            Ok(hash) => hash,
            Err(AppError::BroadcastRejected {
                kind: BroadcastRejection::NonceTooLow,
                ..
            }) => {
                // 原交易已上链，nonce 已被消耗
                log_warn!("{} nonce {} 已被消耗，拒绝替换", chain, nonce);
                self.consume_nonce(record).await;
                return Err(AppError::NonceReused {
                    chain: chain.to_string(),
                    nonce,
                });
            }
            Err(AppError::BroadcastRejected {
                kind: BroadcastRejection::AlreadyKnown,
                ..
            }) => H256::from(keccak256(&raw)),
            Err(e @ AppError::SubmissionFailed(_)) => return Err(e),
            Err(e) => return Err(AppError::SubmissionFailed(e.to_string())),
        };

        let mut replacement = TxRecord::submitted(
            intent,
            record.account,
            tx_hash,
            nonce,
            max_fee,
            priority_fee,
            record.gas_limit,
        );
        replacement
            .metadata
            .extra
            .insert("replaces".to_string(), format!("{:?}", record.tx_hash));
        log_info!(
            "{} 提价替换: nonce={}, {:?} → {:?}, max_fee={}",
            chain,
            nonce,
            record.tx_hash,
            tx_hash,
            max_fee
        );
        self.audit.tx(TxTransition::Submitted, &replacement);
        self.await_confirmation(&mut replacement).await;
        Ok(replacement)
    }

    async fn price(&self, intent: &TxIntent, gas_limit: U256) -> GasEstimate {
        let chain = intent.payload.chain();
        let native_price_usd = intent
            .native_price_usd
            .or_else(|| self.native_prices.get(&chain).copied())
            .unwrap_or(0.0);
        self.gas
            .estimate_with(&GasQuery {
                chain,
                gas_limit,
                native_price_usd,
                source: intent.metadata.source.as_deref(),
                urgency: intent.urgency,
            })
            .await
    }

    /// 适配器给定的 gas limit 优先；否则链上估算（同时发现会 revert 的调用）并加 buffer
    async fn resolve_gas_limit(&self, payload: &TransactionPayload, from: H160) -> Result<U256, AppError> {
        if let Some(limit) = payload.gas_limit() {
            return Ok(limit);
        }
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(from)
            .to(payload.to())
            .value(payload.value())
            .data(payload.data().clone())
            .chain_id(payload.chain().chain_id())
            .into();
        let estimated = self
            .provider
            .estimate_gas(payload.chain(), &tx)
            .await
            .map_err(|e| AppError::SubmissionFailed(format!("gas estimation failed: {}", e)))?;
        Ok(scale_percent(
            estimated,
            u128::from(self.options.gas_limit_buffer_percent),
        ))
    }

    async fn sign_payload(
        &self,
        payload: &TransactionPayload,
        nonce: u64,
        gas_limit: U256,
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    ) -> Result<Bytes, AppError> {
        let typed_tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(self.account())
            .to(payload.to())
            .value(payload.value())
            .data(payload.data().clone())
            .gas(gas_limit)
            .max_fee_per_gas(max_fee_per_gas)
            .max_priority_fee_per_gas(max_priority_fee_per_gas)
            .nonce(nonce)
            .chain_id(payload.chain().chain_id())
            .into();
        let signature = self.signer.sign_tx(&typed_tx).await?;
        Ok(typed_tx.rlp_signed(&signature))
    }

    /// 持有账户租约完成 nonce 分配、签名与广播；租约只在广播成功时前进
    async fn submit(
        &self,
        intent: &TxIntent,
        account: H160,
        gas_limit: U256,
        estimate: &GasEstimate,
    ) -> Result<Submission, AppError> {
        let chain = intent.payload.chain();
        let mut lease: NonceLease = self
            .nonce_mgr
            .lease(chain, account, &*self.provider)
            .await
            .map_err(|e| AppError::SubmissionFailed(format!("nonce lookup failed: {}", e)))?;

        let mut resynced = false;
        let mut signed: Option<(u64, Bytes)> = None;

        loop {
            let nonce = lease.nonce();
            // 同一 nonce 的重试复用同一份签名交易，避免产生不同哈希
            let raw = match &signed {
                Some((n, raw)) if *n == nonce => raw.clone(),
                _ => {
                    let raw = self
                        .sign_payload(
                            &intent.payload,
                            nonce,
                            gas_limit,
                            estimate.max_fee_per_gas,
                            estimate.max_priority_fee_per_gas,
                        )
                        .await?;
                    signed = Some((nonce, raw.clone()));
                    raw
                }
            };

            match self.broadcast_with_retry(chain, &raw).await {
                Ok(tx_hash) => {
                    let nonce = lease.commit();
                    return Ok(Submission::Sent { tx_hash, nonce });
                }
                Err(AppError::BroadcastRejected {
                    kind: BroadcastRejection::AlreadyKnown,
                    ..
                }) => {
                    // 同一笔签名交易已在 mempool（之前的广播实际已送达）
                    let nonce = lease.commit();
                    return Ok(Submission::Sent {
                        tx_hash: H256::from(keccak256(&raw)),
                        nonce,
                    });
                }
                Err(AppError::BroadcastRejected { kind, message })
                    if kind.is_nonce_related() && !resynced =>
                {
                    log_warn!("{} nonce {} 冲突 ({:?})，从链上同步后重试: {}", chain, nonce, kind, message);
                    resynced = true;
                    lease
                        .resync(&*self.provider)
                        .await
                        .map_err(|e| AppError::SubmissionFailed(format!("nonce resync failed: {}", e)))?;
                }
                Err(AppError::BroadcastRejected { kind, message }) => {
                    return Ok(Submission::Rejected(format!("{:?}: {}", kind, message)));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 广播签名交易，瞬时错误按指数退避重试；节点拒绝原样返回，其余错误归为 `SubmissionFailed`
    async fn broadcast_with_retry(&self, chain: Chain, raw: &Bytes) -> Result<H256, AppError> {
        let mut transient_failures = 0usize;
        loop {
            match self.provider.broadcast(chain, raw.clone()).await {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(e @ AppError::BroadcastRejected { .. }) => return Err(e),
                Err(e) if e.is_transient() => {
                    transient_failures += 1;
                    if transient_failures > self.options.max_broadcast_retries {
                        return Err(AppError::SubmissionFailed(format!(
                            "broadcast failed after {} retries: {}",
                            self.options.max_broadcast_retries, e
                        )));
                    }
                    let delay = backoff_delay(self.options.broadcast_base_delay, transient_failures);
                    log_warn!(
                        "{} 广播第 {} 次失败，{:?} 后重试: {}",
                        chain,
                        transient_failures,
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(AppError::SubmissionFailed(e.to_string())),
            }
        }
    }

    /// 有界等待确认；超时保持 pending，不重新提交
    async fn await_confirmation(&self, record: &mut TxRecord) {
        let Some(tx_hash) = record.tx_hash else {
            return;
        };
        let outcome = self
            .provider
            .wait_for_receipt(
                record.chain,
                tx_hash,
                self.options.confirmation_timeout,
                self.options.confirmations,
            )
            .await;

        match outcome {
            Ok(ReceiptOutcome::Confirmed(summary)) => {
                record.apply_receipt(&summary, true);
                record.transfers = decode_transfers(&summary.logs);
                self.consume_nonce(record).await;
                log_info!(
                    "{} {} 已确认: hash={:?}, block={:?}, gas_cost={:?}",
                    record.chain,
                    record.tx_type,
                    tx_hash,
                    record.block_number,
                    record.gas_cost_wei
                );
                self.audit.tx(TxTransition::Confirmed, record);
            }
            Ok(ReceiptOutcome::Reverted(summary)) => {
                record.apply_receipt(&summary, false);
                // revert 的交易同样消耗 nonce
                self.consume_nonce(record).await;
                log_error!("{} {} 链上 revert: hash={:?}", record.chain, record.tx_type, tx_hash);
                self.audit.tx(TxTransition::Failed, record);
            }
            Ok(ReceiptOutcome::Pending) => {
                log_warn!(
                    "{} {} 等待确认超时，保持 pending: hash={:?}",
                    record.chain,
                    record.tx_type,
                    tx_hash
                );
                self.audit.tx(TxTransition::TimedOut, record);
            }
            Err(e) => {
                log_warn!(
                    "{} {} 查询回执失败，保持 pending: hash={:?}, err={}",
                    record.chain,
                    record.tx_type,
                    tx_hash,
                    e
                );
                self.audit.tx(TxTransition::TimedOut, record);
            }
        }
    }

    async fn consume_nonce(&self, record: &TxRecord) {
        if let Some(nonce) = record.nonce {
            if let Err(e) = self
                .nonce_mgr
                .mark_confirmed(record.chain, record.account, nonce)
                .await
            {
                log_warn!("更新已确认 nonce 失败: {}", e);
            }
        }
    }
}

/// 通用解析函数：从回执日志中提取特定事件（连同发出事件的合约地址）
pub fn parse_logs<T: EthEvent>(logs: &[Log]) -> Vec<(H160, T)> {
    logs.iter()
        .filter_map(|log| {
            let raw_log = RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            };
            T::decode_log(&raw_log).ok().map(|event| (log.address, event))
        })
        .collect()
}

/// 回执中的 ERC20 Transfer
pub fn decode_transfers(logs: &[Log]) -> Vec<TokenTransfer> {
    parse_logs::<TransferEvent>(logs)
        .into_iter()
        .map(|(token, event)| TokenTransfer {
            token,
            from: event.from,
            to: event.to,
            amount: event.value,
        })
        .collect()
}
