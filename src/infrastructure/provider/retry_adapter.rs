use super::ethereum_provider::{FeeData, ProviderTrait};
use crate::errors::AppError;
use crate::log_warn;
use crate::models::{Chain, ReceiptOutcome};
use async_trait::async_trait;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Bytes, H160, H256, U256};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// 指数退避 + 0~10% 抖动；attempt 从 1 开始计
pub fn backoff_delay(base: Duration, attempt: usize) -> Duration {
    // 指数倍数最高限制在 2^10
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let delay_ms = (base.as_millis() as u64).saturating_mul(1u64 << exponent);
    // 防止多个重试任务同时“齐射” RPC 节点
    let jitter = rand::thread_rng().gen_range(0..=(delay_ms / 10 + 1));
    Duration::from_millis(delay_ms + jitter)
}

/// 只读 RPC 的重试包装；仅重试瞬时错误
pub struct RetryAdapter {
    inner: Arc<dyn ProviderTrait>,
    max_retries: usize,
    base_delay: Duration,
}

impl RetryAdapter {
    pub fn new(inner: Arc<dyn ProviderTrait>, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    async fn retry_call<T, Fut, F>(&self, op: &str, f: F) -> Result<T, AppError>
    where
        F: FnMut(Arc<dyn ProviderTrait>) -> Fut + Send,
        Fut: Future<Output = Result<T, AppError>> + Send,
    {
        self.retry_until(op, None, f).await
    }

    /// 有截止时间时，退避等待不会越过截止时间
    async fn retry_until<T, Fut, F>(
        &self,
        op: &str,
        deadline: Option<Instant>,
        mut f: F,
    ) -> Result<T, AppError>
    where
        F: FnMut(Arc<dyn ProviderTrait>) -> Fut + Send,
        Fut: Future<Output = Result<T, AppError>> + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f(self.inner.clone()).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let mut delay = backoff_delay(self.base_delay, attempt);
                    if let Some(deadline) = deadline {
                        delay = delay.min(deadline.saturating_duration_since(Instant::now()));
                    }
                    log_warn!(
                        "RPC {} 第 {} 次失败，{:?} 后重试: {}",
                        op,
                        attempt,
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ProviderTrait for RetryAdapter {
    async fn get_fee_data(&self, chain: Chain) -> Result<FeeData, AppError> {
        self.retry_call("get_fee_data", move |p| async move { p.get_fee_data(chain).await })
            .await
    }

    async fn get_account_nonce(&self, chain: Chain, account: H160) -> Result<u64, AppError> {
        self.retry_call("get_account_nonce", move |p| async move {
            p.get_account_nonce(chain, account).await
        })
        .await
    }

    async fn estimate_gas(&self, chain: Chain, tx: &TypedTransaction) -> Result<U256, AppError> {
        self.retry_call("estimate_gas", move |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(chain, &tx).await }
        })
        .await
    }

    /// 广播不在这里重试：重试策略属于执行器（需要结合 nonce 处理）
    async fn broadcast(&self, chain: Chain, raw: Bytes) -> Result<H256, AppError> {
        self.inner.broadcast(chain, raw).await
    }

    /// 重试共享同一个截止时间，总等待不超过 wait
    async fn wait_for_receipt(
        &self,
        chain: Chain,
        tx_hash: H256,
        wait: Duration,
        confirmations: usize,
    ) -> Result<ReceiptOutcome, AppError> {
        let deadline = Instant::now() + wait;
        self.retry_until("wait_for_receipt", Some(deadline), move |p| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            async move {
                if remaining.is_zero() {
                    return Ok(ReceiptOutcome::Pending);
                }
                p.wait_for_receipt(chain, tx_hash, remaining, confirmations)
                    .await
            }
        })
        .await
    }
}
