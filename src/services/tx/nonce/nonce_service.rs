// services/tx/nonce/nonce_service.rs

use crate::errors::AppError;
use crate::infrastructure::provider::ProviderTrait;
use crate::models::Chain;
use crate::{log_info, log_warn};
use ethers_core::types::H160;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

// 进程内只创建一个，所有执行器共享同一个 Arc
// let nonce_manager = Arc::new(NonceManager::new());
//
// 同一 (chain, account) 的 nonce 分配与广播由该账户的互斥锁串行化，
// 不同账户之间互不阻塞

/// 单个 (chain, account) 的 nonce 状态
#[derive(Debug, Default)]
pub struct AccountNonceState {
    /// 下一个可分配的 nonce
    next: u64,
    /// 低于该值的 nonce 均已确认消耗
    confirmed_floor: u64,
    initialized: bool,
}

type NonceSlot = Arc<AsyncMutex<AccountNonceState>>;

#[derive(Default)]
pub struct NonceManager {
    accounts: Mutex<HashMap<(Chain, H160), NonceSlot>>,
}

/// 持有期间独占该账户的 nonce 分配；未 commit 即 drop 时 nonce 不前进
pub struct NonceLease {
    chain: Chain,
    account: H160,
    guard: OwnedMutexGuard<AccountNonceState>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, chain: Chain, account: H160) -> Result<NonceSlot, AppError> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| AppError::Internal("nonce registry poisoned".to_string()))?;
        Ok(accounts.entry((chain, account)).or_default().clone())
    }

    /// 获取账户的独占租约；首次使用时从链上 pending nonce 初始化
    pub async fn lease(
        &self,
        chain: Chain,
        account: H160,
        provider: &dyn ProviderTrait,
    ) -> Result<NonceLease, AppError> {
        let mut guard = self.slot(chain, account)?.lock_owned().await;
        if !guard.initialized {
            let chain_nonce = provider.get_account_nonce(chain, account).await?;
            guard.next = chain_nonce;
            guard.confirmed_floor = 0;
            guard.initialized = true;
            log_info!("{} 账户 {:?} nonce 初始化为 {}", chain, account, chain_nonce);
        }
        Ok(NonceLease {
            chain,
            account,
            guard,
        })
    }

    /// 为同 nonce 替换（fee bump）获取租约：nonce 必须已分配且尚未确认
    pub async fn lease_for_replacement(
        &self,
        chain: Chain,
        account: H160,
        nonce: u64,
    ) -> Result<NonceLease, AppError> {
        let guard = self.slot(chain, account)?.lock_owned().await;
        if !guard.initialized || nonce >= guard.next {
            return Err(AppError::Internal(format!(
                "nonce {} was never assigned for {:?} on {}",
                nonce, account, chain
            )));
        }
        if nonce < guard.confirmed_floor {
            return Err(AppError::NonceReused {
                chain: chain.to_string(),
                nonce,
            });
        }
        Ok(NonceLease {
            chain,
            account,
            guard,
        })
    }

    /// 交易确认后推进已消耗下限
    pub async fn mark_confirmed(&self, chain: Chain, account: H160, nonce: u64) -> Result<(), AppError> {
        let mut guard = self.slot(chain, account)?.lock_owned().await;
        let floor = nonce.saturating_add(1);
        if floor > guard.confirmed_floor {
            guard.confirmed_floor = floor;
        }
        if guard.next < floor {
            guard.next = floor;
        }
        Ok(())
    }

    /// 当前缓存的下一个 nonce（用于监控）
    pub async fn current(&self, chain: Chain, account: H160) -> Option<u64> {
        let slot = self.slot(chain, account).ok()?;
        let guard = slot.lock().await;
        guard.initialized.then_some(guard.next)
    }
}

impl NonceLease {
    pub fn nonce(&self) -> u64 {
        self.guard.next
    }

    /// 广播成功后调用：消耗当前 nonce
    pub fn commit(mut self) -> u64 {
        let used = self.guard.next;
        self.guard.next = used + 1;
        used
    }

    /// 替换交易广播成功：nonce 已被占用，不前进
    pub fn release(self) {}

    /// 检测到 nonce 冲突后，以链上 pending nonce 为准重新同步
    pub async fn resync(&mut self, provider: &dyn ProviderTrait) -> Result<u64, AppError> {
        let chain_nonce = provider.get_account_nonce(self.chain, self.account).await?;
        let synced = chain_nonce.max(self.guard.confirmed_floor);
        if synced != self.guard.next {
            log_warn!(
                "{} 账户 {:?} nonce 重新同步: 本地 {} → 链上 {}",
                self.chain,
                self.account,
                self.guard.next,
                synced
            );
        }
        self.guard.next = synced;
        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::provider::FeeData;
    use crate::models::ReceiptOutcome;
    use async_trait::async_trait;
    use ethers_core::types::transaction::eip2718::TypedTransaction;
    use ethers_core::types::{Bytes, H256, U256};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct ChainNonce(AtomicU64);

    #[async_trait]
    impl ProviderTrait for ChainNonce {
        async fn get_fee_data(&self, _: Chain) -> Result<FeeData, AppError> {
            Err(AppError::ProviderError("unused".into()))
        }
        async fn get_account_nonce(&self, _: Chain, _: H160) -> Result<u64, AppError> {
            Ok(self.0.load(Ordering::SeqCst))
        }
        async fn estimate_gas(&self, _: Chain, _: &TypedTransaction) -> Result<U256, AppError> {
            Err(AppError::ProviderError("unused".into()))
        }
        async fn broadcast(&self, _: Chain, _: Bytes) -> Result<H256, AppError> {
            Err(AppError::ProviderError("unused".into()))
        }
        async fn wait_for_receipt(
            &self,
            _: Chain,
            _: H256,
            _: Duration,
            _: usize,
        ) -> Result<ReceiptOutcome, AppError> {
            Ok(ReceiptOutcome::Pending)
        }
    }

    #[tokio::test]
    async fn uncommitted_lease_does_not_advance() {
        let provider = ChainNonce(AtomicU64::new(7));
        let manager = NonceManager::new();
        let account = H160::repeat_byte(1);

        let lease = manager.lease(Chain::Base, account, &provider).await.unwrap();
        assert_eq!(lease.nonce(), 7);
        drop(lease);

        let lease = manager.lease(Chain::Base, account, &provider).await.unwrap();
        assert_eq!(lease.commit(), 7);
        assert_eq!(manager.current(Chain::Base, account).await, Some(8));
    }

    #[tokio::test]
    async fn accounts_and_chains_are_independent() {
        let provider = ChainNonce(AtomicU64::new(3));
        let manager = NonceManager::new();
        let a = H160::repeat_byte(1);
        let b = H160::repeat_byte(2);

        let held = manager.lease(Chain::Ethereum, a, &provider).await.unwrap();
        // 同账户另一条链、另一个账户都不被阻塞
        let other_chain = manager.lease(Chain::Arbitrum, a, &provider).await.unwrap();
        let other_account = manager.lease(Chain::Ethereum, b, &provider).await.unwrap();
        assert_eq!(held.commit(), 3);
        assert_eq!(other_chain.commit(), 3);
        assert_eq!(other_account.commit(), 3);
    }

    #[tokio::test]
    async fn resync_adopts_chain_pending_nonce() {
        let provider = ChainNonce(AtomicU64::new(5));
        let manager = NonceManager::new();
        let account = H160::repeat_byte(9);

        let mut lease = manager.lease(Chain::Ethereum, account, &provider).await.unwrap();
        provider.0.store(9, Ordering::SeqCst);
        assert_eq!(lease.resync(&provider).await.unwrap(), 9);
        assert_eq!(lease.commit(), 9);
    }

    #[tokio::test]
    async fn confirmed_nonce_cannot_be_replaced() {
        let provider = ChainNonce(AtomicU64::new(0));
        let manager = NonceManager::new();
        let account = H160::repeat_byte(4);

        let lease = manager.lease(Chain::Polygon, account, &provider).await.unwrap();
        let nonce = lease.commit();
        assert!(manager.lease_for_replacement(Chain::Polygon, account, nonce).await.is_ok());

        manager.mark_confirmed(Chain::Polygon, account, nonce).await.unwrap();
        let err = manager
            .lease_for_replacement(Chain::Polygon, account, nonce)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::NonceReused { nonce: 0, .. }));
    }
}
