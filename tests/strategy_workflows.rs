mod common;

use async_trait::async_trait;
use common::{
    Harness, MockChain, confirmed_summary, gwei, harness, payload_to, reward_token, target_pool,
    transfer_log, vault,
};
use ethers_core::types::{H160, U256};
use std::sync::Mutex;
use std::sync::atomic::Ordering;
use std::time::Duration;
use yield_executor::errors::{AppError, BroadcastRejection};
use yield_executor::models::{
    Chain, ReceiptOutcome, StrandedFunds, TransactionPayload, TxStatus, TxType, WorkflowStatus,
};
use yield_executor::services::strategy::{
    CompoundParams, DeferralPolicy, DepositParams, HarvestParams, ProtocolAdapter, RebalanceParams,
    StrategyOrchestrator, SwapParams, WithdrawParams, WorkflowOptions,
};
use yield_executor::services::tx::audit::AuditEvent;

/// 每个 build_* 都返回同一组交易，并记录收到的 deposit 参数
struct TestAdapter {
    protocol_id: &'static str,
    payloads: Vec<TransactionPayload>,
    deposits_seen: Mutex<Vec<DepositParams>>,
}

impl TestAdapter {
    fn new(protocol_id: &'static str, payloads: Vec<TransactionPayload>) -> Self {
        Self {
            protocol_id,
            payloads,
            deposits_seen: Mutex::new(Vec::new()),
        }
    }

    fn deposit_calls(&self) -> usize {
        self.deposits_seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ProtocolAdapter for TestAdapter {
    fn protocol_id(&self) -> &str {
        self.protocol_id
    }

    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn build_deposit(&self, params: &DepositParams) -> Result<Vec<TransactionPayload>, AppError> {
        self.deposits_seen.lock().unwrap().push(params.clone());
        Ok(self.payloads.clone())
    }

    async fn build_withdraw(&self, _: &WithdrawParams) -> Result<Vec<TransactionPayload>, AppError> {
        Ok(self.payloads.clone())
    }

    async fn build_swap(&self, _: &SwapParams) -> Result<Vec<TransactionPayload>, AppError> {
        Ok(self.payloads.clone())
    }

    async fn build_harvest(&self, _: &HarvestParams) -> Result<Vec<TransactionPayload>, AppError> {
        Ok(self.payloads.clone())
    }

    async fn build_compound(&self, _: &CompoundParams) -> Result<Vec<TransactionPayload>, AppError> {
        Ok(self.payloads.clone())
    }
}

fn orchestrator(h: &Harness, max_deferrals: u32) -> StrategyOrchestrator {
    StrategyOrchestrator::new(
        h.executor.clone(),
        DeferralPolicy {
            max_deferrals,
            delay: Duration::from_millis(1),
        },
    )
}

fn options(usd: f64) -> WorkflowOptions {
    WorkflowOptions {
        workflow_id: Some("wf-test".to_string()),
        estimated_usd: usd,
        ..Default::default()
    }
}

fn rebalance_params() -> RebalanceParams {
    RebalanceParams {
        withdraw: WithdrawParams {
            pool_id: "aave-usdc".to_string(),
            shares: None,
        },
        target_pool_id: "comp-usdc".to_string(),
    }
}

#[tokio::test]
async fn harvest_completes_with_single_record() {
    let h = harness(MockChain::new(gwei(20), 0));
    let adapter = TestAdapter::new("aave-v3", vec![payload_to(vault())]);

    let result = orchestrator(&h, 0)
        .harvest(&adapter, &HarvestParams { pool_id: "usdc".into() }, &options(50.0))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].tx_type, TxType::Harvest);
    assert_eq!(result.records[0].metadata.workflow_id.as_deref(), Some("wf-test"));
    assert_eq!(result.records[0].metadata.protocol_id, "aave-v3");
    assert_eq!(result.next_step, None);
    assert!(result.stranded.is_none());
    assert!(
        h.audit
            .events()
            .iter()
            .any(|e| matches!(e, AuditEvent::WorkflowFinished { result } if result.workflow_id == "wf-test"))
    );
}

#[tokio::test]
async fn simple_workflows_map_to_their_tx_types() {
    let h = harness(MockChain::new(gwei(20), 0));
    let orchestrator = orchestrator(&h, 0);
    let adapter = TestAdapter::new("uniswap-v3", vec![payload_to(vault())]);
    let opts = options(10.0);

    let swap = orchestrator.swap(&adapter, &SwapParams::default(), &opts).await;
    let add = orchestrator.add_liquidity(&adapter, &DepositParams::default(), &opts).await;
    let remove = orchestrator
        .remove_liquidity(&adapter, &WithdrawParams::default(), &opts)
        .await;
    let supply = orchestrator.supply(&adapter, &DepositParams::default(), &opts).await;

    let types: Vec<TxType> = [&swap, &add, &remove, &supply]
        .iter()
        .map(|r| {
            assert_eq!(r.status, WorkflowStatus::Completed);
            r.records[0].tx_type
        })
        .collect();
    assert_eq!(
        types,
        vec![TxType::Swap, TxType::Deposit, TxType::Withdraw, TxType::Supply]
    );
    assert_eq!(h.chain.sent_nonces(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn simple_workflow_rejects_multi_payload_adapter() {
    let h = harness(MockChain::new(gwei(20), 0));
    let adapter = TestAdapter::new("curve", vec![payload_to(vault()), payload_to(vault())]);

    let result = orchestrator(&h, 0)
        .harvest(&adapter, &HarvestParams::default(), &options(5.0))
        .await;
    assert_eq!(result.status, WorkflowStatus::Aborted);
    assert!(result.records.is_empty());
    assert!(result.error.is_some());
    assert_eq!(h.chain.broadcast_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn safety_rejection_aborts_workflow() {
    let h = harness(MockChain::new(gwei(20), 0));
    let adapter = TestAdapter::new("rogue", vec![payload_to(ethers_core::types::H160::repeat_byte(0x66))]);

    let result = orchestrator(&h, 0)
        .supply(&adapter, &DepositParams::default(), &options(5.0))
        .await;
    assert_eq!(result.status, WorkflowStatus::Aborted);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].status, TxStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("安全检查拒绝"));
}

#[tokio::test]
async fn compound_splits_usd_across_steps() {
    let h = harness(MockChain::new(gwei(20), 0));
    let adapter = TestAdapter::new("convex", vec![payload_to(vault()), payload_to(target_pool())]);

    let result = orchestrator(&h, 0)
        .compound(&adapter, &CompoundParams { pool_id: "cvx-3pool".into() }, &options(90.0))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.records.len(), 2);
    let total: f64 = result.records.iter().map(|r| r.estimated_usd).sum();
    assert!((total - 90.0).abs() < 1e-9);
    assert_eq!(
        result.records.iter().map(|r| r.metadata.step_index).collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[tokio::test]
async fn compound_failure_stops_later_steps() {
    let h = harness(MockChain::new(gwei(20), 0));
    let adapter = TestAdapter::new(
        "convex",
        vec![payload_to(vault()), payload_to(target_pool()), payload_to(vault())],
    );
    h.chain.next_receipt(ReceiptOutcome::Confirmed(confirmed_summary()));
    h.chain.next_receipt(ReceiptOutcome::Reverted(confirmed_summary()));

    let result = orchestrator(&h, 0)
        .compound(&adapter, &CompoundParams::default(), &options(30.0))
        .await;

    assert_eq!(result.status, WorkflowStatus::Partial);
    assert_eq!(result.planned_steps, 3);
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.next_step, Some(1));
    assert_eq!(result.stranded, Some(StrandedFunds::RewardsClaimedNotRedeposited));
    assert_eq!(h.chain.sent_nonces().len(), 2);
}

#[tokio::test]
async fn rebalance_failed_withdraw_never_deposits() {
    let h = harness(MockChain::new(gwei(20), 0));
    let source = TestAdapter::new("aave-v3", vec![payload_to(vault())]);
    let target = TestAdapter::new("compound-v3", vec![payload_to(target_pool())]);
    h.chain.fail_next_broadcast(AppError::BroadcastRejected {
        kind: BroadcastRejection::Other,
        message: "execution reverted".into(),
    });

    let result = orchestrator(&h, 0)
        .rebalance(&source, &target, &rebalance_params(), &options(1_000.0))
        .await;

    assert_eq!(result.status, WorkflowStatus::Aborted);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].status, TxStatus::Failed);
    assert_eq!(target.deposit_calls(), 0);
    assert!(result.stranded.is_none());
}

#[tokio::test]
async fn rebalance_failed_deposit_is_partial() {
    let h = harness(MockChain::new(gwei(20), 0));
    let source = TestAdapter::new("aave-v3", vec![payload_to(vault())]);
    let target = TestAdapter::new("compound-v3", vec![payload_to(target_pool())]);
    h.chain.next_receipt(ReceiptOutcome::Confirmed(confirmed_summary()));
    h.chain.next_receipt(ReceiptOutcome::Reverted(confirmed_summary()));

    let result = orchestrator(&h, 0)
        .rebalance(&source, &target, &rebalance_params(), &options(1_000.0))
        .await;

    assert_eq!(result.status, WorkflowStatus::Partial);
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records.iter().filter(|r| r.status == TxStatus::Confirmed).count(), 1);
    assert_eq!(result.records.iter().filter(|r| r.status == TxStatus::Failed).count(), 1);
    assert_eq!(result.records[0].tx_type, TxType::Withdraw);
    assert_eq!(result.records[1].tx_type, TxType::Deposit);
    assert_eq!(result.stranded, Some(StrandedFunds::WithdrawnNotRedeployed));
    assert_eq!(result.next_step, Some(1));
}

#[tokio::test]
async fn rebalance_deposit_uses_withdrawn_amounts() {
    let h = harness(MockChain::new(gwei(20), 0));
    let account = h.executor.account();
    let source = TestAdapter::new("aave-v3", vec![payload_to(vault())]);
    let target = TestAdapter::new("compound-v3", vec![payload_to(target_pool())]);

    let mut withdraw_receipt = confirmed_summary();
    withdraw_receipt.logs = vec![transfer_log(reward_token(), vault(), account, U256::from(2_500_000u64))];
    h.chain.next_receipt(ReceiptOutcome::Confirmed(withdraw_receipt));

    let result = orchestrator(&h, 0)
        .rebalance(&source, &target, &rebalance_params(), &options(2_500.0))
        .await;
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.planned_steps, 2);

    let seen = target.deposits_seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].pool_id, "comp-usdc");
    assert_eq!(seen[0].tokens.len(), 1);
    assert_eq!(seen[0].tokens[0].token, reward_token());
    assert_eq!(seen[0].tokens[0].amount, U256::from(2_500_000u64));
    assert_eq!(seen[0].prior_steps.len(), 1);
    assert!(seen[0].prior_steps[0].is_confirmed());
}

#[tokio::test]
async fn rebalance_deposit_sums_transfers_from_every_withdrawal() {
    let h = harness(MockChain::new(gwei(20), 0));
    let account = h.executor.account();
    let source = TestAdapter::new("aave-v3", vec![payload_to(vault()), payload_to(vault())]);
    let target = TestAdapter::new("compound-v3", vec![payload_to(target_pool())]);
    let other_token = H160::repeat_byte(0x44);

    let mut first = confirmed_summary();
    first.logs = vec![transfer_log(reward_token(), vault(), account, U256::from(1_000_000u64))];
    let mut second = confirmed_summary();
    second.logs = vec![
        transfer_log(reward_token(), vault(), account, U256::from(1_500_000u64)),
        transfer_log(other_token, vault(), account, U256::from(7u64)),
    ];
    h.chain.next_receipt(ReceiptOutcome::Confirmed(first));
    h.chain.next_receipt(ReceiptOutcome::Confirmed(second));

    let result = orchestrator(&h, 0)
        .rebalance(&source, &target, &rebalance_params(), &options(3_000.0))
        .await;
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.planned_steps, 3);

    let seen = target.deposits_seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].prior_steps.len(), 2);
    assert_eq!(seen[0].tokens.len(), 2);
    assert_eq!(seen[0].tokens[0].token, reward_token());
    assert_eq!(seen[0].tokens[0].amount, U256::from(2_500_000u64));
    assert_eq!(seen[0].tokens[1].token, other_token);
    assert_eq!(seen[0].tokens[1].amount, U256::from(7u64));
}

#[tokio::test]
async fn rebalance_timeout_pauses_workflow() {
    let h = harness(MockChain::new(gwei(20), 0));
    let source = TestAdapter::new("aave-v3", vec![payload_to(vault())]);
    let target = TestAdapter::new("compound-v3", vec![payload_to(target_pool())]);
    h.chain.next_receipt(ReceiptOutcome::Pending);

    let result = orchestrator(&h, 0)
        .rebalance(&source, &target, &rebalance_params(), &options(100.0))
        .await;
    assert_eq!(result.status, WorkflowStatus::Pending);
    assert_eq!(result.next_step, Some(0));
    assert_eq!(target.deposit_calls(), 0);
}

#[tokio::test]
async fn deferral_budget_is_respected() {
    let h = harness(MockChain::new(gwei(45), 0));
    let adapter = TestAdapter::new("aave-v3", vec![payload_to(vault())]);

    let result = orchestrator(&h, 2)
        .harvest(&adapter, &HarvestParams::default(), &options(10.0))
        .await;

    assert_eq!(result.status, WorkflowStatus::Pending);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].status, TxStatus::Deferred);
    assert_eq!(result.next_step, Some(0));
    // 初次定价 + 2 次重新定价
    assert_eq!(h.chain.fee_calls.load(Ordering::SeqCst), 3);
    assert!(h.chain.sent_nonces().is_empty());
}
