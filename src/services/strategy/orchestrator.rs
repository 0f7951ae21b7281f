// services/strategy/orchestrator.rs

use crate::models::{WorkflowKind, WorkflowResult};
use crate::services::strategy::adapter::{
    CompoundParams, DepositParams, HarvestParams, ProtocolAdapter, SwapParams, WithdrawParams,
};
use crate::services::strategy::compound::run_compound;
use crate::services::strategy::rebalance::{RebalanceParams, run_rebalance};
use crate::services::strategy::run::{DeferralPolicy, WorkflowOptions, WorkflowRun};
use crate::services::strategy::simple::execute_single;
use crate::services::tx_executor::TxExecutor;
use std::sync::Arc;

/// 工作流编排：每种工作流一个入口，全部返回 WorkflowResult。
///
/// 同一工作流内步骤严格串行；不同工作流之间可并发调用，nonce 由执行器按账户串行分配。
#[derive(Clone)]
pub struct StrategyOrchestrator {
    executor: Arc<TxExecutor>,
    deferral: DeferralPolicy,
}

impl StrategyOrchestrator {
    pub fn new(executor: Arc<TxExecutor>, deferral: DeferralPolicy) -> Self {
        Self { executor, deferral }
    }

    pub fn executor(&self) -> &Arc<TxExecutor> {
        &self.executor
    }

    fn start<'a>(&'a self, kind: WorkflowKind, options: &'a WorkflowOptions) -> WorkflowRun<'a> {
        WorkflowRun::new(&self.executor, self.deferral, kind, options)
    }

    pub async fn harvest(
        &self,
        adapter: &dyn ProtocolAdapter,
        params: &HarvestParams,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let run = self.start(WorkflowKind::Harvest, options);
        let built = adapter.build_harvest(params).await;
        execute_single(run, built, adapter.protocol_id(), &params.pool_id).await
    }

    pub async fn swap(
        &self,
        adapter: &dyn ProtocolAdapter,
        params: &SwapParams,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let run = self.start(WorkflowKind::Swap, options);
        let built = adapter.build_swap(params).await;
        execute_single(run, built, adapter.protocol_id(), &params.pool_id).await
    }

    pub async fn add_liquidity(
        &self,
        adapter: &dyn ProtocolAdapter,
        params: &DepositParams,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let run = self.start(WorkflowKind::AddLiquidity, options);
        let built = adapter.build_deposit(params).await;
        execute_single(run, built, adapter.protocol_id(), &params.pool_id).await
    }

    pub async fn remove_liquidity(
        &self,
        adapter: &dyn ProtocolAdapter,
        params: &WithdrawParams,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let run = self.start(WorkflowKind::RemoveLiquidity, options);
        let built = adapter.build_withdraw(params).await;
        execute_single(run, built, adapter.protocol_id(), &params.pool_id).await
    }

    /// 借贷协议存入
    pub async fn supply(
        &self,
        adapter: &dyn ProtocolAdapter,
        params: &DepositParams,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let run = self.start(WorkflowKind::Supply, options);
        let built = adapter.build_deposit(params).await;
        execute_single(run, built, adapter.protocol_id(), &params.pool_id).await
    }

    pub async fn compound(
        &self,
        adapter: &dyn ProtocolAdapter,
        params: &CompoundParams,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let run = self.start(WorkflowKind::Compound, options);
        run_compound(run, adapter, params).await
    }

    /// source 与 target 可以是不同协议、不同链
    pub async fn rebalance(
        &self,
        source: &dyn ProtocolAdapter,
        target: &dyn ProtocolAdapter,
        params: &RebalanceParams,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let run = self.start(WorkflowKind::Rebalance, options);
        run_rebalance(run, source, target, params).await
    }
}
