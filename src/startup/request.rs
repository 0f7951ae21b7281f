use crate::errors::AppError;
use crate::models::{Chain, TransactionPayload, WorkflowKind, WorkflowResult};
use crate::services::strategy::{
    CompoundParams, DepositParams, HarvestParams, ProtocolAdapter, RebalanceParams,
    StrategyOrchestrator, SwapParams, WithdrawParams, WorkflowOptions,
};
use async_trait::async_trait;
use ethers_core::types::{Bytes, H160, U256};
use serde::Deserialize;

/// 外部适配器服务预先构造好的一笔交易
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadSpec {
    pub to: H160,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub gas_limit: Option<U256>,
}

/// 一个协议/池子上的若干步骤
#[derive(Debug, Clone, Deserialize)]
pub struct LegSpec {
    pub protocol_id: String,
    pub chain: Chain,
    pub pool_id: String,
    pub steps: Vec<PayloadSpec>,
}

/// stdin 上的一行 JSON
///
/// ```json
/// {"kind":"harvest","protocol_id":"aave-v3","chain":"base","pool_id":"usdc",
///  "steps":[{"to":"0x…","data":"0x…"}],"options":{"estimated_usd":120.0}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRequest {
    pub kind: WorkflowKind,
    #[serde(flatten)]
    pub leg: LegSpec,
    /// 仅 rebalance 使用：目标池的 deposit 步骤
    #[serde(default)]
    pub target: Option<LegSpec>,
    #[serde(default)]
    pub options: WorkflowOptions,
}

/// 直接返回预构造交易的适配器
#[derive(Debug, Clone)]
pub struct PrebuiltAdapter {
    protocol_id: String,
    chain: Chain,
    payloads: Vec<TransactionPayload>,
}

impl PrebuiltAdapter {
    pub fn from_leg(leg: &LegSpec) -> Self {
        let payloads = leg
            .steps
            .iter()
            .map(|step| {
                let payload = TransactionPayload::new(leg.chain, step.to, step.data.clone(), step.value);
                match step.gas_limit {
                    Some(limit) => payload.with_gas_limit(limit),
                    None => payload,
                }
            })
            .collect();
        Self {
            protocol_id: leg.protocol_id.clone(),
            chain: leg.chain,
            payloads,
        }
    }

    fn payloads(&self) -> Result<Vec<TransactionPayload>, AppError> {
        if self.payloads.is_empty() {
            return Err(AppError::Adapter(format!(
                "{} request carries no steps",
                self.protocol_id
            )));
        }
        Ok(self.payloads.clone())
    }
}

#[async_trait]
impl ProtocolAdapter for PrebuiltAdapter {
    fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    fn chain(&self) -> Chain {
        self.chain
    }

    async fn build_deposit(&self, _: &DepositParams) -> Result<Vec<TransactionPayload>, AppError> {
        self.payloads()
    }

    async fn build_withdraw(&self, _: &WithdrawParams) -> Result<Vec<TransactionPayload>, AppError> {
        self.payloads()
    }

    async fn build_swap(&self, _: &SwapParams) -> Result<Vec<TransactionPayload>, AppError> {
        self.payloads()
    }

    async fn build_harvest(&self, _: &HarvestParams) -> Result<Vec<TransactionPayload>, AppError> {
        self.payloads()
    }

    async fn build_compound(&self, _: &CompoundParams) -> Result<Vec<TransactionPayload>, AppError> {
        self.payloads()
    }
}

/// 按 kind 分派到对应的工作流入口
pub async fn dispatch(
    orchestrator: &StrategyOrchestrator,
    request: WorkflowRequest,
) -> Result<WorkflowResult, AppError> {
    let adapter = PrebuiltAdapter::from_leg(&request.leg);
    let pool_id = request.leg.pool_id.clone();
    let options = &request.options;

    let result = match request.kind {
        WorkflowKind::Harvest => {
            orchestrator
                .harvest(&adapter, &HarvestParams { pool_id }, options)
                .await
        }
        WorkflowKind::Swap => {
            let params = SwapParams {
                pool_id,
                ..Default::default()
            };
            orchestrator.swap(&adapter, &params, options).await
        }
        WorkflowKind::AddLiquidity => {
            let params = DepositParams {
                pool_id,
                ..Default::default()
            };
            orchestrator.add_liquidity(&adapter, &params, options).await
        }
        WorkflowKind::RemoveLiquidity => {
            let params = WithdrawParams {
                pool_id,
                shares: None,
            };
            orchestrator.remove_liquidity(&adapter, &params, options).await
        }
        WorkflowKind::Supply => {
            let params = DepositParams {
                pool_id,
                ..Default::default()
            };
            orchestrator.supply(&adapter, &params, options).await
        }
        WorkflowKind::Compound => {
            orchestrator
                .compound(&adapter, &CompoundParams { pool_id }, options)
                .await
        }
        WorkflowKind::Rebalance => {
            let target = request
                .target
                .as_ref()
                .ok_or_else(|| AppError::Adapter("rebalance request has no target leg".to_string()))?;
            let target_adapter = PrebuiltAdapter::from_leg(target);
            let params = RebalanceParams {
                withdraw: WithdrawParams {
                    pool_id,
                    shares: None,
                },
                target_pool_id: target.pool_id.clone(),
            };
            orchestrator
                .rebalance(&adapter, &target_adapter, &params, options)
                .await
        }
    };
    Ok(result)
}
