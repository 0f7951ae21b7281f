// services/strategy/rebalance.rs

use crate::errors::AppError;
use crate::models::{TxType, WorkflowResult};
use crate::services::strategy::adapter::{DepositParams, ProtocolAdapter, WithdrawParams};
use crate::services::strategy::compound::split_usd;
use crate::services::strategy::run::{StepOutcome, WorkflowRun};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebalanceParams {
    pub withdraw: WithdrawParams,
    pub target_pool_id: String,
}

/// 从源池赎回，确认后再向目标池存入。两步从不合并提交；
/// 中间失败时结果为 partial，资金停留在账户中等待再部署。
pub(crate) async fn run_rebalance(
    mut run: WorkflowRun<'_>,
    source: &dyn ProtocolAdapter,
    target: &dyn ProtocolAdapter,
    params: &RebalanceParams,
) -> WorkflowResult {
    let withdrawals = match source.build_withdraw(&params.withdraw).await {
        Ok(payloads) if !payloads.is_empty() => payloads,
        Ok(_) => {
            run.fail(AppError::Adapter(format!(
                "{} returned no withdraw payloads",
                source.protocol_id()
            )));
            return run.finish();
        }
        Err(e) => {
            run.fail(e);
            return run.finish();
        }
    };

    // deposit 依赖 withdraw 的链上结果，先按一步计划
    let withdraw_steps = withdrawals.len();
    run.plan(withdraw_steps + 1);
    let estimated_usd = run.options().estimated_usd;

    for (payload, usd) in withdrawals.into_iter().zip(split_usd(estimated_usd, withdraw_steps)) {
        let intent = run.intent(
            payload,
            TxType::Withdraw,
            usd,
            source.protocol_id(),
            &params.withdraw.pool_id,
        );
        if run.step(intent).await == StepOutcome::Halt {
            return run.finish();
        }
    }

    let deposit_params = DepositParams::from_prior_steps(params.target_pool_id.clone(), run.records());

    let deposits = match target.build_deposit(&deposit_params).await {
        Ok(payloads) if !payloads.is_empty() => payloads,
        Ok(_) => {
            run.fail(AppError::Adapter(format!(
                "{} returned no deposit payloads",
                target.protocol_id()
            )));
            return run.finish();
        }
        Err(e) => {
            run.fail(e);
            return run.finish();
        }
    };

    run.plan(withdraw_steps + deposits.len());
    let deposit_steps = deposits.len();
    for (payload, usd) in deposits.into_iter().zip(split_usd(estimated_usd, deposit_steps)) {
        let intent = run.intent(
            payload,
            TxType::Deposit,
            usd,
            target.protocol_id(),
            &params.target_pool_id,
        );
        if run.step(intent).await == StepOutcome::Halt {
            break;
        }
    }
    run.finish()
}
