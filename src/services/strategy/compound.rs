// services/strategy/compound.rs

use crate::errors::AppError;
use crate::models::{TxType, WorkflowResult};
use crate::services::strategy::adapter::{CompoundParams, ProtocolAdapter};
use crate::services::strategy::run::{StepOutcome, WorkflowRun};

/// 按步骤平分美元价值，余数计入最后一步，保证总和不变
pub fn split_usd(total: f64, steps: usize) -> Vec<f64> {
    if steps == 0 {
        return Vec::new();
    }
    let share = total / steps as f64;
    let mut parts = vec![share; steps - 1];
    let assigned: f64 = parts.iter().sum();
    parts.push(total - assigned);
    parts
}

/// 领取奖励 + 再投入；第 k 步失败则不再尝试后续步骤
pub(crate) async fn run_compound(
    mut run: WorkflowRun<'_>,
    adapter: &dyn ProtocolAdapter,
    params: &CompoundParams,
) -> WorkflowResult {
    let payloads = match adapter.build_compound(params).await {
        Ok(payloads) if !payloads.is_empty() => payloads,
        Ok(_) => {
            run.fail(AppError::Adapter(format!(
                "{} returned no compound payloads",
                adapter.protocol_id()
            )));
            return run.finish();
        }
        Err(e) => {
            run.fail(e);
            return run.finish();
        }
    };

    run.plan(payloads.len());
    let shares = split_usd(run.options().estimated_usd, payloads.len());
    for (payload, usd) in payloads.into_iter().zip(shares) {
        let intent = run.intent(payload, TxType::Compound, usd, adapter.protocol_id(), &params.pool_id);
        if run.step(intent).await == StepOutcome::Halt {
            break;
        }
    }
    run.finish()
}
