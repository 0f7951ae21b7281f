// services/strategy/simple.rs

use crate::errors::AppError;
use crate::models::{TransactionPayload, WorkflowResult};
use crate::services::strategy::run::WorkflowRun;

/// 单交易工作流：适配器必须恰好返回一笔交易
pub(crate) async fn execute_single(
    mut run: WorkflowRun<'_>,
    built: Result<Vec<TransactionPayload>, AppError>,
    protocol_id: &str,
    pool_id: &str,
) -> WorkflowResult {
    run.plan(1);
    let payload = match built {
        Ok(mut payloads) if payloads.len() == 1 => payloads.remove(0),
        Ok(payloads) => {
            run.fail(AppError::Adapter(format!(
                "{} expected exactly one payload, adapter returned {}",
                protocol_id,
                payloads.len()
            )));
            return run.finish();
        }
        Err(e) => {
            run.fail(e);
            return run.finish();
        }
    };

    let tx_type = run.kind().tx_type();
    let estimated_usd = run.options().estimated_usd;
    let intent = run.intent(payload, tx_type, estimated_usd, protocol_id, pool_id);
    run.step(intent).await;
    run.finish()
}
