use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use crate::config::{AllowlistConfig, Config};
use crate::errors::AppError;
use crate::infrastructure::provider::{ChainProviders, EthereumProvider, ProviderTrait, RetryAdapter};
use crate::models::{Chain, WorkflowResult};
use crate::services::strategy::{DeferralPolicy, StrategyOrchestrator};
use crate::services::tx::audit::TracingAuditSink;
use crate::services::tx::gas::{ChainGasProfile, GasOptimizer, GasThresholds};
use crate::services::tx::nonce::NonceManager;
use crate::services::tx::safety::SafetyPolicy;
use crate::services::tx::signer::LocalSigner;
use crate::services::tx::types::ExecutorOptions;
use crate::services::tx_executor::TxExecutor;
use crate::startup::request::{WorkflowRequest, dispatch};
use crate::{log_error, log_info, log_warn};

pub type Result<T> = std::result::Result<T, AppError>;

/// 签名私钥只从环境变量读取
const PRIVATE_KEY_ENV: &str = "EXECUTOR_PRIVATE_KEY";

/// 应用程序启动与管理结构体（无HTTP API，从 stdin 接收工作流请求）
pub struct Application {
    pub orchestrator: Arc<StrategyOrchestrator>,
}

impl Application {
    /// 构建应用实例：provider → 定价 → 安全策略 → 执行器 → 编排器
    pub async fn build(config: Config) -> Result<Self> {
        let allowlist = AllowlistConfig::load(&config.executor.allowlist_path)?;
        let poll_interval = Duration::from_millis(config.executor.receipt_poll_interval_ms);

        let mut providers = Vec::new();
        let mut ceilings = Vec::new();
        let mut profiles = Vec::new();
        let mut native_prices = Vec::new();

        for (name, chain_cfg) in &config.chains {
            let chain: Chain = name.parse()?;
            providers.push(EthereumProvider::new(chain, chain_cfg, poll_interval)?);
            ceilings.push((chain, chain_cfg.max_value_wei.as_str()));

            let thresholds = chain_cfg
                .thresholds
                .map(GasThresholds::from)
                .unwrap_or_else(|| GasThresholds::default_for(chain));
            profiles.push((chain, ChainGasProfile::new(thresholds, chain_cfg.fallback_base_fee_gwei)));
            native_prices.push((chain, chain_cfg.native_price_usd));
            log_info!(
                "链 {} (id={}) 已配置: 阈值 {:.4}/{:.4}/{:.4} gwei, 白名单 {} 个合约",
                chain,
                chain.chain_id(),
                thresholds.low,
                thresholds.medium,
                thresholds.high,
                allowlist.len(chain)
            );
        }
        if providers.is_empty() {
            return Err(AppError::Config("no chains configured".to_string()));
        }

        let safety = ceilings
            .into_iter()
            .try_fold(SafetyPolicy::new(allowlist), |policy, (chain, max_value_wei)| {
                policy.with_value_ceiling_str(chain, max_value_wei)
            })?;

        // 1. 先初始化 Provider（读操作带重试）
        let provider = Arc::new(RetryAdapter::new(
            Arc::new(ChainProviders::new(providers)),
            config.provider.max_retries,
            Duration::from_millis(config.provider.base_delay_ms),
        )) as Arc<dyn ProviderTrait>;

        // 2. 定价引擎
        let gas = profiles
            .into_iter()
            .fold(GasOptimizer::new(provider.clone(), &config.gas), |gas, (chain, profile)| {
                gas.with_profile(chain, profile)
            });

        // 3. 签名账户
        let private_key = std::env::var(PRIVATE_KEY_ENV)
            .map_err(|_| AppError::Config(format!("{} 未设置", PRIVATE_KEY_ENV)))?;
        let signer = LocalSigner::from_key(&private_key)?;

        // 4. 执行器与编排器
        let executor = native_prices.into_iter().fold(
            TxExecutor::new(
                Arc::new(signer),
                Arc::new(NonceManager::new()),
                Arc::new(gas),
                Arc::new(safety),
                provider,
                Arc::new(TracingAuditSink),
                ExecutorOptions::from(&config.executor),
            ),
            |executor, (chain, price)| executor.with_native_price(chain, price),
        );
        log_info!("执行账户: {:?}", executor.account());

        let orchestrator = Arc::new(StrategyOrchestrator::new(
            Arc::new(executor),
            DeferralPolicy::from(&config.orchestrator),
        ));
        Ok(Self { orchestrator })
    }

    /// 逐行读取 stdin 的工作流请求，每个请求一个任务并发执行；Ctrl+C 停止接收
    pub async fn run(self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut tasks = JoinSet::new();

        log_info!("✔️ Waiting for workflow requests on stdin");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        log_info!("stdin closed, no more requests");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let request: WorkflowRequest = match serde_json::from_str(&line) {
                        Ok(request) => request,
                        Err(e) => {
                            log_warn!("忽略无法解析的请求: {}", e);
                            continue;
                        }
                    };
                    let orchestrator = self.orchestrator.clone();
                    tasks.spawn(async move { dispatch(&orchestrator, request).await });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    report(joined)?;
                }
                _ = tokio::signal::ctrl_c() => {
                    log_info!("⚠️  Received shutdown signal, no longer accepting requests");
                    break;
                }
            }
        }

        // 已广播的交易不能丢弃，等待进行中的工作流结束
        while let Some(joined) = tasks.join_next().await {
            report(joined)?;
        }
        Ok(())
    }
}

/// 每个结束的工作流输出一行 JSON
fn report(
    joined: std::result::Result<Result<WorkflowResult>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match joined {
        Ok(Ok(result)) => println!("{}", serde_json::to_string(&result)?),
        Ok(Err(e)) => log_error!("工作流请求被拒绝: {}", e),
        Err(e) => log_error!("工作流任务异常退出: {}", e),
    }
    Ok(())
}
