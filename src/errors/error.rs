use ethers::providers::ProviderError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// 预检策略拒绝（金额超限、目标地址不在白名单等），不重试
    #[error("安全检查拒绝: {0}")]
    SafetyRejected(String),

    /// 广播重试耗尽
    #[error("交易提交失败: {0}")]
    SubmissionFailed(String),

    /// 链上费用数据不可用（GasOptimizer 内部吸收，不向外抛出）
    #[error("费用数据不可用: {0}")]
    PricingUnavailable(String),

    /// 试图复用已被确认消耗的 nonce
    #[error("nonce 已被使用: chain={chain}, nonce={nonce}")]
    NonceReused { chain: String, nonce: u64 },

    #[error("协议适配器错误: {0}")]
    Adapter(String),

    #[error("签名失败: {0}")]
    Signing(String),

    #[error("区块链RPC错误: {0}")]
    ProviderError(String),

    /// 节点明确拒绝了广播的交易
    #[error("交易被节点拒绝 ({kind:?}): {message}")]
    BroadcastRejected {
        kind: BroadcastRejection,
        message: String,
    },

    #[error("配置错误: {0}")]
    Config(String),

    #[error("无效的地址: {0}")]
    InvalidAddress(String),

    #[error("不支持的链: {0}")]
    UnsupportedChain(String),

    #[error("类型转换错误: {0}")]
    Conversion(String),

    #[error("异步任务错误: {0}")]
    Task(String),

    /// 内部不可预期错误（兜底）
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 节点拒绝广播的原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastRejection {
    /// nonce 已被消耗
    NonceTooLow,
    /// 同 nonce 的另一笔交易已在 mempool
    NonceConflict,
    /// 完全相同的签名交易已在 mempool
    AlreadyKnown,
    InsufficientFunds,
    Underpriced,
    Other,
}

impl BroadcastRejection {
    /// 根据节点返回的错误信息归类
    pub fn classify(message: &str) -> Option<Self> {
        let msg = message.to_lowercase();
        if msg.contains("nonce too low") || msg.contains("nonce has already been used") {
            Some(Self::NonceTooLow)
        } else if msg.contains("already known") || msg.contains("already imported") {
            Some(Self::AlreadyKnown)
        } else if msg.contains("replacement transaction")
            || msg.contains("nonce too high")
        {
            Some(Self::NonceConflict)
        } else if msg.contains("insufficient funds") {
            Some(Self::InsufficientFunds)
        } else if msg.contains("underpriced") || msg.contains("max fee per gas less than") {
            Some(Self::Underpriced)
        } else if msg.contains("execution reverted")
            || msg.contains("invalid sender")
            || msg.contains("exceeds block gas limit")
            || msg.contains("intrinsic gas too low")
        {
            Some(Self::Other)
        } else {
            None
        }
    }

    pub fn is_nonce_related(&self) -> bool {
        matches!(self, Self::NonceTooLow | Self::NonceConflict)
    }
}

impl AppError {
    /// 可重试的瞬时错误：网络抖动、限流、超时
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::ProviderError(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("rate limit")
                    || msg.contains("too many requests")
                    || msg.contains("429")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("temporar")
            }
            _ => false,
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        let message = err.to_string();
        match BroadcastRejection::classify(&message) {
            Some(kind) => AppError::BroadcastRejected { kind, message },
            None => AppError::ProviderError(message),
        }
    }
}

impl From<JoinError> for AppError {
    fn from(err: JoinError) -> Self {
        AppError::Task(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Conversion(err.to_string())
    }
}
