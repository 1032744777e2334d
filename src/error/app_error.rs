use thiserror::Error;

/// 应用错误
///
/// 机器人执行周期中，MarketData/Indicator/Strategy/Audit 阶段的错误为致命错误，
/// Execution 阶段的错误为可容忍错误；是否致命由编排器按阶段决定，错误类型本身不携带。
#[derive(Error, Debug)]
pub enum AppError {
    /// 市场数据错误
    #[error("市场数据不可用: {0}")]
    DataUnavailable(String),

    #[error("数据不足: {0}")]
    InsufficientData(String),

    #[error("上游接口限流: {0}")]
    UpstreamRateLimited(String),

    #[error("上游接口超时: {0}")]
    UpstreamTimeout(String),

    /// 策略评估错误
    #[error("策略评估失败: {0}")]
    StrategyEvaluationFailed(String),

    #[error("策略未注册: {0}")]
    StrategyNotRegistered(String),

    /// 信号审计错误
    #[error("信号审计写入失败: {0}")]
    AuditPersistFailed(String),

    /// 模拟交易执行错误
    #[error("信号执行失败: {0}")]
    ExecutionFailed(String),

    #[error("已存在未平仓位: {0}")]
    PositionConflict(String),

    #[error("无可平仓位: {0}")]
    NoPositionToClose(String),

    /// 生命周期状态机错误
    #[error("非法状态转换: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("机器人不存在: {0}")]
    BotNotFound(String),

    /// 调度器错误
    #[error("调度器错误: {0}")]
    SchedulerError(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    DbError(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),
}

impl From<rbatis::rbdc::Error> for AppError {
    fn from(err: rbatis::rbdc::Error) -> Self {
        AppError::DbError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ConfigError(err.to_string())
    }
}
