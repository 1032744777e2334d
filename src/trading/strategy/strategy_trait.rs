use crate::error::app_error::AppError;
use crate::trading::indicator::IndicatorSet;
use crate::trading::strategy::strategy_common::StrategyResult;
use crate::CandleItem;

/// 策略执行器统一契约
///
/// evaluate 为给定窗口的纯函数：不访问存储、不发起IO。
/// 策略在进程启动时按名称注册，未注册的策略ID属于配置错误而非运行时错误。
pub trait StrategyExecutor: Send + Sync {
    /// 策略唯一标识（如 "blue_sky"）
    fn name(&self) -> &'static str;

    /// 人类可读描述
    fn description(&self) -> &'static str;

    /// 评估K线与指标，产出交易信号
    fn evaluate(
        &self,
        candles: &[CandleItem],
        indicators: &IndicatorSet,
        params: &serde_json::Value,
    ) -> Result<StrategyResult, AppError>;

    /// 校验策略参数
    fn validate_params(&self, params: &serde_json::Value) -> bool;

    /// 策略所需的最少K线数量
    fn required_data_points(&self, params: &serde_json::Value) -> usize;
}
