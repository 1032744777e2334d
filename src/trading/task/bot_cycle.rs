//! 机器人执行周期编排
//!
//! 一次周期按固定顺序走六个阶段：
//! 前置检查 -> 行情 -> 指标 -> 策略 -> 审计 -> 执行。
//! 行情/指标/策略/审计阶段失败为致命错误，机器人进入 Error，
//! 定时器保留，后续周期在前置检查处空转直到人工处置；
//! 执行阶段失败为可容忍错误，记录后周期照常收尾。

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use crate::error::app_error::AppError;
use crate::time_util;
use crate::trading::indicator::IndicatorEngine;
use crate::trading::model::bot::{BotEntity, BotState};
use crate::trading::model::signal::SignalType;
use crate::trading::services::audit_service;
use crate::trading::services::execution_service::{ExecutionAction, ExecutionService};
use crate::trading::services::market_data_service::MarketDataSource;
use crate::trading::store::{require_bot, TradingStore};
use crate::trading::strategy::strategy_registry::StrategyRegistry;
use crate::CandleItem;

/// 每周期向上游请求的K线数量
pub const FETCH_LIMIT: usize = 100;
/// 指标与策略实际使用的窗口
pub const ANALYSIS_WINDOW: usize = 50;
/// 低于此数量直接判定数据不足
pub const MIN_CANDLES: usize = 10;

/// 周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Precondition,
    MarketData,
    Indicators,
    Strategy,
    Audit,
    Execution,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleStage::Precondition => "precondition",
            CycleStage::MarketData => "market_data",
            CycleStage::Indicators => "indicators",
            CycleStage::Strategy => "strategy",
            CycleStage::Audit => "audit",
            CycleStage::Execution => "execution",
        };
        write!(f, "{}", s)
    }
}

/// 带阶段信息的周期错误，fatal 决定机器人是否进入 Error
#[derive(Debug)]
pub struct CycleError {
    pub stage: CycleStage,
    pub fatal: bool,
    pub source: AppError,
}

impl CycleError {
    fn fatal(stage: CycleStage, source: AppError) -> Self {
        Self {
            stage,
            fatal: true,
            source,
        }
    }

    fn contained(stage: CycleStage, source: AppError) -> Self {
        Self {
            stage,
            fatal: false,
            source,
        }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "周期阶段 {} 失败: {}", self.stage, self.source)
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// 一次周期的结果
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed {
        run_id: String,
        signal_type: SignalType,
        confidence: f64,
        action: ExecutionAction,
    },
    /// 周期未执行（状态不满足、上一周期还在跑等）
    Skipped { run_id: String, reason: String },
}

/// 编排器依赖集合，启动时装配一次后在调度器间共享
pub struct CycleContext {
    pub store: Arc<dyn TradingStore>,
    pub market: Arc<dyn MarketDataSource>,
    pub indicators: IndicatorEngine,
    pub registry: Arc<StrategyRegistry>,
    pub execution: Arc<ExecutionService>,
}

/// 执行一次完整周期
pub async fn run_bot_cycle(
    ctx: &CycleContext,
    bot_id: &str,
    run_id: &str,
) -> Result<CycleOutcome, CycleError> {
    // 阶段1: 前置检查
    let mut bot = require_bot(ctx.store.as_ref(), bot_id)
        .await
        .map_err(|e| CycleError::fatal(CycleStage::Precondition, e))?;
    if bot.state != BotState::Running {
        return Ok(CycleOutcome::Skipped {
            run_id: run_id.to_string(),
            reason: format!("机器人状态为 {}，跳过本周期", bot.state),
        });
    }

    // 阶段2: 行情数据
    let candles_raw = ctx
        .market
        .fetch_candles(&bot.symbol, &bot.timeframe, FETCH_LIMIT, None)
        .await
        .map_err(|e| CycleError::fatal(CycleStage::MarketData, e))?;
    if candles_raw.len() < MIN_CANDLES {
        return Err(CycleError::fatal(
            CycleStage::MarketData,
            AppError::InsufficientData(format!(
                "{} {}: 需要至少 {} 根K线，实际 {}",
                bot.symbol,
                bot.timeframe,
                MIN_CANDLES,
                candles_raw.len()
            )),
        ));
    }
    if let Err(e) = ctx.store.upsert_candles(&candles_raw).await {
        // 行情缓存落库失败不阻断本周期
        warn!("K线落库失败: bot_id={}, err={}", bot_id, e);
    }

    let start = candles_raw.len().saturating_sub(ANALYSIS_WINDOW);
    let window: Vec<CandleItem> = candles_raw[start..]
        .iter()
        .map(|c| c.to_item())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CycleError::fatal(CycleStage::MarketData, e))?;
    let current_price = window
        .last()
        .map(|c| c.c())
        .ok_or_else(|| {
            CycleError::fatal(
                CycleStage::MarketData,
                AppError::InsufficientData("分析窗口为空".to_string()),
            )
        })?;

    // 阶段3: 指标
    let indicators = ctx
        .indicators
        .compute(&window)
        .map_err(|e| CycleError::fatal(CycleStage::Indicators, e))?;

    // 阶段4: 策略
    let strategy = ctx
        .registry
        .get(&bot.strategy_id)
        .map_err(|e| CycleError::fatal(CycleStage::Strategy, e))?;
    let params = bot.params_value();
    if !strategy.validate_params(&params) {
        return Err(CycleError::fatal(
            CycleStage::Strategy,
            AppError::StrategyEvaluationFailed(format!(
                "策略参数非法: strategy={}, params={}",
                bot.strategy_id, params
            )),
        ));
    }
    let result = strategy
        .evaluate(&window, &indicators, &params)
        .map_err(|e| CycleError::fatal(CycleStage::Strategy, e))?;

    // 阶段5: 审计
    // 哈希输入覆盖本次决策的全部依据：窗口规模、指标键、参数与评估时刻
    let ts = time_util::now_mills();
    let last_candle_ts = window.last().map(|c| c.ts()).unwrap_or(0);
    let inputs = json!({
        "bot_id": bot.id,
        "symbol": bot.symbol,
        "timeframe": bot.timeframe,
        "strategy_id": bot.strategy_id,
        "params": params,
        "candle_count": window.len(),
        "last_candle_ts": last_candle_ts,
        "indicator_keys": indicators.keys(),
        "evaluated_at": ts,
    });
    let inputs_hash = audit_service::make_inputs_hash(&inputs)
        .map_err(|e| CycleError::fatal(CycleStage::Audit, e))?;
    let signal = audit_service::record_signal(ctx.store.as_ref(), &bot, ts, &result, &inputs_hash)
        .await
        .map_err(|e| CycleError::fatal(CycleStage::Audit, e))?;

    // 阶段6: 执行（可容忍失败）
    let action = match ctx
        .execution
        .execute_signal(&bot, &signal, current_price)
        .await
        .map_err(|e| CycleError::contained(CycleStage::Execution, e))
    {
        Ok(report) => {
            info!(
                "信号执行完成: bot_id={}, run_id={}, action={}, reason={}",
                bot.id, run_id, report.action, report.reason
            );
            report.action
        }
        Err(e) => {
            warn!("信号执行失败（已容忍）: bot_id={}, run_id={}, err={}", bot.id, run_id, e);
            ExecutionAction::None
        }
    };

    // 收尾: 刷新最近运行时间
    bot.last_run_at = Some(ts);
    bot.updated_at = time_util::now_mills();
    if let Err(e) = ctx.store.update_bot(&bot).await {
        warn!("last_run_at 更新失败: bot_id={}, err={}", bot_id, e);
    }

    Ok(CycleOutcome::Completed {
        run_id: run_id.to_string(),
        signal_type: signal.signal_type,
        confidence: signal.confidence,
        action,
    })
}

/// 周期入口：致命错误时尽力把机器人置为 Error 并落库
pub async fn execute_cycle(
    ctx: &CycleContext,
    bot_id: &str,
    run_id: &str,
) -> Result<CycleOutcome, AppError> {
    match run_bot_cycle(ctx, bot_id, run_id).await {
        Ok(outcome) => Ok(outcome),
        Err(cycle_err) => {
            error!(
                "执行周期失败: bot_id={}, run_id={}, stage={}, fatal={}, err={}",
                bot_id, run_id, cycle_err.stage, cycle_err.fatal, cycle_err.source
            );
            if cycle_err.fatal {
                mark_bot_errored(ctx.store.as_ref(), bot_id).await;
            }
            Err(cycle_err.source)
        }
    }
}

async fn mark_bot_errored(store: &dyn TradingStore, bot_id: &str) {
    let mut bot: BotEntity = match store.get_bot(bot_id).await {
        Ok(Some(bot)) => bot,
        Ok(None) => return,
        Err(e) => {
            error!("标记 Error 状态时读取机器人失败: bot_id={}, err={}", bot_id, e);
            return;
        }
    };
    if bot.transition(BotState::Error).is_ok() {
        if let Err(e) = store.update_bot(&bot).await {
            error!("Error 状态落库失败: bot_id={}, err={}", bot_id, e);
        }
    }
}
