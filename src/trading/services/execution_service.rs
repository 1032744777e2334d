//! 模拟盘执行引擎
//!
//! 不对接真实交易所：按固定的模拟余额做风险定仓，订单只落库。
//! 同一机器人同一时刻最多持有一个未平仓订单；
//! 盈亏只记在平仓的卖单上，买单平仓时仅回填出场价。

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::error::app_error::AppError;
use crate::time_util;
use crate::trading::model::bot::BotEntity;
use crate::trading::model::order::{OrderEntity, OrderSide, OrderStatus, PositionState};
use crate::trading::model::signal::{SignalEntity, SignalType};
use crate::trading::store::TradingStore;

/// 单笔基础风险占余额比例
const BASE_RISK: f64 = 0.02;
/// 最小下单数量
const MIN_QUANTITY: f64 = 0.001;
/// 单笔最大占用余额比例
const MAX_BALANCE_PCT: f64 = 0.10;
/// 止损线（百分比）
const STOP_LOSS_PCT: f64 = -5.0;
/// 止盈线（百分比）
const TAKE_PROFIT_PCT: f64 = 15.0;
/// 时间止损的持仓小时数
const TIME_EXIT_HOURS: f64 = 24.0;
/// 时间止损的置信度上限
const TIME_EXIT_CONFIDENCE: f64 = 0.3;

/// 信号执行后实际发生的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionAction {
    /// 开了新仓
    Opened,
    /// 平掉了已有仓位
    Closed,
    /// 信号与仓位状态冲突，按原因忽略
    Ignored,
    /// 无事发生（Hold 且未触发退出）
    None,
}

impl std::fmt::Display for ExecutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionAction::Opened => "opened",
            ExecutionAction::Closed => "closed",
            ExecutionAction::Ignored => "ignored",
            ExecutionAction::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// 执行结果，reason 记录动作或忽略的原因
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub action: ExecutionAction,
    pub order_id: Option<String>,
    pub reason: String,
}

impl ExecutionReport {
    fn ignored(reason: &str) -> Self {
        Self {
            action: ExecutionAction::Ignored,
            order_id: None,
            reason: reason.to_string(),
        }
    }

    fn none(reason: &str) -> Self {
        Self {
            action: ExecutionAction::None,
            order_id: None,
            reason: reason.to_string(),
        }
    }
}

pub struct ExecutionService {
    store: Arc<dyn TradingStore>,
    paper_balance: f64,
}

impl ExecutionService {
    pub fn new(store: Arc<dyn TradingStore>, paper_balance: f64) -> Self {
        Self {
            store,
            paper_balance,
        }
    }

    /// 风险定仓：余额 * 基础风险 * 置信度，夹在最小数量与最大占用之间
    pub fn position_size(&self, price: f64, confidence: f64) -> f64 {
        let raw = self.paper_balance * BASE_RISK * confidence / price;
        let max_quantity = self.paper_balance * MAX_BALANCE_PCT / price;
        raw.max(MIN_QUANTITY).min(max_quantity)
    }

    pub async fn get_open_position(&self, bot_id: &str) -> Result<Option<OrderEntity>, AppError> {
        self.store.get_open_order(bot_id).await
    }

    /// 开模拟仓。已有未平仓订单时返回 PositionConflict
    pub async fn open_paper_position(
        &self,
        bot: &BotEntity,
        signal: &SignalEntity,
        price: f64,
    ) -> Result<OrderEntity, AppError> {
        if let Some(existing) = self.get_open_position(&bot.id).await? {
            return Err(AppError::PositionConflict(format!(
                "bot_id={}, open_order_id={}",
                bot.id, existing.id
            )));
        }

        let quantity = self.position_size(price, signal.confidence);
        let mut order = OrderEntity::create(
            &bot.id,
            OrderSide::Buy,
            quantity,
            price,
            Some(signal.id.clone()),
            Some(serde_json::to_string(&json!({
                "symbol": bot.symbol,
                "confidence": signal.confidence,
            }))?),
        );
        order.entry_price = Some(price);
        order.position_state = PositionState::Long;

        self.store
            .insert_order(&order)
            .await
            .map_err(|e| AppError::ExecutionFailed(format!("开仓落库失败: {}", e)))?;

        info!(
            "模拟开仓: bot_id={}, order_id={}, qty={:.6}, price={:.2}",
            bot.id, order.id, quantity, price
        );
        Ok(order)
    }

    /// 平模拟仓：回填入场订单的出场价并置为 Closed，
    /// 再写一条已结算的卖单承载盈亏。
    pub async fn close_paper_position(
        &self,
        bot: &BotEntity,
        exit_price: f64,
        reason: &str,
    ) -> Result<OrderEntity, AppError> {
        let mut entry_order = self
            .get_open_position(&bot.id)
            .await?
            .ok_or_else(|| AppError::NoPositionToClose(bot.id.clone()))?;

        let entry_price = entry_order.entry_price.unwrap_or(entry_order.price);
        let pnl = (exit_price - entry_price) * entry_order.quantity;

        entry_order.status = OrderStatus::Closed;
        entry_order.exit_price = Some(exit_price);
        entry_order.position_state = PositionState::None;
        entry_order.updated_at = time_util::now_mills();
        self.store
            .update_order(&entry_order)
            .await
            .map_err(|e| AppError::ExecutionFailed(format!("平仓更新失败: {}", e)))?;

        let mut exit_order = OrderEntity::create(
            &bot.id,
            OrderSide::Sell,
            entry_order.quantity,
            exit_price,
            entry_order.signal_id.clone(),
            Some(serde_json::to_string(&json!({
                "symbol": bot.symbol,
                "reason": reason,
                "entry_order_id": entry_order.id,
            }))?),
        );
        exit_order.status = OrderStatus::Closed;
        exit_order.entry_price = Some(entry_price);
        exit_order.exit_price = Some(exit_price);
        exit_order.pnl = pnl;
        self.store
            .insert_order(&exit_order)
            .await
            .map_err(|e| AppError::ExecutionFailed(format!("平仓落库失败: {}", e)))?;

        info!(
            "模拟平仓: bot_id={}, entry={:.2}, exit={:.2}, pnl={:.4}, reason={}",
            bot.id, entry_price, exit_price, pnl, reason
        );
        Ok(exit_order)
    }

    /// 检查退出条件：止损、止盈、低置信度的时间止损。
    /// 返回触发的原因，未触发返回 None。
    fn exit_reason(
        &self,
        order: &OrderEntity,
        current_price: f64,
        confidence: f64,
        now_ms: i64,
    ) -> Option<String> {
        let entry_price = order.entry_price.unwrap_or(order.price);
        if entry_price == 0.0 {
            return None;
        }
        let pnl_pct = (current_price - entry_price) / entry_price * 100.0;

        if pnl_pct <= STOP_LOSS_PCT {
            return Some(format!("stop loss triggered: {:.2}%", pnl_pct));
        }
        if pnl_pct >= TAKE_PROFIT_PCT {
            return Some(format!("take profit triggered: {:.2}%", pnl_pct));
        }

        let hours_held = time_util::hours_between(order.created_at, now_ms);
        if hours_held >= TIME_EXIT_HOURS && confidence < TIME_EXIT_CONFIDENCE {
            return Some(format!(
                "time-based exit: {:.1} hours held, low confidence",
                hours_held
            ));
        }
        None
    }

    /// 信号 x 仓位的执行矩阵
    pub async fn execute_signal(
        &self,
        bot: &BotEntity,
        signal: &SignalEntity,
        current_price: f64,
    ) -> Result<ExecutionReport, AppError> {
        let open = self.get_open_position(&bot.id).await?;

        match (signal.signal_type, open) {
            (SignalType::Buy, Some(order)) => {
                warn!(
                    "买入信号被忽略，已有持仓: bot_id={}, order_id={}",
                    bot.id, order.id
                );
                Ok(ExecutionReport::ignored("Already in position"))
            }
            (SignalType::Buy, None) => {
                let order = self.open_paper_position(bot, signal, current_price).await?;
                Ok(ExecutionReport {
                    action: ExecutionAction::Opened,
                    order_id: Some(order.id),
                    reason: signal.reason.clone(),
                })
            }
            (SignalType::Sell, Some(_)) => {
                let order = self
                    .close_paper_position(bot, current_price, &signal.reason)
                    .await?;
                Ok(ExecutionReport {
                    action: ExecutionAction::Closed,
                    order_id: Some(order.id),
                    reason: signal.reason.clone(),
                })
            }
            (SignalType::Sell, None) => Ok(ExecutionReport::ignored("No position to close")),
            (SignalType::Hold, Some(order)) => {
                let now = time_util::now_mills();
                match self.exit_reason(&order, current_price, signal.confidence, now) {
                    Some(reason) => {
                        let exit = self
                            .close_paper_position(bot, current_price, &reason)
                            .await?;
                        Ok(ExecutionReport {
                            action: ExecutionAction::Closed,
                            order_id: Some(exit.id),
                            reason,
                        })
                    }
                    None => Ok(ExecutionReport::none("持仓未触发退出条件")),
                }
            }
            (SignalType::Hold, None) => Ok(ExecutionReport::none("无持仓，继续观望")),
        }
    }

    /// 撤销未平仓订单
    pub async fn cancel_order(&self, order_id: &str) -> Result<OrderEntity, AppError> {
        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::ExecutionFailed(format!("订单不存在: {}", order_id)))?;
        if !order.is_open() {
            return Err(AppError::ExecutionFailed(format!(
                "订单不可撤销: {}, status={:?}",
                order_id, order.status
            )));
        }
        order.status = OrderStatus::Cancelled;
        order.position_state = PositionState::None;
        order.updated_at = time_util::now_mills();
        self.store.update_order(&order).await?;
        info!("订单已撤销: {}", order_id);
        Ok(order)
    }

    /// 账户概览，盈亏统计只看承载盈亏的卖出平仓单
    pub async fn get_portfolio_summary(&self, bot_id: &str) -> Result<PortfolioSummary, AppError> {
        let orders = self.store.list_orders(bot_id).await?;

        let open_order = orders.iter().find(|o| o.is_open()).cloned();
        let closed_exits: Vec<&OrderEntity> = orders
            .iter()
            .filter(|o| o.is_closed() && o.side == OrderSide::Sell)
            .collect();

        let total_trades = closed_exits.len();
        let total_pnl: f64 = closed_exits.iter().map(|o| o.pnl).sum();
        let wins = closed_exits.iter().filter(|o| o.pnl > 0.0).count();
        let win_rate = if total_trades == 0 {
            0.0
        } else {
            wins as f64 / total_trades as f64 * 100.0
        };
        // 总市值按已实现盈亏计，可用余额再扣除未平仓占用
        let open_cost = open_order
            .as_ref()
            .map(|o| o.quantity * o.price)
            .unwrap_or(0.0);
        let total_value = self.paper_balance + total_pnl;
        let available_balance = total_value - open_cost;

        let best_trade = closed_exits
            .iter()
            .map(|o| o.pnl)
            .fold(None, |acc: Option<f64>, pnl| {
                Some(acc.map_or(pnl, |best| best.max(pnl)))
            });
        let worst_trade = closed_exits
            .iter()
            .map(|o| o.pnl)
            .fold(None, |acc: Option<f64>, pnl| {
                Some(acc.map_or(pnl, |worst| worst.min(pnl)))
            });

        Ok(PortfolioSummary {
            bot_id: bot_id.to_string(),
            paper_balance: self.paper_balance,
            total_value,
            available_balance,
            open_order,
            total_trades,
            total_pnl,
            win_rate,
            best_trade,
            worst_trade,
        })
    }
}

/// 模拟账户概览
#[derive(Debug, Clone)]
pub struct PortfolioSummary {
    pub bot_id: String,
    pub paper_balance: f64,
    /// 模拟余额加已实现盈亏
    pub total_value: f64,
    /// 总市值扣除未平仓占用
    pub available_balance: f64,
    pub open_order: Option<OrderEntity>,
    pub total_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub best_trade: Option<f64>,
    pub worst_trade: Option<f64>,
}
