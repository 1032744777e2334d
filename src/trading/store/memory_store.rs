use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::app_error::AppError;
use crate::trading::model::bot::BotEntity;
use crate::trading::model::market::candles::CandlesEntity;
use crate::trading::model::order::{OrderEntity, OrderStatus};
use crate::trading::model::signal::SignalEntity;
use crate::trading::store::TradingStore;

/// 内存存储实现
///
/// 语义与 MySQL 实现保持一致：K线按 (symbol, timeframe, ts) 去重，
/// recent_candles 按时间升序返回。用于测试与 LOCAL 干跑。
#[derive(Default)]
pub struct MemoryStore {
    bots: RwLock<HashMap<String, BotEntity>>,
    /// (symbol, timeframe) -> ts -> candle
    candles: RwLock<HashMap<(String, String), BTreeMap<i64, CandlesEntity>>>,
    signals: RwLock<Vec<SignalEntity>>,
    orders: RwLock<Vec<OrderEntity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradingStore for MemoryStore {
    async fn get_bot(&self, bot_id: &str) -> Result<Option<BotEntity>, AppError> {
        Ok(self.bots.read().await.get(bot_id).cloned())
    }

    async fn list_bots(&self) -> Result<Vec<BotEntity>, AppError> {
        Ok(self.bots.read().await.values().cloned().collect())
    }

    async fn insert_bot(&self, bot: &BotEntity) -> Result<(), AppError> {
        let mut bots = self.bots.write().await;
        if bots.contains_key(&bot.id) {
            return Err(AppError::DbError(format!("bot 已存在: {}", bot.id)));
        }
        bots.insert(bot.id.clone(), bot.clone());
        Ok(())
    }

    async fn update_bot(&self, bot: &BotEntity) -> Result<(), AppError> {
        let mut bots = self.bots.write().await;
        match bots.get_mut(&bot.id) {
            Some(existing) => {
                *existing = bot.clone();
                Ok(())
            }
            None => Err(AppError::BotNotFound(bot.id.clone())),
        }
    }

    async fn delete_bot(&self, bot_id: &str) -> Result<(), AppError> {
        self.bots.write().await.remove(bot_id);
        self.signals.write().await.retain(|s| s.bot_id != bot_id);
        self.orders.write().await.retain(|o| o.bot_id != bot_id);
        Ok(())
    }

    async fn upsert_candles(&self, candles: &[CandlesEntity]) -> Result<usize, AppError> {
        let mut map = self.candles.write().await;
        let mut inserted = 0;
        for candle in candles {
            let key = (candle.symbol.clone(), candle.timeframe.clone());
            let series = map.entry(key).or_default();
            if !series.contains_key(&candle.ts) {
                series.insert(candle.ts, candle.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<CandlesEntity>, AppError> {
        let map = self.candles.read().await;
        let key = (symbol.to_string(), timeframe.to_string());
        let mut rows: Vec<CandlesEntity> = match map.get(&key) {
            Some(series) => series.values().rev().take(limit).cloned().collect(),
            None => Vec::new(),
        };
        rows.reverse();
        Ok(rows)
    }

    async fn insert_signal(&self, signal: &SignalEntity) -> Result<(), AppError> {
        self.signals.write().await.push(signal.clone());
        Ok(())
    }

    async fn get_signal(&self, signal_id: &str) -> Result<Option<SignalEntity>, AppError> {
        Ok(self
            .signals
            .read()
            .await
            .iter()
            .find(|s| s.id == signal_id)
            .cloned())
    }

    async fn recent_signals(
        &self,
        bot_id: &str,
        limit: usize,
    ) -> Result<Vec<SignalEntity>, AppError> {
        let signals = self.signals.read().await;
        let mut rows: Vec<SignalEntity> = signals
            .iter()
            .filter(|s| s.bot_id == bot_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| std::cmp::Reverse(s.ts));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn insert_order(&self, order: &OrderEntity) -> Result<(), AppError> {
        self.orders.write().await.push(order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &OrderEntity) -> Result<(), AppError> {
        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(AppError::DbError(format!("order 不存在: {}", order.id))),
        }
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<OrderEntity>, AppError> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .find(|o| o.id == order_id)
            .cloned())
    }

    async fn get_open_order(&self, bot_id: &str) -> Result<Option<OrderEntity>, AppError> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .find(|o| o.bot_id == bot_id && o.status == OrderStatus::Open)
            .cloned())
    }

    async fn list_orders(&self, bot_id: &str) -> Result<Vec<OrderEntity>, AppError> {
        let orders = self.orders.read().await;
        let mut rows: Vec<OrderEntity> = orders
            .iter()
            .filter(|o| o.bot_id == bot_id)
            .cloned()
            .collect();
        rows.sort_by_key(|o| o.created_at);
        Ok(rows)
    }
}
