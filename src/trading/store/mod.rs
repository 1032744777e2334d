//! 持久化访问层
//!
//! `TradingStore` 是核心逻辑与具体存储之间的缝隙：
//! 生产环境使用 MySQL 实现，测试与 LOCAL 干跑使用内存实现。

pub mod memory_store;
pub mod mysql_store;

use async_trait::async_trait;

use crate::error::app_error::AppError;
use crate::trading::model::bot::BotEntity;
use crate::trading::model::market::candles::CandlesEntity;
use crate::trading::model::order::OrderEntity;
use crate::trading::model::signal::SignalEntity;

pub use memory_store::MemoryStore;
pub use mysql_store::MysqlStore;

#[async_trait]
pub trait TradingStore: Send + Sync {
    // bots
    async fn get_bot(&self, bot_id: &str) -> Result<Option<BotEntity>, AppError>;
    async fn list_bots(&self) -> Result<Vec<BotEntity>, AppError>;
    async fn insert_bot(&self, bot: &BotEntity) -> Result<(), AppError>;
    async fn update_bot(&self, bot: &BotEntity) -> Result<(), AppError>;
    /// 删除机器人并级联删除其信号与订单
    async fn delete_bot(&self, bot_id: &str) -> Result<(), AppError>;

    // candles
    async fn upsert_candles(&self, candles: &[CandlesEntity]) -> Result<usize, AppError>;
    async fn recent_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<CandlesEntity>, AppError>;

    // signals
    async fn insert_signal(&self, signal: &SignalEntity) -> Result<(), AppError>;
    async fn get_signal(&self, signal_id: &str) -> Result<Option<SignalEntity>, AppError>;
    async fn recent_signals(
        &self,
        bot_id: &str,
        limit: usize,
    ) -> Result<Vec<SignalEntity>, AppError>;

    // orders
    async fn insert_order(&self, order: &OrderEntity) -> Result<(), AppError>;
    async fn update_order(&self, order: &OrderEntity) -> Result<(), AppError>;
    async fn get_order(&self, order_id: &str) -> Result<Option<OrderEntity>, AppError>;
    async fn get_open_order(&self, bot_id: &str) -> Result<Option<OrderEntity>, AppError>;
    async fn list_orders(&self, bot_id: &str) -> Result<Vec<OrderEntity>, AppError>;
}

/// 加载机器人，不存在时返回 BotNotFound
pub async fn require_bot(store: &dyn TradingStore, bot_id: &str) -> Result<BotEntity, AppError> {
    store
        .get_bot(bot_id)
        .await?
        .ok_or_else(|| AppError::BotNotFound(bot_id.to_string()))
}
