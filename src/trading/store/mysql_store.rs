use async_trait::async_trait;

use crate::error::app_error::AppError;
use crate::trading::model::bot::{BotEntity, BotModel};
use crate::trading::model::market::candles::{CandlesEntity, CandlesModel};
use crate::trading::model::order::{OrderEntity, OrderModel};
use crate::trading::model::signal::{SignalEntity, SignalModel};
use crate::trading::store::TradingStore;

/// MySQL 存储实现，委托给各 rbatis Model
pub struct MysqlStore {
    bots: BotModel,
    candles: CandlesModel,
    signals: SignalModel,
    orders: OrderModel,
}

impl MysqlStore {
    /// 需要先完成 `app_config::db::init_db`
    pub fn new() -> Self {
        Self {
            bots: BotModel::new(),
            candles: CandlesModel::new(),
            signals: SignalModel::new(),
            orders: OrderModel::new(),
        }
    }

    pub async fn ensure_tables(&self) -> Result<(), AppError> {
        self.candles.create_table().await
    }
}

impl Default for MysqlStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradingStore for MysqlStore {
    async fn get_bot(&self, bot_id: &str) -> Result<Option<BotEntity>, AppError> {
        self.bots.get_by_id(bot_id).await
    }

    async fn list_bots(&self) -> Result<Vec<BotEntity>, AppError> {
        self.bots.list_all().await
    }

    async fn insert_bot(&self, bot: &BotEntity) -> Result<(), AppError> {
        self.bots.add(bot).await
    }

    async fn update_bot(&self, bot: &BotEntity) -> Result<(), AppError> {
        self.bots.update(bot).await
    }

    async fn delete_bot(&self, bot_id: &str) -> Result<(), AppError> {
        // 级联删除信号与订单
        let db = crate::app_config::db::get_db_client();
        db.exec("DELETE FROM signals WHERE bot_id = ?", vec![bot_id.into()])
            .await?;
        db.exec("DELETE FROM orders WHERE bot_id = ?", vec![bot_id.into()])
            .await?;
        self.bots.delete(bot_id).await
    }

    async fn upsert_candles(&self, candles: &[CandlesEntity]) -> Result<usize, AppError> {
        self.candles.upsert(candles).await
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<CandlesEntity>, AppError> {
        self.candles.recent(symbol, timeframe, limit).await
    }

    async fn insert_signal(&self, signal: &SignalEntity) -> Result<(), AppError> {
        self.signals.add(signal).await
    }

    async fn get_signal(&self, signal_id: &str) -> Result<Option<SignalEntity>, AppError> {
        self.signals.get_by_id(signal_id).await
    }

    async fn recent_signals(
        &self,
        bot_id: &str,
        limit: usize,
    ) -> Result<Vec<SignalEntity>, AppError> {
        self.signals.recent(bot_id, limit).await
    }

    async fn insert_order(&self, order: &OrderEntity) -> Result<(), AppError> {
        self.orders.add(order).await
    }

    async fn update_order(&self, order: &OrderEntity) -> Result<(), AppError> {
        self.orders.update(order).await
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<OrderEntity>, AppError> {
        self.orders.get_by_id(order_id).await
    }

    async fn get_open_order(&self, bot_id: &str) -> Result<Option<OrderEntity>, AppError> {
        self.orders.open_by_bot(bot_id).await
    }

    async fn list_orders(&self, bot_id: &str) -> Result<Vec<OrderEntity>, AppError> {
        self.orders.list_by_bot(bot_id).await
    }
}
