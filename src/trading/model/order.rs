extern crate rbatis;

use std::fmt;

use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_config::db::get_db_client;
use crate::error::app_error::AppError;
use crate::time_util;

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// 订单状态：Open 为唯一可变状态，Closed/Cancelled 之后不再修改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Cancelled,
}

/// 仓位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    None,
    Long,
    Short,
}

/// table: orders（模拟盘订单/仓位记录）
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct OrderEntity {
    pub id: String,
    pub bot_id: String,
    pub signal_id: Option<String>,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub status: OrderStatus,
    pub position_state: PositionState,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub pnl: f64,
    /// 附加信息，JSON字符串
    pub metadata: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OrderEntity {
    pub fn create(
        bot_id: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        signal_id: Option<String>,
        metadata: Option<String>,
    ) -> Self {
        let now = time_util::now_mills();
        let uuid = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}_{}_{}", bot_id, side, &uuid[..8]),
            bot_id: bot_id.to_string(),
            signal_id,
            side,
            quantity,
            price,
            status: OrderStatus::Open,
            position_state: PositionState::None,
            entry_price: None,
            exit_price: None,
            pnl: 0.0,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == OrderStatus::Closed
    }

    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::Buy
    }

    /// 以百分比表示的盈亏，仅对已确定进出场价的订单有意义
    pub fn pnl_percentage(&self) -> Option<f64> {
        match (self.entry_price, self.exit_price) {
            (Some(entry), Some(exit)) if entry != 0.0 => {
                if self.is_buy() {
                    Some((exit - entry) / entry * 100.0)
                } else {
                    Some((entry - exit) / entry * 100.0)
                }
            }
            _ => None,
        }
    }
}

crud!(OrderEntity {}, "orders");
impl_select!(OrderEntity{select_by_id(id:&str) -> Option => "`where id = #{id} limit 1`"}, "orders");
impl_select!(OrderEntity{select_open_by_bot(bot_id:&str) -> Option =>
    "`where bot_id = #{bot_id} and status = 'open' limit 1`"}, "orders");
impl_select!(OrderEntity{select_by_bot(bot_id:&str) =>
    "`where bot_id = #{bot_id} order by created_at asc`"}, "orders");

pub struct OrderModel {
    db: &'static RBatis,
}

impl OrderModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    pub async fn add(&self, order: &OrderEntity) -> Result<(), AppError> {
        OrderEntity::insert(self.db, order).await?;
        Ok(())
    }

    pub async fn update(&self, order: &OrderEntity) -> Result<(), AppError> {
        OrderEntity::update_by_column(self.db, order, "id").await?;
        Ok(())
    }

    pub async fn get_by_id(&self, order_id: &str) -> Result<Option<OrderEntity>, AppError> {
        let order = OrderEntity::select_by_id(self.db, order_id).await?;
        Ok(order)
    }

    pub async fn open_by_bot(&self, bot_id: &str) -> Result<Option<OrderEntity>, AppError> {
        let order = OrderEntity::select_open_by_bot(self.db, bot_id).await?;
        Ok(order)
    }

    pub async fn list_by_bot(&self, bot_id: &str) -> Result<Vec<OrderEntity>, AppError> {
        let orders = OrderEntity::select_by_bot(self.db, bot_id).await?;
        Ok(orders)
    }
}

impl Default for OrderModel {
    fn default() -> Self {
        Self::new()
    }
}
