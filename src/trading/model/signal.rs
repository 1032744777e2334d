extern crate rbatis;

use std::fmt;

use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::error::app_error::AppError;

/// 信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Hold => "HOLD",
        };
        write!(f, "{}", s)
    }
}

/// table: signals
///
/// 信号一经写入不再修改，inputs_hash 用于事后审计校验
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct SignalEntity {
    pub id: String,
    pub bot_id: String,
    pub ts: i64,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub reason: String,
    pub inputs_hash: String,
    /// 策略附加信息，JSON字符串
    pub metadata: Option<String>,
}

crud!(SignalEntity {}, "signals");
impl_select!(SignalEntity{select_by_id(id:&str) -> Option => "`where id = #{id} limit 1`"}, "signals");
impl_select!(SignalEntity{select_recent(bot_id:&str, limit:usize) =>
    "`where bot_id = #{bot_id} order by ts desc limit #{limit}`"}, "signals");

pub struct SignalModel {
    db: &'static RBatis,
}

impl SignalModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    pub async fn add(&self, signal: &SignalEntity) -> Result<(), AppError> {
        SignalEntity::insert(self.db, signal).await?;
        Ok(())
    }

    pub async fn get_by_id(&self, signal_id: &str) -> Result<Option<SignalEntity>, AppError> {
        let signal = SignalEntity::select_by_id(self.db, signal_id).await?;
        Ok(signal)
    }

    pub async fn recent(&self, bot_id: &str, limit: usize) -> Result<Vec<SignalEntity>, AppError> {
        let signals = SignalEntity::select_recent(self.db, bot_id, limit).await?;
        Ok(signals)
    }
}

impl Default for SignalModel {
    fn default() -> Self {
        Self::new()
    }
}
