extern crate rbatis;

use std::fmt;

use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::error::app_error::AppError;
use crate::time_util;

/// 机器人生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    Stopped,
    Running,
    Paused,
    Error,
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BotState::Stopped => "stopped",
            BotState::Running => "running",
            BotState::Paused => "paused",
            BotState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl BotState {
    /// 状态转换表，只有这里列出的 (from, to) 允许
    pub fn allows(self, to: BotState) -> bool {
        use BotState::*;
        matches!(
            (self, to),
            (Stopped, Running)
                | (Stopped, Error)
                | (Running, Stopped)
                | (Running, Paused)
                | (Running, Error)
                | (Paused, Running)
                | (Paused, Stopped)
                | (Error, Stopped)
        )
    }

    /// 只有 Stopped / Error 可以 start
    pub fn can_start(self) -> bool {
        matches!(self, BotState::Stopped | BotState::Error)
    }

    /// Running / Paused 可以 stop
    pub fn can_stop(self) -> bool {
        matches!(self, BotState::Running | BotState::Paused)
    }

    /// 只有 Running 可以 pause
    pub fn can_pause(self) -> bool {
        matches!(self, BotState::Running)
    }
}

/// table: bots
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct BotEntity {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub symbol: String,
    pub timeframe: String,
    pub strategy_id: String,
    pub state: BotState,
    pub scheduler_job_id: Option<String>,
    pub interval_seconds: u64,
    /// 策略参数，JSON字符串
    pub params: Option<String>,
    pub last_run_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl BotEntity {
    /// 校验并执行状态转换，成功时刷新 updated_at
    pub fn transition(&mut self, to: BotState) -> Result<(), AppError> {
        if !self.state.allows(to) {
            return Err(AppError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.updated_at = time_util::now_mills();
        Ok(())
    }

    /// 策略参数解析为JSON对象，缺失或非法时返回空对象
    pub fn params_value(&self) -> serde_json::Value {
        self.params
            .as_deref()
            .and_then(|p| serde_json::from_str(p).ok())
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

crud!(BotEntity {}, "bots");
impl_select!(BotEntity{select_by_id(id:&str) -> Option => "`where id = #{id} limit 1`"}, "bots");

pub struct BotModel {
    db: &'static RBatis,
}

impl BotModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    pub async fn get_by_id(&self, bot_id: &str) -> Result<Option<BotEntity>, AppError> {
        let bot = BotEntity::select_by_id(self.db, bot_id).await?;
        Ok(bot)
    }

    pub async fn list_all(&self) -> Result<Vec<BotEntity>, AppError> {
        let bots = BotEntity::select_all(self.db).await?;
        Ok(bots)
    }

    pub async fn add(&self, bot: &BotEntity) -> Result<(), AppError> {
        BotEntity::insert(self.db, bot).await?;
        Ok(())
    }

    pub async fn update(&self, bot: &BotEntity) -> Result<(), AppError> {
        BotEntity::update_by_column(self.db, bot, "id").await?;
        Ok(())
    }

    pub async fn delete(&self, bot_id: &str) -> Result<(), AppError> {
        BotEntity::delete_by_column(self.db, "id", bot_id).await?;
        Ok(())
    }
}

impl Default for BotModel {
    fn default() -> Self {
        Self::new()
    }
}
