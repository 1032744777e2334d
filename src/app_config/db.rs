use std::env;

use once_cell::sync::OnceCell;
use rbatis::RBatis;
use rbdc_mysql::MysqlDriver;

use crate::error::app_error::AppError;

static DB_CLIENT: OnceCell<RBatis> = OnceCell::new();

/// 初始化数据库连接池，进程启动时调用一次
pub async fn init_db() -> Result<&'static RBatis, AppError> {
    let dsn = env::var("DB_HOST").map_err(|_| AppError::ConfigError("DB_HOST 未配置".to_string()))?;
    let rb = RBatis::new();
    rb.link(MysqlDriver {}, &dsn)
        .await
        .map_err(|e| AppError::DbError(format!("数据库连接失败: {}", e)))?;

    if let Ok(pool) = rb.get_pool() {
        pool.set_max_open_conns(100).await;
    }

    DB_CLIENT
        .set(rb)
        .map_err(|_| AppError::ConfigError("DB_CLIENT 重复初始化".to_string()))?;
    Ok(DB_CLIENT.get().expect("DB_CLIENT is not initialized"))
}

pub fn get_db_client() -> &'static RBatis {
    DB_CLIENT.get().expect("DB_CLIENT is not initialized")
}
