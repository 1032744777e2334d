//! 应用装配
//!
//! 进程启动时构建依赖图：存储 -> 策略注册 -> 行情 -> 执行引擎 -> 调度器，
//! 然后按持久化状态恢复定时任务，直到收到退出信号。

use std::sync::Arc;

use tracing::info;

use crate::app_config::db;
use crate::app_config::env::env_or_default;
use crate::app_config::settings::Settings;
use crate::error::app_error::AppError;
use crate::trading::indicator::IndicatorEngine;
use crate::trading::services::execution_service::ExecutionService;
use crate::trading::services::market_data_service::{BinanceMarketData, MarketDataSource};
use crate::trading::services::scheduler_service::BotScheduler;
use crate::trading::store::{MemoryStore, MysqlStore, TradingStore};
use crate::trading::strategy::blue_sky_strategy::BlueSkyStrategy;
use crate::trading::strategy::strategy_registry::StrategyRegistry;
use crate::trading::task::bot_cycle::CycleContext;

/// 按配置装配执行周期的依赖集合
pub async fn build_context(settings: &Settings) -> Result<Arc<CycleContext>, AppError> {
    let default_backend = if settings.is_local() { "memory" } else { "mysql" };
    let backend = env_or_default("STORE_BACKEND", default_backend);

    let store: Arc<dyn TradingStore> = match backend.as_str() {
        "mysql" => {
            db::init_db().await?;
            let store = MysqlStore::new();
            store.ensure_tables().await?;
            info!("存储后端: mysql");
            Arc::new(store)
        }
        _ => {
            info!("存储后端: memory（数据不持久化）");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = Arc::new(StrategyRegistry::new());
    registry.register(Arc::new(BlueSkyStrategy::new()));

    let market: Arc<dyn MarketDataSource> = Arc::new(BinanceMarketData::new(settings)?);
    let execution = Arc::new(ExecutionService::new(
        Arc::clone(&store),
        settings.paper_trading_balance,
    ));

    Ok(Arc::new(CycleContext {
        store,
        market,
        indicators: IndicatorEngine::default(),
        registry,
        execution,
    }))
}

/// 应用主流程。run_once 指定时只为该机器人触发一次周期后退出。
pub async fn run(run_once: Option<String>) -> anyhow::Result<()> {
    let settings = Settings::from_env();
    info!("启动配置: {:?}", settings);

    let ctx = build_context(&settings).await?;
    let scheduler = BotScheduler::new(Arc::clone(&ctx), settings.max_concurrent_bots);

    if let Some(bot_id) = run_once {
        let outcome = scheduler.run_cycle_once(&bot_id).await?;
        info!("单次执行完成: bot_id={}, outcome={:?}", bot_id, outcome);
        return Ok(());
    }

    let resumed = scheduler.resume_persisted_jobs().await?;
    info!("已恢复 {} 个定时任务", resumed);

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，开始关闭调度器");
    scheduler.shutdown().await;
    Ok(())
}
