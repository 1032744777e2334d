//! 调度器生命周期与并发测试

mod common;

use std::sync::Arc;
use std::time::Duration;

use paper_quant::error::app_error::AppError;
use paper_quant::trading::model::bot::BotState;
use paper_quant::trading::services::scheduler_service::BotScheduler;
use paper_quant::trading::store::{MemoryStore, TradingStore};
use paper_quant::trading::task::bot_cycle::CycleOutcome;

use common::{build_context, make_bot, oscillating_candles, FakeMarketData};

fn setup() -> (Arc<MemoryStore>, Arc<FakeMarketData>, BotScheduler) {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(FakeMarketData::new(oscillating_candles(60, 100.0)));
    let ctx = build_context(store.clone(), market.clone());
    let scheduler = BotScheduler::new(ctx, 10);
    (store, market, scheduler)
}

#[tokio::test]
async fn test_start_and_stop_job() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Stopped))
        .await
        .unwrap();

    let job_id = scheduler.start_bot_job("b1").await.unwrap();
    assert!(job_id.starts_with("bot_b1_"));
    assert!(scheduler.has_job("b1"));

    let bot = store.get_bot("b1").await.unwrap().unwrap();
    assert_eq!(bot.state, BotState::Running);
    assert_eq!(bot.scheduler_job_id.as_deref(), Some(job_id.as_str()));

    let jobs = scheduler.list_active_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].bot_id, "b1");
    assert!(!jobs[0].paused);

    scheduler.stop_bot_job("b1").await.unwrap();
    assert!(!scheduler.has_job("b1"));
    let bot = store.get_bot("b1").await.unwrap().unwrap();
    assert_eq!(bot.state, BotState::Stopped);
    assert!(bot.scheduler_job_id.is_none());
}

#[tokio::test]
async fn test_double_start_rejected() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Stopped))
        .await
        .unwrap();

    scheduler.start_bot_job("b1").await.unwrap();
    let err = scheduler.start_bot_job("b1").await.unwrap_err();
    assert!(matches!(err, AppError::SchedulerError(_)));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_start_unknown_strategy_rejected() {
    let (store, _market, scheduler) = setup();
    let mut bot = make_bot("b1", BotState::Stopped);
    bot.strategy_id = "no_such_strategy".to_string();
    store.insert_bot(&bot).await.unwrap();

    let err = scheduler.start_bot_job("b1").await.unwrap_err();
    assert!(matches!(err, AppError::StrategyNotRegistered(_)));
    assert!(!scheduler.has_job("b1"));
    // 启动失败不改变持久化状态
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Stopped
    );
}

#[tokio::test]
async fn test_start_from_error_resets_first() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Error))
        .await
        .unwrap();

    scheduler.start_bot_job("b1").await.unwrap();
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Running
    );

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_stop_requires_stoppable_state() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Stopped))
        .await
        .unwrap();

    let err = scheduler.stop_bot_job("b1").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_pause_and_resume() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Stopped))
        .await
        .unwrap();

    scheduler.start_bot_job("b1").await.unwrap();

    scheduler.pause_bot_job("b1").await.unwrap();
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Paused
    );
    assert!(scheduler.list_active_jobs()[0].paused);

    // 暂停态不能再暂停
    let err = scheduler.pause_bot_job("b1").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));

    scheduler.resume_bot_job("b1").await.unwrap();
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Running
    );
    assert!(!scheduler.list_active_jobs()[0].paused);

    // 暂停态也可以直接停止
    scheduler.pause_bot_job("b1").await.unwrap();
    scheduler.stop_bot_job("b1").await.unwrap();
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Stopped
    );
}

#[tokio::test]
async fn test_pause_and_resume_require_live_job() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Stopped))
        .await
        .unwrap();

    // 不在调度表上的机器人恢复必须被拒绝，
    // 否则状态被提交为 Running 却没有定时器会触发它
    let err = scheduler.resume_bot_job("b1").await.unwrap_err();
    assert!(matches!(err, AppError::SchedulerError(_)));
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Stopped
    );
    assert!(!scheduler.has_job("b1"));

    let err = scheduler.pause_bot_job("b1").await.unwrap_err();
    assert!(matches!(err, AppError::SchedulerError(_)));
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Stopped
    );
}

#[tokio::test]
async fn test_run_cycle_once() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Running))
        .await
        .unwrap();

    let outcome = scheduler.run_cycle_once("b1").await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Completed { .. }));
    assert_eq!(store.recent_signals("b1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_cycles_are_mutually_exclusive() {
    let (store, market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Running))
        .await
        .unwrap();

    // 第一个周期卡在慢行情请求上，第二个周期必须被跳过而不是排队
    market.set_delay(Duration::from_millis(300));
    let scheduler = Arc::new(scheduler);

    let first = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run_cycle_once("b1").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = scheduler.run_cycle_once("b1").await.unwrap();
    match second {
        CycleOutcome::Skipped { reason, .. } => {
            assert!(reason.contains("仍在执行"));
        }
        other => panic!("expected Skipped, got {:?}", other),
    }

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, CycleOutcome::Completed { .. }));
    // 只有先到的周期产生信号
    assert_eq!(store.recent_signals("b1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_timer_loop_executes_cycles() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("b1", BotState::Stopped))
        .await
        .unwrap();

    // interval_seconds = 1，等待一个多周期应看到至少一次执行
    scheduler.start_bot_job("b1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1300)).await;
    scheduler.stop_bot_job("b1").await.unwrap();

    assert!(!store.recent_signals("b1", 10).await.unwrap().is_empty());
    let bot = store.get_bot("b1").await.unwrap().unwrap();
    assert!(bot.last_run_at.is_some());
}

#[tokio::test]
async fn test_resume_persisted_jobs() {
    let (store, _market, scheduler) = setup();
    store
        .insert_bot(&make_bot("running", BotState::Running))
        .await
        .unwrap();
    store
        .insert_bot(&make_bot("paused", BotState::Paused))
        .await
        .unwrap();
    store
        .insert_bot(&make_bot("stopped", BotState::Stopped))
        .await
        .unwrap();

    let resumed = scheduler.resume_persisted_jobs().await.unwrap();
    assert_eq!(resumed, 2);
    assert!(scheduler.has_job("running"));
    assert!(scheduler.has_job("paused"));
    assert!(!scheduler.has_job("stopped"));

    let jobs = scheduler.list_active_jobs();
    let paused_job = jobs.iter().find(|j| j.bot_id == "paused").unwrap();
    assert!(paused_job.paused);

    // 重复恢复是幂等的
    assert_eq!(scheduler.resume_persisted_jobs().await.unwrap(), 0);

    scheduler.shutdown().await;
    assert!(scheduler.list_active_jobs().is_empty());
}
