//! 机器人任务调度器
//!
//! 每个处于 Running 的机器人对应一个独立的 tokio 定时循环，
//! 周期到点触发一次执行周期。三条并发规则：
//! 1. 同一机器人同一时刻只允许一个周期在跑（cycle_guards，try_lock 失败则跳过）；
//! 2. 错过的周期直接丢弃，不补跑（MissedTickBehavior::Skip）；
//! 3. 全局并发上限由信号量控制。
//!
//! 状态与定时器的一致性约定：启动先挂定时器再提交状态，提交失败回滚定时器；
//! 停止先提交状态再摘定时器，提交失败保留定时器便于重试。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::app_error::AppError;
use crate::time_util;
use crate::trading::model::bot::{BotEntity, BotState};
use crate::trading::store::require_bot;
use crate::trading::task::bot_cycle::{execute_cycle, CycleContext, CycleOutcome};

fn short_uuid() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn make_run_id() -> String {
    format!("run_{}", short_uuid())
}

/// 单个机器人的定时任务句柄
pub struct BotJobHandle {
    pub job_id: String,
    pub bot_id: String,
    pub interval_seconds: u64,
    pub started_at: i64,
    paused: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BotJobHandle {
    fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// 对外暴露的任务快照
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobInfo {
    pub job_id: String,
    pub bot_id: String,
    pub interval_seconds: u64,
    pub paused: bool,
    pub started_at: i64,
}

pub struct BotScheduler {
    ctx: Arc<CycleContext>,
    /// bot_id -> 任务句柄
    jobs: DashMap<String, BotJobHandle>,
    /// bot_id -> 周期互斥锁，定时循环与手动触发共用
    cycle_guards: Arc<DashMap<String, Arc<Mutex<()>>>>,
    /// 全局周期并发上限
    permits: Arc<Semaphore>,
}

impl BotScheduler {
    pub fn new(ctx: Arc<CycleContext>, max_concurrent_bots: usize) -> Self {
        Self {
            ctx,
            jobs: DashMap::new(),
            cycle_guards: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent_bots.max(1))),
        }
    }

    fn cycle_guard(
        guards: &DashMap<String, Arc<Mutex<()>>>,
        bot_id: &str,
    ) -> Arc<Mutex<()>> {
        guards
            .entry(bot_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn spawn_loop(&self, bot_id: &str, interval_seconds: u64, start_paused: bool) -> BotJobHandle {
        let job_id = format!("bot_{}_{}", bot_id, short_uuid());
        let paused = Arc::new(AtomicBool::new(start_paused));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let ctx = Arc::clone(&self.ctx);
        let guards = Arc::clone(&self.cycle_guards);
        let permits = Arc::clone(&self.permits);
        let paused_flag = Arc::clone(&paused);
        let loop_bot_id = bot_id.to_string();
        let loop_job_id = job_id.clone();

        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval 的首个 tick 立即完成，消费掉以保证首次执行在一个周期之后
            ticker.tick().await;

            info!(
                "定时任务启动: job_id={}, bot_id={}, interval={}s",
                loop_job_id, loop_bot_id, interval_seconds
            );

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        info!("定时任务收到停止信号: job_id={}", loop_job_id);
                        break;
                    }
                    _ = ticker.tick() => {
                        if paused_flag.load(Ordering::SeqCst) {
                            continue;
                        }

                        let guard = Self::cycle_guard(&guards, &loop_bot_id);
                        let lock = match guard.try_lock() {
                            Ok(lock) => lock,
                            Err(_) => {
                                warn!(
                                    "上一周期仍在执行，跳过本次触发: bot_id={}",
                                    loop_bot_id
                                );
                                continue;
                            }
                        };

                        let permit = match permits.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };

                        let run_id = make_run_id();
                        // 错误已在周期入口记录并处置（致命错误置 Error），
                        // 循环继续走表，后续周期按状态自然跳过
                        let _ = execute_cycle(&ctx, &loop_bot_id, &run_id).await;

                        drop(permit);
                        drop(lock);
                    }
                }
            }
        });

        BotJobHandle {
            job_id,
            bot_id: bot_id.to_string(),
            interval_seconds,
            started_at: time_util::now_mills(),
            paused,
            stop_tx,
            task,
        }
    }

    /// 启动机器人：挂定时器 -> 状态转 Running -> 提交；提交失败回滚定时器。
    /// Error 状态先复位到 Stopped 再启动。
    pub async fn start_bot_job(&self, bot_id: &str) -> Result<String, AppError> {
        if self.jobs.contains_key(bot_id) {
            return Err(AppError::SchedulerError(format!(
                "机器人已有运行中的任务: {}",
                bot_id
            )));
        }

        let mut bot = require_bot(self.ctx.store.as_ref(), bot_id).await?;
        if !bot.state.can_start() {
            return Err(AppError::InvalidStateTransition {
                from: bot.state.to_string(),
                to: BotState::Running.to_string(),
            });
        }
        // 未注册的策略属于配置错误，启动时即拦截
        self.ctx.registry.get(&bot.strategy_id)?;

        if bot.state == BotState::Error {
            bot.transition(BotState::Stopped)?;
        }
        bot.transition(BotState::Running)?;
        bot.last_run_at = None;

        let handle = self.spawn_loop(bot_id, bot.interval_seconds, false);
        let job_id = handle.job_id.clone();
        bot.scheduler_job_id = Some(job_id.clone());
        self.jobs.insert(bot_id.to_string(), handle);

        if let Err(e) = self.ctx.store.update_bot(&bot).await {
            if let Some((_, handle)) = self.jobs.remove(bot_id) {
                handle.signal_stop();
            }
            return Err(e);
        }

        info!("机器人已启动: bot_id={}, job_id={}", bot_id, job_id);
        Ok(job_id)
    }

    /// 停止机器人：状态转 Stopped 提交成功后才摘定时器。
    /// 提交失败时定时器保留，停止操作可重试。
    pub async fn stop_bot_job(&self, bot_id: &str) -> Result<(), AppError> {
        let mut bot = require_bot(self.ctx.store.as_ref(), bot_id).await?;
        if !bot.state.can_stop() {
            return Err(AppError::InvalidStateTransition {
                from: bot.state.to_string(),
                to: BotState::Stopped.to_string(),
            });
        }
        bot.transition(BotState::Stopped)?;
        bot.scheduler_job_id = None;
        self.ctx.store.update_bot(&bot).await?;

        match self.jobs.remove(bot_id) {
            Some((_, handle)) => handle.signal_stop(),
            None => warn!("停止时未找到对应定时任务: bot_id={}", bot_id),
        }

        info!("机器人已停止: bot_id={}", bot_id);
        Ok(())
    }

    /// 停止并复位 Error 状态的机器人
    pub async fn reset_bot(&self, bot_id: &str) -> Result<(), AppError> {
        let mut bot = require_bot(self.ctx.store.as_ref(), bot_id).await?;
        bot.transition(BotState::Stopped)?;
        bot.scheduler_job_id = None;
        self.ctx.store.update_bot(&bot).await?;
        if let Some((_, handle)) = self.jobs.remove(bot_id) {
            handle.signal_stop();
        }
        info!("机器人已复位: bot_id={}", bot_id);
        Ok(())
    }

    /// 暂停：定时器继续走表，tick 到点后跳过执行。
    /// 没有在调度表上的机器人不允许暂停，状态与调度表必须同进退。
    pub async fn pause_bot_job(&self, bot_id: &str) -> Result<(), AppError> {
        let paused = match self.jobs.get(bot_id) {
            Some(handle) => Arc::clone(&handle.paused),
            None => {
                return Err(AppError::SchedulerError(format!(
                    "机器人没有运行中的任务，无法暂停: {}",
                    bot_id
                )))
            }
        };

        let mut bot = require_bot(self.ctx.store.as_ref(), bot_id).await?;
        bot.transition(BotState::Paused)?;
        self.ctx.store.update_bot(&bot).await?;

        paused.store(true, Ordering::SeqCst);
        info!("机器人已暂停: bot_id={}", bot_id);
        Ok(())
    }

    /// 恢复：同样要求定时任务在册。否则 Stopped 的机器人会被
    /// 提交为 Running 却永远不会被触发。
    pub async fn resume_bot_job(&self, bot_id: &str) -> Result<(), AppError> {
        let paused = match self.jobs.get(bot_id) {
            Some(handle) => Arc::clone(&handle.paused),
            None => {
                return Err(AppError::SchedulerError(format!(
                    "机器人没有运行中的任务，无法恢复: {}",
                    bot_id
                )))
            }
        };

        let mut bot = require_bot(self.ctx.store.as_ref(), bot_id).await?;
        bot.transition(BotState::Running)?;
        self.ctx.store.update_bot(&bot).await?;

        paused.store(false, Ordering::SeqCst);
        info!("机器人已恢复: bot_id={}", bot_id);
        Ok(())
    }

    /// 手动触发一次执行周期，与定时循环共享同一把周期锁
    pub async fn run_cycle_once(&self, bot_id: &str) -> Result<CycleOutcome, AppError> {
        let guard = Self::cycle_guard(&self.cycle_guards, bot_id);
        let lock = match guard.try_lock() {
            Ok(lock) => lock,
            Err(_) => {
                return Ok(CycleOutcome::Skipped {
                    run_id: make_run_id(),
                    reason: "上一周期仍在执行".to_string(),
                });
            }
        };

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::SchedulerError(format!("并发信号量已关闭: {}", e)))?;

        let run_id = make_run_id();
        let outcome = execute_cycle(&self.ctx, bot_id, &run_id).await;

        drop(permit);
        drop(lock);
        outcome
    }

    pub fn list_active_jobs(&self) -> Vec<JobInfo> {
        self.jobs
            .iter()
            .map(|entry| JobInfo {
                job_id: entry.job_id.clone(),
                bot_id: entry.bot_id.clone(),
                interval_seconds: entry.interval_seconds,
                paused: entry.paused.load(Ordering::SeqCst),
                started_at: entry.started_at,
            })
            .collect()
    }

    pub fn has_job(&self, bot_id: &str) -> bool {
        self.jobs.contains_key(bot_id)
    }

    /// 进程启动时按持久化状态重建定时任务：
    /// Running 重新挂定时器，Paused 挂暂停态定时器，其余不动。
    pub async fn resume_persisted_jobs(&self) -> Result<usize, AppError> {
        let bots = self.ctx.store.list_bots().await?;
        let mut resumed = 0usize;

        for bot in bots {
            let start_paused = match bot.state {
                BotState::Running => false,
                BotState::Paused => true,
                _ => continue,
            };
            if self.jobs.contains_key(&bot.id) {
                continue;
            }
            if self.ctx.registry.get(&bot.strategy_id).is_err() {
                warn!(
                    "恢复任务跳过，策略未注册: bot_id={}, strategy={}",
                    bot.id, bot.strategy_id
                );
                continue;
            }

            let handle = self.spawn_loop(&bot.id, bot.interval_seconds, start_paused);
            let job_id = handle.job_id.clone();
            self.jobs.insert(bot.id.clone(), handle);

            let mut bot: BotEntity = bot;
            bot.scheduler_job_id = Some(job_id.clone());
            bot.updated_at = time_util::now_mills();
            if let Err(e) = self.ctx.store.update_bot(&bot).await {
                warn!("恢复任务时 job_id 落库失败: bot_id={}, err={}", bot.id, e);
            }

            info!(
                "已恢复定时任务: bot_id={}, job_id={}, paused={}",
                bot.id, job_id, start_paused
            );
            resumed += 1;
        }
        Ok(resumed)
    }

    /// 停止所有定时循环并等待退出
    pub async fn shutdown(&self) {
        let bot_ids: Vec<String> = self.jobs.iter().map(|e| e.bot_id.clone()).collect();
        for bot_id in bot_ids {
            if let Some((_, handle)) = self.jobs.remove(&bot_id) {
                handle.signal_stop();
                let _ = handle.task.await;
            }
        }
        info!("调度器已关闭");
    }
}
