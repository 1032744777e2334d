//! 测试公共设施：内存存储 + 假行情源 + 实体构造器

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use paper_quant::error::app_error::AppError;
use paper_quant::time_util;
use paper_quant::trading::indicator::{
    IndicatorEngine, IndicatorSet, RegressionTrend, SupportResistance, Volatility,
};
use paper_quant::trading::model::bot::{BotEntity, BotState};
use paper_quant::trading::model::market::candles::CandlesEntity;
use paper_quant::trading::model::signal::{SignalEntity, SignalType};
use paper_quant::trading::services::execution_service::ExecutionService;
use paper_quant::trading::services::market_data_service::MarketDataSource;
use paper_quant::trading::store::{MemoryStore, TradingStore};
use paper_quant::trading::strategy::blue_sky_strategy::BlueSkyStrategy;
use paper_quant::trading::strategy::strategy_registry::StrategyRegistry;
use paper_quant::trading::task::bot_cycle::CycleContext;
use paper_quant::CandleItem;

/// 可注入结果的假行情源
pub struct FakeMarketData {
    candles: Mutex<Vec<CandlesEntity>>,
    fail_with: Mutex<Option<String>>,
    delay: Mutex<Duration>,
}

impl FakeMarketData {
    pub fn new(candles: Vec<CandlesEntity>) -> Self {
        Self {
            candles: Mutex::new(candles),
            fail_with: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_candles(&self, candles: Vec<CandlesEntity>) {
        *self.candles.lock().unwrap() = candles;
    }

    pub fn set_failure(&self, msg: &str) {
        *self.fail_with.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    /// 模拟慢请求，用于并发互斥场景
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl MarketDataSource for FakeMarketData {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        _timeframe: &str,
        limit: usize,
        _end_time_ms: Option<i64>,
    ) -> Result<Vec<CandlesEntity>, AppError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            return Err(AppError::DataUnavailable(msg));
        }
        let candles = self.candles.lock().unwrap().clone();
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }
}

/// 围绕 base_price 以 ±1% 交替震荡的K线序列，1小时间隔
pub fn oscillating_candles(n: usize, base_price: f64) -> Vec<CandlesEntity> {
    let start_ts = 1_700_000_000_000_i64;
    (0..n)
        .map(|i| {
            let close = if i % 2 == 0 {
                base_price
            } else {
                base_price * 1.01
            };
            CandlesEntity {
                symbol: "BTCUSDT".to_string(),
                timeframe: "1h".to_string(),
                ts: start_ts + i as i64 * 3_600_000,
                o: base_price,
                h: close * 1.001,
                l: base_price * 0.99,
                c: close,
                vol: 1000.0,
            }
        })
        .collect()
}

/// 震荡序列之后最后一根K线向上突破
pub fn breakout_candles(n: usize, base_price: f64, breakout_close: f64) -> Vec<CandlesEntity> {
    let mut candles = oscillating_candles(n, base_price);
    if let Some(last) = candles.last_mut() {
        last.c = breakout_close;
        last.h = breakout_close * 1.001;
    }
    candles
}

pub fn to_items(candles: &[CandlesEntity]) -> Vec<CandleItem> {
    candles
        .iter()
        .map(|c| c.to_item().expect("测试K线应通过校验"))
        .collect()
}

pub fn make_bot(id: &str, state: BotState) -> BotEntity {
    let now = time_util::now_mills();
    BotEntity {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        name: format!("bot {}", id),
        symbol: "BTCUSDT".to_string(),
        timeframe: "1h".to_string(),
        strategy_id: "blue_sky".to_string(),
        state,
        scheduler_job_id: None,
        interval_seconds: 1,
        params: None,
        last_run_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn make_signal(bot_id: &str, signal_type: SignalType, confidence: f64) -> SignalEntity {
    SignalEntity {
        id: format!("sig-{}-{}", bot_id, time_util::now_mills()),
        bot_id: bot_id.to_string(),
        ts: time_util::now_mills(),
        signal_type,
        confidence,
        reason: "test signal".to_string(),
        inputs_hash: "0".repeat(64),
        metadata: None,
    }
}

/// 给定波动率的指标集合，其余指标取中性值
pub fn indicator_set(stdev: f64) -> IndicatorSet {
    IndicatorSet {
        support_resistance: SupportResistance {
            supports: Vec::new(),
            resistances: Vec::new(),
            window: 20,
        },
        linear_regression: RegressionTrend {
            slope: 0.0,
            intercept: 100.0,
            r2: 0.0,
            window: 30,
            direction: "sideways".to_string(),
        },
        volatility: Volatility {
            stdev,
            stdev_pct: stdev * 100.0,
            window: 20,
        },
    }
}

pub const PAPER_BALANCE: f64 = 10_000.0;

/// 装配一套完整的周期依赖（内存存储 + 假行情）
pub fn build_context(
    store: Arc<MemoryStore>,
    market: Arc<FakeMarketData>,
) -> Arc<CycleContext> {
    let registry = Arc::new(StrategyRegistry::new());
    registry.register(Arc::new(BlueSkyStrategy::new()));

    let store_dyn: Arc<dyn TradingStore> = store;
    let execution = Arc::new(ExecutionService::new(Arc::clone(&store_dyn), PAPER_BALANCE));

    Arc::new(CycleContext {
        store: store_dyn,
        market,
        indicators: IndicatorEngine::default(),
        registry,
        execution,
    })
}
