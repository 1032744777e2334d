//! 行情数据服务
//!
//! 从 Binance 风格的 REST 接口拉取K线（/api/v3/klines，newest-last），
//! 本地限流采用迭代式"等待-复查"滑动窗口，不做递归退避。

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::app_config::settings::Settings;
use crate::error::app_error::AppError;
use crate::trading::model::market::candles::CandlesEntity;

/// 上游接口单次最多返回的K线数量
const API_MAX_LIMIT: usize = 1000;

/// 行情数据源契约，编排器通过它与具体交易所解耦
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 拉取K线，按时间升序返回（newest-last）
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
        end_time_ms: Option<i64>,
    ) -> Result<Vec<CandlesEntity>, AppError>;
}

/// 滑动窗口限流器
///
/// acquire 采用迭代循环：窗口占满时睡到最早请求过期，醒来后重新检查，
/// 持续过载下也不会加深调用栈。
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut history = self.history.lock().await;
                let now = Instant::now();
                while let Some(front) = history.front() {
                    if now.duration_since(*front) >= self.window {
                        history.pop_front();
                    } else {
                        break;
                    }
                }
                if history.len() < self.max_requests {
                    history.push_back(now);
                    return;
                }
                // 等到最早一条出窗，再加少量余量
                let oldest = *history.front().expect("limiter window not empty");
                self.window - now.duration_since(oldest) + Duration::from_millis(100)
            };
            warn!("本地限流已满，等待 {:?} 后重试", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// Binance 风格行情数据实现
pub struct BinanceMarketData {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl BinanceMarketData {
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError(format!("HTTP客户端构建失败: {}", e)))?;
        Ok(Self {
            client,
            base_url: settings.market_data_base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(
                settings.rate_limit_requests_per_minute,
                Duration::from_secs(60),
            ),
        })
    }

    fn convert_timeframe(timeframe: &str) -> Result<&str, AppError> {
        match timeframe {
            "1m" | "5m" | "15m" | "30m" | "1h" | "4h" | "1d" | "1w" => Ok(timeframe),
            other => Err(AppError::ConfigError(format!(
                "不支持的时间周期: {}",
                other
            ))),
        }
    }

    fn parse_kline_row(
        row: &[serde_json::Value],
        symbol: &str,
        timeframe: &str,
    ) -> Result<CandlesEntity, AppError> {
        let num = |idx: usize| -> Result<f64, AppError> {
            row.get(idx)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| {
                    AppError::DataUnavailable(format!("K线字段[{}]解析失败", idx))
                })
        };
        let ts = row
            .first()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AppError::DataUnavailable("K线开始时间解析失败".to_string()))?;
        Ok(CandlesEntity {
            symbol: symbol.to_uppercase(),
            timeframe: timeframe.to_string(),
            ts,
            o: num(1)?,
            h: num(2)?,
            l: num(3)?,
            c: num(4)?,
            vol: num(5)?,
        })
    }
}

#[async_trait]
impl MarketDataSource for BinanceMarketData {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
        end_time_ms: Option<i64>,
    ) -> Result<Vec<CandlesEntity>, AppError> {
        self.limiter.acquire().await;

        let interval = Self::convert_timeframe(timeframe)?;
        let mut query: Vec<(String, String)> = vec![
            ("symbol".to_string(), symbol.to_uppercase()),
            ("interval".to_string(), interval.to_string()),
            ("limit".to_string(), limit.min(API_MAX_LIMIT).to_string()),
        ];
        if let Some(end) = end_time_ms {
            query.push(("endTime".to_string(), end.to_string()));
        }

        let url = format!("{}/api/v3/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout(format!("{} {}: {}", symbol, timeframe, e))
                } else {
                    AppError::DataUnavailable(format!("{} {}: {}", symbol, timeframe, e))
                }
            })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::UpstreamRateLimited(format!(
                "{} {}",
                symbol, timeframe
            )));
        }
        if !response.status().is_success() {
            return Err(AppError::DataUnavailable(format!(
                "{} {}: HTTP {}",
                symbol,
                timeframe,
                response.status()
            )));
        }

        let rows: Vec<Vec<serde_json::Value>> = response.json().await.map_err(|e| {
            AppError::DataUnavailable(format!("{} {}: 响应解析失败 {}", symbol, timeframe, e))
        })?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            candles.push(Self::parse_kline_row(row, symbol, timeframe)?);
        }
        // 上游即为时间升序，这里按约定再保证一次
        candles.sort_by_key(|c| c.ts);

        debug!(
            "拉取K线完成: symbol={}, timeframe={}, count={}",
            symbol,
            timeframe,
            candles.len()
        );
        Ok(candles)
    }
}
