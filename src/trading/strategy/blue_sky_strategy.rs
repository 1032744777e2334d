//! Blue Sky 突破策略
//!
//! 当前收盘价突破前N根K线最高价时买入，其余情况观望。
//! 置信度由突破幅度给出，并按波动率归一化衰减。

use serde_json::json;

use crate::error::app_error::AppError;
use crate::trading::indicator::IndicatorSet;
use crate::trading::strategy::strategy_common::{
    create_buy_signal, create_hold_signal, StrategyResult,
};
use crate::trading::strategy::strategy_trait::StrategyExecutor;
use crate::CandleItem;

const DEFAULT_LOOKBACK: usize = 20;
const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

pub struct BlueSkyStrategy;

impl BlueSkyStrategy {
    pub fn new() -> Self {
        Self
    }

    fn lookback(params: &serde_json::Value) -> usize {
        params
            .get("lookback")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LOOKBACK)
    }

    fn min_confidence(params: &serde_json::Value) -> f64 {
        params
            .get("min_confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_MIN_CONFIDENCE)
    }
}

impl Default for BlueSkyStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyExecutor for BlueSkyStrategy {
    fn name(&self) -> &'static str {
        "blue_sky"
    }

    fn description(&self) -> &'static str {
        "突破策略：当前收盘价超过前N根K线的最高价时买入，适合趋势行情"
    }

    fn evaluate(
        &self,
        candles: &[CandleItem],
        indicators: &IndicatorSet,
        params: &serde_json::Value,
    ) -> Result<StrategyResult, AppError> {
        let lookback = Self::lookback(params);
        let min_confidence = Self::min_confidence(params);

        let required = self.required_data_points(params);
        if candles.len() < required {
            return Ok(create_hold_signal(
                &format!("数据不足: 需要 {} 根K线，当前 {}", required, candles.len()),
                0.5,
            ));
        }

        let current = &candles[candles.len() - 1];
        // 不含当前K线的前N根
        let previous = &candles[candles.len() - 1 - lookback..candles.len() - 1];

        let max_prev_high = previous
            .iter()
            .map(|c| c.h())
            .fold(f64::MIN, f64::max);
        let close_now = current.c();

        if close_now > max_prev_high {
            let breakout_pct = (close_now - max_prev_high) / max_prev_high;

            // 用波动率对突破幅度做归一化衰减：波动越大越不可信
            let volatility = indicators.volatility.stdev.max(0.0001);
            let volatility_normalized = breakout_pct / volatility;

            let base_confidence = (0.5 + breakout_pct * 100.0).min(0.95);
            let confidence = base_confidence * (1.0 / (1.0 + volatility_normalized));

            if confidence >= min_confidence {
                let metadata = json!({
                    "lookback": lookback,
                    "max_prev_high": max_prev_high,
                    "close_now": close_now,
                    "breakout_pct": breakout_pct,
                    "volatility": volatility,
                    "confidence_components": {
                        "base_confidence": base_confidence,
                        "volatility_adjustment": 1.0 / (1.0 + volatility_normalized),
                        "final_confidence": confidence,
                    },
                });
                Ok(create_buy_signal(
                    &format!(
                        "Blue Sky breakout: {:.2} > {:.2} ({:.2}% above max high)",
                        close_now,
                        max_prev_high,
                        breakout_pct * 100.0
                    ),
                    confidence,
                    metadata,
                ))
            } else {
                Ok(create_hold_signal(
                    &format!(
                        "突破成立但置信度 {:.3} 低于阈值 {}",
                        confidence, min_confidence
                    ),
                    confidence,
                ))
            }
        } else {
            let gap = (max_prev_high - close_now) / close_now;
            // 距离突破越远，"观望"判断本身越确定
            Ok(create_hold_signal(
                &format!(
                    "No breakout: {:.2} < {:.2} ({:.2}% below max high)",
                    close_now,
                    max_prev_high,
                    gap * 100.0
                ),
                (1.0 - gap.abs()).max(0.1),
            ))
        }
    }

    fn validate_params(&self, params: &serde_json::Value) -> bool {
        if let Some(v) = params.get("lookback") {
            match v.as_u64() {
                Some(lookback) if (5..=100).contains(&lookback) => {}
                _ => return false,
            }
        }
        if let Some(v) = params.get("min_confidence") {
            match v.as_f64() {
                Some(c) if (0.1..=1.0).contains(&c) => {}
                _ => return false,
            }
        }
        true
    }

    fn required_data_points(&self, params: &serde_json::Value) -> usize {
        // 当前K线 + 前N根
        Self::lookback(params) + 1
    }
}
