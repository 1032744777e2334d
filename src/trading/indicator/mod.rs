//! 指标引擎
//!
//! 对给定K线窗口的纯函数计算：支撑/阻力位、线性回归趋势、波动率。
//! 不访问存储，不产生副作用，同一输入窗口的输出稳定。

use serde::{Deserialize, Serialize};
use ta::indicators::StandardDeviation;
use ta::Next;

use crate::error::app_error::AppError;
use crate::CandleItem;

/// 支撑/阻力价位及其强度（触碰次数）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub strength: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportResistance {
    pub supports: Vec<PriceLevel>,
    pub resistances: Vec<PriceLevel>,
    pub window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTrend {
    pub slope: f64,
    pub intercept: f64,
    pub r2: f64,
    pub window: usize,
    /// bullish / bearish / sideways
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volatility {
    /// 收益率标准差
    pub stdev: f64,
    /// 相对最新收盘价的波动率百分比
    pub stdev_pct: f64,
    pub window: usize,
}

/// 一次周期内计算出的全部指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub support_resistance: SupportResistance,
    pub linear_regression: RegressionTrend,
    pub volatility: Volatility,
}

impl IndicatorSet {
    /// 指标名称列表，用于信号审计的输入哈希
    pub fn keys(&self) -> Vec<&'static str> {
        vec!["support_resistance", "linear_regression", "volatility"]
    }
}

/// 指标引擎
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    pub sr_window: usize,
    pub regression_window: usize,
    pub volatility_window: usize,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self {
            sr_window: 20,
            regression_window: 30,
            volatility_window: 20,
        }
    }
}

impl IndicatorEngine {
    pub fn compute(&self, candles: &[CandleItem]) -> Result<IndicatorSet, AppError> {
        let support_resistance = self.calc_support_resistance(candles)?;
        let linear_regression = self.calc_linear_regression(candles)?;
        let volatility = self.calc_volatility(candles)?;
        Ok(IndicatorSet {
            support_resistance,
            linear_regression,
            volatility,
        })
    }

    /// 支撑/阻力位：枢轴点聚类，按触碰次数排序，各取前5
    fn calc_support_resistance(
        &self,
        candles: &[CandleItem],
    ) -> Result<SupportResistance, AppError> {
        let window = self.sr_window;
        if candles.len() < window * 2 {
            return Err(AppError::InsufficientData(format!(
                "支撑阻力位需要至少 {} 根K线，当前 {}",
                window * 2,
                candles.len()
            )));
        }

        let half = window / 2;
        let mut pivot_highs: Vec<f64> = Vec::new();
        let mut pivot_lows: Vec<f64> = Vec::new();
        for i in half..candles.len() - half {
            let h = candles[i].h();
            let l = candles[i].l();
            let neighbors = &candles[i - half..=i + half];
            if neighbors.iter().all(|c| c.h() <= h) {
                pivot_highs.push(h);
            }
            if neighbors.iter().all(|c| c.l() >= l) {
                pivot_lows.push(l);
            }
        }

        // 0.5% 价差内的枢轴归为同一价位
        let cluster = |mut pivots: Vec<f64>| -> Vec<PriceLevel> {
            pivots.sort_by(|a, b| a.partial_cmp(b).expect("pivot price is NaN"));
            let mut levels: Vec<PriceLevel> = Vec::new();
            for price in pivots {
                match levels.last_mut() {
                    Some(level) if (price - level.price).abs() / level.price <= 0.005 => {
                        level.strength += 1;
                        level.price = (level.price * (level.strength - 1) as f64 + price)
                            / level.strength as f64;
                    }
                    _ => levels.push(PriceLevel { price, strength: 1 }),
                }
            }
            levels.sort_by(|a, b| b.strength.cmp(&a.strength));
            levels.truncate(5);
            levels
        };

        Ok(SupportResistance {
            supports: cluster(pivot_lows),
            resistances: cluster(pivot_highs),
            window,
        })
    }

    /// 最小二乘线性回归：斜率、截距、决定系数
    fn calc_linear_regression(&self, candles: &[CandleItem]) -> Result<RegressionTrend, AppError> {
        let window = self.regression_window;
        if candles.len() < window {
            return Err(AppError::InsufficientData(format!(
                "线性回归需要至少 {} 根K线，当前 {}",
                window,
                candles.len()
            )));
        }

        let closes: Vec<f64> = candles[candles.len() - window..]
            .iter()
            .map(|c| c.c())
            .collect();
        let n = closes.len() as f64;
        let sum_x: f64 = (0..closes.len()).map(|i| i as f64).sum();
        let sum_y: f64 = closes.iter().sum();
        let sum_xy: f64 = closes.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
        let sum_x2: f64 = (0..closes.len()).map(|i| (i as f64) * (i as f64)).sum();

        let denom = n * sum_x2 - sum_x * sum_x;
        if denom == 0.0 {
            return Err(AppError::InsufficientData(
                "线性回归样本退化".to_string(),
            ));
        }
        let slope = (n * sum_xy - sum_x * sum_y) / denom;
        let intercept = (sum_y - slope * sum_x) / n;

        let mean_y = sum_y / n;
        let ss_res: f64 = closes
            .iter()
            .enumerate()
            .map(|(i, y)| {
                let pred = slope * i as f64 + intercept;
                (y - pred) * (y - pred)
            })
            .sum();
        let ss_tot: f64 = closes.iter().map(|y| (y - mean_y) * (y - mean_y)).sum();
        let r2 = if ss_tot != 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        let direction = if slope > 0.0 {
            "bullish"
        } else if slope < 0.0 {
            "bearish"
        } else {
            "sideways"
        };

        Ok(RegressionTrend {
            slope,
            intercept,
            r2,
            window,
            direction: direction.to_string(),
        })
    }

    /// 波动率：收盘收益率的滚动标准差
    fn calc_volatility(&self, candles: &[CandleItem]) -> Result<Volatility, AppError> {
        let window = self.volatility_window;
        if candles.len() < window + 1 {
            return Err(AppError::InsufficientData(format!(
                "波动率需要至少 {} 根K线，当前 {}",
                window + 1,
                candles.len()
            )));
        }

        let mut sd = StandardDeviation::new(window)
            .map_err(|e| AppError::ConfigError(format!("波动率窗口不合法: {}", e)))?;
        let mut stdev = 0.0;
        for pair in candles.windows(2) {
            let prev = pair[0].c();
            let curr = pair[1].c();
            if prev == 0.0 {
                return Err(AppError::DataUnavailable("收盘价为0".to_string()));
            }
            stdev = sd.next(curr / prev - 1.0);
        }
        if !stdev.is_finite() {
            stdev = 0.0;
        }

        Ok(Volatility {
            stdev,
            stdev_pct: stdev * 100.0,
            window,
        })
    }
}
