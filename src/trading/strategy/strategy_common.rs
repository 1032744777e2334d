use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::trading::model::signal::SignalType;

/// 策略评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub signal_type: SignalType,
    /// 置信度 [0, 1]
    pub confidence: f64,
    pub reason: String,
    pub metadata: serde_json::Value,
}

pub fn create_hold_signal(reason: &str, confidence: f64) -> StrategyResult {
    StrategyResult {
        signal_type: SignalType::Hold,
        confidence: confidence.clamp(0.0, 1.0),
        reason: reason.to_string(),
        metadata: json!({}),
    }
}

pub fn create_buy_signal(reason: &str, confidence: f64, metadata: serde_json::Value) -> StrategyResult {
    StrategyResult {
        signal_type: SignalType::Buy,
        confidence: confidence.clamp(0.0, 1.0),
        reason: reason.to_string(),
        metadata,
    }
}

pub fn create_sell_signal(reason: &str, confidence: f64, metadata: serde_json::Value) -> StrategyResult {
    StrategyResult {
        signal_type: SignalType::Sell,
        confidence: confidence.clamp(0.0, 1.0),
        reason: reason.to_string(),
        metadata,
    }
}
