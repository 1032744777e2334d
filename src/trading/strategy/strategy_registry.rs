//! 策略注册中心
//!
//! 管理所有已注册的策略。进程启动时构造一次，以 Arc 显式传入编排器，
//! 不做全局单例，便于测试替换。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::error::app_error::AppError;
use crate::trading::strategy::strategy_trait::StrategyExecutor;

/// 策略注册中心
pub struct StrategyRegistry {
    /// 策略名称 -> 策略执行器
    strategies: RwLock<HashMap<String, Arc<dyn StrategyExecutor>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
        }
    }

    /// 注册策略，重名时覆盖并告警
    pub fn register(&self, strategy: Arc<dyn StrategyExecutor>) {
        let name = strategy.name();
        let mut strategies = self.strategies.write().expect("RwLock poisoned");

        if strategies.contains_key(name) {
            warn!("策略已存在，将被覆盖: {}", name);
        }

        strategies.insert(name.to_string(), strategy);
        info!("策略已注册: {}", name);
    }

    /// 根据名称获取策略
    pub fn get(&self, name: &str) -> Result<Arc<dyn StrategyExecutor>, AppError> {
        self.strategies
            .read()
            .expect("RwLock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::StrategyNotRegistered(name.to_string()))
    }

    /// 列出所有已注册策略名称
    pub fn list_strategies(&self) -> Vec<String> {
        self.strategies
            .read()
            .expect("RwLock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies
            .read()
            .expect("RwLock poisoned")
            .contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.strategies.read().expect("RwLock poisoned").len()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
