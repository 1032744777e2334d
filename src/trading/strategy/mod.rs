pub mod blue_sky_strategy;
pub mod strategy_common;
pub mod strategy_registry;
pub mod strategy_trait;
