pub mod indicator;
pub mod model;
pub mod services;
pub mod store;
pub mod strategy;
pub mod task;
