pub mod audit_service;
pub mod execution_service;
pub mod market_data_service;
pub mod scheduler_service;
