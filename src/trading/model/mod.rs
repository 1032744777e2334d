pub mod bot;
pub mod market;
pub mod order;
pub mod signal;
