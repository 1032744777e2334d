use crate::app_config::env::{env_or_default, env_parse_or};

/// 应用运行配置，进程启动时从环境变量读取一次
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_env: String,
    /// 市场数据接口根地址（Binance风格 /api/v3/klines）
    pub market_data_base_url: String,
    /// 每分钟允许的上游请求数
    pub rate_limit_requests_per_minute: usize,
    /// 上游请求超时（秒）
    pub request_timeout_secs: u64,
    /// 全局并发执行周期上限
    pub max_concurrent_bots: usize,
    /// 模拟盘初始资金
    pub paper_trading_balance: f64,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            app_env: env_or_default("APP_ENV", "LOCAL"),
            market_data_base_url: env_or_default(
                "MARKET_DATA_BASE_URL",
                "https://api.binance.com",
            ),
            rate_limit_requests_per_minute: env_parse_or("RATE_LIMIT_REQUESTS_PER_MINUTE", 100),
            request_timeout_secs: env_parse_or("REQUEST_TIMEOUT_SECS", 30),
            max_concurrent_bots: env_parse_or("MAX_CONCURRENT_BOTS", 50),
            paper_trading_balance: env_parse_or("PAPER_TRADING_BALANCE", 10000.0),
        }
    }

    pub fn is_local(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("LOCAL")
    }
}
