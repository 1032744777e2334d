use clap::Parser;
use dotenv::dotenv;

use paper_quant::app::bootstrap;
use paper_quant::app_config::log::setup_logging;

/// 模拟盘量化机器人调度服务
#[derive(Parser, Debug)]
#[command(name = "paper_quant", version, about = "纸面交易机器人自动化调度")]
struct Args {
    /// 只为指定机器人执行一次周期后退出
    #[arg(long)]
    run_once: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // guard 在 main 存活期间持有，保证日志异步线程不提前退出
    let _log_guards = setup_logging()?;

    bootstrap::run(args.run_once).await
}
