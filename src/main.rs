// src/main.rs

use jobdag::cli::{self, Command};
use jobdag::logging::{self, LogRole};
use jobdag::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("jobdag error: {err}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let role = match args.command {
        Command::Worker(_) => LogRole::Worker,
        _ => LogRole::Cli,
    };
    logging::init_logging(args.log_level, role)?;
    run(args).await?;
    Ok(())
}
