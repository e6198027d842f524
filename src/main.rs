use clap::Parser;
use log::info;
use nasmytunes::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting nasmytunes {}", env!("CARGO_PKG_VERSION"));
    Cli::parse().run().await
}
