mod config;
mod extract;
mod geocode;
mod locale;
mod modes;
mod scan;
mod similarity;
mod sink;
mod telegram;

use anyhow::Result;
use dotenvy::dotenv;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    modes::run_from_env().await
}
