use crate::scan::run_scan;
use anyhow::{Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::shared::{PipelineCfg, build_extractor, load_messages, log_summary, open_sink};

/// Run the pipeline over a JSON-lines dump (`REPLAY_INPUT_PATH`) without
/// touching Telegram.
pub(super) async fn run(cancel: CancellationToken) -> Result<()> {
    let input_path = std::env::var("REPLAY_INPUT_PATH")
        .map_err(|_| anyhow!("Missing env var REPLAY_INPUT_PATH"))?;
    let messages = load_messages(&input_path)?;
    if messages.is_empty() {
        return Err(anyhow!("Replay input is empty: {input_path}"));
    }

    let pipeline = PipelineCfg::from_env();
    let extractor = build_extractor(&pipeline)?;
    let mut sink = open_sink(&pipeline)?;
    info!("Replay started: {} messages from {input_path}", messages.len());

    let outcome = run_scan(&extractor, &messages, &mut sink, &cancel).await?;
    log_summary("Replay", &outcome.summary, outcome.cancelled);
    info!("{} records written to {}", sink.written(), pipeline.records_path);
    Ok(())
}
