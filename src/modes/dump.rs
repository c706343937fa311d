use crate::scan::InputMessage;
use crate::telegram;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::shared::{PipelineCfg, window_start};

/// Save the recent history of every configured channel as JSON lines, for
/// later `replay`.  Writes `DUMP_OUTPUT_PATH` (default `./dump_recent.jsonl`).
pub(super) async fn run(cancel: CancellationToken) -> Result<()> {
    let tg = telegram::load_tg_cfg()?;
    let pipeline = PipelineCfg::from_env();
    let output_path =
        std::env::var("DUMP_OUTPUT_PATH").unwrap_or_else(|_| "./dump_recent.jsonl".into());
    let since_ts = window_start(pipeline.window_hours);

    let (client, pool) = telegram::connect(&tg)?;

    let runner = pool.runner;
    tokio::spawn(async move {
        runner.run().await;
    });

    telegram::ensure_user_login(&client, &tg).await?;

    info!(
        "Dumping {} channels, last {}h (since ts={since_ts})",
        tg.channels.len(),
        pipeline.window_hours
    );

    let mut messages: Vec<InputMessage> = Vec::new();
    for uname in &tg.channels {
        if cancel.is_cancelled() {
            warn!("Dump interrupted; writing what was collected so far");
            break;
        }
        let batch = telegram::fetch_recent(&client, uname, since_ts, &cancel).await?;
        messages.extend(batch.into_iter().filter(|m| !m.text.trim().is_empty()));
    }

    messages.sort_by_key(|m| (m.timestamp, m.channel_id));
    write_messages(&output_path, &messages)?;

    info!(
        "Dump complete: {} messages written to {}",
        messages.len(),
        output_path
    );
    Ok(())
}

fn write_messages(path: &str, messages: &[InputMessage]) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for dump file {path}")
            })?;
        }
    }

    let file = File::create(path).with_context(|| format!("failed to create dump file {path}"))?;
    let mut writer = BufWriter::new(file);
    for msg in messages {
        serde_json::to_writer(&mut writer, msg)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
