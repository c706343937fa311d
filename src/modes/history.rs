use crate::scan::Scanner;
use crate::telegram;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::shared::{PipelineCfg, build_extractor, log_summary, open_sink, window_start};

/// One pass over the recent history of every configured channel, newest
/// message first.
pub(super) async fn run(cancel: CancellationToken) -> Result<()> {
    let tg = telegram::load_tg_cfg()?;
    let pipeline = PipelineCfg::from_env();
    let extractor = build_extractor(&pipeline)?;
    let mut sink = open_sink(&pipeline)?;
    let since_ts = window_start(pipeline.window_hours);

    let (client, pool) = telegram::connect(&tg)?;

    let runner = pool.runner;
    tokio::spawn(async move {
        runner.run().await;
    });

    telegram::ensure_user_login(&client, &tg).await?;

    info!(
        "Scanning {} channels, last {}h (since ts={since_ts})",
        tg.channels.len(),
        pipeline.window_hours
    );

    let mut scanner = Scanner::new(&extractor, &mut sink);
    'channels: for uname in &tg.channels {
        if cancel.is_cancelled() {
            break;
        }
        let messages = telegram::fetch_recent(&client, uname, since_ts, &cancel).await?;
        info!("@{uname}: {} messages in window", messages.len());

        for msg in &messages {
            if !scanner.feed(msg, &cancel).await? {
                break 'channels;
            }
        }
    }

    let summary = scanner.finish()?;
    log_summary("Scan", &summary, cancel.is_cancelled());
    Ok(())
}
