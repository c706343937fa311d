use crate::scan::{InputMessage, Scanner};
use crate::telegram;
use anyhow::Result;
use grammers_client::Update;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::shared::{PipelineCfg, build_extractor, log_summary, open_sink};

pub(super) async fn run(cancel: CancellationToken) -> Result<()> {
    let tg = telegram::load_tg_cfg()?;
    let pipeline = PipelineCfg::from_env();
    let extractor = build_extractor(&pipeline)?;
    let mut sink = open_sink(&pipeline)?;

    let (client, pool) = telegram::connect(&tg)?;

    let runner = pool.runner;
    tokio::spawn(async move {
        runner.run().await;
    });

    let updates_rx = pool.updates;

    telegram::ensure_user_login(&client, &tg).await?;
    let allowed_peer_ids = telegram::resolve_channel_ids(&client, &tg).await?;

    let mut stream = client.stream_updates(
        updates_rx,
        grammers_client::UpdatesConfiguration {
            catch_up: false,
            update_queue_limit: Some(2048),
        },
    );

    let mut scanner = Scanner::new(&extractor, &mut sink);
    info!("Running in live mode. Waiting for new messages...");

    loop {
        let update = tokio::select! {
            _ = cancel.cancelled() => break,
            update = stream.next() => update,
        };
        let Ok(update) = update else {
            warn!("Update stream ended.");
            break;
        };

        let Update::NewMessage(msg) = update else {
            continue;
        };
        let Ok(peer) = msg.peer() else {
            continue;
        };
        let channel_id = peer.id().bare_id();
        if !allowed_peer_ids.contains(&channel_id) {
            continue;
        }

        let input = InputMessage {
            timestamp: msg.date().timestamp(),
            channel_id,
            channel_title: peer.name().unwrap_or("<unknown>").to_string(),
            text: msg.text().to_string(),
        };
        if !scanner.feed(&input, &cancel).await? {
            break;
        }
        scanner.flush()?;
    }

    let summary = scanner.finish()?;
    log_summary("Live mode", &summary, cancel.is_cancelled());
    Ok(())
}
