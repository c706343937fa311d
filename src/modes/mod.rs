mod dump;
mod history;
mod live;
mod replay;
mod shared;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Live,
    Scan,
    Dump,
    Replay,
}

impl RunMode {
    fn from_env() -> Self {
        let raw = std::env::var("RUN_MODE").unwrap_or_else(|_| "live".into());
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "scan" | "history" => Self::Scan,
            "dump" | "dump_recent" => Self::Dump,
            "replay" => Self::Replay,
            _ => Self::Live,
        }
    }
}

pub async fn run_from_env() -> Result<()> {
    let cancel = shared::shutdown_token();
    match RunMode::from_env() {
        RunMode::Live => live::run(cancel).await,
        RunMode::Scan => history::run(cancel).await,
        RunMode::Dump => dump::run(cancel).await,
        RunMode::Replay => replay::run(cancel).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_names() {
        assert_eq!(RunMode::parse("SCAN"), RunMode::Scan);
        assert_eq!(RunMode::parse(" history "), RunMode::Scan);
        assert_eq!(RunMode::parse("dump"), RunMode::Dump);
        assert_eq!(RunMode::parse("replay"), RunMode::Replay);
        assert_eq!(RunMode::parse("whatever"), RunMode::Live);
    }
}
