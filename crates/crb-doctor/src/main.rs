//! Operational self-check for the relay bot.
//!
//! Validates the environment, the bot token and the mapping store, printing
//! one line per check. Exits non-zero when any check fails.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context};
use teloxide::prelude::*;

use crb_core::{
    config::{Config, UpdateMode},
    domain::{MessageId, UserId},
    store::{MappingStore, MessageMapping},
};

#[derive(Default)]
struct Report {
    failures: usize,
}

impl Report {
    fn pass(&self, name: &str, detail: impl AsRef<str>) {
        println!("[ok]   {name}: {}", detail.as_ref());
    }

    fn fail(&mut self, name: &str, err: impl std::fmt::Display) {
        self.failures += 1;
        println!("[FAIL] {name}: {err}");
    }

    fn record(&mut self, name: &str, outcome: anyhow::Result<String>) {
        match outcome {
            Ok(detail) => self.pass(name, detail),
            Err(e) => self.fail(name, format!("{e:#}")),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut report = Report::default();

    let cfg = match Config::load() {
        Ok(cfg) => {
            report.pass("environment", describe(&cfg));
            Some(cfg)
        }
        Err(e) => {
            report.fail("environment", e);
            None
        }
    };

    if let Some(cfg) = &cfg {
        report.record("telegram token", check_token(&cfg.bot_token).await);
    }

    let scratch = std::env::temp_dir().join(format!("crb-doctor-{}", std::process::id()));
    report.record("store smoke test", store_smoke_test(&scratch).await);
    let _ = std::fs::remove_dir_all(&scratch);

    if let Some(cfg) = &cfg {
        report.record("mapping file", probe_mapping_file(&cfg.mapping_file).await);
    }

    if report.failures > 0 {
        println!("\n{} check(s) failed", report.failures);
        ExitCode::FAILURE
    } else {
        println!("\nall checks passed");
        ExitCode::SUCCESS
    }
}

fn describe(cfg: &Config) -> String {
    let mode = match &cfg.mode {
        UpdateMode::Webhook { url } => format!("webhook {url} on {}", cfg.listen_addr),
        UpdateMode::Polling => "polling".to_string(),
    };
    format!("channel {}, {mode}", cfg.channel)
}

async fn check_token(token: &str) -> anyhow::Result<String> {
    let bot = Bot::new(token);
    let me = bot.get_me().await.context("getMe failed")?;
    Ok(format!("@{} (id {})", me.username(), me.id.0))
}

/// Exercise every store operation against a scratch file under `dir`.
async fn store_smoke_test(dir: &Path) -> anyhow::Result<String> {
    let store = MappingStore::new(dir.join("mapping.csv"));
    store.initialize().await.context("initialize")?;

    let user = UserId(12345);
    let record = MessageMapping::new(user, MessageId(1), MessageId(100), Some("Test User".into()));
    if !store.append(record.clone()).await {
        bail!("append failed");
    }

    match store.find_user_by_channel_message(MessageId(100)).await {
        Some(found) if found == user => {}
        other => bail!("user lookup returned {other:?}"),
    }
    match store.find_user_message_id(user, MessageId(100)).await {
        Some(MessageId(1)) => {}
        other => bail!("message lookup returned {other:?}"),
    }
    if store.find_user_by_channel_message(MessageId(999)).await.is_some() {
        bail!("lookup of an unknown channel message found a user");
    }

    let count = store.count().await;
    if count != 1 {
        bail!("expected 1 record, counted {count}");
    }
    if store.list_all().await != vec![record] {
        bail!("list_all did not return the saved record");
    }
    store.close().await;

    Ok(format!("{} bytes written", store.file_size().await))
}

async fn probe_mapping_file(path: &Path) -> anyhow::Result<String> {
    let existed = path.exists();
    let readonly = match std::fs::metadata(path) {
        Ok(meta) => meta.permissions().readonly(),
        Err(_) => false,
    };
    if readonly {
        bail!("{} is read-only", path.display());
    }

    let store = MappingStore::new(PathBuf::from(path));
    store
        .initialize()
        .await
        .with_context(|| format!("cannot initialize {}", path.display()))?;
    let records = store.count().await;

    store
        .initialize()
        .await
        .with_context(|| format!("second initialize of {} failed", path.display()))?;
    let after = store.count().await;
    if after != records {
        bail!("initialize is not idempotent: {records} records before, {after} after");
    }

    Ok(format!(
        "{} ({}, {} bytes, {records} records)",
        path.display(),
        if existed { "existing" } else { "created" },
        store.file_size().await,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn smoke_test_passes_on_a_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let detail = store_smoke_test(dir.path()).await.unwrap();
        assert!(detail.ends_with("bytes written"));
    }

    #[tokio::test]
    async fn probe_creates_missing_file_and_counts_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.csv");

        let detail = probe_mapping_file(&path).await.unwrap();
        assert!(detail.contains("created"));
        assert!(detail.contains("0 records"));

        let store = MappingStore::new(&path);
        assert!(
            store
                .append(MessageMapping::new(UserId(1), MessageId(2), MessageId(3), None))
                .await
        );
        let detail = probe_mapping_file(&path).await.unwrap();
        assert!(detail.contains("existing"));
        assert!(detail.contains("1 records"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("user_id,user_message_id").count(), 1);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn probe_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

        assert!(probe_mapping_file(&path).await.is_err());
    }
}
