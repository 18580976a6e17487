//! File-based command ingestion (spec §4.5): polls a directory every
//! 500 ms for `*.json` signal files, normalizes each into a [`Command`]
//! via [`parse_command`], and submits it to the orchestrator. Malformed
//! payloads are logged and skipped rather than crashing the poller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::time::{interval, Duration};

use crate::command::{parse_command, Command};
use crate::orchestrator::Orchestrator;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct SignalAdapter {
    directory: PathBuf,
    enabled: bool,
}

impl SignalAdapter {
    pub fn new(directory: PathBuf, enabled: bool) -> Self {
        Self { directory, enabled }
    }

    /// Spawn the polling loop. A no-op future if polling is disabled —
    /// the parse/dispatch entry points (`process_file`) remain usable
    /// for tests and embedded callers either way.
    pub fn spawn(self: Arc<Self>, orchestrator: Arc<Orchestrator>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if !self.enabled {
                return;
            }
            let mut ticker = interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = self.poll_once(&orchestrator).await {
                    tracing::warn!(error = %e, "signal poll tick failed");
                }
            }
        })
    }

    pub async fn poll_once(&self, orchestrator: &Orchestrator) -> std::io::Result<()> {
        if !self.directory.exists() {
            return Ok(());
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.directory)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        entries.sort();

        for path in entries {
            self.process_file(&path, orchestrator).await;
        }
        Ok(())
    }

    /// Parse and dispatch a single signal file, then unconditionally
    /// unlink it so it is never reprocessed.
    pub async fn process_file(&self, path: &Path, orchestrator: &Orchestrator) {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        let payload = read_payload(path);

        if let Some(command) = self.build_command(&stem, payload) {
            match command {
                Ok(cmd) => {
                    if let Err(e) = orchestrator.submit_command(cmd).await {
                        tracing::warn!(file = %path.display(), error = %e, "signal command failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "invalid signal command, skipping");
                }
            }
        }

        let _ = std::fs::remove_file(path);
    }

    fn build_command(&self, stem: &str, payload: serde_json::Value) -> Option<cairn_core::Result<Command>> {
        let tag = payload
            .get("type")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| tag_from_filename(stem));

        let tag = tag?;
        let mut payload = payload;
        if (tag == "accept" || tag == "reject") && payload.get("agent_id").is_none() {
            if let Some(id) = agent_id_from_filename(stem, &tag) {
                if let serde_json::Value::Object(ref mut map) = payload {
                    map.insert("agent_id".to_string(), serde_json::Value::String(id));
                }
            }
        }
        Some(parse_command(&tag, &payload))
    }
}

fn read_payload(path: &Path) -> serde_json::Value {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

fn tag_from_filename(stem: &str) -> Option<String> {
    for (prefix, tag) in [("spawn-", "spawn"), ("queue-", "queue"), ("accept-", "accept"), ("reject-", "reject")] {
        if stem.starts_with(prefix) {
            return Some(tag.to_string());
        }
    }
    None
}

fn agent_id_from_filename(stem: &str, tag: &str) -> Option<String> {
    let prefix = format!("{tag}-");
    stem.strip_prefix(&prefix).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_from_filename_maps_known_prefixes() {
        assert_eq!(tag_from_filename("spawn-abc"), Some("spawn".into()));
        assert_eq!(tag_from_filename("queue-abc"), Some("queue".into()));
        assert_eq!(tag_from_filename("accept-abc"), Some("accept".into()));
        assert_eq!(tag_from_filename("reject-abc"), Some("reject".into()));
        assert_eq!(tag_from_filename("teleport-abc"), None);
    }

    #[test]
    fn agent_id_from_filename_strips_prefix() {
        assert_eq!(agent_id_from_filename("accept-agent-123", "accept"), Some("agent-123".into()));
    }

    #[test]
    fn build_command_prefers_explicit_type_field() {
        let adapter = SignalAdapter::new(PathBuf::new(), false);
        let payload = serde_json::json!({"type": "queue", "task": "x"});
        let cmd = adapter.build_command("whatever", payload).unwrap().unwrap();
        assert_eq!(cmd, Command::Queue { task: "x".into(), priority: cairn_core::TaskPriority::Normal });
    }

    #[test]
    fn build_command_injects_agent_id_from_filename() {
        let adapter = SignalAdapter::new(PathBuf::new(), false);
        let payload = serde_json::json!({});
        let cmd = adapter.build_command("accept-agent-9", payload).unwrap().unwrap();
        assert_eq!(cmd, Command::Accept { agent_id: "agent-9".into() });
    }

    #[test]
    fn build_command_with_no_resolvable_tag_is_none() {
        let adapter = SignalAdapter::new(PathBuf::new(), false);
        let payload = serde_json::json!({});
        assert!(adapter.build_command("unrelated-file", payload).is_none());
    }
}
