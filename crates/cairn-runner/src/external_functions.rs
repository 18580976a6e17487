//! The sandbox-facing external function set (spec §6) — the full
//! contract generated code is allowed to call. Wraps an agent's overlay
//! and an optional LLM client; every path argument is validated before
//! it reaches the overlay.

use std::sync::Arc;

use cairn_core::{AgentId, Error, Result, Submission};
use cairn_store::search::{self, ContentMatch};
use cairn_store::submission::serialize_submission_tagged;
use cairn_store::FileOverlay;

use crate::llm_client::LlmClient;
use crate::paths::validate_relative_path;

fn validate_dir_path(path: &str) -> Result<()> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return Ok(());
    }
    validate_relative_path(path)
}

pub struct ExternalFunctions {
    agent_id: AgentId,
    overlay: Arc<FileOverlay>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl ExternalFunctions {
    pub fn new(agent_id: AgentId, overlay: Arc<FileOverlay>, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { agent_id, overlay, llm }
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        validate_relative_path(path)?;
        let bytes = self.overlay.read_file(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<bool> {
        validate_relative_path(path)?;
        self.overlay.write_file(path, content.as_bytes().to_vec()).await?;
        Ok(true)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        validate_dir_path(path)?;
        let mut names: Vec<String> = self.overlay.readdir(path)?.into_iter().map(|e| e.name).collect();
        names.sort();
        Ok(names)
    }

    pub fn file_exists(&self, path: &str) -> Result<bool> {
        validate_relative_path(path)?;
        Ok(self.overlay.exists(path))
    }

    pub fn search_files(&self, pattern: &str) -> Result<Vec<String>> {
        search::search_files(&self.overlay, pattern)
    }

    pub fn search_content(&self, pattern: &str, path: &str) -> Result<Vec<ContentMatch>> {
        let root = if path.is_empty() { "." } else { path };
        validate_dir_path(root)?;
        search::search_content(&self.overlay, pattern, root)
    }

    pub async fn ask_llm(&self, prompt: &str, context: &str) -> Result<String> {
        let combined = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{context}\n\n{prompt}")
        };
        match &self.llm {
            Some(client) => client
                .complete(&combined)
                .await
                .map_err(|e| Error::LlmUnavailable(e.to_string())),
            None => Err(Error::LlmUnavailable("no LLM client configured".into())),
        }
    }

    pub async fn submit_result(&self, summary: &str, changed_files: Vec<String>) -> Result<bool> {
        let submission = Submission {
            summary: summary.to_string(),
            changed_files,
        };
        let raw = serialize_submission_tagged(&self.agent_id, &submission);
        self.overlay
            .kv_set(cairn_store::submission::SUBMISSION_KEY, raw)
            .await?;
        Ok(true)
    }

    pub fn log(&self, message: &str) {
        tracing::info!(agent_id = %self.agent_id, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_store::object_store::LocalObjectStore;
    use cairn_store::ObjectStore;

    fn functions() -> ExternalFunctions {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));
        std::mem::forget(dir);
        let overlay = Arc::new(FileOverlay::new("agent-1", store, None));
        ExternalFunctions::new("agent-1".to_string(), overlay, None)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let f = functions();
        f.write_file("a.txt", "hello").await.unwrap();
        assert_eq!(f.read_file("a.txt").unwrap(), "hello");
    }

    #[tokio::test]
    async fn rejects_absolute_and_traversal_paths() {
        let f = functions();
        assert!(f.read_file("/etc/passwd").is_err());
        assert!(f.write_file("../escape", "x").await.is_err());
    }

    #[tokio::test]
    async fn submit_result_is_readable_back_through_overlay_kv() {
        let f = functions();
        f.submit_result("did the thing", vec!["a.txt".to_string()])
            .await
            .unwrap();
        let raw = f.overlay.kv_get(cairn_store::submission::SUBMISSION_KEY).unwrap();
        let parsed = cairn_store::submission::parse_submission(&raw).unwrap();
        assert_eq!(parsed.summary, "did the thing");
    }

    #[tokio::test]
    async fn ask_llm_without_client_is_unavailable() {
        let f = functions();
        assert!(matches!(
            f.ask_llm("hi", "").await,
            Err(Error::LlmUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn list_dir_accepts_root_forms() {
        let f = functions();
        f.write_file("a.txt", "1").await.unwrap();
        for root in ["/", "", "."] {
            assert_eq!(f.list_dir(root).unwrap(), vec!["a.txt".to_string()]);
        }
    }
}
