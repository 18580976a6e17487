//! Reads/writes the submission payload stored in an agent overlay's KV
//! namespace under the fixed key `"submission"` (spec §3, §4.6). Accepts
//! both the canonical tagged form and the legacy untagged form for
//! backward compatibility, matching the original `kv_store.py` reader.

use cairn_core::{AgentId, Submission, SubmissionRecord};

pub const SUBMISSION_KEY: &str = "submission";

/// Parse a raw JSON submission value, accepting:
/// - the tagged form `{"agent_id": ..., "submission": {"summary", "changed_files"}}`
/// - the legacy untagged form `{"summary": ..., "changed_files": [...]}`
pub fn parse_submission(raw: &str) -> Option<Submission> {
    if let Ok(tagged) = serde_json::from_str::<SubmissionRecord>(raw) {
        return Some(tagged.submission);
    }
    serde_json::from_str::<Submission>(raw).ok()
}

pub fn serialize_submission_tagged(agent_id: &AgentId, submission: &Submission) -> String {
    let record = SubmissionRecord {
        agent_id: agent_id.clone(),
        submission: submission.clone(),
    };
    serde_json::to_string(&record).unwrap_or_default()
}
