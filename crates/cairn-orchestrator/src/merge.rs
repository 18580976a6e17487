//! Recursive copy of an overlay's files into stable on accept (spec
//! §4.9). The store provides its own local-only enumeration primitive —
//! `FileOverlay::list_local_paths` — so the merge walks that rather than
//! the agent script's self-reported `submission.changed_files`, which an
//! under-reporting script could use to hide real writes from review. A
//! per-file failure is logged and does not abort the overall merge; the
//! merge is not atomic across files.

use cairn_core::Submission;
use cairn_store::FileOverlay;

#[derive(Debug, Default)]
pub struct MergeReport {
    pub merged: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Merge every file `source` actually wrote into `stable`. `submission`
/// is accepted for signature symmetry with the lifecycle record but is
/// no longer consulted: the overlay's own local entries are the
/// authoritative record of what changed. Directory entries are created
/// implicitly by `write_file`.
pub async fn merge_into_stable(source: &FileOverlay, stable: &FileOverlay, _submission: &Submission) -> MergeReport {
    let mut report = MergeReport::default();

    for path in source.list_local_paths() {
        match source.read_file(&path) {
            Ok(bytes) => match stable.write_file(&path, bytes).await {
                Ok(_) => report.merged.push(path),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "merge: failed to write into stable");
                    report.failed.push((path, e.to_string()));
                }
            },
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "merge: failed to read from source overlay");
                report.failed.push((path, e.to_string()));
            }
        }
    }

    report
}
