use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Canonical status of an analysis job, regardless of upstream wording.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CanonicalStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl CanonicalStatus {
    /// Normalize an upstream status string into the canonical vocabulary.
    ///
    /// Unrecognized values map to `Failed` so an unknown upstream status is
    /// never treated as still-in-progress and the poll loop always terminates.
    pub fn from_upstream(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "queued" => CanonicalStatus::Queued,
            "started" | "processing" => CanonicalStatus::Processing,
            "finished" | "completed" => CanonicalStatus::Completed,
            "failed" => CanonicalStatus::Failed,
            _ => CanonicalStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CanonicalStatus::Completed | CanonicalStatus::Failed)
    }
}
