//! Record of the artifacts a job uploaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One uploaded file or part and the id the remote gave it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedEntry {
    pub name: String,
    pub id: String,
}

/// Uploaded artifacts in upload order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResult {
    pub entries: Vec<UploadedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, id: impl Into<String>) {
        self.entries.push(UploadedEntry {
            name: name.into(),
            id: id.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// `name - id`, one line per artifact
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("{} - {}", e.name, e.id))
            .collect()
    }
}
