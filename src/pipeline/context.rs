//! The `context.json` record carried between rounds of one task.

use serde::{Deserialize, Serialize};

use crate::models::{Attachment, TaskRequest};

/// Prefix of the brief sent to the generator on update rounds.
pub const CUMULATIVE_BRIEF_HEADER: &str = "This is a cumulative brief...";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Every distinct brief, oldest first.
    #[serde(default)]
    pub brief_history: Vec<String>,
    /// Checks from round 1; never changed afterwards.
    #[serde(default)]
    pub checks_history: Vec<String>,
    /// Attachments from all rounds, unique by `(name, url)`.
    #[serde(default)]
    pub attachment_history: Vec<Attachment>,
}

impl ContextRecord {
    /// Round 1 record.
    pub fn seeded(request: &TaskRequest) -> Self {
        let mut record = Self {
            brief_history: vec![request.brief.clone()],
            checks_history: request.checks.clone(),
            attachment_history: Vec::new(),
        };
        record.merge_attachments(&request.attachments);
        record
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Append attachments not already present. Order is preserved.
    pub fn merge_attachments(&mut self, incoming: &[Attachment]) {
        for attachment in incoming {
            if !self.attachment_history.contains(attachment) {
                self.attachment_history.push(attachment.clone());
            }
        }
    }

    /// Append `brief` unless an identical one is already recorded.
    pub fn append_brief(&mut self, brief: &str) {
        if !self.brief_history.iter().any(|b| b == brief) {
            self.brief_history.push(brief.to_string());
        }
    }

    /// All briefs so far, under the cumulative header.
    pub fn cumulative_brief(&self) -> String {
        format!("{}\n{}", CUMULATIVE_BRIEF_HEADER, self.brief_history.join("\n"))
    }
}
