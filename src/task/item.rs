use serde::{Deserialize, Serialize};

/// One unit of input work: a prompt plus the record it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Zero-based position in the input.
    pub id: usize,
    pub prompt: String,
    /// The original input record, `Null` for generated prompts.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl WorkItem {
    pub fn new(id: usize, prompt: impl Into<String>) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Short single-line form of the prompt for log lines.
    pub fn prompt_preview(&self) -> String {
        const MAX_CHARS: usize = 80;
        let flat: String = self
            .prompt
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        if flat.chars().count() > MAX_CHARS {
            let cut: String = flat.chars().take(MAX_CHARS).collect();
            format!("{cut}…")
        } else {
            flat
        }
    }
}

/// Terminal result of processing one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success { text: String },
    Failure { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success { text } => write!(f, "success ({} chars)", text.chars().count()),
            Outcome::Failure { reason } => write!(f, "failure: {reason}"),
        }
    }
}

/// What a retrying task hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub item: WorkItem,
    pub outcome: Outcome,
    pub attempts: u32,
}
