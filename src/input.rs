//! Materializes work items before dispatch starts.
//!
//! Accepts either a JSON array of records or newline-delimited JSON, told
//! apart by the first non-whitespace byte. A record is an object carrying the
//! prompt under a configurable field, or a bare string.

use std::path::Path;

use serde_json::Value;

use crate::error::BatchError;
use crate::task::WorkItem;

pub const DEFAULT_PROMPT_FIELD: &str = "question";

pub fn load_items(
    path: &Path,
    prompt_field: &str,
    limit: Option<usize>,
) -> Result<Vec<WorkItem>, BatchError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| BatchError::Input(format!("cannot read {}: {e}", path.display())))?;
    parse_items(&contents, prompt_field, limit)
}

pub fn parse_items(
    contents: &str,
    prompt_field: &str,
    limit: Option<usize>,
) -> Result<Vec<WorkItem>, BatchError> {
    let records = if contents.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<Value>>(contents)
            .map_err(|e| BatchError::Input(format!("invalid JSON array: {e}")))?
    } else {
        parse_jsonl(contents)?
    };

    records
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(id, record)| {
            let prompt = extract_prompt(&record, prompt_field)
                .ok_or_else(|| {
                    BatchError::Input(format!(
                        "record {id} has no string field `{prompt_field}`"
                    ))
                })?
                .to_string();
            Ok(WorkItem::new(id, prompt).with_metadata(record))
        })
        .collect()
}

fn parse_jsonl(contents: &str) -> Result<Vec<Value>, BatchError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| BatchError::Input(format!("line {}: {e}", n + 1)))
        })
        .collect()
}

fn extract_prompt<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    match record {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get(field).and_then(Value::as_str),
        _ => None,
    }
}

/// `count` copies of the same prompt, for open-ended generation runs.
pub fn repeat_prompt(prompt: &str, count: usize) -> Vec<WorkItem> {
    (0..count).map(|id| WorkItem::new(id, prompt)).collect()
}
