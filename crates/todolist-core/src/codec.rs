use tracing::debug;

use crate::task::Task;

pub const STORAGE_KEY: &str = "todos";
pub const EMPTY_LIST: &str = "[]";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("stored task list is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("stored task list has an unexpected shape: {0}")]
    Shape(#[source] serde_json::Error),
    #[error("stored task id {0} leaves no room for another id")]
    IdOverflow(u64),
    #[error("stored id counter is not an integer: {0:?}")]
    Counter(String),
}

/// Key holding the id counter next to a task list stored under `key`.
pub fn counter_key(key: &str) -> String {
    format!("{key}.next_id")
}

pub fn encode_tasks(tasks: &[Task]) -> anyhow::Result<String> {
    Ok(serde_json::to_string(tasks)?)
}

#[tracing::instrument(skip(raw), fields(bytes = raw.len()))]
pub fn decode_tasks(raw: &str) -> Result<Vec<Task>, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(DecodeError::Syntax)?;
    let tasks: Vec<Task> = serde_json::from_value(value).map_err(DecodeError::Shape)?;
    debug!(count = tasks.len(), "decoded task list");
    Ok(tasks)
}

pub fn decode_counter(raw: &str) -> Result<u64, DecodeError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| DecodeError::Counter(raw.to_string()))
}
