use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: u64,

    /// Title text. Serialized as `task` to stay compatible with existing stored lists.
    #[serde(rename = "task")]
    pub title: String,

    #[serde(default)]
    pub done: bool,
}

impl Task {
    pub fn new_pending(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            done: false,
        }
    }
}
