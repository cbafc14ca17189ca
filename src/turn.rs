use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// One stored exchange unit: a user question or a bot answer.
///
/// Optional fields are skipped on write, so turns without SQL context stay
/// compact in the persisted document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_text_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_text_expanded: Option<String>,
    /// Either an array of row objects or a string holding one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_preview: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Turn::plain(Role::User, content.into(), timestamp.into())
    }

    pub fn bot(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Turn::plain(Role::Bot, content.into(), timestamp.into())
    }

    fn plain(role: Role, content: String, timestamp: String) -> Self {
        Turn {
            role,
            content,
            timestamp,
            sql_text_raw: None,
            sql_text_expanded: None,
            rows_preview: None,
            columns: None,
            rows_count: None,
            mode: None,
        }
    }

    /// True when either SQL variant carries text.
    pub fn has_sql(&self) -> bool {
        non_empty(&self.sql_text_raw).is_some() || non_empty(&self.sql_text_expanded).is_some()
    }
}

/// Ordered conversation, owned by the session and persisted as one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        History::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        History { turns }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn tail(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Display timestamp in local time.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%d.%m.%Y, %H:%M:%S").to_string()
}
