use serde::{Deserialize, Serialize};

/// A single feed entry as served by the remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "userId")]
    pub author_id: i64,
    pub id: i64,
    pub title: String,
    pub body: String,
}

impl Post {
    /// Case-insensitive substring match against title or body.
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.body.to_lowercase().contains(needle)
    }
}
