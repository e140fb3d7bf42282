//! Line-anchored script comments and their broadcast messages.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::remap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentType {
    #[default]
    #[serde(alias = "general", alias = "GENERAL")]
    General,
    #[serde(alias = "cue", alias = "CUE")]
    Cue,
    #[serde(alias = "audio", alias = "AUDIO")]
    Audio,
    #[serde(alias = "gfx", alias = "GFX")]
    Gfx,
    #[serde(alias = "video", alias = "VIDEO")]
    Video,
    #[serde(alias = "lighting", alias = "LIGHTING")]
    Lighting,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub line_number: usize,
    pub text: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(rename = "type", default)]
    pub kind: CommentType,
}

impl Comment {
    /// New comment with a fresh id, stamped now.
    #[must_use]
    pub fn new(line_number: usize, text: impl Into<String>, author: impl Into<String>, kind: CommentType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            line_number,
            text: text.into(),
            author: author.into(),
            timestamp: Some(OffsetDateTime::now_utc()),
            kind,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentAction {
    Add,
    Edit,
    Delete,
}

/// `comment:update` / `comment:sync` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentMessage {
    pub action: CommentAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
}

impl CommentMessage {
    #[must_use]
    pub fn add(comment: Comment) -> Self {
        Self { action: CommentAction::Add, comment: Some(comment), comment_id: None }
    }

    #[must_use]
    pub fn edit(comment: Comment) -> Self {
        Self { action: CommentAction::Edit, comment: Some(comment), comment_id: None }
    }

    #[must_use]
    pub fn delete(comment_id: impl Into<String>) -> Self {
        Self { action: CommentAction::Delete, comment: None, comment_id: Some(comment_id.into()) }
    }
}

/// The script being followed plus the comments anchored to it.
#[derive(Clone, Debug, Default)]
pub struct CommentBoard {
    script: String,
    comments: Vec<Comment>,
}

impl CommentBoard {
    #[must_use]
    pub fn new(script: impl Into<String>, comments: Vec<Comment>) -> Self {
        Self { script: script.into(), comments }
    }

    #[must_use]
    pub fn script(&self) -> &str {
        &self.script
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.script.lines().count()
    }

    /// Comments ordered by line, stable within a line.
    #[must_use]
    pub fn comments(&self) -> Vec<&Comment> {
        let mut sorted: Vec<&Comment> = self.comments.iter().collect();
        sorted.sort_by_key(|c| c.line_number);
        sorted
    }

    #[must_use]
    pub fn comments_for_line(&self, line: usize) -> Vec<&Comment> {
        self.comments.iter().filter(|c| c.line_number == line).collect()
    }

    /// Comments within `buffer` lines of the visible range.
    #[must_use]
    pub fn comments_near(&self, start: usize, end: usize, buffer: usize) -> Vec<&Comment> {
        let lo = start.saturating_sub(buffer);
        let hi = end.saturating_add(buffer);
        self.comments()
            .into_iter()
            .filter(|c| (lo..=hi).contains(&c.line_number))
            .collect()
    }

    /// Apply a `comment:sync` broadcast. Returns whether anything changed.
    pub fn apply(&mut self, message: &CommentMessage) -> bool {
        match (message.action, &message.comment, &message.comment_id) {
            (CommentAction::Add, Some(comment), _) => {
                if self.comments.iter().any(|c| c.id == comment.id) {
                    tracing::debug!(id = %comment.id, "comments: duplicate add skipped");
                    return false;
                }
                self.comments.push(comment.clone());
                true
            }
            (CommentAction::Edit, Some(comment), _) => match self.comments.iter_mut().find(|c| c.id == comment.id) {
                Some(existing) => {
                    *existing = comment.clone();
                    true
                }
                None => false,
            },
            (CommentAction::Delete, _, Some(id)) => {
                let before = self.comments.len();
                self.comments.retain(|c| &c.id != id);
                self.comments.len() != before
            }
            _ => {
                tracing::warn!(action = ?message.action, "comments: message missing its payload");
                false
            }
        }
    }

    /// Swap in an edited script and move every comment with it.
    pub fn replace_script(&mut self, new_script: impl Into<String>) {
        let new_script = new_script.into();
        self.comments = remap::remap(&self.script, &new_script, &self.comments);
        self.script = new_script;
    }

    /// What the comments would look like under `new_script`, without applying it.
    #[must_use]
    pub fn preview(&self, new_script: &str) -> Vec<Comment> {
        remap::remap(&self.script, new_script, &self.comments)
    }
}

#[cfg(test)]
#[path = "comments_test.rs"]
mod tests;
