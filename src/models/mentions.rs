// src/models/mentions.rs

//! Optional per-line user mentions.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
struct LineUsers {
    #[serde(default)]
    users: Vec<String>,
}

/// Accepted file shapes: `{"lines": {id: {users}}}` or `{id: {users}}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum MentionsFile {
    Nested { lines: HashMap<String, LineUsers> },
    Flat(HashMap<String, LineUsers>),
}

/// Users to mention when a line is newly disrupted or its disruption changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionRegistry {
    lines: HashMap<String, LineUsers>,
}

impl MentionRegistry {
    pub fn from_json(content: &str) -> Result<Self> {
        let lines = match serde_json::from_str(content)? {
            MentionsFile::Nested { lines } => lines,
            MentionsFile::Flat(lines) => lines,
        };
        Ok(Self { lines })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Load mentions; a missing or unreadable file disables mentions.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Mentions unavailable from {:?}: {}. Continuing without mentions.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Non-blank user ids registered for a line.
    pub fn users_for(&self, line_id: &str) -> Vec<String> {
        self.lines
            .get(line_id)
            .map(|l| {
                l.users
                    .iter()
                    .map(|u| u.trim())
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
