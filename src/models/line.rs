// src/models/line.rs

//! Tracked lines and their presentation metadata.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A tracked line or service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineDescriptor {
    /// Stable slug (e.g., "central", "hammersmith-city")
    pub id: String,

    /// Display name
    pub name: String,

    /// Chat emoji shortcode shown next to the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,

    /// Hex color used for the line's message section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl LineDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: None,
            color: None,
        }
    }

    fn styled(id: &str, name: &str, emoji: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            emoji: Some(emoji.to_string()),
            color: Some(color.to_string()),
        }
    }
}

/// Immutable, ordered set of tracked lines. Registry order is the canonical
/// order of every disruption set produced in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRegistry {
    lines: Vec<LineDescriptor>,
}

impl LineRegistry {
    pub fn new(lines: Vec<LineDescriptor>) -> Self {
        Self { lines }
    }

    /// Load a registry from a JSON array of `{id, name, emoji?, color?}`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let lines: Vec<LineDescriptor> = serde_json::from_str(&content)?;
        Ok(Self::new(lines))
    }

    /// Load a registry or fall back to the built-in network if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Line registry load failed from {:?}: {}. Using built-in lines.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Reject blank or duplicate line ids.
    pub fn validate(&self) -> Result<()> {
        if self.lines.is_empty() {
            return Err(AppError::validation("Line registry is empty"));
        }
        let mut seen = HashSet::new();
        for line in &self.lines {
            if line.id.trim().is_empty() {
                return Err(AppError::validation("Line registry contains a blank id"));
            }
            if !seen.insert(line.id.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate line id in registry: {}",
                    line.id
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&LineDescriptor> {
        self.lines.iter().find(|l| l.id == id)
    }

    /// Registry index of a line, used to order disruption sets.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.lines.iter().position(|l| l.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineDescriptor> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for LineRegistry {
    /// London Underground, DLR, Elizabeth line and Overground lines.
    fn default() -> Self {
        const OVERGROUND: &str = "#EE7D11";
        Self::new(vec![
            LineDescriptor::styled("bakerloo", "Bakerloo", ":bakerloo:", "#B26300"),
            LineDescriptor::styled("central", "Central", ":central:", "#DC241F"),
            LineDescriptor::styled("circle", "Circle", ":circle:", "#FFD329"),
            LineDescriptor::styled("district", "District", ":district:", "#007229"),
            LineDescriptor::styled(
                "hammersmith-city",
                "Hammersmith & City",
                ":hammersmith-city:",
                "#F4A9BE",
            ),
            LineDescriptor::styled("jubilee", "Jubilee", ":jubilee:", "#A1A5A7"),
            LineDescriptor::styled("metropolitan", "Metropolitan", ":metropolitan:", "#9B0058"),
            LineDescriptor::styled("northern", "Northern", ":northern:", "#000000"),
            LineDescriptor::styled("piccadilly", "Piccadilly", ":piccadilly:", "#0019A8"),
            LineDescriptor::styled("victoria", "Victoria", ":victoria:", "#00A0E2"),
            LineDescriptor::styled(
                "waterloo-city",
                "Waterloo & City",
                ":waterloo-city:",
                "#93CEBA",
            ),
            LineDescriptor::styled("dlr", "DLR", ":dlr:", "#00A4A7"),
            LineDescriptor::styled("elizabeth", "Elizabeth line", ":elizabeth:", "#7156A5"),
            LineDescriptor::styled("liberty", "Liberty", ":overground:", OVERGROUND),
            LineDescriptor::styled("lioness", "Lioness", ":overground:", OVERGROUND),
            LineDescriptor::styled("mildmay", "Mildmay", ":overground:", OVERGROUND),
            LineDescriptor::styled("suffragette", "Suffragette", ":overground:", OVERGROUND),
            LineDescriptor::styled("weaver", "Weaver", ":overground:", OVERGROUND),
            LineDescriptor::styled("windrush", "Windrush", ":overground:", OVERGROUND),
        ])
    }
}
