//! TOML seed files describing the projects a store starts with.
//!
//! Columns and cards are listed in display order; their position in the
//! file becomes their stored `order`.
//!
//! ```toml
//! [[projects]]
//! id = "website"
//! name = "Website Redesign"
//! client_name = "Acme Corp"
//!
//! [[projects.columns]]
//! id = "todo"
//! name = "To Do"
//!
//! [[projects.columns.cards]]
//! id = "T1"
//! title = "Homepage design"
//! priority = "high"
//! due_date = "2024-09-10"
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

/// Errors that can occur when loading a seed file.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// Failed to read the seed file.
    #[error("failed to read seed file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML seed.
    #[error("failed to parse seed file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The same id is used twice for projects, columns, cards, or access links.
    #[error("duplicate {kind} id in seed: {id}")]
    DuplicateId {
        /// Which table the id belongs to.
        kind: &'static str,
        /// The repeated id.
        id: String,
    },
}

/// Top-level seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    /// Projects to create.
    pub projects: Vec<ProjectSeed>,
}

/// One project and its board.
#[derive(Debug, Deserialize)]
pub struct ProjectSeed {
    /// Project id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Client the project is for.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Shareable link token; generated when absent.
    #[serde(default)]
    pub access_link: Option<String>,
    /// Project status.
    #[serde(default = "default_status")]
    pub status: String,
    /// Columns in display order.
    #[serde(default)]
    pub columns: Vec<ColumnSeed>,
}

/// One column and its cards.
#[derive(Debug, Deserialize)]
pub struct ColumnSeed {
    /// Column id.
    pub id: String,
    /// Column heading.
    pub name: String,
    /// Cards in display order.
    #[serde(default)]
    pub cards: Vec<CardSeed>,
}

/// One card.
#[derive(Debug, Deserialize)]
pub struct CardSeed {
    /// Card id.
    pub id: String,
    /// Card title.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Due date (`YYYY-MM-DD`).
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Priority as stored; parsed leniently when served.
    #[serde(default)]
    pub priority: Option<String>,
}

fn default_status() -> String {
    "active".to_string()
}

impl Seed {
    /// Parse a seed from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::ParseToml`] if the text is not a valid seed.
    pub fn parse(text: &str) -> Result<Self, SeedError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a seed file.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::ReadFile`] or [`SeedError::ParseToml`].
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let text = std::fs::read_to_string(path).map_err(|e| SeedError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text)
    }
}
