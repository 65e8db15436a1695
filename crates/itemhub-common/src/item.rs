use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage-assigned identifier of an item.
pub type ItemId = i64;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"));

/// Lifecycle status of an item.
///
/// Only `NEW` and `PROCESSED` carry meaning for the service. Any other value a
/// client stores is kept verbatim in `Other` so it survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemStatus {
    #[default]
    New,
    Processed,
    Other(String),
}

impl ItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "NEW",
            Self::Processed => "PROCESSED",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl From<String> for ItemStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NEW" => Self::New,
            "PROCESSED" => Self::Processed,
            _ => Self::Other(s),
        }
    }
}

impl From<ItemStatus> for String {
    fn from(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// Validation failures accumulated over every field of an item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation errors: {}", .0.join(" "))]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub email: String,
}

impl Item {
    /// Build an unsaved item with status `NEW`.
    pub fn new(name: &str, description: &str, email: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            description: description.to_string(),
            status: ItemStatus::New,
            email: email.to_string(),
        }
    }

    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Check the request-level rules: a non-blank name and a plausible email.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Name must not be blank.".to_string());
        }
        if !EMAIL_PATTERN.is_match(&self.email) {
            errors.push("Email must be a valid email address.".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }
}
