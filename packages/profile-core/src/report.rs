//! Shared diagnostic and report types used by metadata validation, control
//! registration, and [`crate::profile::Profile::check`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single error or warning surfaced by [`crate::profile::Profile::check`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub control_id: Option<String>,
    pub msg: String,
}

impl Diagnostic {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            file: None,
            line: None,
            column: None,
            control_id: None,
            msg: msg.into(),
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_control_id(mut self, id: impl Into<String>) -> Self {
        self.control_id = Some(id.into());
        self
    }
}

/// The structured, non-throwing report returned by [`crate::profile::Profile::check`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckReport {
    pub summary: CheckSummary,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckSummary {
    pub valid: bool,
    pub timestamp: String,
    pub location: PathBuf,
    pub profile: String,
    pub controls: usize,
}
