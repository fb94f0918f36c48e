//! Core types for sftp-ingest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Absolute path on the remote server
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePath(String);

impl RemotePath {
    /// Wrap a remote path string
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The full path
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component, used as the recorded filename
    pub fn file_name(&self) -> &str {
        let trimmed = self.0.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Append a child entry name
    pub fn join(&self, name: &str) -> Self {
        let parent = self.0.trim_end_matches('/');
        Self(format!("{parent}/{name}"))
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for RemotePath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

/// A qualifying file found by the lister
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// Where the file lives on the remote server
    pub path: RemotePath,
    /// When the lister found it
    pub discovered_at: DateTime<Utc>,
}

impl CandidateFile {
    /// Candidate discovered now
    pub fn new(path: impl Into<RemotePath>) -> Self {
        Self {
            path: path.into(),
            discovered_at: Utc::now(),
        }
    }
}

/// Terminal state of one file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    /// Content passed validation
    Valid,
    /// Content was retrieved but failed validation
    Invalid,
    /// Content could not be retrieved
    Error,
}

impl ValidationState {
    /// Stored/logged representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationState::Valid => "valid",
            ValidationState::Invalid => "invalid",
            ValidationState::Error => "error",
        }
    }

    /// Parse the stored representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(ValidationState::Valid),
            "invalid" => Some(ValidationState::Invalid),
            "error" => Some(ValidationState::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a validator reports about one file's content
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Issues that make the file invalid
    pub errors: Vec<String>,
    /// Issues worth reporting that do not invalidate the file
    pub warnings: Vec<String>,
    /// Informational notes
    pub info: Vec<String>,
}

impl Verdict {
    /// `invalid` when any error was reported, `valid` otherwise
    pub fn state(&self) -> ValidationState {
        if self.errors.is_empty() {
            ValidationState::Valid
        } else {
            ValidationState::Invalid
        }
    }
}

/// Terminal outcome for one file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Remote file name
    pub filename: String,
    /// Full remote path the outcome belongs to
    pub path: RemotePath,
    /// Terminal state
    pub state: ValidationState,
    /// Ordered error entries
    pub errors: Vec<String>,
    /// Ordered warning entries
    pub warnings: Vec<String>,
    /// Ordered info entries
    pub info: Vec<String>,
}

impl ValidationOutcome {
    /// Outcome built from a validator verdict
    pub fn from_verdict(path: &RemotePath, verdict: Verdict) -> Self {
        Self {
            filename: path.file_name().to_string(),
            path: path.clone(),
            state: verdict.state(),
            errors: verdict.errors,
            warnings: verdict.warnings,
            info: verdict.info,
        }
    }

    /// `error` outcome for a file whose content never arrived
    pub fn transport_error(path: &RemotePath, message: impl Into<String>) -> Self {
        Self {
            filename: path.file_name().to_string(),
            path: path.clone(),
            state: ValidationState::Error,
            errors: vec![message.into()],
            warnings: Vec::new(),
            info: Vec::new(),
        }
    }

    /// `invalid` outcome for content the validator could not process
    pub fn validator_failure(path: &RemotePath, message: impl Into<String>) -> Self {
        Self {
            filename: path.file_name().to_string(),
            path: path.clone(),
            state: ValidationState::Invalid,
            errors: vec![message.into()],
            warnings: Vec::new(),
            info: Vec::new(),
        }
    }
}

/// An outcome as stored in the results database
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Store-assigned identifier
    pub id: i64,
    /// When the record was written
    pub timestamp: DateTime<Utc>,
    /// The recorded outcome
    #[serde(flatten)]
    pub outcome: ValidationOutcome,
}

/// A root or subdirectory the lister had to give up on
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDirectory {
    /// Directory that could not be listed
    pub path: RemotePath,
    /// Last error encountered
    pub reason: String,
}

/// Counts of outcomes by state for one run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of outcomes recorded
    pub total: usize,
    /// Outcomes in state `valid`
    pub valid: usize,
    /// Outcomes in state `invalid`
    pub invalid: usize,
    /// Outcomes in state `error`
    pub error: usize,
    /// Directories skipped during listing
    pub skipped_directories: usize,
    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
}

impl RunSummary {
    /// Tally outcomes
    pub fn from_outcomes(outcomes: &[ValidationOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.state {
                ValidationState::Valid => summary.valid += 1,
                ValidationState::Invalid => summary.invalid += 1,
                ValidationState::Error => summary.error += 1,
            }
        }
        summary
    }

    /// Plain-text report for operators and notifications
    pub fn render(&self) -> String {
        let mut text = format!(
            "Validation Summary:\nTotal Files: {}\nValid Files: {}\nInvalid Files: {}\nError Files: {}",
            self.total, self.valid, self.invalid, self.error
        );
        if self.skipped_directories > 0 {
            text.push_str(&format!(
                "\nSkipped Directories: {}",
                self.skipped_directories
            ));
        }
        if self.cancelled {
            text.push_str("\nRun was cancelled before all files were processed");
        }
        text
    }
}

/// Everything a completed (or cancelled) batch run produced
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport {
    /// One outcome per processed candidate, in completion order
    pub outcomes: Vec<ValidationOutcome>,
    /// Directories the lister skipped
    pub skipped: Vec<SkippedDirectory>,
    /// Counts by state
    pub summary: RunSummary,
    /// Validation log the outcomes were appended to
    pub log_path: PathBuf,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}
