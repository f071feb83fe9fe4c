use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Normalized metadata for one game, merged from manifest, API and store page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameMetadata {
    pub title: String,
    pub description: String,
    /// Cache file name of the downloaded cover, or the raw remote URL when
    /// the download failed.
    pub cover: Option<String>,
    /// 0-100 scale.
    pub rating: Option<u8>,
    /// Display form `DD Month YYYY`; raw value when unparseable, empty when
    /// no source had a date.
    pub release_date: String,
    pub developer: String,
    pub publisher: String,
    pub languages: LanguageSets,
    pub systems: SystemFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageSets {
    pub audio: Vec<String>,
    pub text: Vec<String>,
    pub subtitles: Vec<String>,
}

impl LanguageSets {
    /// Per-set union with another set, each result sorted and deduplicated.
    pub fn union(&self, other: &LanguageSets) -> LanguageSets {
        fn merge(a: &[String], b: &[String]) -> Vec<String> {
            let set: BTreeSet<String> = a.iter().chain(b.iter()).cloned().collect();
            set.into_iter().collect()
        }

        LanguageSets {
            audio: merge(&self.audio, &other.audio),
            text: merge(&self.text, &other.text),
            subtitles: merge(&self.subtitles, &other.subtitles),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty() && self.text.is_empty() && self.subtitles.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemFlags {
    pub windows: bool,
    pub linux: bool,
    pub mac: bool,
}

impl SystemFlags {
    /// Boolean OR across two sets of signals; once true, stays true.
    pub fn union(&self, other: &SystemFlags) -> SystemFlags {
        SystemFlags {
            windows: self.windows || other.windows,
            linux: self.linux || other.linux,
            mac: self.mac || other.mac,
        }
    }

    pub fn any(&self) -> bool {
        self.windows || self.linux || self.mac
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished,
    Error,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
        };
        write!(f, "{}", name)
    }
}

/// Point-in-time view of a job, safe to read while the job is running.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub status: JobStatus,
    pub output: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "gogshelf/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShelfError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, ShelfError>;
