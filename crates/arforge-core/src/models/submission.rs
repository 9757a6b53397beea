use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Processing status of a submission.
///
/// `Processing` is the initial state, set at record creation before any asset
/// exists. The three remaining states are terminal and reachable only from
/// `Processing`; a retry of a failed or rejected submission is a fresh
/// pipeline run with a fresh record, never a terminal-to-terminal transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Processing,
    Ready,
    Error,
    NeedsBetterSource,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Processing)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        matches!(self, SubmissionStatus::Processing) && next.is_terminal()
    }
}

impl Display for SubmissionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SubmissionStatus::Processing => write!(f, "processing"),
            SubmissionStatus::Ready => write!(f, "ready"),
            SubmissionStatus::Error => write!(f, "error"),
            SubmissionStatus::NeedsBetterSource => write!(f, "needs_better_source"),
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(SubmissionStatus::Processing),
            "ready" => Ok(SubmissionStatus::Ready),
            "error" => Ok(SubmissionStatus::Error),
            "needs_better_source" => Ok(SubmissionStatus::NeedsBetterSource),
            _ => Err(anyhow::anyhow!("Invalid submission status: {}", s)),
        }
    }
}

/// The asset types a submission owns in object storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Marker,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
            AssetKind::Marker => "marker",
        }
    }
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// The durable record describing one submission.
///
/// Asset key fields hold canonical storage locations, never signed URLs;
/// read/write capabilities are derived on demand and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub description: Option<String>,
    pub image_key: Option<String>,
    pub video_key: Option<String>,
    pub marker_key: Option<String>,
    pub status: SubmissionStatus,
    /// Present only when `status == Error`.
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// All three asset keys recorded, as required for the `Ready` state.
    pub fn has_all_keys(&self) -> bool {
        self.image_key.is_some() && self.video_key.is_some() && self.marker_key.is_some()
    }
}
