//! Evidence snippets produced by page classification.

use serde::{Deserialize, Serialize};

/// The kind of evidence a page provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Schedule,
    Legend,
    Egress,
    Keynote,
    Code,
    Plan,
    Unknown,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Legend => "legend",
            Self::Egress => "egress",
            Self::Keynote => "keynote",
            Self::Code => "code",
            Self::Plan => "plan",
            Self::Unknown => "unknown",
        }
    }

    /// Schedules and legends carry authoritative counts.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Schedule | Self::Legend)
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A short piece of classified page text, used as pipeline/collaborator input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub filename: String,
    pub page: u32,
    pub kind: EvidenceKind,
    pub text: String,
}
