use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Severity classification reported by the scanner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Error,
    Warning,
    Notice,
}

impl Display for IssueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            IssueType::Error => write!(f, "error"),
            IssueType::Warning => write!(f, "warning"),
            IssueType::Notice => write!(f, "notice"),
        }
    }
}

/// Engine-specific details attached to an issue. Only the axe runner fills
/// these; htmlcs reports an empty object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunnerExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
}

/// One accessibility finding, exactly as the scanner's JSON reporter emits it.
/// Keys outside this shape fail the parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Issue {
    pub code: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub type_code: i32,
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub runner: String,
    #[serde(default)]
    pub runner_extras: Option<RunnerExtras>,
}
