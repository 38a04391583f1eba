use serde::{Deserialize, Serialize};
use strum::Display;

/// The kind of repository item being mined.
///
/// The serde names double as the top-level keys of the output document and
/// as the keys of the `[fields]` configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
pub enum ItemType {
    /// The most recent commit on pull request #n.
    #[serde(rename = "commits")]
    #[strum(serialize = "commit")]
    Commit,

    #[serde(rename = "issues")]
    #[strum(serialize = "issue")]
    Issue,

    #[serde(rename = "pull_requests")]
    #[strum(serialize = "pull request")]
    PullRequest,
}
