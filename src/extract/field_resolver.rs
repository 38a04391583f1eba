//! Static table of per-item-type field extraction rules.
//!
//! Each rule maps a field name to a projection over the raw JSON record the
//! fetcher returns. Rules are pure: same record in, same value out. A rule
//! that finds nothing usable (missing path, null, empty string) yields `None`
//! so the merge store never records an empty value.

use crate::extract::ItemType;
use crate::extract::merge_store::is_empty_value;
use chrono::DateTime;
use serde_json::Value;

/// Timestamps render in this human form in the output document.
const TIME_FORMAT: &str = "%m/%d/%y %I:%M:%S %p";

const ISSUE_FIELDS: &[&str] = &[
    "number", "title", "body", "author", "created_at", "closed_at", "comments", "state",
];

const PULL_REQUEST_FIELDS: &[&str] = &[
    "number",
    "merged",
    "title",
    "body",
    "author",
    "created_at",
    "closed_at",
    "comments",
    "state",
    "commit_count",
    "additions",
    "deletions",
    "changed_files",
];

const COMMIT_FIELDS: &[&str] = &[
    "commit_sha",
    "commit_author_name",
    "commit_committer_name",
    "commit_date",
    "commit_message",
    "commit_files",
    "commit_additions",
    "commit_deletions",
    "commit_changes",
    "commit_status",
    "commit_patch_text",
];

/// Fields collected for every item of the given type, whether requested or not.
pub const fn mandatory_fields(item_type: ItemType) -> &'static [&'static str] {
    match item_type {
        ItemType::Commit => &[],
        ItemType::Issue => &["number"],
        ItemType::PullRequest => &["number", "merged"],
    }
}

/// All field names the resolver understands for the given type.
pub const fn known_fields(item_type: ItemType) -> &'static [&'static str] {
    match item_type {
        ItemType::Commit => COMMIT_FIELDS,
        ItemType::Issue => ISSUE_FIELDS,
        ItemType::PullRequest => PULL_REQUEST_FIELDS,
    }
}

pub fn is_known_field(item_type: ItemType, field: &str) -> bool {
    known_fields(item_type).contains(&field)
}

/// Extract one field's value from a raw record.
pub fn resolve(item_type: ItemType, field: &str, record: &Value) -> Option<Value> {
    let value = match item_type {
        ItemType::Commit => resolve_commit(field, record),
        ItemType::Issue => resolve_issue(field, record),
        ItemType::PullRequest => resolve_pull_request(field, record),
    };

    value.filter(|v| !is_empty_value(v))
}

fn resolve_issue(field: &str, record: &Value) -> Option<Value> {
    match field {
        "number" | "title" | "body" | "comments" | "state" => record.get(field).cloned(),
        "author" => value_at(record, &["user", "login"]),
        "created_at" | "closed_at" => format_timestamp(record.get(field)?),
        _ => None,
    }
}

fn resolve_pull_request(field: &str, record: &Value) -> Option<Value> {
    match field {
        "merged" => Some(Value::Bool(is_merged(record))),
        "commit_count" => record.get("commits").cloned(),
        "additions" | "deletions" | "changed_files" => record.get(field).cloned(),
        _ => resolve_issue(field, record),
    }
}

fn resolve_commit(field: &str, record: &Value) -> Option<Value> {
    match field {
        "commit_sha" => record.get("sha").cloned(),
        "commit_author_name" => value_at(record, &["commit", "author", "name"]),
        "commit_committer_name" => value_at(record, &["commit", "committer", "name"]),
        "commit_date" => format_timestamp(&value_at(record, &["commit", "author", "date"])?),
        "commit_message" => value_at(record, &["commit", "message"]),
        "commit_files" => {
            let names = files(record)?
                .iter()
                .filter_map(|f| f.get("filename").cloned())
                .collect();
            Some(Value::Array(names))
        }
        "commit_additions" => file_stat_total(record, "additions"),
        "commit_deletions" => file_stat_total(record, "deletions"),
        "commit_changes" => sum_over_files(record, "changes")
            .or_else(|| value_at(record, &["stats", "total"])),
        "commit_status" => join_over_files(record, "status", ", "),
        "commit_patch_text" => join_over_files(record, "patch", "\n"),
        _ => None,
    }
}

/// A pull request counts as merged when the API says so or a merge timestamp
/// is present.
pub fn is_merged(record: &Value) -> bool {
    record
        .get("merged")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| record.get("merged_at").is_some_and(|v| !v.is_null()))
}

fn value_at(record: &Value, path: &[&str]) -> Option<Value> {
    let mut current = record;
    for key in path {
        current = current.get(key)?;
    }

    Some(current.clone())
}

/// Reformat an RFC 3339 timestamp into the output document's time form.
fn format_timestamp(value: &Value) -> Option<Value> {
    let parsed = DateTime::parse_from_rfc3339(value.as_str()?).ok()?;
    Some(Value::String(parsed.format(TIME_FORMAT).to_string()))
}

fn files(record: &Value) -> Option<&Vec<Value>> {
    record.get("files")?.as_array()
}

/// Per-file totals, falling back to the record's summary stats when the file
/// list is absent.
fn file_stat_total(record: &Value, key: &str) -> Option<Value> {
    sum_over_files(record, key).or_else(|| value_at(record, &["stats", key]))
}

/// Total of a per-file numeric stat, or `None` when no file carries it.
fn sum_over_files(record: &Value, key: &str) -> Option<Value> {
    let mut total: Option<u64> = None;
    for value in files(record)?.iter().filter_map(|f| f.get(key).and_then(Value::as_u64)) {
        total = Some(total.unwrap_or(0) + value);
    }

    total.map(Value::from)
}

fn join_over_files(record: &Value, key: &str, separator: &str) -> Option<Value> {
    let parts: Vec<&str> = files(record)?
        .iter()
        .filter_map(|f| f.get(key).and_then(Value::as_str))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(Value::String(parts.join(separator)))
    }
}
