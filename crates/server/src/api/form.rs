//! Text fields of the multipart upload form.

use chrono::NaiveDate;

use docvault_core::UserId;
use docvault_library::DocumentDraft;

use crate::error::ServerError;

/// Names the file part may arrive under.
pub const FILE_FIELDS: &[&str] = &["file", "pdf"];

/// A JSON array of strings, or a comma-separated list.
fn parse_list(field: &str, value: &str) -> Result<Vec<String>, ServerError> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ServerError::BadRequest(format!("{field} must be a list of strings: {e}")));
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect())
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ServerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" | "" => Ok(false),
        other => Err(ServerError::BadRequest(format!(
            "{field} must be true or false, got {other:?}"
        ))),
    }
}

fn parse_date(field: &str, value: &str) -> Result<Option<NaiveDate>, ServerError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    // Accept full timestamps too; only the date part is kept.
    let date = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ServerError::BadRequest(format!("{field} must be a YYYY-MM-DD date")))
}

/// Copy one text field into `draft`. Unknown fields are ignored.
pub fn apply_field(draft: &mut DocumentDraft, name: &str, value: &str) -> Result<(), ServerError> {
    match name {
        "name" | "filename" => {
            draft.filename = Some(value.to_owned()).filter(|v| !v.trim().is_empty());
        }
        "tags" => draft.tags = parse_list(name, value)?,
        "description" => draft.description = Some(value.to_owned()),
        "folder" => draft.folder = Some(value.to_owned()),
        "expiryDate" => draft.expiry_date = parse_date(name, value)?,
        "reminderEnabled" => draft.reminder_enabled = parse_bool(name, value)?,
        "sharedWith" => {
            draft.shared_with = parse_list(name, value)?
                .into_iter()
                .map(UserId::from)
                .collect();
        }
        _ => {}
    }
    Ok(())
}
