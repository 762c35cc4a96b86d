//! Core types for the todo tracker.

use crate::error::ApiError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::sync::LazyLock;

/// Todo priority rank. Higher = more important.
pub type Priority = i32;

pub const PRIORITY_MIN: Priority = 1;
pub const PRIORITY_MAX: Priority = 10;
pub const PRIORITY_DEFAULT: Priority = 5;

pub const TITLE_MAX_CHARS: usize = 500;
pub const CATEGORY_NAME_MAX_CHARS: usize = 100;
pub const TAG_NAME_MAX_CHARS: usize = 50;
pub const PRIORITY_NAME_MAX_CHARS: usize = 50;
pub const ICON_MAX_CHARS: usize = 50;

/// Deepest subtask level allowed unless configured otherwise. Top-level todos are depth 0.
pub const DEFAULT_MAX_SUBTASK_DEPTH: usize = 5;

/// Seed values for the ten fixed priority levels: (level, name, color).
pub const DEFAULT_PRIORITY_LEVELS: [(Priority, &str, &str); 10] = [
    (1, "Lowest", "#9E9E9E"),
    (2, "Very Low", "#8BC34A"),
    (3, "Low", "#4CAF50"),
    (4, "Below Normal", "#CDDC39"),
    (5, "Normal", "#FFEB3B"),
    (6, "Above Normal", "#FFC107"),
    (7, "High", "#FF9800"),
    (8, "Very High", "#FF5722"),
    (9, "Critical", "#F44336"),
    (10, "Urgent", "#B71C1C"),
];

/// A todo row as stored, without resolved relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    pub category_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A todo with category, tags, attachments and its whole subtree resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoView {
    #[serde(flatten)]
    pub todo: Todo,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
    pub attachments: Vec<Attachment>,
    pub subtasks: Vec<TodoView>,
    /// Direct children only.
    pub subtask_count: usize,
    pub completed_subtask_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityLevel {
    pub level: Priority,
    pub name: String,
    pub color: Option<String>,
}

/// Attachment metadata. Content lives in the file store under `filename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub todo_id: String,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}

// =============================================================================
// Inputs
// =============================================================================

/// Input for creating a todo or subtask.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTodo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    pub parent_id: Option<String>,
}

impl NewTodo {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Partial update of a todo. Outer `None` = leave unchanged, inner `None` = clear.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "deserialize_patch_timestamp")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub category_id: Option<Option<String>>,
    pub tag_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub parent_id: Option<Option<String>>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub icon: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTag {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub color: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriorityPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub color: Option<Option<String>>,
}

/// Attachment metadata to record after the content has been stored.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub todo_id: String,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

// =============================================================================
// Query types
// =============================================================================

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Filter criteria for listing todos. Unset fields do not constrain.
#[derive(Debug, Clone, PartialEq)]
pub struct TodoFilter {
    pub completed: Option<bool>,
    pub category_id: Option<String>,
    pub tag_id: Option<String>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the title.
    pub q: Option<String>,
    pub priority_min: Option<Priority>,
    pub priority_max: Option<Priority>,
    /// List direct children of this todo instead of top-level todos.
    pub parent_id: Option<String>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for TodoFilter {
    fn default() -> Self {
        Self {
            completed: None,
            category_id: None,
            tag_id: None,
            due_before: None,
            due_after: None,
            q: None,
            priority_min: None,
            priority_max: None,
            parent_id: None,
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TodoPage {
    pub items: Vec<TodoView>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

/// Generic `{items, total}` envelope for small collections.
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// What a cascade delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub todos_deleted: usize,
    pub attachments_deleted: usize,
    /// Stored filenames whose content should be removed from the file store.
    pub files: Vec<String>,
}

// =============================================================================
// Validation
// =============================================================================

static COLOR_RE: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color pattern is valid")
});

pub fn validate_priority(priority: Priority) -> Result<Priority, ApiError> {
    if (PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        Ok(priority)
    } else {
        Err(ApiError::invalid_value(
            "priority",
            format!(
                "priority must be between {} and {}, got {}",
                PRIORITY_MIN, PRIORITY_MAX, priority
            ),
        ))
    }
}

/// Trim a required display string and enforce its length.
pub fn validate_name(field: &str, value: &str, max_chars: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_value(field, format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ApiError::invalid_value(
            field,
            format!("{} must be at most {} characters", field, max_chars),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_title(title: Option<&str>) -> Result<String, ApiError> {
    match title {
        None => Err(ApiError::missing_field("title")),
        Some(t) => validate_name("title", t, TITLE_MAX_CHARS),
    }
}

pub fn validate_color(color: Option<String>) -> Result<Option<String>, ApiError> {
    match color {
        Some(c) if !COLOR_RE.is_match(&c) => Err(ApiError::invalid_value(
            "color",
            format!("color must look like #RRGGBB, got '{}'", c),
        )),
        other => Ok(other),
    }
}

pub fn validate_icon(icon: Option<String>) -> Result<Option<String>, ApiError> {
    match icon {
        Some(i) if i.chars().count() > ICON_MAX_CHARS => Err(ApiError::invalid_value(
            "icon",
            format!("icon must be at most {} characters", ICON_MAX_CHARS),
        )),
        other => Ok(other),
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Convert stored milliseconds to a UTC timestamp.
pub fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Parse RFC 3339, naive `YYYY-MM-DDTHH:MM[:SS]` (UTC) or `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        parse_timestamp(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", s)))
    })
    .transpose()
}

fn deserialize_patch_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_opt_timestamp(deserializer).map(Some)
}

/// Present-but-null becomes `Some(None)`; absence is handled by `#[serde(default)]`.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_timestamp_accepts_supported_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 12:30"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("next tuesday"), None);
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: TodoPatch = serde_json::from_str(r#"{"category_id": null}"#).unwrap();
        assert_eq!(patch.category_id, Some(None));
        assert_eq!(patch.parent_id, None);
        assert_eq!(patch.due_date, None);

        let patch: TodoPatch =
            serde_json::from_str(r#"{"due_date": "2024-05-01", "parent_id": "p1"}"#).unwrap();
        assert!(matches!(patch.due_date, Some(Some(_))));
        assert_eq!(patch.parent_id, Some(Some("p1".to_string())));

        let patch: TodoPatch = serde_json::from_str(r#"{"due_date": null}"#).unwrap();
        assert_eq!(patch.due_date, Some(None));
    }

    #[test]
    fn invalid_due_date_is_rejected() {
        let result: Result<NewTodo, _> = serde_json::from_str(r#"{"title": "x", "due_date": "soon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn priority_bounds() {
        assert!(validate_priority(1).is_ok());
        assert!(validate_priority(10).is_ok());
        assert!(validate_priority(0).is_err());
        assert!(validate_priority(11).is_err());
    }

    #[test]
    fn title_must_be_present_and_non_blank() {
        assert_eq!(validate_title(Some("  Buy milk ")).unwrap(), "Buy milk");
        assert_eq!(
            validate_title(None).unwrap_err().code,
            crate::error::ErrorCode::MissingRequiredField
        );
        assert!(validate_title(Some("   ")).is_err());
        assert!(validate_title(Some(&"x".repeat(501))).is_err());
    }

    #[test]
    fn color_must_be_hex() {
        assert!(validate_color(Some("#A1b2C3".into())).is_ok());
        assert!(validate_color(None).is_ok());
        assert!(validate_color(Some("red".into())).is_err());
        assert!(validate_color(Some("#12345".into())).is_err());
    }

    #[test]
    fn todo_view_flattens_todo_fields() {
        let now = Utc::now();
        let view = TodoView {
            todo: Todo {
                id: "t1".into(),
                title: "Buy milk".into(),
                description: None,
                due_date: None,
                priority: 5,
                completed: false,
                completed_at: None,
                parent_id: None,
                category_id: None,
                created_at: now,
                updated_at: now,
            },
            category: None,
            tags: vec![],
            attachments: vec![],
            subtasks: vec![],
            subtask_count: 0,
            completed_subtask_count: 0,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "t1");
        assert_eq!(json["title"], "Buy milk");
        assert_eq!(json["category_id"], serde_json::Value::Null);
        assert!(json["subtasks"].as_array().unwrap().is_empty());
    }
}
