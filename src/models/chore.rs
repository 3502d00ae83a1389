use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::profile::normalize_family_code;

/// Field names of a chore record in the remote collection.
pub mod field {
    pub const TITLE: &str = "title";
    pub const ASSIGNED_TO: &str = "assignedTo";
    pub const FAMILY_CODE: &str = "familyCode";
    pub const STATUS: &str = "status";
    pub const PHOTO_URL: &str = "photoUrl";
    pub const COMPLETED_BY: &str = "completedBy";
    pub const CREATED_AT: &str = "createdAt";
    pub const COMPLETED_AT: &str = "completedAt";
}

/// A unit of household work shared within a family.
///
/// Chores are created pending by a parent and flipped to completed, together
/// with the proof photo URL, by the upload pipeline. Nothing in this crate
/// moves a completed chore back to pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chore {
    /// Opaque key assigned by the repository on creation.
    pub id: String,
    pub title: String,
    /// Free-text name of the member expected to do the chore.
    pub assigned_to: String,
    pub family_code: String,
    pub status: ChoreStatus,
    pub photo_url: Option<String>,
    pub completed_by: Option<String>,
    /// Server-assigned; `None` while the server timestamp is still pending.
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Completion status of a chore.
///
/// - `Pending`: Waiting for someone to do it
/// - `Completed`: Done, usually with a photo attached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChoreStatus {
    #[default]
    Pending,
    Completed,
}

impl ChoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A chore record exactly as the remote collection stores it.
///
/// The collection has no schema enforcement, so every field besides the key
/// may be missing or carry an unexpected type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoreDocument {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ChoreDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn family_code(&self) -> Option<&str> {
        self.fields.get(field::FAMILY_CODE).and_then(Value::as_str)
    }
}

impl Chore {
    /// Convert a raw record into a fully-typed chore.
    ///
    /// Missing or mistyped fields fall back to defaults: status becomes
    /// pending, text fields become empty, optional fields become `None`.
    /// Timestamps are accepted as RFC 3339 strings or epoch milliseconds.
    pub fn from_document(doc: &ChoreDocument) -> Self {
        let fields = &doc.fields;
        let status = text_field(fields, field::STATUS)
            .and_then(|s| ChoreStatus::from_str(s.trim()))
            .unwrap_or_default();

        Self {
            id: doc.id.clone(),
            title: text_field(fields, field::TITLE).unwrap_or_default().to_string(),
            assigned_to: text_field(fields, field::ASSIGNED_TO)
                .unwrap_or_default()
                .to_string(),
            family_code: text_field(fields, field::FAMILY_CODE)
                .unwrap_or_default()
                .to_string(),
            status,
            photo_url: optional_text(fields, field::PHOTO_URL),
            completed_by: optional_text(fields, field::COMPLETED_BY),
            created_at: timestamp_field(fields, field::CREATED_AT),
            completed_at: timestamp_field(fields, field::COMPLETED_AT),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ChoreStatus::Completed
    }
}

fn text_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn optional_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    text_field(fields, key)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn timestamp_field(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    match fields.get(key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

/// Input for creating a new chore. The repository assigns the id, sets the
/// status to pending and stamps `createdAt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChoreInput {
    pub title: String,
    pub assigned_to: String,
    pub family_code: String,
}

impl CreateChoreInput {
    pub fn new(
        title: impl Into<String>,
        assigned_to: impl Into<String>,
        family_code: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            assigned_to: assigned_to.into(),
            family_code: family_code.into(),
        }
    }

    /// Trim the text fields and lower-case the family code, rejecting an
    /// empty title or family code.
    pub fn normalized(self) -> Result<Self, String> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err("chore title cannot be empty".to_string());
        }
        let family_code = normalize_family_code(&self.family_code);
        if family_code.is_empty() {
            return Err("family code cannot be empty".to_string());
        }
        Ok(Self {
            title,
            assigned_to: self.assigned_to.trim().to_string(),
            family_code,
        })
    }
}

/// A partial update merged into an existing chore. Absent fields are left
/// untouched by the repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChorePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ChoreStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChorePatch {
    /// The status transition recorded once a proof photo is stored.
    pub fn completion(
        photo_url: impl Into<String>,
        completed_by: impl Into<String>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: Some(ChoreStatus::Completed),
            photo_url: Some(photo_url.into()),
            completed_by: Some(completed_by.into()),
            completed_at: Some(completed_at),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_document_applies_defaults_for_missing_fields() {
        let doc = ChoreDocument::new("c1").with(field::TITLE, "Dishes");
        let chore = Chore::from_document(&doc);

        assert_eq!(chore.id, "c1");
        assert_eq!(chore.title, "Dishes");
        assert_eq!(chore.assigned_to, "");
        assert_eq!(chore.family_code, "");
        assert_eq!(chore.status, ChoreStatus::Pending);
        assert!(chore.photo_url.is_none());
        assert!(chore.created_at.is_none());
    }

    #[test]
    fn from_document_tolerates_mistyped_fields() {
        let doc = ChoreDocument::new("c2")
            .with(field::TITLE, 42)
            .with(field::STATUS, "archived")
            .with(field::PHOTO_URL, "")
            .with(field::CREATED_AT, json!({"seconds": 1}));
        let chore = Chore::from_document(&doc);

        assert_eq!(chore.title, "");
        assert_eq!(chore.status, ChoreStatus::Pending);
        assert!(chore.photo_url.is_none());
        assert!(chore.created_at.is_none());
    }

    #[test]
    fn from_document_reads_both_timestamp_encodings() {
        let doc = ChoreDocument::new("c3")
            .with(field::STATUS, "completed")
            .with(field::CREATED_AT, "2024-05-01T10:00:00Z")
            .with(field::COMPLETED_AT, 1_714_557_600_000_i64);
        let chore = Chore::from_document(&doc);

        assert!(chore.is_completed());
        assert_eq!(
            chore.created_at.unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
        assert_eq!(chore.completed_at.unwrap().timestamp_millis(), 1_714_557_600_000);
    }

    #[test]
    fn document_round_trips_through_flattened_json() {
        let raw = json!({"id": "c4", "title": "Trash", "familyCode": "abc12"});
        let doc: ChoreDocument = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.id, "c4");
        assert_eq!(doc.family_code(), Some("abc12"));
        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    #[test]
    fn create_input_normalizes_and_validates() {
        let input = CreateChoreInput::new(" Dishes ", " Sam ", "ABC12")
            .normalized()
            .unwrap();
        assert_eq!(input.title, "Dishes");
        assert_eq!(input.assigned_to, "Sam");
        assert_eq!(input.family_code, "abc12");

        assert!(CreateChoreInput::new("  ", "Sam", "abc12").normalized().is_err());
        assert!(CreateChoreInput::new("Dishes", "Sam", " ").normalized().is_err());
    }

    #[test]
    fn completion_patch_only_carries_completion_fields() {
        let now = Utc::now();
        let patch = ChorePatch::completion("http://x/p.jpg", "Sam", now);
        let json = serde_json::to_value(&patch).unwrap();

        assert_eq!(json["status"], "completed");
        assert_eq!(json["completedBy"], "Sam");
        assert!(json.get("title").is_none());
        assert!(!patch.is_empty());
        assert!(ChorePatch::default().is_empty());
    }
}
