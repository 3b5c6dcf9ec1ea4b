//! Notification entity, request payloads and events.
//!
//! Field names serialize in `snake_case` and enum values in upper case, which
//! is the format of both cache snapshots and published events.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of `recipient` and `subject`.
pub const MAX_FIELD_LEN: usize = 255;

/// Delivery channel of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationType {
    Email,
    Sms,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Sms => "SMS",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMAIL" => Ok(Self::Email),
            "SMS" => Ok(Self::Sms),
            _ => Err(ValidationError::UnsupportedType(s.to_string())),
        }
    }
}

impl ToSql for NotificationType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for NotificationType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "EMAIL" => Ok(Self::Email),
            "SMS" => Ok(Self::Sms),
            other => Err(FromSqlError::Other(
                format!("unsupported notification type: {other}").into(),
            )),
        }
    }
}

/// Kind of change carried by a [`NotificationEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Create,
    Update,
    Delete,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub recipient: String,
    pub subject: Option<String>,
    pub content: String,
    /// Creation time in Unix milliseconds, assigned by the store.
    pub created_at: i64,
    pub version: i64,
}

/// Error for malformed create/update payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },
}

/// Validated payload for creating a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub recipient: String,
    pub subject: Option<String>,
    pub content: String,
}

impl NewNotification {
    /// Build a create payload from raw request fields.
    ///
    /// A blank subject is stored as `None`.
    pub fn parse(
        kind: &str,
        recipient: impl Into<String>,
        subject: Option<String>,
        content: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let kind = kind.parse::<NotificationType>()?;
        let new = Self {
            kind,
            recipient: recipient.into(),
            subject: normalize_subject(subject),
            content: content.into(),
        };
        new.validate()?;
        Ok(new)
    }

    /// Check required fields and length limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("recipient", &self.recipient)?;
        require("content", &self.content)?;
        limit("recipient", &self.recipient)?;
        if let Some(subject) = &self.subject {
            limit("subject", subject)?;
        }
        Ok(())
    }
}

/// Validated payload for updating a notification's mutable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationUpdate {
    pub subject: Option<String>,
    pub content: String,
}

impl NotificationUpdate {
    pub fn new(subject: Option<String>, content: impl Into<String>) -> Result<Self, ValidationError> {
        let update = Self {
            subject: normalize_subject(subject),
            content: content.into(),
        };
        update.validate()?;
        Ok(update)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("content", &self.content)?;
        if let Some(subject) = &self.subject {
            limit("subject", subject)?;
        }
        Ok(())
    }

    /// Apply to a notification, leaving immutable fields untouched.
    pub fn apply_to(&self, notification: &mut Notification) {
        notification.subject.clone_from(&self.subject);
        notification.content.clone_from(&self.content);
    }
}

/// Event published after a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: i64,
    pub notification_type: NotificationType,
    pub notification_message_type: MessageType,
    pub recipient: String,
    pub subject: Option<String>,
    pub content: String,
}

impl NotificationEvent {
    pub fn new(notification: &Notification, message_type: MessageType) -> Self {
        Self {
            id: notification.id,
            notification_type: notification.kind,
            notification_message_type: message_type,
            recipient: notification.recipient.clone(),
            subject: notification.subject.clone(),
            content: notification.content.clone(),
        }
    }
}

fn normalize_subject(subject: Option<String>) -> Option<String> {
    subject.filter(|s| !s.trim().is_empty())
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

fn limit(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notification {
        Notification {
            id: 7,
            kind: NotificationType::Email,
            recipient: "ops@example.com".into(),
            subject: Some("Deploy".into()),
            content: "Deploy finished".into(),
            created_at: 1_700_000_000_000,
            version: 0,
        }
    }

    #[test]
    fn test_type_from_str() {
        assert_eq!("EMAIL".parse::<NotificationType>(), Ok(NotificationType::Email));
        assert_eq!("sms".parse::<NotificationType>(), Ok(NotificationType::Sms));
        assert_eq!(
            "PIGEON".parse::<NotificationType>(),
            Err(ValidationError::UnsupportedType("PIGEON".into()))
        );
        assert!("".parse::<NotificationType>().is_err());
    }

    #[test]
    fn test_unsupported_type_message() {
        let err = "FAX".parse::<NotificationType>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported type: FAX");
    }

    #[test]
    fn test_new_notification_requires_fields() {
        assert_eq!(
            NewNotification::parse("EMAIL", "  ", None, "body"),
            Err(ValidationError::MissingField("recipient"))
        );
        assert_eq!(
            NewNotification::parse("SMS", "+15550100", None, ""),
            Err(ValidationError::MissingField("content"))
        );
    }

    #[test]
    fn test_new_notification_length_limits() {
        let long = "a".repeat(MAX_FIELD_LEN + 1);
        assert_eq!(
            NewNotification::parse("EMAIL", long.clone(), None, "body"),
            Err(ValidationError::TooLong {
                field: "recipient",
                max: MAX_FIELD_LEN
            })
        );
        assert!(matches!(
            NewNotification::parse("EMAIL", "a@b.c", Some(long), "body"),
            Err(ValidationError::TooLong { field: "subject", .. })
        ));
    }

    #[test]
    fn test_blank_subject_is_none() {
        let new = NewNotification::parse("EMAIL", "a@b.c", Some("   ".into()), "body").unwrap();
        assert_eq!(new.subject, None);
    }

    #[test]
    fn test_update_keeps_immutable_fields() {
        let mut n = sample();
        let update = NotificationUpdate::new(Some("Rollback".into()), "Rolled back").unwrap();
        update.apply_to(&mut n);

        assert_eq!(n.subject.as_deref(), Some("Rollback"));
        assert_eq!(n.content, "Rolled back");
        assert_eq!(n.recipient, "ops@example.com");
        assert_eq!(n.kind, NotificationType::Email);
        assert_eq!(n.created_at, 1_700_000_000_000);
    }

    #[test]
    fn test_snapshot_format() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "EMAIL");
        assert_eq!(json["created_at"], 1_700_000_000_000_i64);

        let back: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_snapshot_rejects_unknown_type() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["type"] = "PIGEON".into();
        assert!(serde_json::from_value::<Notification>(json).is_err());
    }

    #[test]
    fn test_event_format() {
        let event = NotificationEvent::new(&sample(), MessageType::Update);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["notification_type"], "EMAIL");
        assert_eq!(json["notification_message_type"], "UPDATE");
        assert_eq!(json["subject"], "Deploy");
    }
}
