//! Well-formedness rules for events and notifications.
//!
//! Both validators evaluate their rules in a fixed order and report the
//! first violation: `type`, then `id`, then `source`. Callers and tests rely
//! on this order when several attributes are invalid at once.
//!
//! A string that is empty or consists only of whitespace counts as absent.

use crate::event::{Event, SPEC_VERSION};
use crate::notification::Notification;

/// Reasons an [`Event`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("event id must be non-empty and non-blank")]
    MissingId,

    #[error("event source must be non-empty and non-blank")]
    MissingSource,

    #[error("event type must be non-empty and non-blank")]
    MissingType,

    /// A structural rule other than presence failed.
    #[error("event attribute {field} is invalid: {reason}")]
    SchemaViolation {
        /// The offending attribute.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Reasons a [`Notification`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("event type must be non-empty and non-blank")]
    InvalidEventType,

    #[error("event id must be non-empty and non-blank")]
    InvalidEventId,

    #[error("event source must be non-empty and non-blank")]
    InvalidEventSource,
}

type Rule<T, E> = fn(&T) -> Result<(), E>;

const EVENT_RULES: [Rule<Event, EventError>; 5] = [
    event_type_present,
    event_id_present,
    event_source_present,
    spec_version_supported,
    content_type_well_formed,
];

const NOTIFICATION_RULES: [Rule<Notification, NotificationError>; 3] = [
    notification_type_present,
    notification_id_present,
    notification_source_present,
];

/// Validates an event, returning the first rule it violates.
pub fn validate_event(event: &Event) -> Result<(), EventError> {
    EVENT_RULES.iter().try_for_each(|rule| rule(event))
}

/// Validates a notification, returning the first rule it violates.
pub fn validate_notification(notification: &Notification) -> Result<(), NotificationError> {
    NOTIFICATION_RULES
        .iter()
        .try_for_each(|rule| rule(notification))
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn event_type_present(e: &Event) -> Result<(), EventError> {
    if is_blank(&e.event_type) {
        return Err(EventError::MissingType);
    }
    Ok(())
}

fn event_id_present(e: &Event) -> Result<(), EventError> {
    if is_blank(&e.id) {
        return Err(EventError::MissingId);
    }
    Ok(())
}

fn event_source_present(e: &Event) -> Result<(), EventError> {
    if is_blank(&e.source) {
        return Err(EventError::MissingSource);
    }
    Ok(())
}

fn spec_version_supported(e: &Event) -> Result<(), EventError> {
    if e.spec_version != SPEC_VERSION {
        return Err(EventError::SchemaViolation {
            field: "specversion",
            reason: format!("expected {SPEC_VERSION}, got {:?}", e.spec_version),
        });
    }
    Ok(())
}

fn content_type_well_formed(e: &Event) -> Result<(), EventError> {
    let Some(content_type) = e.data_content_type.as_deref() else {
        return Ok(());
    };

    // type "/" subtype, optionally followed by ";" parameters
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    let well_formed = match essence.split_once('/') {
        Some((ty, subtype)) => {
            !ty.is_empty()
                && !subtype.is_empty()
                && !essence.chars().any(char::is_whitespace)
                && !subtype.contains('/')
        }
        None => false,
    };

    if !well_formed {
        return Err(EventError::SchemaViolation {
            field: "datacontenttype",
            reason: format!("{content_type:?} is not a MIME type"),
        });
    }
    Ok(())
}

fn notification_type_present(n: &Notification) -> Result<(), NotificationError> {
    if is_blank(&n.event_type) {
        return Err(NotificationError::InvalidEventType);
    }
    Ok(())
}

fn notification_id_present(n: &Notification) -> Result<(), NotificationError> {
    if is_blank(&n.event_id) {
        return Err(NotificationError::InvalidEventId);
    }
    Ok(())
}

fn notification_source_present(n: &Notification) -> Result<(), NotificationError> {
    if is_blank(&n.event_source) {
        return Err(NotificationError::InvalidEventSource);
    }
    Ok(())
}
