//! Shared types, validation rules, and wire messages for evrys.
//!
//! This crate provides the foundational types used across all evrys crates:
//! the canonical [`Event`] record and its CloudEvents JSON form, the
//! [`Notification`] projection published to subscribers, the pure validation
//! predicates that gate both, and the request/response shapes exchanged
//! between the ingestion service and its clients.
//!
//! No crate in the workspace defines its own copy of these types. The server,
//! the stores, the notification bus, and the publish pipeline all agree on
//! the representation defined here.

mod event;
mod notification;
mod validation;
mod wire;

pub use event::{format_time, Data, DecodeError, Event, WireEvent, SPEC_VERSION};
pub use notification::Notification;
pub use validation::{validate_event, validate_notification, EventError, NotificationError};
pub use wire::{AppendRequest, AppendResponse, Code, ErrorBody, GetEventResponse, IterateParams};
