//! Server-side observe support (RFC 7641)
//!
//! An [`ObservableResource`] wraps a plain [`crate::CoapHandler`] and keeps
//! the subscription registry for one resource: who observes it, with which
//! token, and where its notification sequence stands. Notification fan-out
//! and termination run through the endpoint passed into each call; relations
//! are owned exclusively by the resource.

mod relation;
mod resource;

pub use relation::ObservationRelation;
pub use resource::{NotifyOptions, ObservableResource, DEFAULT_FORCE_CON_FREQ};
