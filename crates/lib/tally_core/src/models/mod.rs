//! Domain models shared by the auth and billing layers.
//!
//! These are internal domain models, distinct from the request/response
//! shapes in `tally_api::models`.

pub mod auth;
pub mod billing;
