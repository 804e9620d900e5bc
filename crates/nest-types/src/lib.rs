//! Shared domain and wire types for the nest marketplace.
//!
//! `models` holds the closed vocabularies (room types, report states, ...) and
//! the small value types derived from them. `api` holds request and response
//! bodies exchanged over HTTP.

pub mod api;
pub mod models;
