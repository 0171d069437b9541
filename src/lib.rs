//! Warden — access-control core for a multi-tenant content API.
//!
//! Three capabilities over one data model: authentication (is this
//! credential known?), authorization (does it satisfy named role
//! constraints?), and abuse detection (should this identity or origin be
//! temporarily banned?). The HTTP layer and per-resource CRUD modules are
//! external consumers of these APIs.

pub mod abuse;
pub mod cli;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod scheme;
pub mod store;
