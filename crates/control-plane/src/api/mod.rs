// HTTP API routes
//
// This module contains all HTTP route handlers for the public API.
// Each submodule handles a specific resource type with its own AppState.

pub mod campaigns;
pub mod common;
pub mod sites;
pub mod subscriptions;
pub mod tracking;
pub mod webhooks;

// Re-export common types
pub use common::{ApiError, ApiResult, ErrorResponse, ListResponse};
