//! HTTP surface of pipewatch.
//!
//! - [`source`]: the [`source::StateSource`] seam the daemon implements
//! - [`http_api`]: axum router and handlers
//! - [`api_error`]: JSON error responses
//! - [`viewer`]: the built-in viewer page

pub mod api_error;
pub mod http_api;
pub mod source;
pub mod viewer;
