//! Utility functions shared across modules.
//!
//! - **URL validation**: provider base URLs must not leak API keys over plain HTTP

mod url_validator;

pub use url_validator::{validate_base_url, UrlValidationError};
