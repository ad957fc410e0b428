//! Utility functions shared by the registry and the normalizer.
//!
//! - **URL validation**: absolute http(s) URLs, with an optional SSRF policy
//! - **Text processing**: control-character stripping and char-bounded truncation

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_chars};
pub use url_validator::{validate_url, UrlPolicy, UrlValidationError};
