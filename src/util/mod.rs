//! Utility functions for common operations.
//!
//! - **Text**: character-count truncation for stored titles, control-char
//!   stripping for terminal output
//! - **URL validation**: scheme and host checks for newly registered feeds

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_chars};
pub use url_validator::{validate_url, HostPolicy, UrlValidationError};
