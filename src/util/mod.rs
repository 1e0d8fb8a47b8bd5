//! Shared helpers.
//!
//! - **URL validation**: member-submitted URLs are fetched by the server, so
//!   they are validated against SSRF (scheme allow-list, no private or
//!   loopback addresses) before any request is made.
//! - **Text helpers**: char-counted truncation and the word-boundary term
//!   matcher used for content warnings.

mod net;
mod text;

pub use net::{validate_url, UrlValidationError};
pub use text::{contains_word, truncate_chars};
