//! Sphinx HMAC - Wire codec
//!
//! - **Canonical messages**: [`CanonicalMessage`] builds the exact bytes each
//!   message kind is signed over
//! - **Tokens**: [`AuthToken`] encodes and strictly decodes the versioned
//!   `:`-delimited token
//! - **URI mode**: [`append_token`] / [`split_token`] place the token in the
//!   query string

mod canonical;
mod token;
mod uri;

pub use canonical::*;
pub use token::*;
pub use uri::*;
