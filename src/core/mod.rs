//! Core constants, error types and injected interfaces.

mod constants;
mod error;
#[cfg(any(feature = "client", feature = "server"))]
mod problem;
mod traits;

pub use constants::*;
pub use error::*;
#[cfg(any(feature = "client", feature = "server"))]
pub use problem::*;
pub use traits::*;
