//! ABR Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Types and utilities shared by the ABR loader workspace members:
//!
//! - **Error handling**: [`AbrError`] and the [`Result`] alias
//! - **Logging**: centralized `tracing` setup in [`logging`]
//! - **Identifiers**: the [`Abn`] business identifier
//! - **Text**: search normalization for name fields in [`text`]

pub mod error;
pub mod logging;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use error::{AbrError, Result};
pub use text::normalize_name;
pub use types::Abn;
