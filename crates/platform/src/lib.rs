//! # Skiff Platform
//!
//! Core platform types shared by the crates of the skiff file-transfer
//! toolkit.
//!
//! This crate provides:
//! - Unified error types (`Error`, `Result`)
//!
//! # Examples
//!
//! ```
//! use skiff_platform::{Error, Result};
//!
//! fn example_function() -> Result<String> {
//!     Ok("Hello, skiff!".to_string())
//! }
//!
//! # fn main() -> Result<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, skiff!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{Error, Result};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
