//! # libloader-core
//!
//! Platform-independent rules for the libloader dynamic library layer.
//!
//! Everything here is pure logic: the error taxonomy, path validation and
//! AIX archive-member decoration, the per-platform capability table and
//! parsing of runtime configuration values. The native `dlopen`/`LoadLibrary`
//! calls live in the `libloader` crate. No `unsafe` code is permitted here.

#![deny(unsafe_code)]

pub mod capability;
pub mod config;
pub mod error;
pub mod path;

pub use capability::Platform;
pub use error::LoaderError;
