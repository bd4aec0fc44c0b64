// All extern "C" exports accept raw pointers from C callers and document the
// null contract on each function.
#![allow(clippy::missing_safety_doc)]
//! # libloader-abi
//!
//! C ABI for libloader.
//!
//! Every failure collapses to a null (or `false`) return; no export panics
//! across the boundary. Strings handed out (diagnostics) are allocated through
//! the libloader allocator and must be released with `libloader_mem_free`.
//!
//! ```text
//! C caller -> libloader_* export (this crate) -> libloader::LibraryLoader -> backend
//! ```

pub mod loader_abi;
pub mod mem_abi;

pub use loader_abi::*;
pub use mem_abi::*;
