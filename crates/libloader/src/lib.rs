//! # libloader
//!
//! Runtime loading of shared libraries behind one contract on every
//! supported OS loader (POSIX `dlopen`, Windows `LoadLibrary`, AIX archive
//! members, HP-UX `shl_load`).
//!
//! ```text
//! LibraryLoader::new(path) -> mem (handle + path copy) -> backend::open
//! get_symbol(name)         -> backend::symbol -> diagnostic on miss
//! close / drop             -> backend::close  -> mem::free
//! ```
//!
//! Every allocation made here goes through [`mem`], whose allocator can be
//! swapped for failure injection. Allocation failure is reported as
//! [`LoaderError::AllocationFailure`], never as a panic or abort, and never
//! leaves a native handle open.

#![allow(clippy::missing_safety_doc)]

mod backend;
pub mod config;
mod diag;
pub mod loader;
pub mod mem;

pub use libloader_core::{LoaderError, Platform};
pub use loader::{LibraryLoader, LoaderState, Symbol};
pub use mem::{MemString, MemVTable, MemWideString, VTableGuard};

pub use backend::{IS_REF_COUNTED, PLATFORM};

/// Whether the compiled backend shares one counted OS handle across repeated
/// opens of the same path. Constant for the life of the process.
#[must_use]
pub const fn is_ref_counted() -> bool {
    backend::IS_REF_COUNTED
}

/// [`is_ref_counted`], flagged as non-authoritative on backends where the
/// answer must not be relied upon (HP-UX).
pub const fn ref_count_query() -> Result<bool, LoaderError> {
    backend::PLATFORM.ref_count_query()
}

#[cfg(test)]
pub(crate) static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());
