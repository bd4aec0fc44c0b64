//! Native loader backends.
//!
//! Exactly one backend is compiled in, selected by build target:
//!
//! | target | module | ref-counted |
//! |---|---|---|
//! | `unix` (other than AIX/HP-UX) | `posix` | yes |
//! | `aix` | `aix` | yes |
//! | `hpux` | `hpux` | no |
//! | `windows` | `win32` | yes |
//!
//! Every backend exposes the same free functions over a [`NativeHandle`]:
//! `open`, `symbol`, `close`, `diagnostic`, plus the `IS_REF_COUNTED`
//! constant. All text they hand back is copied into allocator-owned memory.
//!
//! `open` returns `Ok(None)` when the native loader refuses the path and
//! `Err` only when the backend could not prepare the call (re-encoding the
//! path for a wide API).

use std::ffi::c_void;
use std::ptr::NonNull;

use libloader_core::Platform;

/// Opaque OS loader handle (`void *` from `dlopen`/`shl_load`, `HMODULE`).
pub(crate) type NativeHandle = NonNull<c_void>;

#[cfg(all(unix, not(target_os = "hpux")))]
mod dl;

#[cfg(all(unix, not(any(target_os = "aix", target_os = "hpux"))))]
mod posix;
#[cfg(all(unix, not(any(target_os = "aix", target_os = "hpux"))))]
use posix as imp;

#[cfg(target_os = "aix")]
mod aix;
#[cfg(target_os = "aix")]
use aix as imp;

#[cfg(target_os = "hpux")]
mod hpux;
#[cfg(target_os = "hpux")]
use hpux as imp;

#[cfg(windows)]
mod win32;
#[cfg(windows)]
use win32 as imp;

#[cfg(not(any(unix, windows)))]
compile_error!("libloader has no native loader backend for this target");

pub(crate) use imp::{close, diagnostic, open, symbol};

/// Whether the compiled backend shares one counted OS handle across repeated
/// opens of the same path.
pub const IS_REF_COUNTED: bool = imp::IS_REF_COUNTED;

/// Identity of the compiled backend.
pub const PLATFORM: Platform = Platform::current();

const _: () = assert!(IS_REF_COUNTED == PLATFORM.is_ref_counted());
