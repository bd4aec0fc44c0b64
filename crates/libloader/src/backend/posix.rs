//! POSIX-like backend: `dlopen`/`dlsym`/`dlclose`/`dlerror`.

use std::ffi::CStr;

use libloader_core::LoaderError;

use super::NativeHandle;

pub(crate) use super::dl::{close, diagnostic, symbol};

pub(crate) const IS_REF_COUNTED: bool = true;

/// Map the shared object at `path` into the process.
///
/// # Safety
///
/// Loading runs the image's initializers.
pub(crate) unsafe fn open(path: &CStr) -> Result<Option<NativeHandle>, LoaderError> {
    // SAFETY: forwarded caller contract.
    Ok(unsafe { super::dl::open_with_flags(path, 0) })
}
