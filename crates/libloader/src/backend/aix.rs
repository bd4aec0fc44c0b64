//! AIX backend.
//!
//! Shared objects are commonly members of archive files. A path of the form
//! `archive(member)` is opened with `RTLD_MEMBER`; plain paths behave as on
//! other POSIX systems.

use std::ffi::{CStr, c_int};

use libloader_core::{LoaderError, path};

use super::NativeHandle;

pub(crate) use super::dl::{close, diagnostic, symbol};

pub(crate) const IS_REF_COUNTED: bool = true;

// <dlfcn.h>: treat the path as `archive(member)`.
const RTLD_MEMBER: c_int = 0x0004_0000;

pub(crate) unsafe fn open(path: &CStr) -> Result<Option<NativeHandle>, LoaderError> {
    let extra = if path::is_archive_member(path.to_bytes()) {
        RTLD_MEMBER
    } else {
        0
    };
    // SAFETY: forwarded caller contract.
    Ok(unsafe { super::dl::open_with_flags(path, extra) })
}
