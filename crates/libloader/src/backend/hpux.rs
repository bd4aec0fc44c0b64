//! HP-UX backend: `shl_load`/`shl_findsym`/`shl_unload`.
//!
//! The HP-UX loader does not reference-count repeated loads of one path;
//! callers must not rely on handle aliasing here.

use std::ffi::{CStr, c_char, c_int, c_long, c_short, c_void};
use std::ptr::NonNull;

use libloader_core::LoaderError;

use super::NativeHandle;
use crate::mem::MemString;

pub(crate) const IS_REF_COUNTED: bool = false;

type ShlT = *mut c_void;

// <dl.h>
const BIND_IMMEDIATE: c_int = 0x0;
const BIND_NONFATAL: c_int = 0x8;
const DYNAMIC_PATH: c_int = 0x400;
const TYPE_UNDEFINED: c_short = 0;

unsafe extern "C" {
    fn shl_load(path: *const c_char, flags: c_int, address: c_long) -> ShlT;
    fn shl_findsym(
        handle: *mut ShlT,
        sym: *const c_char,
        sym_type: c_short,
        value: *mut *mut c_void,
    ) -> c_int;
    fn shl_unload(handle: ShlT) -> c_int;
    fn strerror(errnum: c_int) -> *mut c_char;
}

pub(crate) unsafe fn open(path: &CStr) -> Result<Option<NativeHandle>, LoaderError> {
    // SAFETY: `path` is NUL-terminated; initializers run at the caller's request.
    Ok(NonNull::new(unsafe {
        shl_load(
            path.as_ptr(),
            BIND_IMMEDIATE | BIND_NONFATAL | DYNAMIC_PATH,
            0,
        )
    }))
}

pub(crate) unsafe fn symbol(native: NativeHandle, name: &CStr) -> Option<NonNull<c_void>> {
    let mut handle: ShlT = native.as_ptr();
    let mut addr: *mut c_void = std::ptr::null_mut();
    // SAFETY: `handle` is a live shl_t and both out-pointers are valid locals.
    let rc = unsafe { shl_findsym(&mut handle, name.as_ptr(), TYPE_UNDEFINED, &mut addr) };
    if rc != 0 {
        return None;
    }
    NonNull::new(addr)
}

pub(crate) unsafe fn close(native: NativeHandle) {
    // SAFETY: `native` is a live shl_t, unloaded once.
    unsafe { shl_unload(native.as_ptr()) };
}

pub(crate) fn diagnostic() -> Option<MemString> {
    let errnum = std::io::Error::last_os_error().raw_os_error()?;
    // SAFETY: strerror returns a static or thread-local NUL-terminated string.
    let msg = unsafe { strerror(errnum) };
    if msg.is_null() {
        return None;
    }
    // SAFETY: non-null strerror result.
    MemString::from_c_str(unsafe { CStr::from_ptr(msg) }).ok()
}
