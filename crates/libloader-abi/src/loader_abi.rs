//! ABI layer for the loader handle.
//!
//! `libloader_new`, `libloader_get_symbol`, `libloader_get_last_error`,
//! `libloader_is_ref_counted`, `libloader_free`. Handles are opaque
//! `LoaderState` pointers owned by the caller between `new` and `free`.

use std::ffi::{CStr, c_char, c_void};
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use libloader::{LibraryLoader, LoaderState, MemString};

/// Borrow a caller-owned handle without taking ownership.
///
/// # Safety
///
/// `handle` must be a live pointer from `libloader_new`.
unsafe fn borrow_handle(handle: NonNull<LoaderState>) -> ManuallyDrop<LibraryLoader> {
    // SAFETY: forwarded caller contract; ManuallyDrop keeps ownership with C.
    ManuallyDrop::new(unsafe { LibraryLoader::from_raw(handle) })
}

// ---------------------------------------------------------------------------
// libloader_new
// ---------------------------------------------------------------------------

/// Load the shared library at `path`.
///
/// Returns null for a null or empty path, a missing file, a file that is not
/// a loadable image, or an allocation failure. No diagnostic is available for
/// a failed load.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn libloader_new(path: *const c_char) -> *mut LoaderState {
    if path.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: non-null path from a C caller is NUL-terminated.
    let path = unsafe { CStr::from_ptr(path) };
    match LibraryLoader::from_c_str(path) {
        Ok(loader) => loader.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ---------------------------------------------------------------------------
// libloader_get_symbol
// ---------------------------------------------------------------------------

/// Resolve `name` in `handle`.
///
/// Returns null if the symbol is absent (the handle's diagnostic is
/// refreshed). A null `handle` or `name` returns null with no side effect.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn libloader_get_symbol(
    handle: *mut LoaderState,
    name: *const c_char,
) -> *mut c_void {
    let Some(handle) = NonNull::new(handle) else {
        return ptr::null_mut();
    };
    if name.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: caller passes a live handle and a NUL-terminated name.
    let mut loader = unsafe { borrow_handle(handle) };
    let name = unsafe { CStr::from_ptr(name) };
    loader
        .get_symbol(name)
        .map_or(ptr::null_mut(), |sym| sym.as_ptr())
}

// ---------------------------------------------------------------------------
// libloader_get_last_error
// ---------------------------------------------------------------------------

/// Copy of the handle's latest diagnostic, owned by the caller and released
/// with `libloader_mem_free`. Null if `handle` is null, nothing has failed on
/// it, or the copy could not be allocated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn libloader_get_last_error(handle: *const LoaderState) -> *mut c_char {
    let Some(handle) = NonNull::new(handle.cast_mut()) else {
        return ptr::null_mut();
    };
    // SAFETY: caller passes a live handle.
    let loader = unsafe { borrow_handle(handle) };
    loader
        .last_error()
        .map_or(ptr::null_mut(), MemString::into_raw)
}

// ---------------------------------------------------------------------------
// libloader_is_ref_counted
// ---------------------------------------------------------------------------

/// Whether repeated loads of one path share a counted OS handle.
#[unsafe(no_mangle)]
pub extern "C" fn libloader_is_ref_counted() -> bool {
    libloader::is_ref_counted()
}

// ---------------------------------------------------------------------------
// libloader_free
// ---------------------------------------------------------------------------

/// Close `handle` and release everything it owns. Null is a no-op; freeing a
/// handle twice is undefined behavior.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn libloader_free(handle: *mut LoaderState) {
    let Some(handle) = NonNull::new(handle) else {
        return;
    };
    // SAFETY: caller hands back ownership of a live handle.
    unsafe { LibraryLoader::from_raw(handle) }.close();
}
