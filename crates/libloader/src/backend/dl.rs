//! `dlopen` family shared by the POSIX and AIX backends.

use std::ffi::{CStr, c_int, c_void};
use std::ptr::NonNull;

use libloader_core::config::{BindMode, OpenConfig, SymbolScope};

use super::NativeHandle;
use crate::config::open_config;
use crate::mem::MemString;

/// `dlopen` mode bits for the configured bind mode and scope.
pub(super) fn mode_flags(cfg: OpenConfig) -> c_int {
    let bind = match cfg.bind {
        BindMode::Now => libc::RTLD_NOW,
        BindMode::Lazy => libc::RTLD_LAZY,
    };
    let scope = match cfg.scope {
        SymbolScope::Local => libc::RTLD_LOCAL,
        SymbolScope::Global => libc::RTLD_GLOBAL,
    };
    bind | scope
}

/// Drop any pending `dlerror` text so the next read belongs to our call.
fn clear_dlerror() {
    // SAFETY: dlerror has no preconditions.
    unsafe { libc::dlerror() };
}

pub(super) unsafe fn open_with_flags(path: &CStr, extra: c_int) -> Option<NativeHandle> {
    clear_dlerror();
    let flags = mode_flags(open_config()) | extra;
    // SAFETY: `path` is NUL-terminated; running the image's initializers is
    // the caller's decision.
    NonNull::new(unsafe { libc::dlopen(path.as_ptr(), flags) })
}

pub(crate) unsafe fn symbol(native: NativeHandle, name: &CStr) -> Option<NonNull<c_void>> {
    clear_dlerror();
    // SAFETY: `native` is a live handle returned by dlopen.
    NonNull::new(unsafe { libc::dlsym(native.as_ptr(), name.as_ptr()) })
}

pub(crate) unsafe fn close(native: NativeHandle) {
    // SAFETY: `native` is a live handle returned by dlopen, closed once.
    unsafe { libc::dlclose(native.as_ptr()) };
}

pub(crate) fn diagnostic() -> Option<MemString> {
    // SAFETY: dlerror returns null or a thread-local NUL-terminated string
    // that stays valid until the next dl* call on this thread.
    let msg = unsafe { libc::dlerror() };
    if msg.is_null() {
        return None;
    }
    // SAFETY: non-null dlerror result, copied before any further dl* call.
    MemString::from_c_str(unsafe { CStr::from_ptr(msg) }).ok()
}
