//! Windows backend: `LoadLibraryW`/`GetProcAddress`/`FreeLibrary`.
//!
//! Paths arrive as UTF-8 and are re-encoded as UTF-16 for `LoadLibraryW`;
//! symbol names stay narrow, as `GetProcAddress` only takes ANSI names.

use std::cell::Cell;
use std::ffi::{CStr, c_void};
use std::ptr::NonNull;

use windows::Win32::Foundation::{GetLastError, HMODULE};
use windows::Win32::System::Diagnostics::Debug::{
    FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageA,
    SEM_FAILCRITICALERRORS, SetErrorMode, THREAD_ERROR_MODE,
};
use libloader_core::LoaderError;
use windows::Win32::System::LibraryLoader::{FreeLibrary, GetProcAddress, LoadLibraryW};
use windows::core::{PCSTR, PCWSTR, PSTR};

use super::NativeHandle;
use crate::mem::{MemString, MemWideString};

pub(crate) const IS_REF_COUNTED: bool = true;

const FACILITY_WIN32: i32 = 7;

thread_local! {
    // Win32 code of the last failure on this thread, captured before any
    // other API call can overwrite GetLastError.
    static LAST_CODE: Cell<u32> = const { Cell::new(0) };
}

/// Suppresses the critical-error dialog for as long as it lives and restores
/// the previous error mode on every exit path.
struct ErrorModeGuard {
    previous: THREAD_ERROR_MODE,
}

impl ErrorModeGuard {
    fn suppress_critical_errors() -> Self {
        // SAFETY: SetErrorMode has no preconditions.
        let previous = unsafe { SetErrorMode(SEM_FAILCRITICALERRORS) };
        Self {
            previous: THREAD_ERROR_MODE(previous),
        }
    }
}

impl Drop for ErrorModeGuard {
    fn drop(&mut self) {
        // SAFETY: restores the mode captured on acquisition.
        unsafe { SetErrorMode(self.previous) };
    }
}

pub(crate) unsafe fn open(path: &CStr) -> Result<Option<NativeHandle>, LoaderError> {
    let wide = MemWideString::from_utf8(path.to_bytes())?;
    let result = {
        let _mode = ErrorModeGuard::suppress_critical_errors();
        // SAFETY: `wide` is NUL-terminated UTF-16; DllMain runs at the
        // caller's request.
        unsafe { LoadLibraryW(PCWSTR(wide.as_ptr())) }
    };
    Ok(match result {
        Ok(module) => NonNull::new(module.0),
        Err(err) => {
            let hr = err.code().0;
            let code = if (hr >> 16) & 0x1fff == FACILITY_WIN32 {
                (hr & 0xffff) as u32
            } else {
                hr as u32
            };
            LAST_CODE.with(|c| c.set(code));
            None
        }
    })
}

pub(crate) unsafe fn symbol(native: NativeHandle, name: &CStr) -> Option<NonNull<c_void>> {
    // SAFETY: `native` is a live module handle and `name` is NUL-terminated.
    let proc = unsafe { GetProcAddress(HMODULE(native.as_ptr()), PCSTR(name.as_ptr().cast())) };
    match proc {
        Some(f) => NonNull::new(f as *mut c_void),
        None => {
            // SAFETY: GetLastError has no preconditions.
            let code = unsafe { GetLastError() }.0;
            LAST_CODE.with(|c| c.set(code));
            None
        }
    }
}

pub(crate) unsafe fn close(native: NativeHandle) {
    // SAFETY: `native` is a live module handle, released once.
    let _ = unsafe { FreeLibrary(HMODULE(native.as_ptr())) };
}

pub(crate) fn diagnostic() -> Option<MemString> {
    let code = LAST_CODE.with(|c| c.replace(0));
    if code == 0 {
        return None;
    }
    let mut buf = [0_u8; 512];
    // SAFETY: `buf` is writable for its full length; no insert arguments.
    let written = unsafe {
        FormatMessageA(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            code,
            0,
            PSTR(buf.as_mut_ptr()),
            buf.len() as u32,
            None,
        )
    } as usize;
    let text = buf[..written.min(buf.len())].trim_ascii_end();
    if text.is_empty() {
        return None;
    }
    MemString::from_bytes(text).ok()
}

#[cfg(test)]
mod tests {
    use windows::Win32::System::Diagnostics::Debug::{GetErrorMode, SEM_NOOPENFILEERRORBOX};

    use super::*;
    use crate::TEST_LOCK;

    #[test]
    fn failed_open_restores_error_mode() {
        let _lock = TEST_LOCK.lock();
        let path = std::env::temp_dir().join(format!(
            "libloader-win32-empty-{}.dll",
            std::process::id()
        ));
        std::fs::write(&path, b"").unwrap();
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();

        // SAFETY: plain error-mode bookkeeping.
        let original = unsafe { SetErrorMode(SEM_NOOPENFILEERRORBOX) };
        assert!(unsafe { open(&c_path) }.unwrap().is_none());
        assert_eq!(unsafe { GetErrorMode() }, SEM_NOOPENFILEERRORBOX.0);
        assert!(diagnostic().is_some());
        unsafe { SetErrorMode(THREAD_ERROR_MODE(original)) };

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn non_ascii_path_reaches_the_loader_intact() {
        let _lock = TEST_LOCK.lock();
        let dir = std::env::temp_dir().join(format!("libloader-biblioth\u{e8}que-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("msvcrt.dll");
        let system = std::path::Path::new(&std::env::var("SystemRoot").unwrap())
            .join("System32")
            .join("msvcrt.dll");
        std::fs::copy(&system, &target).unwrap();
        let c_path = std::ffi::CString::new(target.to_str().unwrap()).unwrap();

        let native = unsafe { open(&c_path) }.unwrap().expect("non-ASCII path loads");
        assert!(unsafe { symbol(native, c"free") }.is_some());
        unsafe { close(native) };

        let _ = std::fs::remove_dir_all(&dir);
    }
}
