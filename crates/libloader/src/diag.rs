//! Per-handle diagnostic channel.

use std::ffi::CStr;

use libloader_core::LoaderError;

use crate::backend;
use crate::mem::MemString;

/// Latest failure text recorded for one loader handle.
///
/// Each recorded failure replaces the previous text, which is released
/// immediately.
#[derive(Debug, Default)]
pub(crate) struct Diagnostic {
    text: Option<MemString>,
}

impl Diagnostic {
    /// Record the backend's description of the failure that just happened.
    ///
    /// Must be called right after the failing native call: some loaders keep
    /// only a thread-local latest error. When the backend has nothing to say,
    /// the description of `fallback` is stored instead. If even that copy
    /// cannot be allocated the channel ends up empty rather than stale.
    pub(crate) fn record_failure(&mut self, fallback: LoaderError) {
        let fresh = backend::diagnostic()
            .or_else(|| MemString::from_bytes(fallback.message().as_bytes()).ok());
        self.text = fresh;
    }

    /// A caller-owned copy of the current text.
    pub(crate) fn copy_out(&self) -> Option<MemString> {
        self.text
            .as_ref()
            .and_then(|text| MemString::from_c_str(text.as_c_str()).ok())
    }

    pub(crate) fn peek(&self) -> Option<&CStr> {
        self.text.as_ref().map(MemString::as_c_str)
    }
}
