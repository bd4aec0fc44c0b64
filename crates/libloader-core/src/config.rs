//! Open-mode configuration values.
//!
//! The POSIX-like and AIX backends honour two environment variables:
//! - `LIBLOADER_BIND`: `now` (default) resolves every undefined symbol at
//!   load time; `lazy` defers function binding to first call.
//! - `LIBLOADER_SCOPE`: `local` (default) keeps the library's symbols out of
//!   the global namespace; `global` makes them available to later loads.
//!
//! Parsing lives here; the cached process-wide value lives in
//! `libloader::config`.

/// Environment variable selecting the binding mode.
pub const ENV_BIND: &str = "LIBLOADER_BIND";
/// Environment variable selecting the symbol scope.
pub const ENV_SCOPE: &str = "LIBLOADER_SCOPE";

/// When undefined symbols of a loaded image are bound.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindMode {
    /// Resolve everything before the open returns. Missing dependencies fail
    /// the open instead of a later call.
    #[default]
    Now,
    /// Bind functions on first use.
    Lazy,
}

impl BindMode {
    /// Parse from string (case-insensitive). Unknown values yield `Now`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazy" | "deferred" => Self::Lazy,
            _ => Self::Now,
        }
    }
}

/// Visibility of a loaded image's symbols to subsequently loaded images.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolScope {
    #[default]
    Local,
    Global,
}

impl SymbolScope {
    /// Parse from string (case-insensitive). Unknown values yield `Local`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "shared" => Self::Global,
            _ => Self::Local,
        }
    }
}

/// Resolved open configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenConfig {
    pub bind: BindMode,
    pub scope: SymbolScope,
}

// Packed form for lock-free caching: bit 0 = lazy, bit 1 = global, bit 7 set
// on every resolved value so that zero means "unresolved".
const PACKED_RESOLVED: u8 = 0x80;
const PACKED_LAZY: u8 = 0x01;
const PACKED_GLOBAL: u8 = 0x02;

impl OpenConfig {
    /// Build from raw environment values; `None` means unset.
    #[must_use]
    pub fn from_env_values(bind: Option<&str>, scope: Option<&str>) -> Self {
        Self {
            bind: bind.map(BindMode::from_str_loose).unwrap_or_default(),
            scope: scope.map(SymbolScope::from_str_loose).unwrap_or_default(),
        }
    }

    /// Encode into a non-zero byte.
    #[must_use]
    pub const fn pack(self) -> u8 {
        let mut v = PACKED_RESOLVED;
        if matches!(self.bind, BindMode::Lazy) {
            v |= PACKED_LAZY;
        }
        if matches!(self.scope, SymbolScope::Global) {
            v |= PACKED_GLOBAL;
        }
        v
    }

    /// Decode a byte produced by [`OpenConfig::pack`]. Returns `None` for the
    /// unresolved marker.
    #[must_use]
    pub const fn unpack(v: u8) -> Option<Self> {
        if v & PACKED_RESOLVED == 0 {
            return None;
        }
        Some(Self {
            bind: if v & PACKED_LAZY != 0 {
                BindMode::Lazy
            } else {
                BindMode::Now
            },
            scope: if v & PACKED_GLOBAL != 0 {
                SymbolScope::Global
            } else {
                SymbolScope::Local
            },
        })
    }
}
