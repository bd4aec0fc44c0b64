//! Process-wide open configuration.
//!
//! Read from `LIBLOADER_BIND` / `LIBLOADER_SCOPE` on first use and cached
//! for the life of the process. See `libloader_core::config` for the values.

use std::sync::atomic::{AtomicU8, Ordering};

use libloader_core::config::{ENV_BIND, ENV_SCOPE, OpenConfig};

// 0 = unresolved, RESOLVING while one thread reads the environment, anything
// else is an `OpenConfig::pack` value (always has bit 7 set).
static CACHED: AtomicU8 = AtomicU8::new(UNRESOLVED);

const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 0x40;

/// The configured open mode (reads the environment on first call).
///
/// A concurrent caller that arrives while another thread is resolving gets
/// the default configuration instead of waiting.
#[must_use]
pub fn open_config() -> OpenConfig {
    let cached = CACHED.load(Ordering::Acquire);
    if let Some(cfg) = OpenConfig::unpack(cached) {
        return cfg;
    }
    if cached == RESOLVING {
        return OpenConfig::default();
    }

    if CACHED
        .compare_exchange(UNRESOLVED, RESOLVING, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        return OpenConfig::unpack(CACHED.load(Ordering::Acquire)).unwrap_or_default();
    }

    let bind = std::env::var(ENV_BIND).ok();
    let scope = std::env::var(ENV_SCOPE).ok();
    let cfg = OpenConfig::from_env_values(bind.as_deref(), scope.as_deref());
    CACHED.store(cfg.pack(), Ordering::Release);
    cfg
}

/// Pin the cached configuration, bypassing the environment.
pub fn set_open_config_for_tests(cfg: OpenConfig) {
    CACHED.store(cfg.pack(), Ordering::Release);
}

/// Forget the cached configuration so the next call re-reads the environment.
pub fn reset_open_config_for_tests() {
    CACHED.store(UNRESOLVED, Ordering::Release);
}
