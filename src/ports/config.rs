//! # Engine/AOT configuration (C11, ambient)
//!
//! Constructed explicitly at process start and threaded down to the engine
//! and wrapper — no global `OnceCell`/`lazy_static` singleton, matching the
//! teacher's "construct at runtime start and pass down" convention for its
//! own `VmConfig`/`ServiceConfig`.

use crate::domain::invariants::limits;
use std::path::PathBuf;

/// Tunables the wrapper and engine consult on every run.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum nested `Call`/`CallCode`/`DelegateCall`/`Create` depth.
    pub call_create_depth: u16,
    /// Hard bound on the engine's frame stack.
    pub max_frames: usize,
    /// Maximum runtime code size accepted after `Create`'s constructor.
    pub max_code_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_create_depth: limits::CALL_CREATE_DEPTH,
            max_frames: limits::MAX_FRAMES,
            max_code_size: limits::MAX_CODE_SIZE,
        }
    }
}

/// AOT subsystem configuration, loaded from environment variables.
#[derive(Clone, Debug)]
pub struct AotConfig {
    /// Whether the AOT loader is active at all.
    pub enabled: bool,
    /// Directory compiled shared objects and C sources are written to.
    pub root: PathBuf,
    /// Whether generated C source is retained alongside the `.so` for
    /// inspection, or discarded once compilation succeeds.
    pub keep_csource: bool,
}

impl Default for AotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: PathBuf::from("/tmp/aots"),
            keep_csource: false,
        }
    }
}

impl AotConfig {
    /// Reads `TCVM_AOTS_ENABLE`/`TCVM_AOTS_ROOT`/`TCVM_AOTS_KEEP_CSOURCE`
    /// from the process environment, falling back to the documented
    /// defaults (§6.5) for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let enabled = std::env::var("TCVM_AOTS_ENABLE")
            .map(|v| v == "1")
            .unwrap_or(false);
        let root = std::env::var("TCVM_AOTS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp/aots"));
        let keep_csource = std::env::var("TCVM_AOTS_KEEP_CSOURCE")
            .map(|v| v != "0")
            .unwrap_or(false);
        Self {
            enabled,
            root,
            keep_csource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults_match_limits() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.call_create_depth, limits::CALL_CREATE_DEPTH);
        assert_eq!(cfg.max_frames, limits::MAX_FRAMES);
        assert_eq!(cfg.max_code_size, limits::MAX_CODE_SIZE);
    }

    #[test]
    fn aot_config_defaults_to_disabled() {
        let cfg = AotConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.root, PathBuf::from("/tmp/aots"));
        assert!(!cfg.keep_csource);
    }
}
