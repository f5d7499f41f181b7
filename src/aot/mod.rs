//! # AOT loader (C9, optional)
//!
//! Background compilation of validated WASM modules into native shared
//! objects, gated entirely behind the `aot` cargo feature and the
//! `TCVM_AOTS_ENABLE` environment variable (§6.5) — when either is off, the
//! engine runs every frame interpreted and this subsystem is never
//! constructed.
//!
//! Mirrors the design's three tables (§3/§4.9) — `succ` (loaded handles),
//! `onDelete` (pending teardown) and `black` (permanent compile failures)
//! — plus the background worker that refreshes newly observed contracts,
//! runs the 5-minute idle sweep and 10-second GC sweep, and shuts down on
//! a quit signal.
//!
//! `generate_c_source`'s `thunderchain_main` stub forwards to a host
//! trampoline rather than lowering WASM opcodes itself; real opcode
//! lowering is the same kind of external, non-redesigned toolchain
//! dependency §1 already carves out for "module decoding, the bytecode
//! interpreter loop" — this subsystem's own scope is the compile/load/
//! evict lifecycle around whatever artifact that toolchain produces, which
//! is what's implemented (and tested) here.

mod compiler;
mod tables;
mod worker;

pub use compiler::{compile, generate_c_source, CompiledArtifact};
pub use tables::{NativeEntry, NativeHandle, Tables};
pub use worker::RefreshRequest;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::ports::config::AotConfig;
use crate::ports::outbound::StateAccess;

/// Failures from the compile/load flow. None of these propagate to a
/// guest invocation — a failure here only means the contract keeps running
/// interpreted, logged at debug level by the worker.
#[derive(Error, Debug, Clone)]
pub enum AotError {
    /// A prior compile attempt for this contract permanently failed.
    #[error("contract is AOT-blacklisted")]
    Blacklisted,
    /// `cc` (or the code-generation step before it) failed.
    #[error("AOT compile failed: {0}")]
    CompileFailed(String),
    /// The compiled shared object could not be loaded/linked.
    #[error("AOT load failed: {0}")]
    LoadFailed(String),
    /// A filesystem operation (write/read/remove) failed.
    #[error("AOT io error: {0}")]
    Io(String),
}

/// Handle to the AOT subsystem: the shared tables, plus the channels used
/// to talk to its background worker task.
pub struct AotLoader {
    tables: Arc<tables::Tables>,
    refresh_tx: mpsc::UnboundedSender<RefreshRequest>,
    quit_tx: watch::Sender<bool>,
}

impl AotLoader {
    /// Spawns the background worker and returns a handle to it. Does
    /// nothing (and the worker task exits immediately) unless
    /// `config.enabled` — callers should still construct one unconditionally
    /// and let `notify`/`acquire` no-op, matching how the design treats the
    /// subsystem as present-but-inert rather than optionally absent from
    /// the engine's wiring.
    #[must_use]
    pub fn spawn(config: AotConfig, state: Arc<dyn StateAccess>) -> Self {
        let tables = tables::Tables::new();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (quit_tx, quit_rx) = watch::channel(false);

        if config.enabled {
            let tables = tables.clone();
            tokio::spawn(worker::run(tables, state, config, refresh_rx, quit_rx));
        }

        Self {
            tables,
            refresh_tx,
            quit_tx,
        }
    }

    /// Enqueues `name`/`code` for background compilation. A no-op (beyond
    /// the channel send, which is dropped if the worker already exited) when
    /// AOT is disabled, since nothing ever reads the channel in that case.
    pub fn notify(&self, name: &str, code: &[u8]) {
        let _ = self.refresh_tx.send(RefreshRequest {
            name: name.to_string(),
            code: code.to_vec(),
        });
    }

    /// Acquires a reference-counted handle onto `name`'s loaded native
    /// artifact, if one is ready. `None` means: not yet compiled, still
    /// compiling, blacklisted, or AOT disabled — in every case the caller
    /// falls back to interpreted execution.
    #[must_use]
    pub fn acquire(&self, name: &str) -> Option<tables::NativeHandle> {
        self.tables.acquire(name)
    }

    /// Evicts `name` immediately (self-destruct, code upgrade) rather than
    /// waiting for the idle sweep.
    pub fn evict(&self, name: &str) {
        self.tables.mark_for_delete(name);
    }

    /// Signals the background worker to stop after its current iteration.
    pub fn shutdown(&self) {
        let _ = self.quit_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Address, BigInt};
    use crate::errors::StateError;
    use crate::ports::outbound::ContractInfo;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct SideTableState {
        info: Mutex<HashMap<String, ContractInfo>>,
    }

    #[async_trait]
    impl StateAccess for SideTableState {
        async fn get_account(&self, _: Address) -> Result<Option<crate::domain::entities::Account>, StateError> {
            Ok(None)
        }
        async fn create_account(&self, _: Address) -> Result<(), StateError> {
            Ok(())
        }
        async fn set_balance(&self, _: Address, _: BigInt) -> Result<(), StateError> {
            Ok(())
        }
        async fn sub_balance(&self, _: Address, _: BigInt) -> Result<(), StateError> {
            Ok(())
        }
        async fn add_balance(&self, _: Address, _: BigInt) -> Result<(), StateError> {
            Ok(())
        }
        async fn set_token_balance(&self, _: Address, _: Address, _: BigInt) -> Result<(), StateError> {
            Ok(())
        }
        async fn sub_token_balance(&self, _: Address, _: Address, _: BigInt) -> Result<(), StateError> {
            Ok(())
        }
        async fn add_token_balance(&self, _: Address, _: Address, _: BigInt) -> Result<(), StateError> {
            Ok(())
        }
        async fn get_token_balances(&self, _: Address) -> Result<Vec<(Address, BigInt)>, StateError> {
            Ok(Vec::new())
        }
        async fn set_nonce(&self, _: Address, _: u64) -> Result<(), StateError> {
            Ok(())
        }
        async fn get_code(&self, _: Address) -> Result<crate::domain::value_objects::Bytes, StateError> {
            Ok(crate::domain::value_objects::Bytes::new())
        }
        async fn set_code(&self, _: Address, _: crate::domain::value_objects::Bytes) -> Result<(), StateError> {
            Ok(())
        }
        async fn get_storage(
            &self,
            _: Address,
            _: crate::domain::value_objects::StorageKey,
        ) -> Result<crate::domain::value_objects::StorageValue, StateError> {
            Ok(crate::domain::value_objects::StorageValue::ZERO)
        }
        async fn set_storage(
            &self,
            _: Address,
            _: crate::domain::value_objects::StorageKey,
            _: crate::domain::value_objects::StorageValue,
        ) -> Result<(), StateError> {
            Ok(())
        }
        async fn suicide(&self, _: Address) -> Result<(), StateError> {
            Ok(())
        }
        async fn has_suicided(&self, _: Address) -> Result<bool, StateError> {
            Ok(false)
        }
        async fn snapshot(&self) -> Result<u64, StateError> {
            Ok(0)
        }
        async fn revert_to_snapshot(&self, _: u64) -> Result<(), StateError> {
            Ok(())
        }
        async fn add_log(&self, _: crate::domain::entities::Log) -> Result<(), StateError> {
            Ok(())
        }
        async fn logs(&self) -> Result<Vec<crate::domain::entities::Log>, StateError> {
            Ok(Vec::new())
        }
        async fn tx_hash(&self) -> Result<crate::domain::value_objects::Hash, StateError> {
            Ok(crate::domain::value_objects::Hash::ZERO)
        }
        async fn get_contract_info(&self, name: &str) -> Result<Option<ContractInfo>, StateError> {
            Ok(self.info.lock().unwrap().get(name).cloned())
        }
        async fn set_contract_info(&self, name: &str, info: ContractInfo) -> Result<(), StateError> {
            self.info.lock().unwrap().insert(name.to_string(), info);
            Ok(())
        }
    }

    #[tokio::test]
    async fn disabled_loader_never_loads_anything() {
        let loader = AotLoader::spawn(
            AotConfig {
                enabled: false,
                ..AotConfig::default()
            },
            Arc::new(SideTableState { info: Mutex::new(HashMap::new()) }),
        );
        loader.notify("0xabc", b"\0asm\x01\0\0\0");
        // Give a disabled worker (which never spawned) no chance to react;
        // the point under test is that nothing panics and nothing loads.
        assert!(loader.acquire("0xabc").is_none());
        loader.shutdown();
    }

    #[tokio::test]
    async fn ensure_loaded_reuses_a_side_table_record_with_matching_md5() {
        let tables = tables::Tables::new();
        let code = b"\0asm\x01\0\0\0".to_vec();
        let state: Arc<dyn StateAccess> = Arc::new(SideTableState { info: Mutex::new(HashMap::new()) });
        let config = AotConfig {
            enabled: true,
            root: std::env::temp_dir().join("thunderchain-aot-tests"),
            keep_csource: false,
        };

        // Seed a side-table record pointing at a real (if trivial) file so
        // the "path.is_file()" check passes without invoking `cc`.
        let artifact_path = config.root.join("0xabc.so");
        std::fs::create_dir_all(&config.root).unwrap();
        std::fs::write(&artifact_path, b"not really an .so").unwrap();
        let md5 = format!("{:x}", md5::compute(&code));
        state
            .set_contract_info(
                "cfso:0xabc",
                ContractInfo {
                    kind: "wasm".to_string(),
                    path: artifact_path.display().to_string(),
                    md5,
                    err: None,
                },
            )
            .await
            .unwrap();

        let result = worker::ensure_loaded(&tables, &state, &config, "0xabc", &code).await;
        assert!(result.is_ok());
        assert_eq!(tables.loaded_len(), 1);

        let _ = std::fs::remove_file(&artifact_path);
    }

    #[tokio::test]
    async fn ensure_loaded_blacklists_after_a_failed_compile() {
        let tables = tables::Tables::new();
        let code = b"\0asm\x01\0\0\0".to_vec();
        let state: Arc<dyn StateAccess> = Arc::new(SideTableState { info: Mutex::new(HashMap::new()) });
        // A root that can never be created (nested under a file) forces
        // `compiler::compile`'s `create_dir_all` to fail deterministically
        // without depending on whether `cc` is on PATH in the test
        // environment.
        let blocking_file = std::env::temp_dir().join("thunderchain-aot-blocker");
        std::fs::write(&blocking_file, b"x").unwrap();
        let config = AotConfig {
            enabled: true,
            root: blocking_file.join("root"),
            keep_csource: false,
        };

        let result = worker::ensure_loaded(&tables, &state, &config, "0xdef", &code).await;
        assert!(result.is_err());
        assert!(tables.is_blacklisted("0xdef"));

        let second = worker::ensure_loaded(&tables, &state, &config, "0xdef", &code).await;
        assert!(matches!(second, Err(AotError::Blacklisted)));

        let _ = std::fs::remove_file(&blocking_file);
    }
}
