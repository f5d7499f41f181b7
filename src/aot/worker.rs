//! The AOT background worker (§4.9, §5): a single cooperative loop driven
//! by a refresh channel for newly observed contracts, a 5-minute idle
//! sweep, a 10-second GC sweep, and a quit signal — the same
//! channel/timer-driven adapter shape as `qc-16-api-gateway`'s event-bus
//! response router.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::ports::config::AotConfig;
use crate::ports::outbound::{ContractInfo, StateAccess};

use super::tables::{now_secs, Tables};
use super::{compiler, AotError};

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const IDLE_THRESHOLD_SECS: u64 = 60 * 60;
const IDLE_EVICT_CAP: usize = 3;
const GC_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// One contract newly observed by a running engine, enqueued for the
/// worker to compile (or re-verify) in the background.
pub struct RefreshRequest {
    pub name: String,
    pub code: Vec<u8>,
}

/// Drives the worker loop until `quit_rx` reports shutdown. Spawned once by
/// [`super::AotLoader::spawn`] as a detached `tokio` task.
pub(super) async fn run(
    tables: Arc<Tables>,
    state: Arc<dyn StateAccess>,
    config: AotConfig,
    mut refresh_rx: mpsc::UnboundedReceiver<RefreshRequest>,
    mut quit_rx: watch::Receiver<bool>,
) {
    let mut idle_sweep = tokio::time::interval(IDLE_SWEEP_INTERVAL);
    let mut gc_sweep = tokio::time::interval(GC_SWEEP_INTERVAL);

    loop {
        tokio::select! {
            biased;

            _ = quit_rx.changed() => {
                if *quit_rx.borrow() {
                    break;
                }
            }

            req = refresh_rx.recv() => {
                match req {
                    Some(req) => {
                        if let Err(e) = ensure_loaded(&tables, &state, &config, &req.name, &req.code).await {
                            tracing::debug!(name = %req.name, error = %e, "AOT compile failed, falling back to interpretation");
                        }
                    }
                    None => break,
                }
            }

            _ = idle_sweep.tick() => {
                let evicted = tables.sweep_idle(now_secs(), IDLE_THRESHOLD_SECS, IDLE_EVICT_CAP);
                if evicted > 0 {
                    tracing::debug!(evicted, "AOT idle sweep evicted entries");
                }
            }

            _ = gc_sweep.tick() => {
                tables.sweep_garbage();
            }
        }
    }
}

/// The load flow of §4.9: verify the side-table record (file exists, is a
/// regular file, and its recorded md5 matches the code actually on hand),
/// reusing it if so; otherwise (re)compile from scratch.
pub(super) async fn ensure_loaded(
    tables: &Arc<Tables>,
    state: &Arc<dyn StateAccess>,
    config: &AotConfig,
    name: &str,
    code: &[u8],
) -> Result<(), AotError> {
    if tables.is_blacklisted(name) {
        return Err(AotError::Blacklisted);
    }

    let key = format!("cfso:{name}");
    let wanted_md5 = format!("{:x}", md5::compute(code));

    if let Ok(Some(info)) = state.get_contract_info(&key).await {
        let path = std::path::Path::new(&info.path);
        if info.err.is_none() && info.md5 == wanted_md5 && path.is_file() {
            tables.record(name, path.to_path_buf(), info.md5, load_library(path));
            return Ok(());
        }
    }

    match compiler::compile(&config.root, name, code, config.keep_csource) {
        Ok(artifact) => {
            let info = ContractInfo {
                kind: "wasm".to_string(),
                path: artifact.path.display().to_string(),
                md5: artifact.md5.clone(),
                err: None,
            };
            let _ = state.set_contract_info(&key, info).await;
            tables.record(name, artifact.path.clone(), artifact.md5, load_library(&artifact.path));
            Ok(())
        }
        Err(e) => {
            tables.blacklist(name);
            let info = ContractInfo {
                kind: "wasm".to_string(),
                path: String::new(),
                md5: String::new(),
                err: Some(e.to_string()),
            };
            let _ = state.set_contract_info(&key, info).await;
            Err(e)
        }
    }
}

fn load_library(path: &std::path::Path) -> Option<libloading::Library> {
    // SAFETY: the loaded object is one this process just compiled (or
    // previously compiled and verified by md5) from a validated WASM
    // module; `thunderchain_main`'s signature matches the native ABI this
    // loader's trampoline expects.
    unsafe { libloading::Library::new(path).ok() }
}
