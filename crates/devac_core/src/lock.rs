//! Advisory partition locking via atomic marker-file creation.
//!
//! Writers to a seed partition coordinate through a `.devac.lock` marker
//! created with `create_new` (atomic on every filesystem we care about)
//! and holding `{pid, timestamp, hostname}` as JSON. Readers never touch
//! the lock. Stale markers (older than the staleness age, or whose
//! same-host holder process is gone) are reclaimed in place; fresh ones
//! are waited out with exponential backoff up to a terminal timeout.

use crate::config::LockConfig;
use crate::error::{DevacError, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// File name of the transient lock marker inside a partition directory.
pub const LOCK_FILE_NAME: &str = ".devac.lock";

/// Contents of a lock marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMarker {
    /// Process id of the writer.
    pub pid: u32,
    /// ISO-8601 acquisition time.
    pub timestamp: DateTime<Utc>,
    /// Hostname of the writer, for cross-host staleness decisions.
    pub hostname: String,
}

impl LockMarker {
    /// Builds a marker describing the current process.
    pub fn for_current_process() -> Self {
        Self {
            pid: std::process::id(),
            timestamp: Utc::now(),
            hostname: local_hostname(),
        }
    }
}

/// What inspection of an existing marker concluded.
enum MarkerState {
    /// Legitimately held; contains the holder's marker.
    Fresh(LockMarker),
    /// Reclaimable, with the reason.
    Stale(String),
    /// Marker vanished between the failed create and the read.
    Gone,
    /// Marker exists but cannot be parsed (possibly mid-write).
    Unreadable(String),
}

/// RAII guard for a held partition lock.
///
/// Dropping the guard releases the `fs2` file lock and removes the marker.
/// Removal failures are logged, never fatal; a leftover marker is
/// reclaimed by the next writer's staleness check.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    /// Path of the held marker.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove lock marker on release"
                );
            }
        }
    }
}

/// Acquires the exclusive lock for a partition directory.
///
/// `dir` is the partition directory; the marker is created inside it.
/// Blocks with exponential backoff while a fresh holder exists, up to
/// `config.timeout()`.
///
/// # Errors
///
/// - `LockTimeout` when a fresh holder outlasts the timeout.
/// - `StaleLock` when the marker stays unreadable for the whole timeout.
/// - `Io` on filesystem failures.
pub fn acquire(dir: &Path, config: &LockConfig) -> Result<LockGuard> {
    let path = dir.join(LOCK_FILE_NAME);
    let started = Instant::now();
    let mut delay = config.initial_delay();

    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let marker = LockMarker::for_current_process();
                let json = serde_json::to_string(&marker)
                    .map_err(|e| DevacError::Serialization(e.to_string()))?;
                file.write_all(json.as_bytes())?;
                file.flush()?;

                // Second belt on platforms with mandatory-ish flock
                // semantics; the marker's existence is the real lock.
                if let Err(e) = file.try_lock_exclusive() {
                    warn!(path = %path.display(), error = %e, "flock on fresh marker failed");
                }

                debug!(path = %path.display(), pid = marker.pid, "acquired partition lock");
                return Ok(LockGuard {
                    file: Some(file),
                    path,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                match inspect_marker(&path, config) {
                    MarkerState::Stale(reason) => {
                        warn!(path = %path.display(), reason = %reason, "reclaiming stale lock");
                        remove_marker(&path)?;
                        // Retry immediately; no backoff against a corpse.
                        continue;
                    }
                    MarkerState::Gone => continue,
                    MarkerState::Fresh(holder) => {
                        if started.elapsed() >= config.timeout() {
                            return Err(DevacError::LockTimeout {
                                path,
                                holder_pid: holder.pid,
                                holder_host: holder.hostname,
                                waited_ms: started.elapsed().as_millis() as u64,
                            });
                        }
                    }
                    MarkerState::Unreadable(reason) => {
                        // Could be a writer mid-flush; give it the same
                        // backoff window before declaring it damaged.
                        if started.elapsed() >= config.timeout() {
                            return Err(DevacError::StaleLock { path, reason });
                        }
                    }
                }

                std::thread::sleep(delay);
                delay = (delay * 2).min(config.max_delay());
            }
            Err(e) => return Err(DevacError::Io(e)),
        }
    }
}

/// Reads the marker currently guarding `dir`, if any.
pub fn current_holder(dir: &Path) -> Option<LockMarker> {
    let path = dir.join(LOCK_FILE_NAME);
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Removes the marker in `dir` if it is stale. Returns whether a marker
/// was removed.
///
/// This is the staleness sweep behind `devac unlock`: a live same-host
/// holder is left alone and reported as an error instead.
pub fn force_unlock(dir: &Path, config: &LockConfig) -> Result<bool> {
    let path = dir.join(LOCK_FILE_NAME);
    if !path.exists() {
        return Ok(false);
    }
    match inspect_marker(&path, config) {
        MarkerState::Fresh(holder) => Err(DevacError::LockTimeout {
            path,
            holder_pid: holder.pid,
            holder_host: holder.hostname,
            waited_ms: 0,
        }),
        MarkerState::Gone => Ok(false),
        MarkerState::Stale(_) | MarkerState::Unreadable(_) => {
            remove_marker(&path)?;
            Ok(true)
        }
    }
}

fn inspect_marker(path: &Path, config: &LockConfig) -> MarkerState {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return MarkerState::Gone,
        Err(e) => return MarkerState::Unreadable(e.to_string()),
    };

    let marker: LockMarker = match serde_json::from_str(&content) {
        Ok(m) => m,
        Err(e) => return MarkerState::Unreadable(format!("invalid marker JSON: {}", e)),
    };

    let age = Utc::now().signed_duration_since(marker.timestamp);
    if age > chrono::Duration::seconds(config.stale_after_secs as i64) {
        return MarkerState::Stale(format!(
            "marker is {}s old (staleness threshold {}s)",
            age.num_seconds(),
            config.stale_after_secs
        ));
    }

    // Liveness is only checkable for same-host holders; cross-host
    // markers fall back to the age rule above.
    if marker.hostname == local_hostname() && !is_process_alive(marker.pid) {
        return MarkerState::Stale(format!("holder process {} is gone", marker.pid));
    }

    MarkerState::Fresh(marker)
}

fn remove_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        // Another contender won the removal race; that is fine.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DevacError::Io(e)),
    }
}

/// Best-effort hostname for lock markers.
fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check if a process with the given PID is still alive.
#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    // /proc/{pid}/stat also exists for zombies, which still "hold" their
    // pid; a zombie writer will age out via the staleness threshold.
    std::path::Path::new(&format!("/proc/{}/stat", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    // No cheap liveness probe; stale locks age out instead.
    true
}
