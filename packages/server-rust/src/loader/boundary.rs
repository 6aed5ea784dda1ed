//! Isolation boundaries: one disposable scope per module load.
//!
//! A boundary owns the loaded copy of a module for exactly one `describe` or
//! `invoke`. Dropping it releases everything it owns (for process modules the
//! child is killed), on every path including cancellation. The
//! [`BoundaryTracker`] counts boundaries that are currently open.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::process::Child;
use tracing::{debug, warn};

/// Gauge reporting the number of open isolation boundaries, summed over
/// every tracker in the process.
pub const OPEN_BOUNDARIES_GAUGE: &str = "dataservice_open_boundaries";

/// Why a boundary was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryPurpose {
    /// Reading a module's manifest during discovery.
    Describe,
    /// Running one operation for one request.
    Invoke,
}

impl BoundaryPurpose {
    /// Lowercase label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Describe => "describe",
            Self::Invoke => "invoke",
        }
    }
}

// ---------------------------------------------------------------------------
// BoundaryTracker
// ---------------------------------------------------------------------------

/// Counts open isolation boundaries. Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct BoundaryTracker {
    open: Arc<AtomicU64>,
    opened_total: Arc<AtomicU64>,
}

impl BoundaryTracker {
    /// Creates a tracker with no open boundaries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a boundary for `module`. It stays counted until dropped.
    #[must_use]
    pub fn open(&self, module: &Path, purpose: BoundaryPurpose) -> IsolationBoundary {
        let id = self.opened_total.fetch_add(1, Ordering::Relaxed) + 1;
        self.open.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!(OPEN_BOUNDARIES_GAUGE).increment(1.0);

        debug!(
            boundary = id,
            module = %module.display(),
            purpose = purpose.as_str(),
            "isolation boundary opened"
        );

        IsolationBoundary {
            id,
            module: module.to_path_buf(),
            purpose,
            opened_at: Instant::now(),
            child: None,
            open: Arc::clone(&self.open),
        }
    }

    /// Number of boundaries currently open.
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.open.load(Ordering::Relaxed)
    }

    /// Number of boundaries opened since the tracker was created.
    #[must_use]
    pub fn opened_total(&self) -> u64 {
        self.opened_total.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// IsolationBoundary
// ---------------------------------------------------------------------------

/// RAII scope around one loaded copy of a module.
#[derive(Debug)]
pub struct IsolationBoundary {
    id: u64,
    module: PathBuf,
    purpose: BoundaryPurpose,
    opened_at: Instant,
    child: Option<Child>,
    open: Arc<AtomicU64>,
}

impl IsolationBoundary {
    /// Sequence number of this boundary, unique per tracker.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Hands a module process to the boundary, which kills it on release.
    pub fn attach(&mut self, child: Child) -> &mut Child {
        self.child.insert(child)
    }
}

impl Drop for IsolationBoundary {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            // Already-exited children report InvalidInput; nothing to do then.
            if let Err(err) = child.start_kill() {
                if err.kind() != std::io::ErrorKind::InvalidInput {
                    warn!(boundary = self.id, error = %err, "failed to kill module process");
                }
            }
        }
        self.open.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!(OPEN_BOUNDARIES_GAUGE).decrement(1.0);

        debug!(
            boundary = self.id,
            module = %self.module.display(),
            purpose = self.purpose.as_str(),
            elapsed_ms = u64::try_from(self.opened_at.elapsed().as_millis())
                .unwrap_or(u64::MAX),
            "isolation boundary released"
        );
    }
}
