//! Generation tracking for smart collection searches.
//!
//! Every refresh takes a new generation from a [`SearchVersionTracker`]. The
//! session's [`CancellationToken`] stays active only while its generation is
//! the newest one, so a superseded search can detect that its results must be
//! discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tracks the active search generation for cancellation.
///
/// When a new search starts, call `next_version()` to get a new generation.
/// Tokens handed out for older generations report as cancelled.
#[derive(Debug, Default)]
pub struct SearchVersionTracker {
    active_version: Arc<AtomicU64>,
}

impl SearchVersionTracker {
    /// Creates a new search version tracker.
    pub fn new() -> Self {
        Self {
            active_version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Increments the active version and returns the new version number.
    ///
    /// This effectively cancels any in-flight searches using older versions.
    pub fn next_version(&self) -> u64 {
        self.active_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the current active version without incrementing.
    pub fn current_version(&self) -> u64 {
        self.active_version.load(Ordering::SeqCst)
    }

    /// Returns whether `version` is still the active generation.
    pub fn is_current(&self, version: u64) -> bool {
        self.current_version() == version
    }

    /// Creates a cancellation token for the given version.
    ///
    /// The token reports as cancelled once the active version has moved past
    /// the given version.
    pub fn token_for_version(&self, version: u64) -> CancellationToken {
        CancellationToken {
            active_version: Some(self.active_version.clone()),
            version,
        }
    }
}

/// A cancellation token handed to the query engine for one search session.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    /// Shared generation counter; `None` for tokens that never cancel.
    active_version: Option<Arc<AtomicU64>>,
    /// The generation this token was created with.
    version: u64,
}

impl CancellationToken {
    /// Creates a cancellation token that is never cancelled.
    ///
    /// Useful for tests or operations that should not be interruptible.
    #[inline]
    pub fn noop() -> Self {
        Self::default()
    }

    /// The generation this token belongs to.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Checks if this token is still active.
    ///
    /// Returns `Some(())` if still active, `None` if cancelled.
    /// This enables use with the `?` operator for early returns.
    #[inline]
    pub fn is_cancelled(&self) -> Option<()> {
        match &self.active_version {
            Some(active) if active.load(Ordering::Relaxed) != self.version => None,
            _ => Some(()),
        }
    }
}
