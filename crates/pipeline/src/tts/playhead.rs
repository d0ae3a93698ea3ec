//! Pausable playback clock
//!
//! Tracks how much of a clip has played on the tokio clock. Used by the
//! simulated engine and the paced audio output.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// How a run of the playhead ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlayheadEnd {
    Finished,
    Cancelled,
}

#[derive(Debug)]
struct PlayheadState {
    total: Duration,
    elapsed: Duration,
    /// Set while playing
    resumed_at: Option<Instant>,
    cancelled: bool,
}

impl PlayheadState {
    fn position(&self) -> Duration {
        match self.resumed_at {
            Some(at) => self.elapsed + at.elapsed(),
            None => self.elapsed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Playhead {
    state: Mutex<PlayheadState>,
    wake: Notify,
}

impl Playhead {
    /// Create a playhead; it only advances once `play` is called
    pub(crate) fn new(total: Duration) -> Self {
        Self {
            state: Mutex::new(PlayheadState {
                total,
                elapsed: Duration::ZERO,
                resumed_at: None,
                cancelled: false,
            }),
            wake: Notify::new(),
        }
    }

    pub(crate) fn play(&self) {
        let mut state = self.state.lock();
        if state.resumed_at.is_none() && !state.cancelled {
            state.resumed_at = Some(Instant::now());
        }
        drop(state);
        self.wake.notify_one();
    }

    pub(crate) fn pause(&self) {
        let mut state = self.state.lock();
        if let Some(at) = state.resumed_at.take() {
            state.elapsed += at.elapsed();
        }
        drop(state);
        self.wake.notify_one();
    }

    /// Move back to the start without changing play/pause
    pub(crate) fn rewind(&self) {
        let mut state = self.state.lock();
        state.elapsed = Duration::ZERO;
        if state.resumed_at.is_some() {
            state.resumed_at = Some(Instant::now());
        }
        drop(state);
        self.wake.notify_one();
    }

    pub(crate) fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.wake.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn is_playing(&self) -> bool {
        self.state.lock().resumed_at.is_some()
    }

    pub(crate) fn position(&self) -> Duration {
        self.state.lock().position()
    }

    #[cfg(test)]
    pub(crate) fn total(&self) -> Duration {
        self.state.lock().total
    }

    /// Wait until the clip has played through or was cancelled.
    ///
    /// Only one task may wait on a playhead at a time.
    pub(crate) async fn run(&self) -> PlayheadEnd {
        loop {
            let remaining = {
                let state = self.state.lock();
                if state.cancelled {
                    return PlayheadEnd::Cancelled;
                }
                if state.resumed_at.is_some() {
                    let left = state.total.saturating_sub(state.position());
                    if left.is_zero() {
                        return PlayheadEnd::Finished;
                    }
                    Some(left)
                } else {
                    None
                }
            };

            match remaining {
                Some(left) => {
                    tokio::select! {
                        _ = tokio::time::sleep(left) => {}
                        _ = self.wake.notified() => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }
}
