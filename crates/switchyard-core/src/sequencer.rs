//! Generation-based admission control for activation requests.
//!
//! Every accepted request gets a fresh, strictly increasing generation and
//! its own `CancellationToken`. Accepting a request cancels whatever token
//! was in flight, so at most one token per sequencer is ever live. Work
//! holding an older generation detects that it is stale by comparing against
//! `current_generation()` or by polling its token.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::notify::Notifier;
use crate::types::{ResourceId, Severity};

// ---------------------------------------------------------------------------
// ActivationRequest / ActivationOutcome
// ---------------------------------------------------------------------------

/// An admitted request. Immutable once issued.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    pub target: ResourceId,
    pub generation: u64,
    pub token: CancellationToken,
    pub requested_at: Instant,
}

#[derive(Debug, Clone)]
pub enum ActivationOutcome {
    /// The same target is already being switched to.
    Duplicate,
    /// The target is already committed and no force was requested.
    NoOp,
    /// Run the transition for this request.
    Proceed(ActivationRequest),
}

// ---------------------------------------------------------------------------
// SequencerState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SequencerState {
    pub current_generation: u64,
    pub in_flight_target: Option<ResourceId>,
    pub in_flight_token: Option<CancellationToken>,
    /// Last target whose transition committed.
    pub committed: Option<ResourceId>,
}

/// Read-only copy of the sequencer state for display and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerSnapshot {
    pub current_generation: u64,
    pub in_flight_target: Option<ResourceId>,
    pub committed: Option<ResourceId>,
}

// ---------------------------------------------------------------------------
// ActivationSequencer
// ---------------------------------------------------------------------------

/// Single owner of `SequencerState` for one resource class.
///
/// All mutation happens under one mutex held only for in-memory bookkeeping;
/// notices are emitted after the lock is released.
pub struct ActivationSequencer {
    class: &'static str,
    state: Mutex<SequencerState>,
    notifier: Arc<dyn Notifier>,
}

impl ActivationSequencer {
    pub fn new(class: &'static str, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            class,
            state: Mutex::new(SequencerState::default()),
            notifier,
        }
    }

    /// Seed the committed target, e.g. from the persisted current profile.
    pub fn with_committed(self, committed: Option<ResourceId>) -> Self {
        self.lock().committed = committed;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SequencerState> {
        // Plain data, safe to use after a poisoning panic.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn request(&self, target: ResourceId, force: bool) -> ActivationOutcome {
        let (request, interrupted) = {
            let mut state = self.lock();

            if state.in_flight_target.as_ref() == Some(&target) {
                tracing::debug!(class = self.class, %target, "duplicate activation ignored");
                return ActivationOutcome::Duplicate;
            }

            // Compared against the committed target even while another one is
            // in flight: the in-flight request keeps running and the committed
            // target is not re-applied afterwards.
            if !force && state.committed.as_ref() == Some(&target) {
                tracing::debug!(class = self.class, %target, "already active, nothing to do");
                return ActivationOutcome::NoOp;
            }

            state.current_generation += 1;
            let generation = state.current_generation;

            let previous = state.in_flight_target.take();
            let interrupted = state.in_flight_token.take().and_then(|token| {
                token.cancel();
                previous
            });

            let token = CancellationToken::new();
            state.in_flight_target = Some(target.clone());
            state.in_flight_token = Some(token.clone());

            let request = ActivationRequest {
                target,
                generation,
                token,
                requested_at: Instant::now(),
            };
            (request, interrupted)
        };

        if let Some(previous) = interrupted {
            tracing::info!(
                class = self.class,
                generation = request.generation,
                from = %previous,
                to = %request.target,
                "interrupting in-flight activation"
            );
            self.notifier.emit(
                Severity::Info,
                &format!(
                    "Profile switch interrupted by new selection: {previous} → {}",
                    request.target
                ),
            );
        }

        tracing::debug!(
            class = self.class,
            generation = request.generation,
            target = %request.target,
            "activation admitted"
        );
        ActivationOutcome::Proceed(request)
    }

    /// Clear the in-flight slot and record `generation`'s target as committed.
    ///
    /// No-op unless `generation` is still the current one.
    pub fn complete(&self, generation: u64) -> bool {
        self.release(generation, true)
    }

    /// Clear the in-flight slot after a failed transition, leaving the
    /// committed target untouched. No-op unless `generation` is current.
    pub fn abandon(&self, generation: u64) -> bool {
        self.release(generation, false)
    }

    fn release(&self, generation: u64, committed: bool) -> bool {
        let mut state = self.lock();
        if state.current_generation != generation {
            tracing::debug!(
                class = self.class,
                generation,
                current = state.current_generation,
                "cleanup skipped, generation taken over"
            );
            return false;
        }
        let target = state.in_flight_target.take();
        state.in_flight_token = None;
        if committed {
            if let Some(target) = target {
                state.committed = Some(target);
            }
        }
        true
    }

    pub fn current_generation(&self) -> u64 {
        self.lock().current_generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    pub fn in_flight(&self) -> Option<ResourceId> {
        self.lock().in_flight_target.clone()
    }

    pub fn committed(&self) -> Option<ResourceId> {
        self.lock().committed.clone()
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        let state = self.lock();
        SequencerSnapshot {
            current_generation: state.current_generation,
            in_flight_target: state.in_flight_target.clone(),
            committed: state.committed.clone(),
        }
    }
}
