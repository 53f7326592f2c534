//! # Activation lifecycle shared by workers and handlers.
//!
//! Every worker and handler owns an [`Activation`] that governs whether it
//! takes part in a tick. The component's own code is reached only through the
//! two [`Activate`] hooks.
//!
//! ## State machine
//! ```text
//!              request(true)                       request(true) [retry]
//!   Inactive ────────────────► activate(false) ──┐  ┌──► activate(true) ──┐
//!      ▲                         │ ok     │ err   │  │                     │
//!      │                         ▼        ▼       │  │        ok ┌─────────┘ err
//!      │                      Active  ActivationFailed ◄─────────┼──────────┘
//!      │                         │        │                      ▼
//!      │       request(false)    │        │                    Active
//!      └──── deactivate() ◄──────┴────────┘
//! ```
//!
//! ## Rules
//! - `Active` + `request(true)` and `Inactive` + `request(false)` are no-ops
//!   (hooks are **not** called again).
//! - `deactivate()` is assumed to always succeed.
//! - The aggregator calls `request(true)` on every tick a failed component
//!   participates in; this is the only automatic corrective action.

/// Activation hooks implemented by workers and handlers.
///
/// Both hooks have no-op defaults, so a component that needs no setup is
/// always-on once requested active:
///
/// ```
/// use tickvisor::Activate;
///
/// struct Counter;
/// impl Activate for Counter {}
/// ```
pub trait Activate {
    /// Brings the component up (open a port, configure a pin, ...).
    ///
    /// `retry` is `true` when a previous attempt failed and this is an
    /// automatic or explicit retry. Return `false` to stay in
    /// [`ActivationState::ActivationFailed`].
    fn activate(&mut self, _retry: bool) -> bool {
        true
    }

    /// Tears the component down. Called when leaving `Active` or `ActivationFailed`.
    fn deactivate(&mut self) {}
}

/// Lifecycle state of a worker or handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// Not participating; the initial state after registration.
    #[default]
    Inactive,
    /// Participating in ticks.
    Active,
    /// The last activation attempt failed; retried on participation.
    ActivationFailed,
}

/// Outcome of one [`Activation::request`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `activate` succeeded.
    Activated {
        /// Whether this was a retry after a failure.
        retry: bool,
    },
    /// `activate` returned failure.
    Failed {
        /// Whether this was a retry after a failure.
        retry: bool,
    },
    /// `deactivate` ran and the component is now inactive.
    Deactivated,
    /// The requested state was already satisfied; no hook was called.
    Unchanged,
}

impl Transition {
    /// True if the component left (or never reached) `Active` because of this call.
    pub fn left_active(&self) -> bool {
        matches!(self, Transition::Failed { .. } | Transition::Deactivated)
    }
}

/// Activation state machine owned by a single component.
#[derive(Debug, Clone, Default)]
pub struct Activation {
    state: ActivationState,
    failures: u32,
}

impl Activation {
    /// Creates a machine in [`ActivationState::Inactive`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> ActivationState {
        self.state
    }

    /// True if the state is [`ActivationState::Active`].
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == ActivationState::Active
    }

    /// True if the state is [`ActivationState::ActivationFailed`].
    #[inline]
    pub fn is_failed(&self) -> bool {
        self.state == ActivationState::ActivationFailed
    }

    /// Consecutive failed activation attempts; reset on success or deactivation.
    #[inline]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Requests the component to be active (`want = true`) or inactive.
    ///
    /// Calls at most one hook on `hooks` and returns what happened.
    pub fn request<A: Activate + ?Sized>(&mut self, hooks: &mut A, want: bool) -> Transition {
        match (self.state, want) {
            (ActivationState::Inactive, true) => self.attempt(hooks, false),
            (ActivationState::ActivationFailed, true) => self.attempt(hooks, true),
            (ActivationState::Active | ActivationState::ActivationFailed, false) => {
                hooks.deactivate();
                self.state = ActivationState::Inactive;
                self.failures = 0;
                Transition::Deactivated
            }
            (ActivationState::Active, true) | (ActivationState::Inactive, false) => {
                Transition::Unchanged
            }
        }
    }

    fn attempt<A: Activate + ?Sized>(&mut self, hooks: &mut A, retry: bool) -> Transition {
        if hooks.activate(retry) {
            self.state = ActivationState::Active;
            self.failures = 0;
            Transition::Activated { retry }
        } else {
            self.state = ActivationState::ActivationFailed;
            self.failures = self.failures.saturating_add(1);
            Transition::Failed { retry }
        }
    }
}
