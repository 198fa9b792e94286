//! Callback handles and their lifecycle.
//!
//! ```text
//!            arm                 native fire
//!   Free ─────────▶ Primed ──────────────────▶ PreCall
//!    ▲                ▲                          │
//!    │                └──── re-armed in call ────┤
//!    │                                           ├── returned ──▶ PostCall ─ arm ─▶ Primed
//!    │                                           └── removed in call ──▶ PendingDelete
//!    └── registration failure (boundary categories only)
//! ```
//!
//! `PendingDelete` is also used for a primed callback whose native
//! removal the backend refused: the entry stays until the backend fires it,
//! and that fire is squashed.
//!
//! This module only tracks state. [`crate::gpi::Gpi`] performs the native
//! calls each transition requires.

use std::collections::HashMap;

use crate::error::{GpiError, Result};
use crate::handle::{AdapterId, HandleId, RawRef};

/// Identifier of a registered callback; also the token handed to the
/// backend as native user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

/// Transition a value-change callback reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Transition into `1`.
    Rising,
    /// Transition into `0`.
    Falling,
    Any,
}

impl Edge {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Rising),
            2 => Some(Self::Falling),
            3 => Some(Self::Any),
            _ => None,
        }
    }

    /// Whether the value sampled right after the change satisfies the edge.
    pub fn accepts(&self, sampled: &str) -> bool {
        match self {
            Self::Rising => sampled == "1",
            Self::Falling => sampled == "0",
            Self::Any => true,
        }
    }
}

/// Callback category and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    ValueChange { signal: HandleId, edge: Edge },
    /// Relative delay in simulator precision units.
    Timer { delay: u64 },
    ReadOnly,
    ReadWrite,
    NextTimeStep,
    StartOfSim,
    EndOfSim,
}

impl CallbackKind {
    /// One-shot categories are consumed by the backend when they fire.
    pub fn is_one_shot(&self) -> bool {
        !matches!(self, Self::ValueChange { .. })
    }

    /// Start and end of simulation: failures to register or remove these
    /// are absorbed.
    pub fn is_sim_boundary(&self) -> bool {
        matches!(self, Self::StartOfSim | Self::EndOfSim)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ValueChange { .. } => "value-change",
            Self::Timer { .. } => "timer",
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
            Self::NextTimeStep => "next-time-step",
            Self::StartOfSim => "start-of-simulation",
            Self::EndOfSim => "end-of-simulation",
        }
    }
}

/// Lifecycle state of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CbState {
    Free,
    Primed,
    PreCall,
    PostCall,
    PendingDelete,
}

/// User function. The context travels in the closure's captures.
pub type UserFn = Box<dyn FnMut() -> i32>;

/// What a removal request needs from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveAction {
    /// Nothing is registered natively; drop the entry.
    DropNow,
    /// Remove this native registration, then drop the entry.
    Disarm(RawRef),
    /// The callback is running; removal happens when it returns.
    Deferred,
    /// A removal is already pending.
    AlreadyPending,
}

/// Where a callback stands once its user function returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterCall {
    /// Removed during the call; free the entry now.
    Delete,
    /// Still registered natively (value-change, or re-armed in the call).
    Primed,
    /// One-shot that was not re-armed; may be armed again later.
    Done,
}

/// One callback registration.
pub struct CallbackHandle {
    id: CallbackId,
    adapter: AdapterId,
    kind: CallbackKind,
    state: CbState,
    registration: Option<RawRef>,
    func: Option<UserFn>,
    in_call: bool,
    calls: u64,
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("id", &self.id)
            .field("adapter", &self.adapter)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("registration", &self.registration)
            .field("in_call", &self.in_call)
            .field("calls", &self.calls)
            .finish()
    }
}

impl CallbackHandle {
    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn adapter(&self) -> AdapterId {
        self.adapter
    }

    pub fn kind(&self) -> &CallbackKind {
        &self.kind
    }

    pub fn state(&self) -> CbState {
        self.state
    }

    pub fn registration(&self) -> Option<RawRef> {
        self.registration
    }

    /// Whether the user function is running right now.
    pub fn in_call(&self) -> bool {
        self.in_call
    }

    /// Number of times the user function ran.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub(crate) fn take_registration(&mut self) -> Option<RawRef> {
        self.registration.take()
    }

    /// Record a successful native registration.
    pub(crate) fn set_primed(&mut self, registration: RawRef) -> Result<()> {
        match self.state {
            CbState::Free | CbState::PostCall | CbState::PreCall => {
                self.registration = Some(registration);
                self.state = CbState::Primed;
                Ok(())
            }
            state => Err(GpiError::corrupted(format!(
                "{} armed while {state:?}",
                self.id
            ))),
        }
    }

    /// Mark the entry as removed locally; a later native fire is squashed.
    pub(crate) fn set_orphaned(&mut self) {
        self.state = CbState::PendingDelete;
    }

    /// Enter the call. Takes the user function out for the duration.
    pub(crate) fn begin_call(&mut self) -> Result<UserFn> {
        if self.state != CbState::Primed {
            return Err(GpiError::corrupted(format!(
                "{} fired while {:?}",
                self.id, self.state
            )));
        }
        let func = self.func.take().ok_or_else(|| {
            GpiError::corrupted(format!("{} fired with no associated function", self.id))
        })?;
        self.state = CbState::PreCall;
        self.in_call = true;
        self.calls += 1;
        Ok(func)
    }

    /// Leave the call, putting the user function back.
    pub(crate) fn end_call(&mut self, func: UserFn) -> AfterCall {
        self.func = Some(func);
        self.in_call = false;
        match self.state {
            CbState::PendingDelete => AfterCall::Delete,
            CbState::PreCall if self.kind.is_one_shot() && self.registration.is_none() => {
                self.state = CbState::PostCall;
                AfterCall::Done
            }
            _ => {
                self.state = CbState::Primed;
                AfterCall::Primed
            }
        }
    }

    /// Ask for removal.
    pub(crate) fn request_remove(&mut self) -> RemoveAction {
        match self.state {
            CbState::Free | CbState::PostCall => RemoveAction::DropNow,
            CbState::Primed => match self.registration {
                Some(reg) => RemoveAction::Disarm(reg),
                None => RemoveAction::DropNow,
            },
            CbState::PreCall => {
                self.state = CbState::PendingDelete;
                RemoveAction::Deferred
            }
            CbState::PendingDelete => RemoveAction::AlreadyPending,
        }
    }
}

/// All callbacks of one process.
#[derive(Debug, Default)]
pub struct CallbackTable {
    entries: HashMap<CallbackId, CallbackHandle>,
    next_id: u64,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback in the `Free` state.
    pub fn insert(&mut self, adapter: AdapterId, kind: CallbackKind, func: UserFn) -> CallbackId {
        self.next_id += 1;
        let id = CallbackId(self.next_id);
        self.entries.insert(
            id,
            CallbackHandle {
                id,
                adapter,
                kind,
                state: CbState::Free,
                registration: None,
                func: Some(func),
                in_call: false,
                calls: 0,
            },
        );
        id
    }

    pub fn get(&self, id: CallbackId) -> Option<&CallbackHandle> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: CallbackId) -> Option<&mut CallbackHandle> {
        self.entries.get_mut(&id)
    }

    pub fn remove(&mut self, id: CallbackId) -> Option<CallbackHandle> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<CallbackId> {
        let mut ids: Vec<CallbackId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ids of callbacks in `state`.
    pub fn ids_in(&self, state: CbState) -> Vec<CallbackId> {
        let mut ids: Vec<CallbackId> = self
            .entries
            .values()
            .filter(|cb| cb.state == state)
            .map(|cb| cb.id)
            .collect();
        ids.sort();
        ids
    }
}
