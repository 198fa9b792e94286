//! Simulator processes backing timer, phase and value-change callbacks.
//!
//! FLI cannot delete a process. Each process is parked in a [`Slot`] for
//! its whole life and reused by later registrations of the same kind; the
//! number of idle slots kept per kind is bounded, and surplus slots are
//! retired. A slot's address is both the process parameter and the
//! registration reference handed to the GPI, so slots are never freed.

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic;

use tracing::{debug, error, trace};

use gpi_core::{global, CallbackId, RawRef};

use crate::api::FliApi;
use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SlotKind {
    ValueChange,
    Timer,
    ReadWrite,
    ReadOnly,
    NextTimeStep,
    StartOfSim,
    EndOfSim,
}

impl SlotKind {
    fn priority(self) -> i32 {
        match self {
            Self::ReadWrite => MTI_PROC_SYNCH,
            Self::ReadOnly => MTI_PROC_POSTPONED,
            Self::NextTimeStep => MTI_PROC_IMMEDIATE,
            _ => MTI_PROC_NORMAL,
        }
    }

    fn process_name(self) -> &'static str {
        match self {
            Self::ValueChange => "gpi_value_change",
            Self::Timer => "gpi_timer",
            Self::ReadWrite => "gpi_read_write",
            Self::ReadOnly => "gpi_read_only",
            Self::NextTimeStep => "gpi_next_time_step",
            Self::StartOfSim => "gpi_start_of_sim",
            Self::EndOfSim => "gpi_end_of_sim",
        }
    }

    /// Start and end of simulation are load-done and quit callbacks rather
    /// than processes.
    pub(crate) fn has_process(self) -> bool {
        !matches!(self, Self::StartOfSim | Self::EndOfSim)
    }

    /// Whether the native side wakes it once per arming.
    fn one_shot(self) -> bool {
        self != Self::ValueChange
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Idle,
    /// Wakes deliver this callback token.
    Armed(u64),
    /// Disarmed with a wakeup still pending; idle once it arrives.
    Cancelled,
    /// Beyond the pool bound; never armed again.
    Retired,
}

#[derive(Debug)]
pub(crate) struct Slot {
    kind: SlotKind,
    process: Cell<Option<RawRef>>,
    state: Cell<SlotState>,
}

impl Slot {
    pub(crate) fn kind(&self) -> SlotKind {
        self.kind
    }

    pub(crate) fn process(&self) -> Option<RawRef> {
        self.process.get()
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state.get()
    }

    pub(crate) fn param(&'static self) -> *mut c_void {
        self as *const Slot as *mut c_void
    }

    pub(crate) fn registration(&'static self) -> Option<RawRef> {
        RawRef::from_ptr(self.param())
    }
}

/// Entry point of every pool process and phase callback.
pub(crate) extern "C" fn on_wake(param: *mut c_void) {
    if param.is_null() {
        return;
    }
    // SAFETY: processes and phase callbacks are only ever created with the
    // address of a leaked `Slot` as their parameter.
    let slot = unsafe { &*(param as *const Slot) };
    match slot.state.get() {
        SlotState::Armed(token) => {
            if panic::catch_unwind(|| global::fire(token)).is_err() {
                error!(critical = true, token, "callback panicked");
                std::process::abort();
            }
        }
        SlotState::Cancelled => {
            trace!(kind = ?slot.kind, "cancelled wakeup absorbed");
            slot.state.set(SlotState::Idle);
        }
        SlotState::Idle | SlotState::Retired => {}
    }
}

#[derive(Debug)]
pub(crate) struct ProcessPool {
    slots: Vec<&'static Slot>,
    by_registration: HashMap<RawRef, usize>,
    /// Idle slots kept per kind.
    limit: usize,
}

impl ProcessPool {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            by_registration: HashMap::new(),
            limit: limit.max(1),
        }
    }

    pub(crate) fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
    }

    /// Processes created so far.
    pub(crate) fn processes(&self) -> usize {
        self.slots.iter().filter(|s| s.process.get().is_some()).count()
    }

    pub(crate) fn count(&self, kind: SlotKind, state: SlotState) -> usize {
        self.slots
            .iter()
            .filter(|s| s.kind == kind && s.state.get() == state)
            .count()
    }

    pub(crate) fn find(&self, registration: RawRef) -> Option<&'static Slot> {
        self.by_registration
            .get(&registration)
            .and_then(|&i| self.slots.get(i).copied())
    }

    /// An idle slot of `kind`, armed with `token`. A new process is created
    /// when none is idle; `None` if the simulator refuses it.
    pub(crate) fn acquire<A: FliApi>(
        &mut self,
        api: &mut A,
        kind: SlotKind,
        token: CallbackId,
    ) -> Option<&'static Slot> {
        let idle = self
            .slots
            .iter()
            .copied()
            .find(|s| s.kind == kind && s.state.get() == SlotState::Idle);
        let slot = match idle {
            Some(slot) => slot,
            None => self.create(api, kind)?,
        };
        slot.state.set(SlotState::Armed(token.raw()));
        Some(slot)
    }

    fn create<A: FliApi>(&mut self, api: &mut A, kind: SlotKind) -> Option<&'static Slot> {
        let slot: &'static Slot = Box::leak(Box::new(Slot {
            kind,
            process: Cell::new(None),
            state: Cell::new(SlotState::Idle),
        }));
        if kind.has_process() {
            let process =
                api.create_process(kind.process_name(), on_wake, slot.param(), kind.priority());
            let Some(process) = process else {
                // Never handed out; the leak is one slot.
                slot.state.set(SlotState::Retired);
                return None;
            };
            slot.process.set(Some(process));
        }
        let registration = slot.registration()?;
        debug!(?kind, priority = priority_name(kind.priority()), "pool slot created");
        self.by_registration.insert(registration, self.slots.len());
        self.slots.push(slot);
        Some(slot)
    }

    /// Return a slot after its callback fired or was removed. `pending` is
    /// true when a one-shot wakeup is still on its way.
    pub(crate) fn release(&mut self, slot: &'static Slot, pending: bool) {
        if pending && slot.kind.one_shot() && slot.kind.has_process() {
            slot.state.set(SlotState::Cancelled);
            return;
        }
        let idle = self.count(slot.kind, SlotState::Idle);
        if idle >= self.limit {
            debug!(kind = ?slot.kind, idle, "pool full, retiring slot");
            slot.state.set(SlotState::Retired);
        } else {
            slot.state.set(SlotState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFli;
    use gpi_testkit::{fixture, Sim};

    fn api() -> MockFli {
        MockFli::new(Sim::new(fixture::vhdl_design()).shared())
    }

    fn id(raw: u64) -> CallbackId {
        CallbackId::from_raw(raw)
    }

    #[test]
    fn idle_slots_are_reused_per_kind() {
        let mut api = api();
        let mut pool = ProcessPool::new(4);
        let timer = pool.acquire(&mut api, SlotKind::Timer, id(1)).unwrap();
        assert_eq!(timer.state(), SlotState::Armed(1));
        pool.release(timer, false);
        let again = pool.acquire(&mut api, SlotKind::Timer, id(2)).unwrap();
        assert!(std::ptr::eq(timer, again));
        assert_eq!(again.state(), SlotState::Armed(2));

        let read_only = pool.acquire(&mut api, SlotKind::ReadOnly, id(3)).unwrap();
        assert!(!std::ptr::eq(timer, read_only));
        assert_eq!(pool.processes(), 2);
        assert_eq!(
            api.process_names(),
            vec!["gpi_timer", "gpi_read_only"]
        );
        let registration = read_only.registration().unwrap();
        assert!(std::ptr::eq(pool.find(registration).unwrap(), read_only));
    }

    #[test]
    fn pending_wakeup_parks_the_slot() {
        let mut api = api();
        let mut pool = ProcessPool::new(4);
        let timer = pool.acquire(&mut api, SlotKind::Timer, id(1)).unwrap();
        pool.release(timer, true);
        assert_eq!(timer.state(), SlotState::Cancelled);

        let other = pool.acquire(&mut api, SlotKind::Timer, id(2)).unwrap();
        assert!(!std::ptr::eq(timer, other));

        on_wake(timer.param());
        assert_eq!(timer.state(), SlotState::Idle);
        assert_eq!(pool.count(SlotKind::Timer, SlotState::Idle), 1);
    }

    #[test]
    fn surplus_slots_retire() {
        let mut api = api();
        let mut pool = ProcessPool::new(1);
        let a = pool.acquire(&mut api, SlotKind::ReadWrite, id(1)).unwrap();
        let b = pool.acquire(&mut api, SlotKind::ReadWrite, id(2)).unwrap();
        pool.release(a, false);
        pool.release(b, false);
        assert_eq!(a.state(), SlotState::Idle);
        assert_eq!(b.state(), SlotState::Retired);
        assert_eq!(pool.count(SlotKind::ReadWrite, SlotState::Retired), 1);

        // Value-change processes are never pending; one that just fired
        // goes back to idle.
        let watch = pool.acquire(&mut api, SlotKind::ValueChange, id(3)).unwrap();
        pool.release(watch, true);
        assert_eq!(watch.state(), SlotState::Idle);
    }

    #[test]
    fn phase_slots_have_no_process() {
        let mut api = api();
        let mut pool = ProcessPool::new(4);
        let start = pool.acquire(&mut api, SlotKind::StartOfSim, id(1)).unwrap();
        assert!(start.process().is_none());
        assert_eq!(pool.processes(), 0);
        pool.release(start, true);
        assert_eq!(start.state(), SlotState::Idle);
    }

    #[test]
    fn refused_process_yields_no_slot() {
        let mut api = api();
        api.refuse_processes();
        let mut pool = ProcessPool::new(4);
        assert!(pool.acquire(&mut api, SlotKind::Timer, id(1)).is_none());
        assert_eq!(pool.processes(), 0);
    }
}
