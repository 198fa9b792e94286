//! Event kernel: time, timers, value-change watchers and phase callbacks.
//!
//! Within one time step the kernel delivers, in order: due timers, then
//! read-write callbacks, then read-only callbacks. Value-change
//! notifications are delivered as soon as the change happens. Moving to the
//! next time step delivers next-time-step callbacks first.
//!
//! Everything except value-change watchers is one-shot: it is unregistered
//! when delivered.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::trace;

use crate::design::NodeId;

/// What wakes a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ValueChange(NodeId),
    /// Relative delay from the time of registration.
    After(u64),
    ReadWrite,
    ReadOnly,
    NextTimeStep,
    StartOfSim,
    EndOfSim,
}

impl Trigger {
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::ValueChange(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    trigger: Trigger,
    user_data: u64,
}

#[derive(Debug, Default)]
pub struct Kernel {
    now: u64,
    next_token: u64,
    registrations: BTreeMap<u64, Registration>,
    timers: BTreeSet<(u64, u64)>,
    ready: VecDeque<u64>,
    started: bool,
    finished: bool,
    delivered: u64,
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of deliveries so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Register `user_data` to be delivered on `trigger`. Returns a nonzero
    /// token.
    pub fn schedule(&mut self, trigger: Trigger, user_data: u64) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        if let Trigger::After(delay) = trigger {
            self.timers.insert((self.now + delay, token));
        }
        self.registrations
            .insert(token, Registration { trigger, user_data });
        trace!(token, ?trigger, user_data, "scheduled");
        token
    }

    /// Unregister. False if the token is unknown or already delivered.
    pub fn cancel(&mut self, token: u64) -> bool {
        let Some(reg) = self.registrations.remove(&token) else {
            return false;
        };
        if let Trigger::After(_) = reg.trigger {
            self.timers.retain(|&(_, t)| t != token);
        }
        trace!(token, "cancelled");
        true
    }

    pub fn is_pending(&self, token: u64) -> bool {
        self.registrations.contains_key(&token)
    }

    pub fn pending(&self) -> usize {
        self.registrations.len()
    }

    pub fn trigger_of(&self, token: u64) -> Option<Trigger> {
        self.registrations.get(&token).map(|r| r.trigger)
    }

    fn queue_matching(&mut self, wanted: impl Fn(&Trigger) -> bool) -> bool {
        let tokens: Vec<u64> = self
            .registrations
            .iter()
            .filter(|(_, reg)| wanted(&reg.trigger))
            .map(|(token, _)| *token)
            .collect();
        let any = !tokens.is_empty();
        self.ready.extend(tokens);
        any
    }

    /// Queue the watchers of a node whose value changed.
    pub fn notify(&mut self, node: NodeId) {
        self.queue_matching(|t| *t == Trigger::ValueChange(node));
    }

    /// Deliver start-of-simulation callbacks. Only the first call counts.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.queue_matching(|t| *t == Trigger::StartOfSim);
        }
    }

    /// End the simulation: end-of-simulation callbacks are delivered and
    /// nothing else afterwards.
    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.ready.clear();
            self.queue_matching(|t| *t == Trigger::EndOfSim);
        }
    }

    fn pop_ready(&mut self) -> Option<u64> {
        while let Some(token) = self.ready.pop_front() {
            let Some(reg) = self.registrations.get(&token).copied() else {
                continue;
            };
            if !reg.trigger.is_persistent() {
                self.registrations.remove(&token);
            }
            self.delivered += 1;
            trace!(token, trigger = ?reg.trigger, now = self.now, "delivered");
            return Some(reg.user_data);
        }
        None
    }

    /// Next delivery at or before `until`, advancing time as needed.
    /// `None` once nothing is left to deliver up to `until`; time then
    /// stands at `until`.
    pub fn next_event(&mut self, until: u64) -> Option<u64> {
        loop {
            if let Some(user_data) = self.pop_ready() {
                return Some(user_data);
            }
            if self.finished {
                return None;
            }
            if let Some(&(at, token)) = self.timers.first() {
                if at == self.now {
                    self.timers.remove(&(at, token));
                    self.ready.push_back(token);
                    continue;
                }
            }
            if self.queue_matching(|t| *t == Trigger::ReadWrite) {
                continue;
            }
            if self.queue_matching(|t| *t == Trigger::ReadOnly) {
                continue;
            }
            match self.timers.first() {
                Some(&(at, _)) if at <= until => {
                    self.now = at;
                    self.queue_matching(|t| *t == Trigger::NextTimeStep);
                }
                _ => {
                    if until > self.now {
                        self.now = until;
                        self.queue_matching(|t| *t == Trigger::NextTimeStep);
                        if let Some(user_data) = self.pop_ready() {
                            return Some(user_data);
                        }
                    }
                    return None;
                }
            }
        }
    }
}
