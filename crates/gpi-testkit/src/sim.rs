//! A running simulation: design, kernel, and the native object space the
//! adapter mocks hand out references from.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::design::{Design, Drive, NodeId, NodeValue};
use crate::error::Result;
use crate::kernel::{Kernel, Trigger};

/// What a native reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeObj {
    Node(NodeId),
    /// Iterator, callback or process owned by a mock.
    Other,
}

pub type SharedSim = Rc<RefCell<Sim>>;

#[derive(Debug)]
pub struct Sim {
    pub design: Design,
    pub kernel: Kernel,
    product: String,
    version: String,
    precision: i32,
    objects: HashMap<usize, NativeObj>,
    next_object: usize,
    finish_requested: bool,
}

impl Sim {
    pub fn new(design: Design) -> Self {
        Self {
            design,
            kernel: Kernel::new(),
            product: "gpi-testkit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            precision: -12,
            objects: HashMap::new(),
            next_object: 0,
            finish_requested: false,
        }
    }

    pub fn with_identity(mut self, product: &str, version: &str) -> Self {
        self.product = product.to_string();
        self.version = version.to_string();
        self
    }

    pub fn with_precision(mut self, precision: i32) -> Self {
        self.precision = precision;
        self
    }

    pub fn shared(self) -> SharedSim {
        Rc::new(RefCell::new(self))
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn precision(&self) -> i32 {
        self.precision
    }

    pub fn now(&self) -> u64 {
        self.kernel.now()
    }

    // ---- Native object space ----

    fn alloc(&mut self, obj: NativeObj) -> usize {
        // Spaced like pointers so that tests cannot confuse them with ids.
        self.next_object += 1;
        let raw = 0x1000 + self.next_object * 0x10;
        self.objects.insert(raw, obj);
        raw
    }

    /// New native reference to a design node.
    pub fn alloc_node(&mut self, node: NodeId) -> usize {
        self.alloc(NativeObj::Node(node))
    }

    pub fn alloc_other(&mut self) -> usize {
        self.alloc(NativeObj::Other)
    }

    pub fn object(&self, raw: usize) -> Option<NativeObj> {
        self.objects.get(&raw).copied()
    }

    pub fn node_of(&self, raw: usize) -> Option<NodeId> {
        match self.object(raw)? {
            NativeObj::Node(node) => Some(node),
            NativeObj::Other => None,
        }
    }

    /// Free a native reference. False if it was not live.
    pub fn free(&mut self, raw: usize) -> bool {
        self.objects.remove(&raw).is_some()
    }

    /// Live references to design nodes; zero once every handle is released.
    pub fn live_nodes(&self) -> usize {
        self.objects
            .values()
            .filter(|o| matches!(o, NativeObj::Node(_)))
            .count()
    }

    // ---- Values and time ----

    pub fn read(&self, node: NodeId) -> Option<NodeValue> {
        self.design.value(node)
    }

    /// Write and notify watchers of every node that changed.
    pub fn write(&mut self, node: NodeId, value: NodeValue, drive: Drive) -> Result<()> {
        for changed in self.design.write(node, value, drive)? {
            self.kernel.notify(changed);
        }
        Ok(())
    }

    pub fn schedule(&mut self, trigger: Trigger, user_data: u64) -> u64 {
        self.kernel.schedule(trigger, user_data)
    }

    pub fn cancel(&mut self, token: u64) -> bool {
        self.kernel.cancel(token)
    }

    pub fn request_finish(&mut self) {
        self.finish_requested = true;
        self.kernel.finish();
    }

    pub fn finish_requested(&self) -> bool {
        self.finish_requested
    }
}

/// Deliver every event up to `until`. `deliver` runs with no borrow of the
/// simulation held, so it may call back into it. Returns the number of
/// deliveries.
pub fn run_until(sim: &SharedSim, until: u64, mut deliver: impl FnMut(u64)) -> usize {
    let mut count = 0;
    loop {
        let next = sim.borrow_mut().kernel.next_event(until);
        match next {
            Some(user_data) => {
                deliver(user_data);
                count += 1;
            }
            None => return count,
        }
    }
}

/// Deliver start-of-simulation callbacks and anything due at time zero.
pub fn start(sim: &SharedSim, deliver: impl FnMut(u64)) -> usize {
    sim.borrow_mut().kernel.start();
    let now = sim.borrow().now();
    run_until(sim, now, deliver)
}

/// End the simulation and deliver end-of-simulation callbacks.
pub fn finish(sim: &SharedSim, deliver: impl FnMut(u64)) -> usize {
    sim.borrow_mut().request_finish();
    let now = sim.borrow().now();
    run_until(sim, now, deliver)
}
