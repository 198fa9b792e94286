//! Hierarchy traversal.
//!
//! An iterator walks an ordered list of one-to-many relations below one
//! parent. Each relation is opened as a native sub-iterator; a relation
//! with no objects is skipped, and the traversal ends after the last
//! relation is exhausted. The relation lists themselves, and which native
//! kinds are skipped, are adapter business.

use std::collections::{HashSet, VecDeque};

use crate::handle::{ObjectHandle, RawRef};
use crate::kind::ObjectKind;
use crate::name;

/// Native one-to-many relation code (`vpiNet`, `vhpiSigDecls`, ...).
pub type Relation = i32;

/// A native sub-iterator over one relation.
#[derive(Debug)]
pub enum SubIter {
    /// Backend iterator object, freed by the backend on exhaustion.
    Native(RawRef),
    /// Objects collected up front, for backends with first/next calls only.
    Buffered(VecDeque<RawRef>),
}

/// Backend hooks used by [`IterState::next_raw`].
pub trait NativeWalk {
    /// Open `relation` below `parent`; `None` when it yields nothing.
    fn open(&mut self, parent: RawRef, relation: Relation) -> Option<SubIter>;

    /// Next object, or `None` once the sub-iterator is exhausted.
    fn scan(&mut self, sub: &mut SubIter) -> Option<RawRef>;

    /// Free a sub-iterator that is abandoned before exhaustion.
    fn close(&mut self, sub: SubIter);
}

/// Adapter answer for one step of a traversal.
#[derive(Debug)]
pub enum NextChild {
    /// A child this adapter materialized.
    Native(ObjectHandle),
    /// A child this adapter cannot represent; another adapter may.
    Foreign(RawRef),
    /// A child with no name that no other adapter could resolve either.
    Unnamed,
    /// Every relation is exhausted.
    End,
}

/// Traversal state for one parent.
#[derive(Debug)]
pub struct IterState {
    parent: RawRef,
    parent_kind: ObjectKind,
    parent_full_name: String,
    pseudo_label: Option<String>,
    candidates: Vec<Relation>,
    cursor: usize,
    current: Option<Relation>,
    sub: Option<SubIter>,
    seen: HashSet<String>,
}

impl IterState {
    /// Prepare a traversal of `parent` over `candidates`, in priority order.
    ///
    /// A pseudo-region parent restricts children to generate blocks whose
    /// label matches its own name.
    pub fn new(parent: &ObjectHandle, candidates: Vec<Relation>) -> Self {
        Self {
            parent: parent.raw(),
            parent_kind: parent.kind(),
            parent_full_name: parent.full_name().to_string(),
            pseudo_label: parent.is_pseudo().then(|| parent.name().to_string()),
            candidates,
            cursor: 0,
            current: None,
            sub: None,
            seen: HashSet::new(),
        }
    }

    pub fn parent_raw(&self) -> RawRef {
        self.parent
    }

    pub fn parent_kind(&self) -> ObjectKind {
        self.parent_kind
    }

    pub fn parent_full_name(&self) -> &str {
        &self.parent_full_name
    }

    pub fn pseudo_label(&self) -> Option<&str> {
        self.pseudo_label.as_deref()
    }

    /// Relation the current sub-iterator walks.
    pub fn relation(&self) -> Option<Relation> {
        self.current
    }

    /// Whether a child named `child_name` belongs in this traversal.
    pub fn accepts(&self, child_name: &str) -> bool {
        match &self.pseudo_label {
            Some(label) => name::matches_generate_label(child_name, label),
            None => true,
        }
    }

    /// Advance to the next native object, opening relations as needed.
    pub fn next_raw(&mut self, walk: &mut impl NativeWalk) -> Option<RawRef> {
        loop {
            if let Some(sub) = self.sub.as_mut() {
                if let Some(obj) = walk.scan(sub) {
                    return Some(obj);
                }
                self.sub = None;
            }
            let relation = *self.candidates.get(self.cursor)?;
            self.cursor += 1;
            self.current = Some(relation);
            self.sub = walk.open(self.parent, relation);
        }
    }

    /// Record a yielded child; false if it was already yielded.
    pub(crate) fn first_sighting(&mut self, full_name: &str) -> bool {
        self.seen.insert(full_name.to_string())
    }

    /// Free any open sub-iterator.
    pub fn close(mut self, walk: &mut impl NativeWalk) {
        if let Some(sub) = self.sub.take() {
            walk.close(sub);
        }
    }
}
