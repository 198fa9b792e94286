//! Handle abstraction: typed references to simulated design objects.
//!
//! A backend hands out native references (pointers or ids). An
//! [`ObjectHandle`] wraps one together with the metadata read when it was
//! created, and remembers which adapter owns it. Handles live in a
//! [`HandleTable`]; callers only ever see [`HandleId`]s.
//!
//! A generate-array pseudo-region borrows the native reference of the
//! region that contains the generate blocks. The table counts every live
//! holder of a native reference and asks for it to be freed once, when the
//! last holder is gone, and only if some holder owned it.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use crate::error::{GpiError, Result};
use crate::kind::{ObjectKind, Range};
use crate::value::ValueFormat;

/// Opaque native reference owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawRef(NonZeroUsize);

impl RawRef {
    pub fn new(value: usize) -> Option<Self> {
        NonZeroUsize::new(value).map(Self)
    }

    pub fn from_ptr<T>(ptr: *mut T) -> Option<Self> {
        Self::new(ptr as usize)
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0.get() as *mut T
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Index of a registered adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterId(pub(crate) usize);

impl AdapterId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Identifier of a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the design unit of an object was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub file: Option<String>,
}

/// Metadata cached when a handle is created.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleMeta {
    pub name: String,
    pub full_name: String,
    pub kind: ObjectKind,
    pub is_const: bool,
    pub indexable: bool,
    pub num_elems: usize,
    pub range: Option<Range>,
    pub definition: Option<Definition>,
}

impl HandleMeta {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            kind,
            is_const: false,
            indexable: false,
            num_elems: 0,
            range: None,
            definition: None,
        }
    }

    /// Record a declared range; the object becomes indexable.
    pub fn with_range(mut self, range: Range) -> Self {
        self.indexable = true;
        self.num_elems = range.len();
        self.range = Some(range);
        self
    }

    pub fn with_elems(mut self, num_elems: usize) -> Self {
        self.num_elems = num_elems;
        self
    }

    pub fn constant(mut self, is_const: bool) -> Self {
        self.is_const = is_const;
        self
    }

    pub fn with_definition(mut self, definition: Option<Definition>) -> Self {
        self.definition = definition;
        self
    }
}

/// Value-side state of a signal handle.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalData {
    format: ValueFormat,
    width: usize,
    binstr: Option<String>,
}

impl SignalData {
    pub fn format(&self) -> ValueFormat {
        self.format
    }

    /// Width in bits (or characters, or elements) of the value.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Store a freshly read binary string in the scratch buffer, which is
    /// allocated at the signal's width on first use.
    pub fn store_binstr(&mut self, value: &str) -> &str {
        let width = self.width;
        let buf = self.binstr.get_or_insert_with(|| String::with_capacity(width));
        buf.clear();
        buf.push_str(value);
        buf
    }

    /// Last value read through the binary-string path.
    pub fn last_binstr(&self) -> Option<&str> {
        self.binstr.as_deref()
    }
}

/// How a handle holds its native reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Owned(RawRef),
    /// Pseudo-region: the reference belongs to the enclosing real region.
    Borrowed(RawRef),
}

/// One simulated design object.
#[derive(Debug)]
pub struct ObjectHandle {
    adapter: AdapterId,
    backing: Backing,
    meta: HandleMeta,
    signal: Option<SignalData>,
}

impl ObjectHandle {
    /// A non-signal object (scope, array, struct).
    pub fn object(adapter: AdapterId, raw: RawRef, meta: HandleMeta) -> Self {
        Self {
            adapter,
            backing: Backing::Owned(raw),
            meta,
            signal: None,
        }
    }

    /// A value-carrying object. Zero width is rejected.
    pub fn new_signal(
        adapter: AdapterId,
        raw: RawRef,
        meta: HandleMeta,
        format: ValueFormat,
        width: usize,
    ) -> Result<Self> {
        if width == 0 {
            return Err(GpiError::unsupported(format!(
                "{} has zero width",
                meta.full_name
            )));
        }
        Ok(Self {
            adapter,
            backing: Backing::Owned(raw),
            meta,
            signal: Some(SignalData {
                format,
                width,
                binstr: None,
            }),
        })
    }

    /// A generate-array pseudo-region labelled `name`, borrowing the native
    /// reference of the region that holds the generate blocks.
    pub fn pseudo_region(
        adapter: AdapterId,
        borrowed: RawRef,
        name: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        let mut meta = HandleMeta::new(name, full_name, ObjectKind::GenArray);
        meta.indexable = true;
        Self {
            adapter,
            backing: Backing::Borrowed(borrowed),
            meta,
            signal: None,
        }
    }

    pub fn adapter(&self) -> AdapterId {
        self.adapter
    }

    pub fn backing(&self) -> Backing {
        self.backing
    }

    pub fn raw(&self) -> RawRef {
        match self.backing {
            Backing::Owned(raw) | Backing::Borrowed(raw) => raw,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self.backing, Backing::Borrowed(_))
    }

    pub fn meta(&self) -> &HandleMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn full_name(&self) -> &str {
        &self.meta.full_name
    }

    pub fn kind(&self) -> ObjectKind {
        self.meta.kind
    }

    pub fn signal(&self) -> Option<&SignalData> {
        self.signal.as_ref()
    }

    pub fn signal_mut(&mut self) -> Option<&mut SignalData> {
        self.signal.as_mut()
    }

    /// Signal data, or an error naming the object when it carries no value.
    pub fn require_signal(&self) -> Result<&SignalData> {
        self.signal.as_ref().ok_or_else(|| {
            GpiError::unsupported(format!(
                "{} ({}) has no value",
                self.meta.full_name, self.meta.kind
            ))
        })
    }
}

#[derive(Debug)]
struct Slot {
    handle: ObjectHandle,
    released: bool,
    pins: u32,
}

#[derive(Debug, Clone, Copy)]
struct Holders {
    count: usize,
    owned: bool,
}

/// Arena of live handles.
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: HashMap<HandleId, Slot>,
    holders: HashMap<(AdapterId, RawRef), Holders>,
    next_id: u64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ObjectHandle) -> HandleId {
        self.next_id += 1;
        let id = HandleId(self.next_id);
        let holders = self
            .holders
            .entry((handle.adapter, handle.raw()))
            .or_insert(Holders {
                count: 0,
                owned: false,
            });
        holders.count += 1;
        holders.owned |= !handle.is_pseudo();
        self.slots.insert(
            id,
            Slot {
                handle,
                released: false,
                pins: 0,
            },
        );
        id
    }

    /// Look up a handle the caller still owns.
    pub fn get(&self, id: HandleId) -> Result<&ObjectHandle> {
        match self.slots.get(&id) {
            Some(slot) if !slot.released => Ok(&slot.handle),
            _ => Err(GpiError::InvalidHandle(id)),
        }
    }

    pub fn get_mut(&mut self, id: HandleId) -> Result<&mut ObjectHandle> {
        match self.slots.get_mut(&id) {
            Some(slot) if !slot.released => Ok(&mut slot.handle),
            _ => Err(GpiError::InvalidHandle(id)),
        }
    }

    /// Look up a handle that is kept alive by a pin, even if its owner has
    /// released it.
    pub fn get_pinned_mut(&mut self, id: HandleId) -> Result<&mut ObjectHandle> {
        match self.slots.get_mut(&id) {
            Some(slot) if slot.pins > 0 || !slot.released => Ok(&mut slot.handle),
            _ => Err(GpiError::InvalidHandle(id)),
        }
    }

    /// Keep a handle's native resources alive past its owner's release.
    pub fn pin(&mut self, id: HandleId) -> Result<()> {
        match self.slots.get_mut(&id) {
            Some(slot) if !slot.released => {
                slot.pins += 1;
                Ok(())
            }
            _ => Err(GpiError::InvalidHandle(id)),
        }
    }

    /// Drop one pin. Returns the native reference to free, if this was the
    /// last thing keeping it alive.
    pub fn unpin(&mut self, id: HandleId) -> Option<(AdapterId, RawRef)> {
        let slot = self.slots.get_mut(&id)?;
        slot.pins = slot.pins.saturating_sub(1);
        if slot.pins == 0 && slot.released {
            self.drop_slot(id)
        } else {
            None
        }
    }

    /// Release a handle on behalf of its owner. Releasing twice is an
    /// error. Returns the native reference to free, if any.
    pub fn release(&mut self, id: HandleId) -> Result<Option<(AdapterId, RawRef)>> {
        let slot = match self.slots.get_mut(&id) {
            Some(slot) if !slot.released => slot,
            _ => return Err(GpiError::InvalidHandle(id)),
        };
        slot.released = true;
        if slot.pins > 0 {
            return Ok(None);
        }
        Ok(self.drop_slot(id))
    }

    fn drop_slot(&mut self, id: HandleId) -> Option<(AdapterId, RawRef)> {
        let slot = self.slots.remove(&id)?;
        let key = (slot.handle.adapter, slot.handle.raw());
        let holders = self.holders.get_mut(&key)?;
        holders.count -= 1;
        if holders.count > 0 {
            return None;
        }
        let owned = holders.owned;
        self.holders.remove(&key);
        owned.then_some(key)
    }

    /// Number of handles with live native resources.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Remove every handle, returning the native references to free.
    pub fn drain(&mut self) -> Vec<(AdapterId, RawRef)> {
        let owned: Vec<(AdapterId, RawRef)> = self
            .holders
            .iter()
            .filter(|(_, h)| h.owned)
            .map(|(key, _)| *key)
            .collect();
        self.slots.clear();
        self.holders.clear();
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: AdapterId = AdapterId(0);

    fn raw(v: usize) -> RawRef {
        RawRef::new(v).unwrap()
    }

    fn module(r: usize, name: &str) -> ObjectHandle {
        ObjectHandle::object(A, raw(r), HandleMeta::new(name, name, ObjectKind::Module))
    }

    #[test]
    fn zero_width_signal_is_rejected() {
        let meta = HandleMeta::new("s", "top.s", ObjectKind::Net);
        let err = ObjectHandle::new_signal(A, raw(1), meta, ValueFormat::LogicVec, 0).unwrap_err();
        assert!(matches!(err, GpiError::Unsupported { .. }));
    }

    #[test]
    fn scratch_buffer_is_lazy() {
        let meta = HandleMeta::new("s", "top.s", ObjectKind::Net);
        let mut h = ObjectHandle::new_signal(A, raw(1), meta, ValueFormat::LogicVec, 4).unwrap();
        assert!(h.signal().unwrap().last_binstr().is_none());
        let sig = h.signal_mut().unwrap();
        assert_eq!(sig.store_binstr("01XZ"), "01XZ");
        assert_eq!(sig.last_binstr(), Some("01XZ"));
    }

    #[test]
    fn release_twice_is_an_error() {
        let mut table = HandleTable::new();
        let id = table.insert(module(1, "top"));
        assert_eq!(table.release(id).unwrap(), Some((A, raw(1))));
        assert!(matches!(table.release(id), Err(GpiError::InvalidHandle(_))));
        assert!(table.get(id).is_err());
    }

    #[test]
    fn pseudo_region_never_frees_borrowed_reference_early() {
        let mut table = HandleTable::new();
        let parent = table.insert(module(7, "top"));
        let pseudo = table.insert(ObjectHandle::pseudo_region(A, raw(7), "loop", "top.loop"));

        // Parent goes first: the pseudo-region still needs the reference.
        assert_eq!(table.release(parent).unwrap(), None);
        assert_eq!(table.get(pseudo).unwrap().raw(), raw(7));
        assert_eq!(table.release(pseudo).unwrap(), Some((A, raw(7))));
        assert!(table.is_empty());
    }

    #[test]
    fn pseudo_region_release_alone_frees_nothing() {
        let mut table = HandleTable::new();
        let parent = table.insert(module(7, "top"));
        let pseudo = table.insert(ObjectHandle::pseudo_region(A, raw(7), "loop", "top.loop"));
        assert_eq!(table.release(pseudo).unwrap(), None);
        assert_eq!(table.release(parent).unwrap(), Some((A, raw(7))));
    }

    #[test]
    fn duplicate_owned_reference_freed_once() {
        let mut table = HandleTable::new();
        let a = table.insert(module(3, "top"));
        let b = table.insert(module(3, "top"));
        assert_eq!(table.release(a).unwrap(), None);
        assert_eq!(table.release(b).unwrap(), Some((A, raw(3))));
    }

    #[test]
    fn pinned_handle_outlives_release() {
        let mut table = HandleTable::new();
        let id = table.insert(module(5, "top"));
        table.pin(id).unwrap();
        assert_eq!(table.release(id).unwrap(), None);
        assert!(table.get(id).is_err());
        assert!(table.get_pinned_mut(id).is_ok());
        assert_eq!(table.unpin(id), Some((A, raw(5))));
        assert!(table.get_pinned_mut(id).is_err());
    }
}
