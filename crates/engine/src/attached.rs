//! Attached set: the refs a transaction has touched
//!
//! One enum with three backings chosen by [`SpeculativeConfig`]
//! (see [`AttachedSetKind`]). The fixed-capacity backings hand an entry
//! back when full so the transaction can release it and fail with a
//! speculative configuration error.
//!
//! [`SpeculativeConfig`]: crate::speculative::SpeculativeConfig

use crate::entry::AttachedEntry;
use crate::speculative::AttachedSetKind;
use orecstm_core::RefId;
use rustc_hash::FxHashMap;

pub(crate) type BoxedEntry = Box<dyn AttachedEntry>;

pub(crate) enum AttachedSet {
    Mono(Option<BoxedEntry>),
    Array {
        entries: Vec<BoxedEntry>,
        capacity: usize,
    },
    Growable(FxHashMap<RefId, BoxedEntry>),
}

impl AttachedSet {
    pub(crate) fn new(kind: AttachedSetKind, max_array_size: usize) -> Self {
        match kind {
            AttachedSetKind::Mono => AttachedSet::Mono(None),
            AttachedSetKind::Array => AttachedSet::Array {
                entries: Vec::with_capacity(max_array_size),
                capacity: max_array_size,
            },
            AttachedSetKind::Growable => AttachedSet::Growable(FxHashMap::default()),
        }
    }

    pub(crate) fn kind(&self) -> AttachedSetKind {
        match self {
            AttachedSet::Mono(_) => AttachedSetKind::Mono,
            AttachedSet::Array { .. } => AttachedSetKind::Array,
            AttachedSet::Growable(_) => AttachedSetKind::Growable,
        }
    }

    /// Re-initialise for `kind`, keeping allocations when the kind matches
    pub(crate) fn reset(&mut self, kind: AttachedSetKind, max_array_size: usize) {
        match self {
            AttachedSet::Array { entries, capacity }
                if kind == AttachedSetKind::Array && *capacity == max_array_size =>
            {
                entries.clear();
            }
            AttachedSet::Growable(map) if kind == AttachedSetKind::Growable => map.clear(),
            _ => *self = AttachedSet::new(kind, max_array_size),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            AttachedSet::Mono(slot) => usize::from(slot.is_some()),
            AttachedSet::Array { entries, .. } => entries.len(),
            AttachedSet::Growable(map) => map.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn contains(&self, id: RefId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn get(&self, id: RefId) -> Option<&BoxedEntry> {
        match self {
            AttachedSet::Mono(slot) => slot.as_ref().filter(|e| e.ref_id() == id),
            AttachedSet::Array { entries, .. } => entries.iter().find(|e| e.ref_id() == id),
            AttachedSet::Growable(map) => map.get(&id),
        }
    }

    pub(crate) fn get_mut(&mut self, id: RefId) -> Option<&mut BoxedEntry> {
        match self {
            AttachedSet::Mono(slot) => slot.as_mut().filter(|e| e.ref_id() == id),
            AttachedSet::Array { entries, .. } => entries.iter_mut().find(|e| e.ref_id() == id),
            AttachedSet::Growable(map) => map.get_mut(&id),
        }
    }

    /// Attach a new entry. Returns it back when a fixed-capacity backing is
    /// full.
    pub(crate) fn insert(&mut self, entry: BoxedEntry) -> Result<(), BoxedEntry> {
        debug_assert!(!self.contains(entry.ref_id()));
        match self {
            AttachedSet::Mono(slot) => {
                if slot.is_some() {
                    return Err(entry);
                }
                *slot = Some(entry);
            }
            AttachedSet::Array { entries, capacity } => {
                if entries.len() >= *capacity {
                    return Err(entry);
                }
                entries.push(entry);
            }
            AttachedSet::Growable(map) => {
                map.insert(entry.ref_id(), entry);
            }
        }
        Ok(())
    }

    pub(crate) fn iter(&self) -> Box<dyn Iterator<Item = &BoxedEntry> + '_> {
        match self {
            AttachedSet::Mono(slot) => Box::new(slot.iter()),
            AttachedSet::Array { entries, .. } => Box::new(entries.iter()),
            AttachedSet::Growable(map) => Box::new(map.values()),
        }
    }

    pub(crate) fn iter_mut(&mut self) -> Box<dyn Iterator<Item = &mut BoxedEntry> + '_> {
        match self {
            AttachedSet::Mono(slot) => Box::new(slot.iter_mut()),
            AttachedSet::Array { entries, .. } => Box::new(entries.iter_mut()),
            AttachedSet::Growable(map) => Box::new(map.values_mut()),
        }
    }

    /// Remove every entry, leaving the backing in place
    pub(crate) fn drain(&mut self) -> Vec<BoxedEntry> {
        match self {
            AttachedSet::Mono(slot) => slot.take().into_iter().collect(),
            AttachedSet::Array { entries, .. } => entries.drain(..).collect(),
            AttachedSet::Growable(map) => map.drain().map(|(_, e)| e).collect(),
        }
    }
}
