//! Typed `u32` handles and the arenas they index.
//!
//! A [`FlowGraph`](crate::ir::FlowGraph) owns one arena each for blocks,
//! instructions and SSA values. Handles stay valid for the life of the graph:
//! unlinking an instruction detaches it from its block but keeps its slot, so
//! a stale handle still reads the detached instruction rather than another.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// A handle into one of the graph arenas.
pub trait EntityRef: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    fn new(index: u32) -> Self;
    fn index(self) -> u32;

    fn slot(self) -> usize {
        self.index() as usize
    }
}

/// Declare a handle type. Handles serialize as their bare index.
#[macro_export]
macro_rules! define_entity {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $crate::entity::EntityRef for $name {
            fn new(index: u32) -> Self {
                Self(index)
            }
            fn index(self) -> u32 {
                self.0
            }
        }
    };
}

/// Append-only arena. The handle returned by `push` is the slot number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryMap<K: EntityRef, V> {
    slots: Vec<V>,
    #[serde(skip)]
    marker: PhantomData<K>,
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            marker: PhantomData,
        }
    }

    pub fn push(&mut self, value: V) -> K {
        let key = self.next_key();
        self.slots.push(value);
        key
    }

    /// Handle of the next value to be pushed. Lets an instruction name its
    /// own result before the result definition exists.
    pub fn next_key(&self) -> K {
        K::new(self.slots.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `key` names a slot of this arena.
    pub fn contains_key(&self, key: K) -> bool {
        key.slot() < self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        (0u32..).map(K::new).zip(self.slots.iter())
    }

    pub fn values(&self) -> std::slice::Iter<'_, V> {
        self.slots.iter()
    }

    pub fn values_mut(&mut self) -> std::slice::IterMut<'_, V> {
        self.slots.iter_mut()
    }
}

impl<K: EntityRef, V> std::ops::Index<K> for PrimaryMap<K, V> {
    type Output = V;
    fn index(&self, key: K) -> &V {
        &self.slots[key.slot()]
    }
}

impl<K: EntityRef, V> std::ops::IndexMut<K> for PrimaryMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut V {
        &mut self.slots[key.slot()]
    }
}

/// Visited marks for graph walks.
#[derive(Debug, Clone)]
pub struct EntitySet<K: EntityRef> {
    marks: Vec<bool>,
    count: usize,
    marker: PhantomData<K>,
}

impl<K: EntityRef> Default for EntitySet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef> EntitySet<K> {
    pub fn new() -> Self {
        Self {
            marks: Vec::new(),
            count: 0,
            marker: PhantomData,
        }
    }

    /// Mark `key`. False if it was already marked.
    pub fn insert(&mut self, key: K) -> bool {
        let slot = key.slot();
        if slot >= self.marks.len() {
            self.marks.resize(slot + 1, false);
        }
        let fresh = !std::mem::replace(&mut self.marks[slot], true);
        self.count += usize::from(fresh);
        fresh
    }

    pub fn contains(&self, key: K) -> bool {
        self.marks.get(key.slot()).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
