use serde::{Deserialize, Serialize};

use super::value::{DeoptId, ValueId};

/// A value proven to be in tagged representation.
///
/// Only [`FlowGraph::tagged`](super::FlowGraph::tagged) hands these out, so
/// environment slots can never be written with an unboxed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaggedValue(ValueId);

impl TaggedValue {
    pub(crate) fn new_unchecked(value: ValueId) -> Self {
        TaggedValue(value)
    }

    pub fn value(self) -> ValueId {
        self.0
    }
}

/// Deoptimization environment: the values of the unoptimized frame's slots
/// at the point execution resumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    deopt_id: DeoptId,
    slots: Vec<ValueId>,
}

impl Environment {
    pub fn new(deopt_id: DeoptId, slots: impl IntoIterator<Item = TaggedValue>) -> Self {
        Self {
            deopt_id,
            slots: slots.into_iter().map(TaggedValue::value).collect(),
        }
    }

    pub fn deopt_id(&self) -> DeoptId {
        self.deopt_id
    }

    pub fn slots(&self) -> &[ValueId] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn set(&mut self, index: usize, value: TaggedValue) {
        self.slots[index] = value.value();
    }
}
