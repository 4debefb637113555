use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::class_id::{CidSet, ClassId};
use super::recognized::RecognizedKind;
use super::value::DeoptId;

/// What a call target is, as far as the optimizer cares.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetKind {
    #[default]
    Regular,
    /// Compiler-generated getter returning field `field`.
    ImplicitGetter { field: String },
    /// Compiler-generated setter storing into field `field`.
    ImplicitSetter { field: String },
    /// A runtime function entered through the native call stub.
    Native,
}

/// A resolved callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Qualified name, e.g. `"_GrowableList.[]"`.
    pub name: String,
    #[serde(default)]
    pub kind: TargetKind,
}

impl Target {
    pub fn regular(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Regular,
        }
    }

    pub fn getter(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::ImplicitGetter {
                field: field.into(),
            },
        }
    }

    pub fn setter(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::ImplicitSetter {
                field: field.into(),
            },
        }
    }

    pub fn native(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Native,
        }
    }

    pub fn recognized(&self) -> Option<RecognizedKind> {
        match self.kind {
            TargetKind::Regular => RecognizedKind::lookup(&self.name),
            _ => None,
        }
    }
}

/// One observed combination of argument classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcEntry {
    /// Class ids of the tested arguments, receiver first.
    pub cids: Vec<ClassId>,
    pub count: u32,
    #[serde(default)]
    pub target: Option<Target>,
}

impl IcEntry {
    pub fn receiver(&self) -> ClassId {
        self.cids.first().copied().unwrap_or(ClassId::ILLEGAL)
    }
}

/// Inline-cache feedback for one call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcData {
    pub num_args_tested: u32,
    #[serde(default)]
    pub entries: Vec<IcEntry>,
}

impl IcData {
    pub fn new(num_args_tested: u32) -> Self {
        Self {
            num_args_tested,
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, cids: &[ClassId], count: u32, target: Option<Target>) -> Self {
        self.entries.push(IcEntry {
            cids: cids.to_vec(),
            count,
            target,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn number_of_checks(&self) -> usize {
        self.entries.len()
    }

    /// Collapse to receiver-only feedback, summing counts per receiver class.
    /// A receiver keeps its target only when every merged entry agrees on it.
    pub fn as_unary(&self) -> IcData {
        let mut merged: Vec<IcEntry> = Vec::new();
        for entry in &self.entries {
            let receiver = entry.receiver();
            match merged.iter_mut().find(|m| m.cids[0] == receiver) {
                Some(m) => {
                    m.count = m.count.saturating_add(entry.count);
                    if m.target != entry.target {
                        m.target = None;
                    }
                }
                None => merged.push(IcEntry {
                    cids: vec![receiver],
                    count: entry.count,
                    target: entry.target.clone(),
                }),
            }
        }
        IcData {
            num_args_tested: 1,
            entries: merged,
        }
    }

    /// Distinct receiver classes seen.
    pub fn receiver_cids(&self) -> CidSet {
        CidSet::new(self.entries.iter().map(IcEntry::receiver))
    }

    /// Class ids observed for argument `index`.
    pub fn arg_cids(&self, index: usize) -> CidSet {
        CidSet::new(self.entries.iter().filter_map(|e| e.cids.get(index).copied()))
    }

    pub fn num_receiver_classes(&self) -> usize {
        self.receiver_cids().len()
    }

    pub fn is_monomorphic(&self) -> bool {
        self.num_receiver_classes() == 1
    }

    /// Receiver classes with their targets, by descending count; equal counts
    /// order by the smaller class id.
    pub fn sorted_receiver_targets(&self) -> Vec<(ClassId, Option<Target>, u32)> {
        let mut targets: Vec<_> = self
            .as_unary()
            .entries
            .into_iter()
            .map(|e| (e.cids[0], e.target, e.count))
            .collect();
        targets.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        targets
    }

    /// Entries whose receiver is `cid`.
    pub fn specialize(&self, cid: ClassId) -> IcData {
        IcData {
            num_args_tested: self.num_args_tested,
            entries: self
                .entries
                .iter()
                .filter(|e| e.receiver() == cid)
                .cloned()
                .collect(),
        }
    }

    /// The single target every entry resolved to.
    pub fn unique_target(&self) -> Option<&Target> {
        let first = self.entries.first()?.target.as_ref()?;
        self.entries
            .iter()
            .all(|e| e.target.as_ref() == Some(first))
            .then_some(first)
    }

    /// True if every entry's tested arguments are all in `allowed`.
    pub fn has_only(&self, allowed: &[ClassId]) -> bool {
        !self.is_empty()
            && self
                .entries
                .iter()
                .all(|e| e.cids.iter().all(|c| allowed.contains(c)))
    }

    pub fn has_two_smis(&self) -> bool {
        self.num_args_tested == 2 && self.has_only(&[ClassId::SMI])
    }

    pub fn has_two_mint_or_smi(&self) -> bool {
        self.num_args_tested == 2 && self.has_only(&[ClassId::SMI, ClassId::MINT])
    }

    /// Doubles were seen and nothing but doubles and Smis.
    pub fn should_specialize_for_double(&self) -> bool {
        self.has_only(&[ClassId::SMI, ClassId::DOUBLE])
            && self
                .entries
                .iter()
                .any(|e| e.cids.contains(&ClassId::DOUBLE))
    }
}

/// Per-unit store of collected inline-cache feedback, keyed by the deopt id of
/// the call site that recorded it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackStore {
    entries: BTreeMap<DeoptId, IcData>,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deopt_id: DeoptId, data: IcData) {
        self.entries.insert(deopt_id, data);
    }

    pub fn get(&self, deopt_id: DeoptId) -> Option<&IcData> {
        self.entries.get(&deopt_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly() -> IcData {
        IcData::new(1)
            .with_entry(&[ClassId(101)], 5, Some(Target::regular("A.f")))
            .with_entry(&[ClassId(100)], 5, Some(Target::regular("B.f")))
            .with_entry(&[ClassId(102)], 9, Some(Target::regular("C.f")))
    }

    /// Ties in count order by the numerically smaller class id.
    #[test]
    fn sorted_targets_break_ties_by_class_id() {
        let order: Vec<ClassId> = poly()
            .sorted_receiver_targets()
            .into_iter()
            .map(|(cid, _, _)| cid)
            .collect();
        assert_eq!(order, vec![ClassId(102), ClassId(100), ClassId(101)]);
    }

    #[test]
    fn as_unary_merges_receivers() {
        let ic = IcData::new(2)
            .with_entry(&[ClassId::SMI, ClassId::SMI], 3, Some(Target::regular("_Smi.+")))
            .with_entry(&[ClassId::SMI, ClassId::DOUBLE], 2, Some(Target::regular("_Smi.+")));
        let unary = ic.as_unary();
        assert_eq!(unary.num_args_tested, 1);
        assert_eq!(unary.entries.len(), 1);
        assert_eq!(unary.entries[0].count, 5);
        assert!(unary.is_monomorphic());
        assert_eq!(unary.unique_target(), Some(&Target::regular("_Smi.+")));
    }

    #[test]
    fn merged_counts_saturate() {
        let ic = IcData::new(2)
            .with_entry(&[ClassId::SMI, ClassId::SMI], u32::MAX, None)
            .with_entry(&[ClassId::SMI, ClassId::DOUBLE], 1, None)
            .with_entry(&[ClassId::DOUBLE, ClassId::SMI], 7, None);
        let unary = ic.as_unary();
        assert_eq!(unary.entries[0].count, u32::MAX);
        let order: Vec<ClassId> = ic
            .sorted_receiver_targets()
            .into_iter()
            .map(|(cid, _, _)| cid)
            .collect();
        assert_eq!(order, vec![ClassId::SMI, ClassId::DOUBLE]);
    }

    #[test]
    fn double_specialization_needs_a_double() {
        let smis = IcData::new(2).with_entry(&[ClassId::SMI, ClassId::SMI], 1, None);
        assert!(smis.has_two_smis());
        assert!(!smis.should_specialize_for_double());

        let mixed = smis.with_entry(&[ClassId::DOUBLE, ClassId::SMI], 1, None);
        assert!(!mixed.has_two_smis());
        assert!(mixed.should_specialize_for_double());
        assert!(!mixed.has_two_mint_or_smi());
    }

    #[test]
    fn getter_targets_are_not_recognized() {
        assert!(Target::getter("_GrowableList.length", "length").recognized().is_none());
        assert!(Target::regular("_GrowableList.length").recognized().is_some());
    }

    #[test]
    fn feedback_store_round_trips_through_json() {
        let mut store = FeedbackStore::new();
        store.insert(DeoptId(4), poly());
        let json = serde_json::to_string(&store).unwrap();
        let back: FeedbackStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(DeoptId(4)), Some(&poly()));
    }
}
