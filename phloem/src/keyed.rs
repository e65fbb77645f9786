//! Child list reconciliation.
//!
//! A [`ChildPlan`] holds everything needed to reconcile one parent's children
//! one entry at a time, so the walk can stop between any two siblings.
//!
//! Unkeyed lists are compared by position. Keyed lists are matched by key:
//! vanished keys are removed first (highest old index first), then the new
//! list is walked in order. A matched child stays where it is iff its old
//! index is greater than the old index of the last child that stayed;
//! everything else is moved to sit right after the previously placed
//! sibling. Prepending to a list therefore costs one insert and no moves.

use crate::error::{ReconcileError, Snapshot};
use crate::node::Key;
use crate::patch::{NodePath, PatchOp};
use crate::tree::{ChildIds, Tree};
#[allow(unused_imports)]
use crate::{debug, trace};
use indextree::NodeId;
use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};

/// Live-entry counts indexed by append order, 1-indexed internally.
#[derive(Debug, Default)]
struct Fenwick {
    tree: Vec<u32>,
}

impl Fenwick {
    fn new(len: usize) -> Self {
        Self {
            tree: vec![0; len + 1],
        }
    }

    fn insert(&mut self, index: usize) {
        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] += 1;
            i += lowbit(i);
        }
    }

    fn remove(&mut self, index: usize) {
        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] -= 1;
            i += lowbit(i);
        }
    }

    /// Live entries strictly before `index`.
    fn before(&self, index: usize) -> usize {
        let mut sum = 0;
        let mut i = index;
        while i > 0 {
            sum += self.tree[i] as usize;
            i -= lowbit(i);
        }
        sum
    }
}

#[inline]
fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

/// Keyed placement state.
///
/// After the removals, the live child list is a placed prefix followed by
/// the surviving old children that no placement has reached yet, in old
/// order. Every placement appends to the prefix: an insert or a move puts
/// the child right after the previously placed sibling, which is always the
/// prefix's last entry, and keeping a child in place pulls in every
/// surviving old child up to it. Positions inside the prefix are counted by
/// append order, so each op costs O(log n).
#[derive(Debug)]
struct KeyedState {
    old_index_by_key: HashMap<Key, usize>,
    /// Old indices to remove, highest first
    removals: Vec<usize>,
    /// Surviving old indices, ascending
    survivors: Vec<usize>,
    /// How many of `survivors` the prefix has reached
    reached: usize,
    /// Append order of each reached old child, by old index
    order_of_old: Vec<usize>,
    /// Live prefix entries by append order
    placed: Fenwick,
    appended: usize,
    prefix_len: usize,
    /// Old index of the last child left in place
    last_placed: Option<usize>,
}

impl KeyedState {
    fn new(
        old_index_by_key: HashMap<Key, usize>,
        removals: Vec<usize>,
        old_len: usize,
        new_len: usize,
    ) -> Self {
        let mut removed = vec![false; old_len];
        for &i in &removals {
            removed[i] = true;
        }
        let survivors: Vec<usize> = (0..old_len).filter(|&i| !removed[i]).collect();
        // Each survivor joins once, each new child appends at most once more.
        let capacity = survivors.len() + new_len;
        Self {
            old_index_by_key,
            removals,
            survivors,
            reached: 0,
            order_of_old: vec![0; old_len],
            placed: Fenwick::new(capacity),
            appended: 0,
            prefix_len: 0,
            last_placed: None,
        }
    }

    fn append(&mut self) -> usize {
        let order = self.appended;
        self.appended += 1;
        self.placed.insert(order);
        self.prefix_len += 1;
        order
    }

    /// Place a fresh child; returns its index.
    fn insert_new(&mut self) -> usize {
        self.append();
        self.prefix_len - 1
    }

    /// Leave old child `old_index` where it is, pulling everything before it
    /// into the prefix.
    fn keep(&mut self, old_index: usize) {
        while let Some(&next) = self.survivors.get(self.reached) {
            if next > old_index {
                break;
            }
            self.order_of_old[next] = self.append();
            self.reached += 1;
        }
        self.last_placed = Some(old_index);
    }

    /// Move reached old child `old_index` to the end of the prefix; returns
    /// its live index before and after.
    fn move_to_end(&mut self, old_index: usize) -> (usize, usize) {
        let order = self.order_of_old[old_index];
        let from = self.placed.before(order);
        self.placed.remove(order);
        self.prefix_len -= 1;
        self.order_of_old[old_index] = self.append();
        (from, self.prefix_len - 1)
    }
}

#[derive(Debug)]
enum Mode {
    Positional,
    Keyed(KeyedState),
}

/// A same-type pair whose subtree still needs diffing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Descend {
    pub index: usize,
    pub old: NodeId,
    pub new: NodeId,
}

/// Resumable reconciliation state for one parent's children.
#[derive(Debug)]
pub(crate) struct ChildPlan {
    old: ChildIds,
    new: ChildIds,
    mode: Mode,
    descend: Vec<Descend>,
}

impl ChildPlan {
    /// Validate both child lists and build a plan.
    pub fn new(
        current: &Tree,
        old_parent: NodeId,
        wip: &Tree,
        new_parent: NodeId,
        path: &NodePath,
    ) -> Result<Self, Vec<ReconcileError>> {
        let old = current.child_ids(old_parent);
        let new = wip.child_ids(new_parent);

        let keyed = validate_keys(current, &old, wip, &new, path)?;

        let mode = if keyed {
            let mut old_index_by_key = HashMap::default();
            for (i, &id) in old.iter().enumerate() {
                if let Some(key) = &current.get(id).key {
                    old_index_by_key.insert(key.clone(), i);
                }
            }
            let mut new_keys: HashSet<&Key> = HashSet::default();
            for &id in &new {
                if let Some(key) = &wip.get(id).key {
                    new_keys.insert(key);
                }
            }
            let removals: Vec<usize> = old
                .iter()
                .enumerate()
                .rev()
                .filter(|(_, id)| {
                    current
                        .get(**id)
                        .key
                        .as_ref()
                        .is_some_and(|k| !new_keys.contains(k))
                })
                .map(|(i, _)| i)
                .collect();
            Mode::Keyed(KeyedState::new(
                old_index_by_key,
                removals,
                old.len(),
                new.len(),
            ))
        } else {
            Mode::Positional
        };

        trace!(
            %path,
            old = old.len(),
            new = new.len(),
            keyed,
            "child plan"
        );

        Ok(Self {
            old,
            new,
            mode,
            descend: Vec::new(),
        })
    }

    /// Number of entries this plan processes.
    pub fn len(&self) -> usize {
        match &self.mode {
            Mode::Positional => self.old.len().max(self.new.len()),
            Mode::Keyed(state) => state.removals.len() + self.new.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Process entry `cursor`, emitting any ops it needs.
    pub fn step(
        &mut self,
        cursor: usize,
        path: &NodePath,
        current: &Tree,
        wip: &mut Tree,
        emit: &mut dyn FnMut(PatchOp),
    ) {
        match &mut self.mode {
            Mode::Positional => {
                let common = self.old.len().min(self.new.len());
                if cursor < common {
                    let (old_id, new_id) = (self.old[cursor], self.new[cursor]);
                    if current.get(old_id).type_id == wip.get(new_id).type_id {
                        wip.get_mut(new_id).alternate = Some(old_id);
                        self.descend.push(Descend {
                            index: cursor,
                            old: old_id,
                            new: new_id,
                        });
                    } else {
                        emit(PatchOp::Replace {
                            path: path.child(cursor),
                            old: current.to_node(old_id),
                            new: wip.to_node(new_id),
                        });
                    }
                } else if self.new.len() > self.old.len() {
                    emit(PatchOp::Insert {
                        parent: path.clone(),
                        index: cursor,
                        node: wip.to_node(self.new[cursor]),
                    });
                } else {
                    // Trailing removals run from the end so indices stay valid.
                    let at_old_index = self.old.len() - 1 - (cursor - common);
                    emit(PatchOp::Remove {
                        parent: path.clone(),
                        at_old_index,
                    });
                }
            }
            Mode::Keyed(state) => {
                // Removals run highest first, before anything else moves, so
                // the old index is still the live index.
                if let Some(&at_old_index) = state.removals.get(cursor) {
                    emit(PatchOp::Remove {
                        parent: path.clone(),
                        at_old_index,
                    });
                    return;
                }

                let new_index = cursor - state.removals.len();
                let new_id = self.new[new_index];
                let matched = wip
                    .get(new_id)
                    .key
                    .as_ref()
                    .and_then(|key| state.old_index_by_key.get(key))
                    .copied();

                let Some(old_index) = matched else {
                    let index = state.insert_new();
                    emit(PatchOp::Insert {
                        parent: path.clone(),
                        index,
                        node: wip.to_node(new_id),
                    });
                    return;
                };

                let in_place = state.last_placed.is_none_or(|last| old_index > last);
                if in_place {
                    state.keep(old_index);
                } else {
                    let (from, to) = state.move_to_end(old_index);
                    if from != to {
                        emit(PatchOp::Move {
                            parent: path.clone(),
                            from_old_index: from,
                            to_new_index: to,
                        });
                    }
                }

                let old_id = self.old[old_index];
                if current.get(old_id).type_id == wip.get(new_id).type_id {
                    wip.get_mut(new_id).alternate = Some(old_id);
                    self.descend.push(Descend {
                        index: new_index,
                        old: old_id,
                        new: new_id,
                    });
                } else {
                    // The child just placed is the prefix's last entry.
                    emit(PatchOp::Replace {
                        path: path.child(state.prefix_len - 1),
                        old: current.to_node(old_id),
                        new: wip.to_node(new_id),
                    });
                }
            }
        }
    }

    /// Same-type pairs collected so far, in new-list order.
    pub fn into_descend(self) -> Vec<Descend> {
        self.descend
    }
}

/// Check both lists for duplicate keys and mixed keying.
///
/// Returns whether the lists are keyed.
fn validate_keys(
    current: &Tree,
    old: &[NodeId],
    wip: &Tree,
    new: &[NodeId],
    path: &NodePath,
) -> Result<bool, Vec<ReconcileError>> {
    let old_keys: Vec<Option<&Key>> = old.iter().map(|&id| current.get(id).key.as_ref()).collect();
    let new_keys: Vec<Option<&Key>> = new.iter().map(|&id| wip.get(id).key.as_ref()).collect();

    let keyed = old_keys.iter().chain(&new_keys).any(Option::is_some);
    if !keyed {
        return Ok(false);
    }

    let mut errors = Vec::new();
    for (keys, snapshot) in [(&old_keys, Snapshot::Old), (&new_keys, Snapshot::New)] {
        let unkeyed: Vec<usize> = keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_none())
            .map(|(i, _)| i)
            .collect();
        if !unkeyed.is_empty() {
            errors.push(ReconcileError::MixedKeying {
                parent: path.clone(),
                snapshot,
                affected_children: unkeyed,
            });
        }

        let mut seen: HashMap<&Key, Vec<usize>> = HashMap::default();
        let mut order: Vec<&Key> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            if let Some(key) = key {
                let slots = seen.entry(*key).or_default();
                if slots.len() == 1 {
                    order.push(*key);
                }
                slots.push(i);
            }
        }
        for key in order {
            errors.push(ReconcileError::DuplicateKey {
                parent: path.clone(),
                snapshot,
                key: key.clone(),
                affected_children: seen.remove(key).unwrap_or_default(),
            });
        }
    }

    if errors.is_empty() {
        Ok(true)
    } else {
        Err(errors)
    }
}
