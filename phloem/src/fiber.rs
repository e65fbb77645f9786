//! The resumable diff walk.
//!
//! The walk keeps an explicit stack of [`WorkItem`]s instead of recursing, and
//! does one unit of work per [`Walk::step`] call:
//!
//! - placing the root (insert, remove, replace, or compare),
//! - a node's own attribute diff plus planning of its child list,
//! - one entry of a child list.
//!
//! A caller can stop between any two steps and pick up later; nothing already
//! emitted is revisited. Children are only descended into after their parent's
//! whole child list has been settled, so paths in emitted ops always point at
//! the live host position.

use crate::diff::{DiffConfig, ErrorPolicy, attribute_patch};
use crate::error::ReconcileError;
use crate::keyed::ChildPlan;
use crate::patch::{NodePath, PatchOp};
use crate::tree::Tree;
#[allow(unused_imports)]
use crate::{debug, trace, warn};
use indextree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Root placement against the mount container
    Mount,
    /// Attribute diff and child planning
    Own,
    /// Reconciling the child list, one entry per step
    Children,
}

/// Reconciliation progress at one tree position.
#[derive(Debug)]
pub struct WorkItem {
    /// Node in the Current tree, if any
    pub old_ref: Option<NodeId>,
    /// Node in the Work-In-Progress tree, if any
    pub new_ref: Option<NodeId>,
    /// Live host path of this node (of the container, for the mount item)
    pub path: NodePath,
    /// Next child list entry to process
    pub child_cursor: usize,
    phase: Phase,
    plan: Option<ChildPlan>,
}

impl WorkItem {
    fn new(old_ref: Option<NodeId>, new_ref: Option<NodeId>, path: NodePath, phase: Phase) -> Self {
        Self {
            old_ref,
            new_ref,
            path,
            child_cursor: 0,
            phase,
            plan: None,
        }
    }
}

/// Result of one [`Walk::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More work remains
    Continue,
    /// The walk is drained
    Done,
    /// A structural error aborted the walk ([`ErrorPolicy::Abort`])
    Failed,
}

/// An in-progress diff between a Current tree and a Work-In-Progress tree.
///
/// The walk only stores node ids; both trees are passed to every
/// [`step`](Walk::step). Current is only ever read. Work-In-Progress gets its
/// `alternate` links filled in and, for parents whose children could not be
/// reconciled, its children swapped back to copies of the Current ones so it
/// keeps mirroring the host.
#[derive(Debug, Default)]
pub struct Walk {
    stack: Vec<WorkItem>,
    config: DiffConfig,
    errors: Vec<ReconcileError>,
    units: usize,
    ops: usize,
    failed: bool,
}

impl Walk {
    /// Create an idle walk.
    pub fn new(config: DiffConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Clear all state, keeping the stack's allocation.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.errors.clear();
        self.units = 0;
        self.ops = 0;
        self.failed = false;
    }

    /// Start a whole-tree diff. The roots sit at index 0 of the mount container.
    pub fn mount(&mut self, old_root: Option<NodeId>, new_root: Option<NodeId>) {
        self.reset();
        self.stack
            .push(WorkItem::new(old_root, new_root, NodePath::root(), Phase::Mount));
    }

    /// Start reconciling the children of two same-type nodes whose own
    /// position is the mount container.
    pub fn children_of(&mut self, old_parent: NodeId, new_parent: NodeId) {
        self.reset();
        self.stack.push(WorkItem::new(
            Some(old_parent),
            Some(new_parent),
            NodePath::root(),
            Phase::Own,
        ));
    }

    /// Whether every unit of work is done.
    pub fn is_done(&self) -> bool {
        self.stack.is_empty()
    }

    /// Whether the walk stopped on a structural error.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Units of work performed so far.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Ops emitted so far.
    pub fn ops_emitted(&self) -> usize {
        self.ops
    }

    /// Pending work items, innermost last.
    pub fn pending(&self) -> &[WorkItem] {
        &self.stack
    }

    /// Errors collected so far.
    pub fn errors(&self) -> &[ReconcileError] {
        &self.errors
    }

    /// Take the collected errors.
    pub fn take_errors(&mut self) -> Vec<ReconcileError> {
        core::mem::take(&mut self.errors)
    }

    /// Perform one unit of work.
    ///
    /// `current` and `wip` must be the same trees the walk was started with.
    pub fn step(
        &mut self,
        current: Option<&Tree>,
        mut wip: Option<&mut Tree>,
        emit: &mut dyn FnMut(PatchOp),
    ) -> Step {
        if self.failed {
            return Step::Failed;
        }
        let Some(item) = self.stack.last_mut() else {
            return Step::Done;
        };
        self.units += 1;

        let mut emitted = 0;
        let mut emit = |op: PatchOp| {
            debug!(%op, "emit");
            emitted += 1;
            emit(op);
        };

        match item.phase {
            Phase::Mount => {
                let item_path = item.path.clone();
                match (item.old_ref, item.new_ref, current, wip.as_deref_mut()) {
                    (Some(old), Some(new), Some(current), Some(wip))
                        if current.get(old).type_id == wip.get(new).type_id =>
                    {
                        wip.get_mut(new).alternate = Some(old);
                        item.path = item_path.child(0);
                        item.phase = Phase::Own;
                    }
                    (Some(old), Some(new), Some(current), Some(wip)) => {
                        emit(PatchOp::Replace {
                            path: item_path.child(0),
                            old: current.to_node(old),
                            new: wip.to_node(new),
                        });
                        self.stack.pop();
                    }
                    (None, Some(new), _, Some(wip)) => {
                        emit(PatchOp::Insert {
                            parent: item_path,
                            index: 0,
                            node: wip.to_node(new),
                        });
                        self.stack.pop();
                    }
                    (Some(_), None, _, _) => {
                        emit(PatchOp::Remove {
                            parent: item_path,
                            at_old_index: 0,
                        });
                        self.stack.pop();
                    }
                    _ => {
                        self.stack.pop();
                    }
                }
            }
            Phase::Own => {
                let (Some(old), Some(new), Some(current), Some(wip)) =
                    (item.old_ref, item.new_ref, current, wip)
                else {
                    self.stack.pop();
                    self.ops += emitted;
                    return self.status();
                };

                if let Some(op) = attribute_patch(
                    &item.path,
                    &current.get(old).attributes,
                    &wip.get(new).attributes,
                ) {
                    emit(op);
                }

                match ChildPlan::new(current, old, wip, new, &item.path) {
                    Ok(plan) if plan.is_empty() => {
                        self.stack.pop();
                    }
                    Ok(plan) => {
                        item.plan = Some(plan);
                        item.child_cursor = 0;
                        item.phase = Phase::Children;
                    }
                    Err(errors) => {
                        #[cfg(feature = "tracing")]
                        for error in &errors {
                            warn!(%error, "child list not reconciled");
                        }
                        self.errors.extend(errors);
                        if self.config.error_policy == ErrorPolicy::Abort {
                            self.failed = true;
                            self.stack.clear();
                            self.ops += emitted;
                            return Step::Failed;
                        }
                        // The host keeps the old children, so the new tree must too.
                        wip.graft_children(new, current, old);
                        self.stack.pop();
                    }
                }
            }
            Phase::Children => {
                let (Some(current), Some(wip)) = (current, wip) else {
                    self.stack.pop();
                    self.ops += emitted;
                    return self.status();
                };
                let Some(plan) = item.plan.as_mut() else {
                    self.stack.pop();
                    self.ops += emitted;
                    return self.status();
                };

                plan.step(item.child_cursor, &item.path, current, wip, &mut emit);
                item.child_cursor += 1;

                if item.child_cursor >= plan.len() {
                    let path = item.path.clone();
                    let plan = item.plan.take();
                    self.stack.pop();
                    if let Some(plan) = plan {
                        // Reversed so the first child is processed first.
                        for d in plan.into_descend().into_iter().rev() {
                            self.stack.push(WorkItem::new(
                                Some(d.old),
                                Some(d.new),
                                path.child(d.index),
                                Phase::Own,
                            ));
                        }
                    }
                }
            }
        }

        self.ops += emitted;
        self.status()
    }

    fn status(&self) -> Step {
        if self.failed {
            Step::Failed
        } else if self.stack.is_empty() {
            Step::Done
        } else {
            Step::Continue
        }
    }

    /// Step until the walk finishes, fails, or `should_yield` returns true.
    ///
    /// `should_yield` is checked after every unit.
    pub fn run(
        &mut self,
        current: Option<&Tree>,
        mut wip: Option<&mut Tree>,
        emit: &mut dyn FnMut(PatchOp),
        should_yield: &mut dyn FnMut() -> bool,
    ) -> Step {
        loop {
            match self.step(current, wip.as_deref_mut(), emit) {
                Step::Continue => {
                    if should_yield() {
                        trace!(units = self.units, depth = self.stack.len(), "yield");
                        return Step::Continue;
                    }
                }
                done => return done,
            }
        }
    }
}
