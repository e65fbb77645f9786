//! The pass queue shared between a [`Reconciler`](crate::Reconciler) and its
//! [`Submitter`]s.

use core::cmp::Ordering;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use facet::Facet;
use phloem::{Node, PatchList, ReconcileError};
use rapidhash::RapidHashMap as HashMap;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::debug;

/// How urgent a pass is. Higher runs first.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    /// Background work, e.g. prefetched screens
    Idle,
    /// Non-urgent updates
    Low,
    /// Regular renders
    #[default]
    Normal,
    /// Direct responses to input
    UserBlocking,
    /// Must not wait behind anything
    Immediate,
}

/// Identifies a submitted pass.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[facet(transparent)]
pub struct PassHandle(pub u64);

impl fmt::Display for PassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass#{}", self.0)
    }
}

/// Where a pass is in its lifecycle.
#[derive(Facet, Debug, Clone, PartialEq)]
#[repr(u8)]
pub enum PassStatus {
    /// Queued, not started
    Pending,
    /// Being walked right now
    Active,
    /// Yielded; will resume where it stopped
    Interrupted,
    /// Walk drained and committed
    Completed(PatchList),
    /// Aborted on a structural error; Current untouched
    Failed(Vec<ReconcileError>),
    /// Cancelled by the caller
    Cancelled,
    /// Replaced by a newer or more urgent pass before it completed
    Superseded,
}

impl PassStatus {
    /// Whether the pass will never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PassStatus::Completed(_)
                | PassStatus::Failed(_)
                | PassStatus::Cancelled
                | PassStatus::Superseded
        )
    }
}

/// Work done by a pass.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Units of walk work performed
    pub units: usize,
    /// Ops emitted
    pub ops: usize,
    /// Times the pass yielded and was resumed
    pub yields: usize,
}

/// A pending pass. Ordered by priority, then submission order.
struct Queued {
    priority: Priority,
    handle: PassHandle,
    tree: Node,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.handle == other.handle
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: most urgent first, then oldest first
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}

/// Why an active pass has to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interruption {
    Cancelled,
    Preempted,
}

#[derive(Default)]
pub(crate) struct PassQueue {
    next_handle: u64,
    pending: BinaryHeap<Queued>,
    statuses: HashMap<PassHandle, PassStatus>,
    stats: HashMap<PassHandle, PassStats>,
    retain_completed: bool,
}

impl PassQueue {
    fn submit(&mut self, tree: Node, priority: Priority) -> PassHandle {
        let handle = PassHandle(self.next_handle);
        self.next_handle += 1;

        // Queued passes of no greater urgency target an older snapshot.
        let statuses = &mut self.statuses;
        self.pending.retain(|queued| {
            if queued.priority <= priority {
                debug!(superseded = %queued.handle, by = %handle, "superseding pending pass");
                statuses.insert(queued.handle, PassStatus::Superseded);
                false
            } else {
                true
            }
        });

        self.statuses.insert(handle, PassStatus::Pending);
        self.pending.push(Queued {
            priority,
            handle,
            tree,
        });
        debug!(%handle, ?priority, queued = self.pending.len(), "pass submitted");
        handle
    }

    pub(crate) fn pop_next(&mut self) -> Option<(PassHandle, Priority, Node)> {
        let queued = self.pending.pop()?;
        self.statuses.insert(queued.handle, PassStatus::Active);
        Some((queued.handle, queued.priority, queued.tree))
    }

    fn poll(&mut self, handle: PassHandle) -> Option<PassStatus> {
        let status = self.statuses.get(&handle)?.clone();
        if !self.retain_completed && status.is_terminal() {
            self.statuses.remove(&handle);
            self.stats.remove(&handle);
        }
        Some(status)
    }

    /// Mark a pass cancelled. Returns whether it was still live.
    fn cancel(&mut self, handle: PassHandle) -> bool {
        match self.statuses.get(&handle) {
            Some(status) if !status.is_terminal() => {
                self.pending.retain(|queued| queued.handle != handle);
                self.statuses.insert(handle, PassStatus::Cancelled);
                debug!(%handle, "pass cancelled");
                true
            }
            _ => false,
        }
    }

    /// Move a live pass to `status`. Terminal statuses never change again;
    /// returns false if the pass already reached one.
    pub(crate) fn set_status(&mut self, handle: PassHandle, status: PassStatus) -> bool {
        match self.statuses.get_mut(&handle) {
            Some(slot) if !slot.is_terminal() => {
                *slot = status;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_stats(&mut self, handle: PassHandle, stats: PassStats) {
        if self.statuses.contains_key(&handle) {
            self.stats.insert(handle, stats);
        }
    }

    pub(crate) fn stats(&self, handle: PassHandle) -> Option<PassStats> {
        self.stats.get(&handle).copied()
    }

    pub(crate) fn forget(&mut self, handle: PassHandle) -> bool {
        match self.statuses.get(&handle) {
            Some(status) if status.is_terminal() => {
                self.statuses.remove(&handle);
                self.stats.remove(&handle);
                true
            }
            _ => false,
        }
    }

    /// Whether the active pass `handle` must stop at the next unit boundary.
    pub(crate) fn interruption(&self, handle: PassHandle, priority: Priority) -> Option<Interruption> {
        // Only a cancel ends an active pass from outside, and without
        // retention its status may already have been polled away.
        if matches!(
            self.statuses.get(&handle),
            Some(PassStatus::Cancelled) | None
        ) {
            return Some(Interruption::Cancelled);
        }
        match self.pending.peek() {
            Some(next) if next.priority > priority => Some(Interruption::Preempted),
            _ => None,
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Queue state plus a flag raised whenever it changes under a running pass.
pub(crate) struct Shared {
    queue: Mutex<PassQueue>,
    changed: AtomicBool,
}

impl Shared {
    pub(crate) fn new(retain_completed: bool) -> Self {
        Self {
            queue: Mutex::new(PassQueue {
                retain_completed,
                ..Default::default()
            }),
            changed: AtomicBool::new(false),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PassQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the change flag.
    pub(crate) fn take_changed(&self) -> bool {
        self.changed.swap(false, AtomicOrdering::AcqRel)
    }

    pub(crate) fn submit(&self, tree: Node, priority: Priority) -> PassHandle {
        let handle = self.lock().submit(tree, priority);
        self.changed.store(true, AtomicOrdering::Release);
        handle
    }

    pub(crate) fn cancel(&self, handle: PassHandle) -> bool {
        let cancelled = self.lock().cancel(handle);
        if cancelled {
            self.changed.store(true, AtomicOrdering::Release);
        }
        cancelled
    }

    pub(crate) fn poll(&self, handle: PassHandle) -> Option<PassStatus> {
        self.lock().poll(handle)
    }
}

/// Submits and polls passes from any thread.
///
/// Obtained from [`Reconciler::submitter`](crate::Reconciler::submitter).
/// The reconciler picks new passes up the next time it is driven, and an
/// active pass notices preemption or cancellation at its next unit boundary.
#[derive(Clone)]
pub struct Submitter {
    pub(crate) shared: Arc<Shared>,
}

impl Submitter {
    /// Queue a render of `tree`.
    pub fn submit_pass(&self, tree: Node, priority: Priority) -> PassHandle {
        self.shared.submit(tree, priority)
    }

    /// Status of a pass, or `None` for unknown or forgotten handles.
    pub fn poll(&self, handle: PassHandle) -> Option<PassStatus> {
        self.shared.poll(handle)
    }

    /// Cancel a pass that has not finished yet.
    pub fn cancel(&self, handle: PassHandle) -> bool {
        self.shared.cancel(handle)
    }
}

impl fmt::Debug for Submitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submitter")
            .field("pending", &self.shared.lock().pending_len())
            .finish()
    }
}
