//! Prioritized, interruptible render passes on top of [`phloem`].
//!
//! A [`Reconciler`] owns a Current tree and a queue of passes. Each pass
//! diffs a new snapshot against Current one unit of work at a time, checking
//! a caller-supplied yield predicate between units, so a host event loop can
//! bound how long any single call blocks. A more urgent submission preempts
//! the running pass; a newer submission of equal or lower urgency replaces
//! passes still waiting in the queue.
//!
//! Ops can be pulled from the completed [`PassStatus`] or pushed to patch
//! sinks as they are produced. Sinks see ops before the pass is known to
//! succeed: a host applying them incrementally has to resync from
//! [`Reconciler::current_node`] when a pass ends up failed, cancelled or
//! superseded. Hosts that apply only completed patch lists get atomic updates.
//!
//! ```
//! use phloem::Node;
//! use phloem_scheduler::{PassStatus, Priority, Reconciler};
//!
//! let mut reconciler = Reconciler::new();
//! let pass = reconciler.submit_pass(Node::element("main").with_child(Node::text("hi")), Priority::Normal);
//! reconciler.run_until_idle();
//!
//! match reconciler.poll(pass) {
//!     Some(PassStatus::Completed(patches)) => assert_eq!(patches.ops.len(), 1),
//!     other => panic!("unexpected status {other:?}"),
//! }
//! ```

#![warn(missing_docs)]

mod buffer;
mod queue;
mod tracing_macros;
pub(crate) use tracing_macros::debug;

pub use buffer::DoubleBuffer;
pub use queue::{PassHandle, PassStats, PassStatus, Priority, Submitter};

use phloem::{DiffConfig, Node, PatchList, PatchOp, Step, Tree, Walk};
use queue::{Interruption, Shared};
use std::sync::Arc;

/// Reconciler settings.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Settings for every pass's diff walk
    pub diff: DiffConfig,
    /// Keep terminal statuses until [`Reconciler::forget`]. When false, the
    /// first [`poll`](Reconciler::poll) that reports a terminal status also
    /// drops it.
    pub retain_completed: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            diff: DiffConfig::default(),
            retain_completed: true,
        }
    }
}

/// Result of [`Reconciler::work`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Nothing is queued or running
    Idle,
    /// The yield predicate asked to stop; call `work` again to resume
    Yielded,
    /// A pass reached `Completed` or `Failed`
    Finished(PassHandle),
}

type PatchSink = Box<dyn FnMut(&PatchOp)>;
type YieldPredicate = Box<dyn FnMut() -> bool>;

struct ActivePass {
    handle: PassHandle,
    priority: Priority,
    ops: Vec<PatchOp>,
    yields: usize,
}

/// Drives render passes against a double-buffered tree.
pub struct Reconciler {
    config: ReconcilerConfig,
    shared: Arc<Shared>,
    buffer: DoubleBuffer,
    walk: Walk,
    active: Option<ActivePass>,
    sinks: Vec<PatchSink>,
    should_yield: Option<YieldPredicate>,
}

impl Reconciler {
    /// A reconciler with nothing committed yet.
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    /// A reconciler with custom settings.
    pub fn with_config(config: ReconcilerConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config.retain_completed)),
            walk: Walk::new(config.diff.clone()),
            buffer: DoubleBuffer::new(),
            active: None,
            sinks: Vec::new(),
            should_yield: None,
            config,
        }
    }

    /// Treat `node` as already rendered by the host.
    ///
    /// The next pass diffs against it instead of mounting from scratch.
    pub fn with_current(mut self, node: &Node) -> Self {
        self.buffer = DoubleBuffer::with_current(Tree::from_node(node));
        self
    }

    /// A handle for submitting and polling passes from other threads.
    pub fn submitter(&self) -> Submitter {
        Submitter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue a render of `tree`.
    pub fn submit_pass(&self, tree: Node, priority: Priority) -> PassHandle {
        self.shared.submit(tree, priority)
    }

    /// Status of a pass, or `None` for unknown or forgotten handles.
    pub fn poll(&self, handle: PassHandle) -> Option<PassStatus> {
        self.shared.poll(handle)
    }

    /// Work counters for a pass that has started.
    pub fn stats(&self, handle: PassHandle) -> Option<PassStats> {
        self.shared.lock().stats(handle)
    }

    /// Drop a terminal status. Returns false for live or unknown passes.
    pub fn forget(&self, handle: PassHandle) -> bool {
        self.shared.lock().forget(handle)
    }

    /// Call `sink` with every op, in emission order, as it is produced.
    pub fn register_patch_sink(&mut self, sink: impl FnMut(&PatchOp) + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Check `predicate` after every unit of work; returning true suspends
    /// the running pass.
    pub fn set_yield_predicate(&mut self, predicate: impl FnMut() -> bool + 'static) {
        self.should_yield = Some(Box::new(predicate));
    }

    /// Cancel a pass that has not finished yet.
    ///
    /// Cancelling the running pass drops its Work-In-Progress tree right away.
    pub fn cancel(&mut self, handle: PassHandle) -> bool {
        if !self.shared.cancel(handle) {
            return false;
        }
        if self.active.as_ref().is_some_and(|active| active.handle == handle) {
            self.teardown();
        }
        true
    }

    /// The last committed tree.
    pub fn current(&self) -> Option<&Tree> {
        self.buffer.current()
    }

    /// The last committed tree as a [`Node`].
    pub fn current_node(&self) -> Option<Node> {
        self.buffer.current().map(Tree::to_root_node)
    }

    /// The running or suspended pass, if any.
    pub fn active_pass(&self) -> Option<PassHandle> {
        self.active.as_ref().map(|active| active.handle)
    }

    /// Run queued passes until one finishes, the queue is empty, or the yield
    /// predicate fires.
    pub fn work(&mut self) -> WorkOutcome {
        self.drive(true)
    }

    /// Run every queued pass to the end, ignoring the yield predicate.
    pub fn run_until_idle(&mut self) {
        while self.drive(false) != WorkOutcome::Idle {}
    }

    fn drive(&mut self, honor_yield: bool) -> WorkOutcome {
        loop {
            if self.active.is_none() && !self.start_next() {
                return WorkOutcome::Idle;
            }
            if let Some(outcome) = self.advance(honor_yield) {
                return outcome;
            }
        }
    }

    fn start_next(&mut self) -> bool {
        let Some((handle, priority, tree)) = self.shared.lock().pop_next() else {
            return false;
        };
        debug!(%handle, ?priority, "starting pass");

        let wip = Tree::from_node(&tree);
        let old_root = self.buffer.current().map(|tree| tree.root);
        self.walk.mount(old_root, Some(wip.root));
        self.buffer.stage(wip);
        self.active = Some(ActivePass {
            handle,
            priority,
            ops: Vec::new(),
            yields: 0,
        });
        true
    }

    /// Step the active pass. Returns `None` if it was dropped and the next
    /// queued pass should run.
    fn advance(&mut self, honor_yield: bool) -> Option<WorkOutcome> {
        let (handle, priority) = {
            let active = self.active.as_ref()?;
            (active.handle, active.priority)
        };

        {
            let mut queue = self.shared.lock();
            if let Some(interruption) = queue.interruption(handle, priority) {
                drop(queue);
                self.interrupt(interruption);
                return None;
            }
            queue.set_status(handle, PassStatus::Active);
        }

        let mut interrupted = None;
        let step = {
            let active = self.active.as_mut()?;
            let sinks = &mut self.sinks;
            let shared = &self.shared;
            let should_yield = &mut self.should_yield;
            let (current, wip) = self.buffer.split();

            let mut emit = |op: PatchOp| {
                for sink in sinks.iter_mut() {
                    sink(&op);
                }
                active.ops.push(op);
            };
            let mut check = || {
                if shared.take_changed() {
                    interrupted = shared.lock().interruption(handle, priority);
                    if interrupted.is_some() {
                        return true;
                    }
                }
                honor_yield && should_yield.as_mut().is_some_and(|predicate| predicate())
            };
            self.walk.run(current, wip, &mut emit, &mut check)
        };

        if let Some(interruption) = interrupted {
            self.interrupt(interruption);
            return None;
        }

        // A sink or the yield predicate may have cancelled the pass after the
        // last boundary check. The status is decided under the same lock that
        // cancels take, so a cancel that returned true is never overwritten.
        let mut queue = self.shared.lock();
        let late = queue
            .interruption(handle, priority)
            .filter(|interruption| step == Step::Continue || *interruption == Interruption::Cancelled);
        if let Some(interruption) = late {
            drop(queue);
            self.interrupt(interruption);
            return None;
        }

        match step {
            Step::Continue => {
                let active = self.active.as_mut()?;
                active.yields += 1;
                debug!(%handle, units = self.walk.units(), "pass yielded");
                queue.set_status(handle, PassStatus::Interrupted);
                queue.set_stats(handle, pass_stats(&self.walk, active));
                Some(WorkOutcome::Yielded)
            }
            Step::Done => {
                let active = self.active.take()?;
                let stats = pass_stats(&self.walk, &active);
                let patches = PatchList {
                    ops: active.ops,
                    errors: self.walk.take_errors(),
                };
                debug!(
                    %handle,
                    ops = patches.ops.len(),
                    errors = patches.errors.len(),
                    "pass committed"
                );
                queue.set_status(handle, PassStatus::Completed(patches));
                queue.set_stats(handle, stats);
                self.buffer.commit();
                Some(WorkOutcome::Finished(handle))
            }
            Step::Failed => {
                let active = self.active.take()?;
                let stats = pass_stats(&self.walk, &active);
                let errors = self.walk.take_errors();
                debug!(%handle, errors = errors.len(), "pass failed");
                queue.set_status(handle, PassStatus::Failed(errors));
                queue.set_stats(handle, stats);
                self.buffer.discard();
                Some(WorkOutcome::Finished(handle))
            }
        }
    }

    fn interrupt(&mut self, interruption: Interruption) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let handle = active.handle;
        let stats = pass_stats(&self.walk, active);
        {
            let mut queue = self.shared.lock();
            if interruption == Interruption::Preempted {
                debug!(%handle, "pass preempted");
                queue.set_status(handle, PassStatus::Superseded);
            }
            queue.set_stats(handle, stats);
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.active.take().is_some() {
            debug!("dropping work in progress");
        }
        self.buffer.discard();
        self.walk.reset();
    }
}

fn pass_stats(walk: &Walk, active: &ActivePass) -> PassStats {
    PassStats {
        units: walk.units(),
        ops: active.ops.len(),
        yields: active.yields,
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("current", &self.buffer.current().map(Tree::node_count))
            .field("active", &self.active_pass())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
