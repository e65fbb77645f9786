//! Current / Work-In-Progress double buffering.

use phloem::Tree;

/// Holds the last committed tree and, while a pass runs, the tree being
/// reconciled against it.
///
/// Current is only handed out as `&Tree`. The only way to replace it is
/// [`commit`](DoubleBuffer::commit), which moves the Work-In-Progress tree
/// into its place in one step.
#[derive(Debug, Default)]
pub struct DoubleBuffer {
    current: Option<Tree>,
    wip: Option<Tree>,
}

impl DoubleBuffer {
    /// An empty buffer: nothing committed, nothing in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer whose Current is already `tree`.
    pub fn with_current(tree: Tree) -> Self {
        Self {
            current: Some(tree),
            wip: None,
        }
    }

    /// The last committed tree.
    pub fn current(&self) -> Option<&Tree> {
        self.current.as_ref()
    }

    /// The tree being reconciled, if a pass is running.
    pub fn wip(&self) -> Option<&Tree> {
        self.wip.as_ref()
    }

    /// Start reconciling towards `tree`, dropping any previous Work-In-Progress.
    pub fn stage(&mut self, tree: Tree) {
        self.wip = Some(tree);
    }

    /// Current for reading and Work-In-Progress for writing, at the same time.
    pub fn split(&mut self) -> (Option<&Tree>, Option<&mut Tree>) {
        (self.current.as_ref(), self.wip.as_mut())
    }

    /// Promote Work-In-Progress to Current. Returns false if nothing was staged.
    pub fn commit(&mut self) -> bool {
        let Some(mut tree) = self.wip.take() else {
            return false;
        };
        // Alternates point into the tree being dropped.
        tree.clear_alternates();
        self.current = Some(tree);
        true
    }

    /// Drop Work-In-Progress without touching Current.
    pub fn discard(&mut self) -> Option<Tree> {
        self.wip.take()
    }
}
