//! Hierarchical report tree and the bounded-parallelism scheduler behind it.
//!
//! Every unit of work is a node. [`Reporter::run`] starts a child on its own
//! thread and blocks the caller until that child either finishes or calls
//! [`Reporter::parallel`]. Parallel children wait on their parent's barrier,
//! which opens once the parent's own body returns (or at
//! [`Reporter::join_parallel`]); then they compete for slots in a pool of
//! `max_parallel` with FIFO hand-off.
//!
//! Slot accounting: the root holds one slot from the start. A sequential child
//! runs on its caller's slot (the caller is blocked meanwhile). A parallel
//! child acquires its own slot after the barrier opens. A node with pending
//! parallel children gives up its slot while it waits for them and, unless it
//! is parallel itself, takes one back before returning to its caller.
//!
//! ```no_run
//! use revolver_core::report::Scheduler;
//!
//! let report = Scheduler::new().run(|root| {
//!     for name in ["a", "b"] {
//!         root.run(name, |r| {
//!             r.parallel();
//!             r.success();
//!         });
//!     }
//! });
//! assert!(report.succeeded());
//! ```

mod event;
mod render;
mod slots;

use event::Event;
use serde::Serialize;
use slots::SlotPool;
use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Pending,
    Success,
    Skip,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Success => "SUCCESS",
            Status::Skip => "SKIP",
            Status::Error => "ERROR",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Status::Pending
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

type NodeId = usize;

#[derive(Debug, Default)]
struct NodeData {
    name: String,
    status: Status,
    summary: String,
    error: String,
    parallel: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Tree {
    nodes: Mutex<Vec<NodeData>>,
    slots: SlotPool,
}

impl Tree {
    fn new(max_parallel: usize) -> Self {
        Self {
            nodes: Mutex::new(vec![NodeData::default()]),
            slots: SlotPool::new(max_parallel, 1),
        }
    }

    fn add_child(&self, parent: NodeId, name: String) -> NodeId {
        let mut nodes = lock(&self.nodes);
        let id = nodes.len();
        nodes.push(NodeData {
            name,
            parent: Some(parent),
            ..NodeData::default()
        });
        nodes[parent].children.push(id);
        id
    }

    fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&mut NodeData) -> R) -> R {
        f(&mut lock(&self.nodes)[id])
    }

    /// Slash-joined names from the root down to `id`, for log fields.
    fn path(nodes: &[NodeData], id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(i) = cur {
            if !nodes[i].name.is_empty() {
                parts.push(nodes[i].name.as_str());
            }
            cur = nodes[i].parent;
        }
        parts.reverse();
        parts.join("/")
    }

    fn snapshot(&self, id: NodeId) -> ReportNode {
        let nodes = lock(&self.nodes);
        build_node(&nodes, id)
    }
}

fn build_node(nodes: &[NodeData], id: NodeId) -> ReportNode {
    let n = &nodes[id];
    ReportNode {
        name: n.name.clone(),
        status: n.status,
        summary: n.summary.clone(),
        error: n.error.clone(),
        parallel: n.parallel,
        children: n.children.iter().map(|&c| build_node(nodes, c)).collect(),
    }
}

// ---------------------------------------------------------------------------
// Per-node coordination
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct NodeCtl {
    /// The caller of `run` may continue.
    released: Event,
    /// The node and its whole subtree are done.
    finished: Event,
    parallel: AtomicBool,
    /// Current barrier generation for parallel children.
    barrier: Mutex<Arc<Event>>,
    /// Parallel children registered against the current barrier.
    pending: Mutex<Vec<Arc<NodeCtl>>>,
}

impl NodeCtl {
    fn new() -> Self {
        Self {
            released: Event::new(),
            finished: Event::new(),
            parallel: AtomicBool::new(false),
            barrier: Mutex::new(Arc::new(Event::new())),
            pending: Mutex::new(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Handle to one executing node, passed to its work function.
pub struct Reporter {
    tree: Arc<Tree>,
    id: NodeId,
    ctl: Arc<NodeCtl>,
    parent: Option<Arc<NodeCtl>>,
}

impl Reporter {
    pub fn name(&self) -> String {
        self.tree.with_node(self.id, |n| n.name.clone())
    }

    /// Run `f` as a named child of this node.
    ///
    /// Blocks until the child finishes (returns `Some` with its value) or
    /// declares itself parallel (returns `None`; the child keeps going).
    pub fn run<T, F>(&self, name: impl Into<String>, f: F) -> Option<T>
    where
        F: FnOnce(&mut Reporter) -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = self.tree.add_child(self.id, name.into());
        let ctl = Arc::new(NodeCtl::new());
        let mut child = Reporter {
            tree: Arc::clone(&self.tree),
            id,
            ctl: Arc::clone(&ctl),
            parent: Some(Arc::clone(&self.ctl)),
        };
        let result = Arc::new(Mutex::new(None));
        let out = Arc::clone(&result);

        let spawned = thread::Builder::new()
            .name(format!("report-{id}"))
            .spawn(move || {
                execute(&mut child, move |r| {
                    let value = f(r);
                    *lock(&out) = Some(value);
                })
            });
        if let Err(e) = spawned {
            self.tree.with_node(id, |n| {
                n.status = Status::Error;
                n.error = format!("failed to spawn worker thread: {e}");
            });
            return None;
        }

        ctl.released.wait();
        let value = lock(&result).take();
        value
    }

    /// Detach this node from its caller and run concurrently with siblings.
    ///
    /// Returns once the parent's barrier opens and a slot is free.
    ///
    /// # Panics
    ///
    /// When called on the root or more than once on the same node.
    pub fn parallel(&mut self) {
        let Some(parent) = self.parent.clone() else {
            panic!("reporter: parallel called on the root report");
        };
        if self.ctl.parallel.swap(true, Ordering::AcqRel) {
            panic!("reporter: parallel called multiple times");
        }
        self.tree.with_node(self.id, |n| n.parallel = true);

        // The parent is blocked inside `run`, so the generation cannot move.
        let barrier = Arc::clone(&lock(&parent.barrier));
        lock(&parent.pending).push(Arc::clone(&self.ctl));
        self.ctl.released.set();

        barrier.wait();
        self.tree.slots.acquire();
    }

    /// Release every pending parallel child now and wait for their subtrees,
    /// instead of at the end of this node's body.
    pub fn join_parallel(&mut self) {
        let pending = std::mem::take(&mut *lock(&self.ctl.pending));
        if pending.is_empty() {
            return;
        }
        self.tree.slots.release();
        let barrier = std::mem::replace(&mut *lock(&self.ctl.barrier), Arc::new(Event::new()));
        barrier.set();
        for child in &pending {
            child.finished.wait();
        }
        self.tree.slots.acquire();
    }

    pub fn summary(&self, summary: impl Into<String>) {
        let summary = summary.into();
        self.tree.with_node(self.id, |n| n.summary = summary);
    }

    pub fn success(&self) {
        self.set_status(Status::Success, None);
    }

    pub fn skip(&self) {
        self.set_status(Status::Skip, None);
    }

    pub fn fail(&self, err: impl fmt::Display) {
        self.set_status(Status::Error, Some(err.to_string()));
    }

    pub fn status(&self) -> Status {
        self.tree.with_node(self.id, |n| n.status)
    }

    /// Statuses of the children currently attached to this node.
    pub fn child_statuses(&self) -> Vec<Status> {
        let nodes = lock(&self.tree.nodes);
        nodes[self.id]
            .children
            .iter()
            .map(|&c| nodes[c].status)
            .collect()
    }

    /// Detach all but the first `len` children from the rendered tree.
    ///
    /// Detached parallel children still run to completion before this node
    /// finishes; they just no longer appear in the report.
    pub fn truncate_children(&self, len: usize) {
        self.tree.with_node(self.id, |n| n.children.truncate(len));
    }

    pub fn reset_children(&self) {
        self.truncate_children(0);
    }

    fn set_status(&self, status: Status, error: Option<String>) {
        let mut nodes = lock(&self.tree.nodes);
        let current = nodes[self.id].status;
        if current.is_terminal() {
            tracing::warn!(
                node = %Tree::path(&nodes, self.id),
                %current,
                ignored = %status,
                "report status already set"
            );
            return;
        }
        let node = &mut nodes[self.id];
        node.status = status;
        if let Some(error) = error {
            node.error = error;
        }
    }

    fn record_panic(&self, payload: &(dyn Any + Send)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        let mut nodes = lock(&self.tree.nodes);
        tracing::error!(node = %Tree::path(&nodes, self.id), %message, "report work panicked");
        // A panic always wins over whatever status was written before it.
        let node = &mut nodes[self.id];
        node.status = Status::Error;
        node.error = format!("panicked: {message}");
    }

    /// Runs after the work function returns, before `released`/`finished`.
    fn finalize(&mut self) {
        let pending = std::mem::take(&mut *lock(&self.ctl.pending));
        let parallel = self.ctl.parallel.load(Ordering::Acquire);
        if !pending.is_empty() {
            self.tree.slots.release();
            lock(&self.ctl.barrier).set();
            for child in &pending {
                child.finished.wait();
            }
            if !parallel {
                self.tree.slots.acquire();
            }
        } else if parallel {
            self.tree.slots.release();
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

fn execute<F: FnOnce(&mut Reporter)>(reporter: &mut Reporter, f: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(reporter))) {
        reporter.record_panic(payload.as_ref());
    }
    reporter.finalize();
    reporter.ctl.released.set();
    reporter.ctl.finished.set();
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    max_parallel: NonZeroUsize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            max_parallel: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Scheduler {
    /// Scheduler bounded by the host's available parallelism.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_parallel(max_parallel: NonZeroUsize) -> Self {
        Self { max_parallel }
    }

    pub fn max_parallel(&self) -> NonZeroUsize {
        self.max_parallel
    }

    /// Run `f` as the root node and return once the whole tree is quiescent.
    pub fn run<F: FnOnce(&mut Reporter)>(&self, f: F) -> Report {
        let tree = Arc::new(Tree::new(self.max_parallel.get()));
        let mut root = Reporter {
            tree: Arc::clone(&tree),
            id: 0,
            ctl: Arc::new(NodeCtl::new()),
            parent: None,
        };
        execute(&mut root, f);

        Report {
            root: tree.snapshot(0),
            max_parallel: tree.slots.max(),
            peak_parallel: tree.slots.peak(),
        }
    }
}

/// Run `f` under a default [`Scheduler`], render the tree to stdout, and
/// return `true` iff no node has `Error` status.
pub fn run<F: FnOnce(&mut Reporter)>(f: F) -> bool {
    use std::io::IsTerminal;

    let report = Scheduler::new().run(f);
    let stdout = std::io::stdout();
    let color = stdout.is_terminal();
    if let Err(e) = report.render(&mut stdout.lock(), color) {
        tracing::warn!(error = %e, "failed to render report");
    }
    report.succeeded()
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportNode {
    pub name: String,
    pub status: Status,
    pub summary: String,
    pub error: String,
    pub parallel: bool,
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    /// This node and all descendants, depth-first in insertion order.
    pub fn walk(&self) -> Vec<&ReportNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    pub fn child(&self, name: &str) -> Option<&ReportNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Snapshot of a finished scheduler run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    root: ReportNode,
    max_parallel: usize,
    peak_parallel: usize,
}

impl Report {
    pub fn root(&self) -> &ReportNode {
        &self.root
    }

    pub fn succeeded(&self) -> bool {
        self.root.walk().iter().all(|n| n.status != Status::Error)
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Highest number of slot holders seen at once.
    pub fn peak_parallel(&self) -> usize {
        self.peak_parallel
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
