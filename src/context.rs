//! Hierarchical ownership of open file handles.
//!
//! A [`Context`] is a node in a tree. Every [`CFile`] is registered under
//! exactly one context; tearing a context down closes every handle beneath it,
//! child subtrees first, depth-first. Dropping a `Context` tears it down, so a
//! context works as a scope guard for everything opened under it.
//!
//! There is no implicit process-wide context. An application that wants a
//! default creates one at start-up and passes it (or children of it) around.

use crate::config::CFileConfig;
use crate::error::{CFileError, Result};
use crate::file_handler::handle::{HandleSlot, SlotRef};
use crate::file_handler::CFile;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Weak};

pub(crate) type NodeRef = Arc<Mutex<ContextNode>>;
pub(crate) type WeakNode = Weak<Mutex<ContextNode>>;

/// Shared state of one context in the tree
#[derive(Debug)]
pub(crate) struct ContextNode {
    name: String,
    config: CFileConfig,
    parent: WeakNode,
    /// Registered handles, in registration order
    handles: Vec<Weak<Mutex<HandleSlot>>>,
    children: Vec<NodeRef>,
    torn_down: bool,
}

impl ContextNode {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Drop the registration of `slot`, if present
    pub(crate) fn unregister(&mut self, slot: &SlotRef) {
        let target = Arc::downgrade(slot);
        self.handles.retain(|h| !Weak::ptr_eq(h, &target));
    }
}

/// An owner for open file handles and child contexts
///
/// # Example
/// ```no_run
/// use cfile::{cfprintf, Context};
///
/// # fn main() -> cfile::Result<()> {
/// let root = Context::new("app");
/// let batch = root.child("batch")?;
/// let mut out = batch.open("report.txt.gz", "w")?;
/// cfprintf!(out, "{} rows\n", 42)?;
/// drop(batch); // closes report.txt.gz
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Context {
    node: NodeRef,
}

impl Context {
    /// Create a root context with the default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), CFileConfig::default(), Weak::new())
    }

    /// Create a root context with an explicit configuration
    pub fn with_config(name: impl Into<String>, config: CFileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(name.into(), config, Weak::new()))
    }

    fn from_parts(name: String, config: CFileConfig, parent: WeakNode) -> Self {
        Self {
            node: Arc::new(Mutex::new(ContextNode {
                name,
                config,
                parent,
                handles: Vec::new(),
                children: Vec::new(),
                torn_down: false,
            })),
        }
    }

    /// Create a child context inheriting this context's configuration
    ///
    /// # Errors
    /// * `ContextClosed` if this context has been torn down
    pub fn child(&self, name: impl Into<String>) -> Result<Context> {
        let mut node = self.node.lock();
        if node.torn_down {
            return Err(CFileError::ContextClosed {
                name: node.name.clone(),
            });
        }
        let child = Self::from_parts(name.into(), node.config.clone(), Arc::downgrade(&self.node));
        node.children.push(Arc::clone(&child.node));
        Ok(child)
    }

    /// Open `path` under this context. See [`CFile::open`].
    pub fn open(&self, path: impl AsRef<Path>, mode: &str) -> Result<CFile> {
        CFile::open(self, path, mode)
    }

    /// Adopt an open descriptor under this context. See [`CFile::dopen`].
    #[cfg(unix)]
    pub fn dopen(&self, fd: impl Into<std::os::fd::OwnedFd>, mode: &str) -> Result<CFile> {
        CFile::dopen(self, fd, mode)
    }

    pub fn name(&self) -> String {
        self.node.lock().name.clone()
    }

    /// Configuration handed to handles opened under this context
    pub fn config(&self) -> CFileConfig {
        self.node.lock().config.clone()
    }

    /// Number of open handles registered directly under this context
    pub fn handle_count(&self) -> usize {
        self.node
            .lock()
            .handles
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|slot| slot.lock().is_open())
            .count()
    }

    /// Number of live child contexts
    pub fn child_count(&self) -> usize {
        self.node.lock().children.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.node.lock().torn_down
    }

    /// Close every handle in this subtree and refuse new registrations
    ///
    /// Child contexts are torn down first, depth-first, then this context's
    /// own handles in registration order. Every handle is closed even when
    /// some fail. Tearing down twice is a no-op.
    ///
    /// # Returns
    /// * Number of handles that were still open and got closed
    ///
    /// # Errors
    /// * The first `Close` failure encountered
    pub fn teardown(&self) -> Result<usize> {
        let (closed, first_error) = teardown_node(&self.node);
        self.detach();
        match first_error {
            Some(err) => Err(err),
            None => Ok(closed),
        }
    }

    /// Register a freshly opened handle slot
    pub(crate) fn register(&self, slot: &SlotRef) -> Result<()> {
        let mut node = self.node.lock();
        if node.torn_down {
            return Err(CFileError::ContextClosed {
                name: node.name.clone(),
            });
        }
        node.handles.retain(|h| h.strong_count() > 0);
        node.handles.push(Arc::downgrade(slot));
        Ok(())
    }

    /// Fail with `ContextClosed` if no more handles can be registered
    pub(crate) fn ensure_open(&self) -> Result<()> {
        let node = self.node.lock();
        if node.torn_down {
            return Err(CFileError::ContextClosed {
                name: node.name.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> WeakNode {
        Arc::downgrade(&self.node)
    }

    /// Remove this node from its parent's child list
    fn detach(&self) {
        let parent = self.node.lock().parent.upgrade();
        if let Some(parent) = parent {
            parent
                .lock()
                .children
                .retain(|child| !Arc::ptr_eq(child, &self.node));
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::warn!("context teardown reported a close failure: {}", e);
        }
    }
}

/// Tear down `node` and its subtree. Locks are never held across children.
fn teardown_node(node: &NodeRef) -> (usize, Option<CFileError>) {
    let (name, children, handles) = {
        let mut guard = node.lock();
        if guard.torn_down {
            return (0, None);
        }
        guard.torn_down = true;
        (
            guard.name.clone(),
            std::mem::take(&mut guard.children),
            std::mem::take(&mut guard.handles),
        )
    };

    let mut closed = 0;
    let mut first_error = None;

    for child in &children {
        let (count, error) = teardown_node(child);
        closed += count;
        if first_error.is_none() {
            first_error = error;
        }
    }

    for slot in handles.iter().filter_map(Weak::upgrade) {
        let mut slot = slot.lock();
        slot.release_owner();
        if slot.is_open() {
            closed += 1;
            if let Err(e) = slot.close() {
                log::warn!("failed to close {} during teardown: {}", slot.path().display(), e);
                first_error.get_or_insert(e);
            }
        }
    }

    log::debug!("context '{}' torn down, {} handle(s) closed", name, closed);
    (closed, first_error)
}
