//! In-memory coordination service for tests and local runs.
//!
//! A [`MemoryEnsemble`] is one shared node tree; every `connect` opens a new
//! session on it, optionally chrooted. Node semantics follow ZooKeeper:
//! parents must exist, sequential nodes get a per-parent 10-digit suffix,
//! ephemeral nodes vanish with their session, and children are listed in
//! creation order. ACLs are recorded per node but not enforced.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::acl::AclEntry;
use crate::config::ConnectParams;
use crate::coordinator::{join, parent_of, validate_path, Connection, Connector, CreateMode};
use crate::error::{CoordinatorError, CoordinatorResult};

/// Operation kinds, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    Create,
    Exists,
    GetData,
    SetData,
    Delete,
    GetChildren,
}

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    acl: Vec<AclEntry>,
    ephemeral_owner: Option<u64>,
    children: Vec<String>,
    next_sequence: u32,
}

impl Node {
    fn new(data: Vec<u8>, acl: Vec<AclEntry>, ephemeral_owner: Option<u64>) -> Self {
        Self {
            data,
            acl,
            ephemeral_owner,
            children: Vec::new(),
            next_sequence: 0,
        }
    }
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<String, Node>,
    available: bool,
    faults: VecDeque<(Op, CoordinatorError)>,
    next_session: u64,
    open_sessions: usize,
    connections: usize,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), vec![AclEntry::open_unsafe()], None));
        Self {
            nodes,
            available: true,
            faults: VecDeque::new(),
            next_session: 1,
            open_sessions: 0,
            connections: 0,
        }
    }

    /// Fail if the ensemble is down or a fault is queued for `op`.
    fn check(&mut self, op: Op) -> CoordinatorResult<()> {
        if !self.available {
            return Err(CoordinatorError::ConnectionLoss);
        }
        if let Some(idx) = self.faults.iter().position(|(o, _)| *o == op) {
            if let Some((_, err)) = self.faults.remove(idx) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn create(
        &mut self,
        path: &str,
        data: &[u8],
        acl: Vec<AclEntry>,
        mode: CreateMode,
        session: u64,
    ) -> CoordinatorResult<String> {
        let parent_path = parent_of(path)
            .ok_or_else(|| CoordinatorError::NodeExists(path.to_string()))?
            .to_string();
        let parent = self
            .nodes
            .get_mut(&parent_path)
            .ok_or_else(|| CoordinatorError::NoNode(path.to_string()))?;
        if parent.ephemeral_owner.is_some() {
            return Err(CoordinatorError::NoChildrenForEphemerals(path.to_string()));
        }

        let actual = if mode.is_sequential() {
            let seq = parent.next_sequence;
            parent.next_sequence += 1;
            format!("{path}{seq:010}")
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(CoordinatorError::NodeExists(actual));
        }

        let name = actual.rsplit('/').next().unwrap_or_default().to_string();
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.children.push(name);
        }
        let owner = mode.is_ephemeral().then_some(session);
        self.nodes.insert(actual.clone(), Node::new(data.to_vec(), acl, owner));
        Ok(actual)
    }

    fn delete(&mut self, path: &str) -> CoordinatorResult<()> {
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| CoordinatorError::NoNode(path.to_string()))?;
        if path == "/" {
            return Err(CoordinatorError::Other("cannot delete the root node".into()));
        }
        if !node.children.is_empty() {
            return Err(CoordinatorError::NotEmpty(path.to_string()));
        }
        self.nodes.remove(path);
        if let Some(parent) = parent_of(path).and_then(|p| self.nodes.get_mut(p)) {
            let name = path.rsplit('/').next().unwrap_or_default();
            parent.children.retain(|child| child != name);
        }
        Ok(())
    }

    fn expire_session(&mut self, session: u64) {
        let mut owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        // Ephemerals cannot have children, so order only matters for logging.
        owned.sort();
        for path in owned {
            let _ = self.delete(&path);
            debug!(%path, session, "ephemeral node removed");
        }
        self.open_sessions = self.open_sessions.saturating_sub(1);
    }
}

/// A shared in-memory node tree that hands out sessions.
#[derive(Debug, Clone)]
pub struct MemoryEnsemble {
    tree: Arc<Mutex<Tree>>,
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        // A panicking test thread must not wedge every other session.
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `err` for the next `op` on any session.
    pub fn fail_next(&self, op: Op, err: CoordinatorError) {
        self.lock().faults.push_back((op, err));
    }

    /// While unavailable, every connect and operation fails with `ConnectionLoss`.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(path)
    }

    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().nodes.get(path).map(|node| node.data.clone())
    }

    pub fn acl(&self, path: &str) -> Option<Vec<AclEntry>> {
        self.lock().nodes.get(path).map(|node| node.acl.clone())
    }

    pub fn children(&self, path: &str) -> Option<Vec<String>> {
        self.lock().nodes.get(path).map(|node| node.children.clone())
    }

    /// Sessions opened so far, closed or not.
    pub fn connection_count(&self) -> usize {
        self.lock().connections
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }
}

impl Connector for MemoryEnsemble {
    type Conn = MemoryConnection;

    fn connect(&self, params: &ConnectParams, chroot: Option<&str>) -> CoordinatorResult<MemoryConnection> {
        if let Some(root) = chroot {
            validate_path(root)?;
        }
        let mut tree = self.lock();
        tree.check(Op::Connect)?;
        let session = tree.next_session;
        tree.next_session += 1;
        tree.open_sessions += 1;
        tree.connections += 1;
        debug!(
            session,
            connect_string = %params.connect_string(chroot),
            "memory session opened"
        );
        Ok(MemoryConnection {
            tree: Arc::clone(&self.tree),
            chroot: chroot.filter(|root| *root != "/").map(String::from),
            session,
            closed: AtomicBool::new(false),
        })
    }
}

/// One session on a [`MemoryEnsemble`].
#[derive(Debug)]
pub struct MemoryConnection {
    tree: Arc<Mutex<Tree>>,
    chroot: Option<String>,
    session: u64,
    closed: AtomicBool,
}

impl MemoryConnection {
    /// Lock the tree and resolve `path` through the chroot.
    fn enter(&self, op: Op, path: &str) -> CoordinatorResult<(MutexGuard<'_, Tree>, String)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinatorError::Closed);
        }
        validate_path(path)?;
        let mut tree = self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tree.check(op)?;
        let absolute = match &self.chroot {
            Some(root) => join(root, path),
            None => path.to_string(),
        };
        Ok((tree, absolute))
    }

    /// Strip the chroot from a path produced by the tree.
    fn relative(&self, absolute: String) -> String {
        match &self.chroot {
            Some(root) => match absolute.strip_prefix(root.as_str()) {
                Some("") => "/".to_string(),
                Some(rest) => rest.to_string(),
                None => absolute,
            },
            None => absolute,
        }
    }

    /// Report node errors against the caller's view of the tree, never the
    /// chrooted one.
    fn relativize(&self, err: CoordinatorError, path: &str) -> CoordinatorError {
        match err {
            CoordinatorError::NodeExists(actual) => CoordinatorError::NodeExists(self.relative(actual)),
            CoordinatorError::NoNode(_) => CoordinatorError::NoNode(path.to_string()),
            CoordinatorError::NotEmpty(_) => CoordinatorError::NotEmpty(path.to_string()),
            other => other,
        }
    }
}

impl Connection for MemoryConnection {
    fn create(
        &self,
        path: &str,
        data: &[u8],
        acls: Option<&[AclEntry]>,
        mode: CreateMode,
    ) -> CoordinatorResult<String> {
        let (mut tree, absolute) = self.enter(Op::Create, path)?;
        let acl = match acls {
            Some([]) => return Err(CoordinatorError::InvalidAcl(path.to_string())),
            Some(acls) => acls.to_vec(),
            None => vec![AclEntry::open_unsafe()],
        };
        let created = tree
            .create(&absolute, data, acl, mode, self.session)
            .map_err(|e| self.relativize(e, path))?;
        drop(tree);
        Ok(self.relative(created))
    }

    fn exists(&self, path: &str) -> CoordinatorResult<bool> {
        let (tree, absolute) = self.enter(Op::Exists, path)?;
        Ok(tree.nodes.contains_key(&absolute))
    }

    fn get_data(&self, path: &str) -> CoordinatorResult<Vec<u8>> {
        let (tree, absolute) = self.enter(Op::GetData, path)?;
        tree.nodes
            .get(&absolute)
            .map(|node| node.data.clone())
            .ok_or_else(|| CoordinatorError::NoNode(path.to_string()))
    }

    fn set_data(&self, path: &str, data: &[u8]) -> CoordinatorResult<()> {
        let (mut tree, absolute) = self.enter(Op::SetData, path)?;
        let node = tree
            .nodes
            .get_mut(&absolute)
            .ok_or_else(|| CoordinatorError::NoNode(path.to_string()))?;
        node.data = data.to_vec();
        Ok(())
    }

    fn delete(&self, path: &str) -> CoordinatorResult<()> {
        let (mut tree, absolute) = self.enter(Op::Delete, path)?;
        tree.delete(&absolute).map_err(|e| self.relativize(e, path))
    }

    fn get_children(&self, path: &str) -> CoordinatorResult<Vec<String>> {
        let (tree, absolute) = self.enter(Op::GetChildren, path)?;
        tree.nodes
            .get(&absolute)
            .map(|node| node.children.clone())
            .ok_or_else(|| CoordinatorError::NoNode(path.to_string()))
    }

    fn close(&mut self) -> CoordinatorResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(CoordinatorError::Closed);
        }
        let mut tree = self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tree.expire_session(self.session);
        debug!(session = self.session, "memory session closed");
        Ok(())
    }
}
