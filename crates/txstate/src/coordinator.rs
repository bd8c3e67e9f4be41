//! The coordination-service connection seam.
//!
//! [`Connector`] opens sessions, [`Connection`] is one open session. The
//! ZooKeeper backend lives in [`crate::zk`], an in-memory ensemble for tests
//! in [`crate::memory`]. All calls block until the service answers.

use crate::acl::AclEntry;
use crate::config::ConnectParams;
use crate::error::{CoordinatorError, CoordinatorResult};

/// How a node is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CreateMode {
    #[default]
    Persistent,
    /// Removed when the creating session closes.
    Ephemeral,
    /// The service appends a monotonically increasing 10-digit suffix.
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// One session with the coordination service.
///
/// Paths are absolute within the session's view; a chrooted session resolves
/// them under its chroot.
pub trait Connection: Send {
    /// Create a node. `acls` of `None` means the service's open default.
    /// Returns the path actually created (differs for sequential modes).
    fn create(
        &self,
        path: &str,
        data: &[u8],
        acls: Option<&[AclEntry]>,
        mode: CreateMode,
    ) -> CoordinatorResult<String>;

    fn exists(&self, path: &str) -> CoordinatorResult<bool>;

    fn get_data(&self, path: &str) -> CoordinatorResult<Vec<u8>>;

    /// Overwrite the payload of an existing node, whatever its version.
    fn set_data(&self, path: &str, data: &[u8]) -> CoordinatorResult<()>;

    fn delete(&self, path: &str) -> CoordinatorResult<()>;

    fn get_children(&self, path: &str) -> CoordinatorResult<Vec<String>>;

    /// End the session. Calls after this fail with `Closed`.
    fn close(&mut self) -> CoordinatorResult<()>;
}

/// Opens sessions. `chroot` scopes every path of the new session.
pub trait Connector: Send + Sync {
    type Conn: Connection;

    fn connect(&self, params: &ConnectParams, chroot: Option<&str>) -> CoordinatorResult<Self::Conn>;
}

/// Turn a caller-relative path into an absolute one.
pub fn normalize(path: &str) -> String {
    format!("/{path}")
}

/// Check coordination-service path syntax.
pub fn validate_path(path: &str) -> CoordinatorResult<()> {
    let invalid = || Err(CoordinatorError::InvalidPath(path.to_string()));
    if !path.starts_with('/') || path.contains('\0') {
        return invalid();
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return invalid();
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return invalid();
        }
    }
    Ok(())
}

/// Parent of an absolute, valid path. The root has none.
pub fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Every proper ancestor of `path`, outermost first, excluding `/`.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent_of(path);
    while let Some(p) = current {
        if p == "/" {
            break;
        }
        out.push(p);
        current = parent_of(p);
    }
    out.reverse();
    out
}

/// Join a base path and a child path without doubling separators.
pub fn join(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{child}"),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{child}"),
    }
}
