//! Per-component transactional state persisted in the coordination service.
//!
//! Each store is rooted at `{transactional_root}/{id}/{subroot}` and owns a
//! session chrooted there, so every path handed to it is relative to that
//! root. Mutations treat an already-reached end state as success so that
//! retried or racing callers converge without spurious errors; every other
//! failure is fatal to the single call that hit it.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::acl::{resolve_worker_acls, AclEntry};
use crate::codec::{StoredValue, ValuesDeserializer, ValuesSerializer};
use crate::config::{ComponentConfig, StateConfig};
use crate::coordinator::{join, normalize, Connection, Connector, CreateMode};
use crate::error::{CoordinatorError, Outcome, StateError, StateResult};
use crate::provision::{ensure_node, provision_namespace};

/// Payload written by [`TransactionalState::mkdir`]. Never interpreted.
pub const DIR_SENTINEL: i32 = 7;

/// Which subtree of a transaction's namespace a store lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subroot {
    User,
    Coordinator,
}

impl Subroot {
    pub fn as_str(self) -> &'static str {
        match self {
            Subroot::User => "user",
            Subroot::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for Subroot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{transactional_root}/{id}/{subroot}`.
pub fn namespace_root(transactional_root: &str, id: &str, subroot: Subroot) -> String {
    join(transactional_root, &format!("{id}/{subroot}"))
}

/// Hierarchical key-value state for one component, scoped to a namespace root.
pub struct TransactionalState<C: Connection> {
    conn: Option<C>,
    root: String,
    acls: Option<Vec<AclEntry>>,
    ser: ValuesSerializer,
    des: ValuesDeserializer,
}

impl<C: Connection> TransactionalState<C> {
    /// Store for user (spout/bolt) state under `.../{id}/user`.
    pub fn new_user_state<K>(
        connector: &K,
        conf: &StateConfig,
        id: &str,
        component: Option<&ComponentConfig>,
    ) -> StateResult<Self>
    where
        K: Connector<Conn = C>,
    {
        Self::open(connector, conf, id, component, Subroot::User)
    }

    /// Store for coordinator state under `.../{id}/coordinator`.
    pub fn new_coordinator_state<K>(
        connector: &K,
        conf: &StateConfig,
        id: &str,
        component: Option<&ComponentConfig>,
    ) -> StateResult<Self>
    where
        K: Connector<Conn = C>,
    {
        Self::open(connector, conf, id, component, Subroot::Coordinator)
    }

    /// Provision the namespace over a short-lived bootstrap session, then
    /// open the long-lived session chrooted to it.
    pub fn open<K>(
        connector: &K,
        conf: &StateConfig,
        id: &str,
        component: Option<&ComponentConfig>,
        subroot: Subroot,
    ) -> StateResult<Self>
    where
        K: Connector<Conn = C>,
    {
        let conf = conf.merged_with(component);
        let params = conf.connect_params()?;
        let acls = resolve_worker_acls(&conf.acl)?;
        let root = namespace_root(&conf.transactional_root, id, subroot);

        let mut bootstrap = connector.connect(&params, None).map_err(|source| StateError::Connect {
            connect_string: params.connect_string(None),
            source,
        })?;
        let provisioned = provision_namespace(
            &bootstrap,
            &join(&conf.transactional_root, ""),
            &root,
            acls.as_deref(),
        );
        if let Err(e) = bootstrap.close() {
            warn!(error = %e, "failed to close bootstrap session");
        }
        provisioned?;

        let conn = connector
            .connect(&params, Some(&root))
            .map_err(|source| StateError::Connect {
                connect_string: params.connect_string(Some(&root)),
                source,
            })?;
        info!(%root, "transactional state opened");

        Ok(Self {
            conn: Some(conn),
            root,
            acls,
            ser: ValuesSerializer::new(&conf),
            des: ValuesDeserializer::new(&conf),
        })
    }

    /// Namespace root this store is chrooted to.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// ACLs applied to every node this store creates (`None` = defaults).
    pub fn acls(&self) -> Option<&[AclEntry]> {
        self.acls.as_deref()
    }

    fn conn(&self) -> StateResult<&C> {
        self.conn.as_ref().ok_or_else(|| StateError::Coordination {
            op: "connection",
            path: self.root.clone(),
            source: CoordinatorError::Closed,
        })
    }

    /// Store `value` at `path`, overwriting any existing payload.
    ///
    /// Missing parents are created. If another actor creates the node between
    /// the existence check and our create, its payload wins and the call
    /// reports [`Outcome::AlreadySatisfied`].
    pub fn set_data<T: Serialize>(&self, path: &str, value: &T) -> StateResult<Outcome> {
        let bytes = self.ser.serialize(value)?;
        self.write_bytes(path, &bytes)
    }

    /// Store an untyped value under an explicit type name.
    pub fn set_value(&self, path: &str, value: &StoredValue) -> StateResult<Outcome> {
        let bytes = self.ser.serialize_value(value)?;
        self.write_bytes(path, &bytes)
    }

    fn write_bytes(&self, path: &str, bytes: &[u8]) -> StateResult<Outcome> {
        let path = normalize(path);
        let conn = self.conn()?;

        let exists = conn
            .exists(&path)
            .map_err(StateError::coordination("exists", &path))?;
        if exists {
            conn.set_data(&path, bytes)
                .map_err(StateError::coordination("set_data", &path))?;
            debug!(%path, len = bytes.len(), "state updated");
            return Ok(Outcome::Applied);
        }

        let outcome = ensure_node(
            conn,
            &path,
            Some(bytes),
            self.acls.as_deref(),
            Some(CreateMode::Persistent),
        )
        .map_err(StateError::coordination("create", &path))?;
        if outcome == Outcome::AlreadySatisfied {
            warn!(%path, "path already exists");
        }
        Ok(outcome)
    }

    /// Read and decode the value at `path`. A missing node is `Ok(None)`.
    pub fn get_data<T: DeserializeOwned>(&self, path: &str) -> StateResult<Option<T>> {
        self.read_bytes(path)?
            .map(|bytes| self.des.deserialize(&bytes))
            .transpose()
    }

    /// Read the value at `path` without knowing its Rust type.
    pub fn get_value(&self, path: &str) -> StateResult<Option<StoredValue>> {
        self.read_bytes(path)?
            .map(|bytes| self.des.deserialize_value(&bytes))
            .transpose()
    }

    fn read_bytes(&self, path: &str) -> StateResult<Option<Vec<u8>>> {
        let path = normalize(path);
        let conn = self.conn()?;
        let exists = conn
            .exists(&path)
            .map_err(StateError::coordination("exists", &path))?;
        if !exists {
            return Ok(None);
        }
        let bytes = conn
            .get_data(&path)
            .map_err(StateError::coordination("get_data", &path))?;
        debug!(%path, len = bytes.len(), "state read");
        Ok(Some(bytes))
    }

    /// Delete the node at `path`. Deleting a missing node succeeds.
    pub fn delete(&self, path: &str) -> StateResult<Outcome> {
        let path = normalize(path);
        match self.conn()?.delete(&path) {
            Ok(()) => {
                debug!(%path, "state deleted");
                Ok(Outcome::Applied)
            }
            Err(CoordinatorError::NoNode(_)) => {
                info!(%path, "path has already been deleted");
                Ok(Outcome::AlreadySatisfied)
            }
            Err(e) => Err(StateError::coordination("delete", &path)(e)),
        }
    }

    /// Child names of `path`, in the order the service reports them.
    /// A missing node has no children.
    pub fn list(&self, path: &str) -> StateResult<Vec<String>> {
        let path = normalize(path);
        let conn = self.conn()?;
        let exists = conn
            .exists(&path)
            .map_err(StateError::coordination("exists", &path))?;
        if !exists {
            return Ok(Vec::new());
        }
        conn.get_children(&path)
            .map_err(StateError::coordination("get_children", &path))
    }

    /// Make sure a node exists at `path` so children can be placed under it.
    pub fn mkdir(&self, path: &str) -> StateResult<Outcome> {
        self.set_data(path, &DIR_SENTINEL)
    }

    /// Release the session.
    pub fn close(mut self) -> StateResult<()> {
        match self.conn.take() {
            Some(mut conn) => conn
                .close()
                .map_err(StateError::coordination("close", &self.root)),
            None => Ok(()),
        }
    }
}

impl<C: Connection> Drop for TransactionalState<C> {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close() {
                warn!(root = %self.root, error = %e, "failed to close transactional state session");
            }
        }
    }
}

impl<C: Connection> fmt::Debug for TransactionalState<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalState")
            .field("root", &self.root)
            .field("acls", &self.acls)
            .field("open", &self.conn.is_some())
            .finish()
    }
}
