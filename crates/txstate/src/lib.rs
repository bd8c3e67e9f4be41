//! txstate: transactional state store on top of ZooKeeper.
//!
//! Gives stream-processing components a place to durably keep small pieces
//! of state (offsets, checkpoints, metadata) under a namespace derived from
//! a transaction id, with idempotent semantics that tolerate retries and
//! concurrent writers.
//!
//! # Architecture
//!
//! ```text
//! TransactionalState (state)
//!   ├── provision     idempotent node creation, namespace bootstrap
//!   ├── codec         serializer/deserializer pair from merged registrations
//!   ├── acl           worker ACLs, resolved once per store
//!   └── Connection    coordinator seam
//!         ├── zk        ZooKeeper sessions (zookeeper crate)
//!         └── memory    in-memory ensemble for tests
//! ```
//!
//! Every mutating call returns an [`Outcome`]: `Applied` when it changed the
//! store, `AlreadySatisfied` when a concurrent actor had already reached the
//! same end state. Anything else is a fatal [`StateError`].

pub mod acl;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod provision;
pub mod state;
pub mod zk;

pub use acl::{AclEntry, Perms};
pub use codec::StoredValue;
pub use config::{ComponentConfig, ConnectParams, StateConfig};
pub use coordinator::{Connection, Connector, CreateMode};
pub use error::{CoordinatorError, CoordinatorResult, Outcome, StateError, StateResult};
pub use memory::MemoryEnsemble;
pub use state::{Subroot, TransactionalState};
pub use zk::ZkConnector;
