//! ZooKeeper backend for the connection seam.

use tracing::{debug, info};
use zookeeper::{Acl, Permission, WatchedEvent, Watcher, ZkError, ZooKeeper};

use crate::acl::{AclEntry, Perms};
use crate::config::ConnectParams;
use crate::coordinator::{Connection, Connector, CreateMode};
use crate::error::{CoordinatorError, CoordinatorResult};

/// Opens sessions against a real ensemble.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZkConnector;

impl Connector for ZkConnector {
    type Conn = ZkConnection;

    fn connect(&self, params: &ConnectParams, chroot: Option<&str>) -> CoordinatorResult<ZkConnection> {
        let connect_string = params.connect_string(chroot);
        let zk = ZooKeeper::connect(&connect_string, params.session_timeout, SessionWatcher)
            .map_err(|e| map_zk_error(e, &connect_string))?;
        if let Some(auth) = &params.auth {
            zk.add_auth(&auth.scheme, auth.payload.clone().into_bytes())
                .map_err(|e| map_zk_error(e, &connect_string))?;
        }
        info!(%connect_string, "zookeeper session established");
        Ok(ZkConnection { zk, closed: false })
    }
}

struct SessionWatcher;

impl Watcher for SessionWatcher {
    fn handle(&self, event: WatchedEvent) {
        debug!(?event, "zookeeper event");
    }
}

/// One ZooKeeper session.
pub struct ZkConnection {
    zk: ZooKeeper,
    closed: bool,
}

impl ZkConnection {
    fn guard(&self) -> CoordinatorResult<()> {
        if self.closed {
            return Err(CoordinatorError::Closed);
        }
        Ok(())
    }
}

impl Connection for ZkConnection {
    fn create(
        &self,
        path: &str,
        data: &[u8],
        acls: Option<&[AclEntry]>,
        mode: CreateMode,
    ) -> CoordinatorResult<String> {
        self.guard()?;
        let acl = match acls {
            Some(entries) => entries.iter().map(to_zk_acl).collect(),
            None => Acl::open_unsafe().clone(),
        };
        self.zk
            .create(path, data.to_vec(), acl, to_zk_mode(mode))
            .map_err(|e| map_zk_error(e, path))
    }

    fn exists(&self, path: &str) -> CoordinatorResult<bool> {
        self.guard()?;
        let stat = self.zk.exists(path, false).map_err(|e| map_zk_error(e, path))?;
        Ok(stat.is_some())
    }

    fn get_data(&self, path: &str) -> CoordinatorResult<Vec<u8>> {
        self.guard()?;
        let (data, _stat) = self.zk.get_data(path, false).map_err(|e| map_zk_error(e, path))?;
        Ok(data)
    }

    fn set_data(&self, path: &str, data: &[u8]) -> CoordinatorResult<()> {
        self.guard()?;
        self.zk
            .set_data(path, data.to_vec(), None)
            .map_err(|e| map_zk_error(e, path))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> CoordinatorResult<()> {
        self.guard()?;
        self.zk.delete(path, None).map_err(|e| map_zk_error(e, path))
    }

    fn get_children(&self, path: &str) -> CoordinatorResult<Vec<String>> {
        self.guard()?;
        self.zk.get_children(path, false).map_err(|e| map_zk_error(e, path))
    }

    fn close(&mut self) -> CoordinatorResult<()> {
        self.guard()?;
        self.closed = true;
        self.zk.close().map_err(|e| map_zk_error(e, "/"))
    }
}

fn to_zk_mode(mode: CreateMode) -> zookeeper::CreateMode {
    match mode {
        CreateMode::Persistent => zookeeper::CreateMode::Persistent,
        CreateMode::Ephemeral => zookeeper::CreateMode::Ephemeral,
        CreateMode::PersistentSequential => zookeeper::CreateMode::PersistentSequential,
        CreateMode::EphemeralSequential => zookeeper::CreateMode::EphemeralSequential,
    }
}

fn to_zk_perms(perms: Perms) -> Permission {
    [
        (Perms::READ, Permission::READ),
        (Perms::WRITE, Permission::WRITE),
        (Perms::CREATE, Permission::CREATE),
        (Perms::DELETE, Permission::DELETE),
        (Perms::ADMIN, Permission::ADMIN),
    ]
    .into_iter()
    .filter(|(ours, _)| perms.contains(*ours))
    .fold(Permission::NONE, |acc, (_, theirs)| acc | theirs)
}

fn to_zk_acl(entry: &AclEntry) -> Acl {
    Acl {
        perms: to_zk_perms(entry.perms),
        scheme: entry.scheme.clone(),
        id: entry.id.clone(),
    }
}

fn map_zk_error(err: ZkError, path: &str) -> CoordinatorError {
    match err {
        ZkError::NodeExists => CoordinatorError::NodeExists(path.to_string()),
        ZkError::NoNode => CoordinatorError::NoNode(path.to_string()),
        ZkError::NotEmpty => CoordinatorError::NotEmpty(path.to_string()),
        ZkError::NoChildrenForEphemerals => {
            CoordinatorError::NoChildrenForEphemerals(path.to_string())
        }
        ZkError::ConnectionLoss => CoordinatorError::ConnectionLoss,
        ZkError::SessionExpired => CoordinatorError::SessionExpired,
        ZkError::NoAuth | ZkError::AuthFailed => CoordinatorError::NoAuth(path.to_string()),
        ZkError::InvalidACL => CoordinatorError::InvalidAcl(path.to_string()),
        ZkError::BadArguments => CoordinatorError::InvalidPath(path.to_string()),
        other => CoordinatorError::Other(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perms_map_bit_for_bit() {
        assert_eq!(to_zk_perms(Perms::ALL), Permission::ALL);
        assert_eq!(to_zk_perms(Perms::NONE), Permission::NONE);
        assert_eq!(
            to_zk_perms(Perms::READ | Perms::WRITE),
            Permission::READ | Permission::WRITE
        );
    }

    #[test]
    fn acl_entries_convert() {
        let acl = to_zk_acl(&AclEntry::new(Perms::ALL, "sasl", "storm"));
        assert_eq!(acl.scheme, "sasl");
        assert_eq!(acl.id, "storm");
        assert_eq!(acl.perms, Permission::ALL);
    }

    #[test]
    fn absorbable_errors_keep_their_identity() {
        assert_eq!(
            map_zk_error(ZkError::NodeExists, "/a"),
            CoordinatorError::NodeExists("/a".into())
        );
        assert_eq!(
            map_zk_error(ZkError::NoNode, "/a"),
            CoordinatorError::NoNode("/a".into())
        );
        assert!(matches!(
            map_zk_error(ZkError::OperationTimeout, "/a"),
            CoordinatorError::Other(_)
        ));
    }
}
