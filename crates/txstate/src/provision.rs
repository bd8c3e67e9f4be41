//! Idempotent node creation and namespace provisioning.

use tracing::{debug, info};

use crate::acl::AclEntry;
use crate::coordinator::{ancestors, Connection, CreateMode};
use crate::error::{CoordinatorError, CoordinatorResult, Outcome, StateError, StateResult};

/// Create `path`, creating missing ancestors first.
///
/// Ancestors get an empty payload. Every node created here, ancestors
/// included, gets `acls` (default ACLs when `None`); only the target gets
/// `mode` (persistent when `None`). A node that already exists is not an
/// error: another actor won the race.
pub fn ensure_node<C: Connection + ?Sized>(
    conn: &C,
    path: &str,
    data: Option<&[u8]>,
    acls: Option<&[AclEntry]>,
    mode: Option<CreateMode>,
) -> CoordinatorResult<Outcome> {
    for parent in ancestors(path) {
        match conn.create(parent, &[], acls, CreateMode::Persistent) {
            Ok(_) | Err(CoordinatorError::NodeExists(_)) => {}
            Err(e) => return Err(e),
        }
    }

    match conn.create(path, data.unwrap_or_default(), acls, mode.unwrap_or_default()) {
        Ok(created) => {
            debug!(path = %created, "node created");
            Ok(Outcome::Applied)
        }
        Err(CoordinatorError::NodeExists(_)) => {
            info!(%path, "path already exists");
            Ok(Outcome::AlreadySatisfied)
        }
        Err(e) => Err(e),
    }
}

/// Make sure the global root and the namespace root both exist.
///
/// Both roots and every missing node between them get `acls`. Each step is
/// independently idempotent.
pub fn provision_namespace<C: Connection + ?Sized>(
    conn: &C,
    global_root: &str,
    namespace_root: &str,
    acls: Option<&[AclEntry]>,
) -> StateResult<()> {
    for path in [global_root, namespace_root] {
        ensure_node(conn, path, None, acls, None).map_err(|source| StateError::Provision {
            path: path.to_string(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateConfig;
    use crate::coordinator::Connector;
    use crate::memory::{MemoryConnection, MemoryEnsemble, Op};

    fn connect(ensemble: &MemoryEnsemble) -> MemoryConnection {
        let mut conf = StateConfig::default();
        conf.zookeeper.servers = vec!["memory".into()];
        ensemble.connect(&conf.connect_params().unwrap(), None).unwrap()
    }

    #[test]
    fn creates_missing_parents() {
        let ensemble = MemoryEnsemble::new();
        let conn = connect(&ensemble);
        let outcome = ensure_node(&conn, "/a/b/c", Some(b"v"), None, None).unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert!(ensemble.exists("/a"));
        assert!(ensemble.exists("/a/b"));
        assert_eq!(ensemble.data("/a/b/c"), Some(b"v".to_vec()));
    }

    #[test]
    fn existing_node_is_already_satisfied() {
        let ensemble = MemoryEnsemble::new();
        let conn = connect(&ensemble);
        let first = ensure_node(&conn, "/a", Some(b"first"), None, None).unwrap();
        assert_eq!(first, Outcome::Applied);
        let outcome = ensure_node(&conn, "/a", Some(b"second"), None, None).unwrap();
        assert_eq!(outcome, Outcome::AlreadySatisfied);
        assert_eq!(ensemble.data("/a"), Some(b"first".to_vec()));
    }

    #[test]
    fn acls_apply_to_created_ancestors() {
        let ensemble = MemoryEnsemble::new();
        let conn = connect(&ensemble);
        let open = ensure_node(&conn, "/p", None, None, None).unwrap();
        assert_eq!(open, Outcome::Applied);

        let acls = vec![AclEntry::creator_all()];
        let outcome = ensure_node(&conn, "/p/q/child", None, Some(&acls), None).unwrap();
        assert_eq!(outcome, Outcome::Applied);
        // Pre-existing ancestors keep what they had.
        assert_eq!(ensemble.acl("/p"), Some(vec![AclEntry::open_unsafe()]));
        assert_eq!(ensemble.acl("/p/q"), Some(acls.clone()));
        assert_eq!(ensemble.acl("/p/q/child"), Some(acls));
    }

    #[test]
    fn ephemeral_mode_is_not_applied_to_ancestors() {
        let ensemble = MemoryEnsemble::new();
        let conn = connect(&ensemble);
        let outcome = ensure_node(&conn, "/a/lock", None, None, Some(CreateMode::Ephemeral)).unwrap();
        assert_eq!(outcome, Outcome::Applied);
        let sibling = ensure_node(&conn, "/a/other", None, None, None).unwrap();
        assert_eq!(sibling, Outcome::Applied);
    }

    #[test]
    fn mode_is_honoured() {
        let ensemble = MemoryEnsemble::new();
        let conn = connect(&ensemble);
        let outcome = ensure_node(&conn, "/eph", None, None, Some(CreateMode::Ephemeral)).unwrap();
        assert_eq!(outcome, Outcome::Applied);
        let err = ensure_node(&conn, "/eph/child", None, None, None).unwrap_err();
        assert_eq!(err, CoordinatorError::NoChildrenForEphemerals("/eph/child".into()));
    }

    #[test]
    fn other_failures_propagate() {
        let ensemble = MemoryEnsemble::new();
        let conn = connect(&ensemble);
        ensemble.fail_next(Op::Create, CoordinatorError::ConnectionLoss);
        let err = ensure_node(&conn, "/a", None, None, None).unwrap_err();
        assert_eq!(err, CoordinatorError::ConnectionLoss);
    }

    #[test]
    fn provisioning_is_idempotent() {
        let ensemble = MemoryEnsemble::new();
        let conn = connect(&ensemble);
        let acls = vec![AclEntry::creator_all()];
        provision_namespace(&conn, "/transactional", "/transactional/t1/user", Some(&acls)).unwrap();
        provision_namespace(&conn, "/transactional", "/transactional/t1/user", Some(&acls)).unwrap();

        assert_eq!(ensemble.children("/transactional"), Some(vec!["t1".to_string()]));
        assert_eq!(ensemble.acl("/transactional"), Some(acls.clone()));
        assert_eq!(ensemble.acl("/transactional/t1"), Some(acls.clone()));
        assert_eq!(ensemble.acl("/transactional/t1/user"), Some(acls));
    }

    #[test]
    fn provisioning_failure_names_the_path() {
        let ensemble = MemoryEnsemble::new();
        let conn = connect(&ensemble);
        ensemble.fail_next(Op::Create, CoordinatorError::NoAuth("/transactional".into()));
        let err = provision_namespace(&conn, "/transactional", "/transactional/t1/user", None)
            .unwrap_err();
        match err {
            StateError::Provision { path, source } => {
                assert_eq!(path, "/transactional");
                assert_eq!(source, CoordinatorError::NoAuth("/transactional".into()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
