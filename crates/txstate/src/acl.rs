//! Access control lists applied to nodes at creation time.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::config::AclConfig;
use crate::error::{StateError, StateResult};

/// Permission bitmask, using the coordination service's bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perms(u32);

impl Perms {
    pub const NONE: Perms = Perms(0);
    pub const READ: Perms = Perms(1);
    pub const WRITE: Perms = Perms(1 << 1);
    pub const CREATE: Perms = Perms(1 << 2);
    pub const DELETE: Perms = Perms(1 << 3);
    pub const ADMIN: Perms = Perms(1 << 4);
    pub const ALL: Perms = Perms(0b11111);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Perms) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Perms {
    type Output = Perms;

    fn bitor(self, rhs: Perms) -> Perms {
        Perms(self.0 | rhs.0)
    }
}

/// A single ACL entry: `perms` granted to principal `scheme:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclEntry {
    pub perms: Perms,
    pub scheme: String,
    pub id: String,
}

impl AclEntry {
    pub fn new(perms: Perms, scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            perms,
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// Everyone may do everything.
    pub fn open_unsafe() -> Self {
        Self::new(Perms::ALL, "world", "anyone")
    }

    /// Full access for whichever identities authenticated the creating session.
    pub fn creator_all() -> Self {
        Self::new(Perms::ALL, "auth", "")
    }

    /// Parse a `scheme:id` principal. The id may itself contain `:`.
    pub fn parse_principal(perms: Perms, principal: &str) -> Option<Self> {
        let (scheme, id) = principal.split_once(':')?;
        if scheme.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(perms, scheme, id))
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{:#07b}", self.scheme, self.id, self.perms.bits())
    }
}

/// Resolve the ACLs this store applies to every node it creates.
///
/// Without a topology auth scheme the nodes get default, unrestricted ACLs
/// (`None`). With one, the creator gets full access and so does the
/// configured super-ACL principal, which is then mandatory.
pub fn resolve_worker_acls(conf: &AclConfig) -> StateResult<Option<Vec<AclEntry>>> {
    let scheme = conf.topology_auth_scheme.as_deref().map(str::trim).unwrap_or("");
    if scheme.is_empty() {
        return Ok(None);
    }

    let superacl = conf.superacl.as_deref().ok_or_else(|| {
        StateError::Config(format!(
            "authentication scheme {scheme} is configured but no super ACL is set"
        ))
    })?;
    let super_entry = AclEntry::parse_principal(Perms::ALL, superacl).ok_or_else(|| {
        StateError::Config(format!("super ACL {superacl:?} is not of the form scheme:id"))
    })?;

    Ok(Some(vec![AclEntry::creator_all(), super_entry]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl_conf(scheme: Option<&str>, superacl: Option<&str>) -> AclConfig {
        AclConfig {
            topology_auth_scheme: scheme.map(String::from),
            superacl: superacl.map(String::from),
        }
    }

    #[test]
    fn no_auth_scheme_means_default_acls() {
        assert_eq!(resolve_worker_acls(&acl_conf(None, None)).unwrap(), None);
        assert_eq!(
            resolve_worker_acls(&acl_conf(Some("  "), Some("sasl:storm"))).unwrap(),
            None
        );
    }

    #[test]
    fn auth_scheme_grants_creator_and_super_user() {
        let acls = resolve_worker_acls(&acl_conf(Some("digest"), Some("sasl:storm")))
            .unwrap()
            .unwrap();
        assert_eq!(acls.len(), 2);
        assert_eq!(acls[0], AclEntry::creator_all());
        assert_eq!(acls[1], AclEntry::new(Perms::ALL, "sasl", "storm"));
    }

    #[test]
    fn auth_scheme_without_superacl_is_rejected() {
        let err = resolve_worker_acls(&acl_conf(Some("digest"), None)).unwrap_err();
        assert!(matches!(err, StateError::Config(_)));

        let err = resolve_worker_acls(&acl_conf(Some("digest"), Some("storm"))).unwrap_err();
        assert!(err.to_string().contains("scheme:id"));
    }

    #[test]
    fn principal_id_may_contain_colons() {
        let entry = AclEntry::parse_principal(Perms::READ, "digest:user:hash=").unwrap();
        assert_eq!(entry.scheme, "digest");
        assert_eq!(entry.id, "user:hash=");
    }

    #[test]
    fn perms_combine() {
        let rw = Perms::READ | Perms::WRITE;
        assert!(rw.contains(Perms::READ));
        assert!(!rw.contains(Perms::DELETE));
        assert!(Perms::ALL.contains(rw | Perms::CREATE | Perms::DELETE | Perms::ADMIN));
    }
}
