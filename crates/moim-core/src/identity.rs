//! Identity Resolver - collapses devices that share a display name.
//!
//! A connection identity is issued per browser session and means nothing to
//! people. The display name is what people pick, and it is the logical voter:
//! a phone and a PC both signed in as "Kim" must count as one person.
//!
//! Documents keep a secondary index (identity → display name). Before an
//! engine records the acting identity it purges every identity already filed
//! under the acting name, so the newest device supersedes the older one.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Opaque per-session identity issued by the auth collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-chosen label, the logical identity used for dedup.
///
/// Always trimmed, whether built with `new` or read back from a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    /// Create a display name; surrounding whitespace is not significant.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self(name.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for DisplayName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<DisplayName> for String {
    fn from(name: DisplayName) -> Self {
        name.0
    }
}

impl std::fmt::Display for DisplayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity → display name index every document carries.
pub type NameIndex = BTreeMap<ConnectionId, DisplayName>;

/// Anything that can hold connection identities: membership sets and
/// identity-keyed maps.
pub trait IdentityContainer {
    /// Remove the identity, returning whether it was present.
    fn remove_identity(&mut self, identity: &ConnectionId) -> bool;

    /// Check whether the identity is held.
    fn holds(&self, identity: &ConnectionId) -> bool;
}

impl IdentityContainer for BTreeSet<ConnectionId> {
    fn remove_identity(&mut self, identity: &ConnectionId) -> bool {
        self.remove(identity)
    }

    fn holds(&self, identity: &ConnectionId) -> bool {
        self.contains(identity)
    }
}

impl<V> IdentityContainer for BTreeMap<ConnectionId, V> {
    fn remove_identity(&mut self, identity: &ConnectionId) -> bool {
        self.remove(identity).is_some()
    }

    fn holds(&self, identity: &ConnectionId) -> bool {
        self.contains_key(identity)
    }
}

/// Refuse actions that arrive without a resolved identity context.
///
/// An unnamed action would otherwise be recorded as an anonymous voter that
/// no later purge can find.
pub fn ensure_context(identity: &ConnectionId, name: &DisplayName) -> Result<()> {
    if identity.is_blank() {
        return Err(ReconcileError::MissingIdentityContext("connection identity is empty"));
    }
    if name.is_blank() {
        return Err(ReconcileError::MissingIdentityContext("display name is empty"));
    }
    Ok(())
}

/// Find the first identity recorded under `name`.
pub fn find_by_name<'a>(display_name_of: &'a NameIndex, name: &DisplayName) -> Option<&'a ConnectionId> {
    display_name_of
        .iter()
        .find(|(_, recorded)| *recorded == name)
        .map(|(identity, _)| identity)
}

/// All identities recorded under `name`.
///
/// The invariant allows at most one, but stale duplicates can exist
/// transiently after concurrent writes.
pub fn identities_named(display_name_of: &NameIndex, name: &DisplayName) -> BTreeSet<ConnectionId> {
    display_name_of
        .iter()
        .filter(|(_, recorded)| *recorded == name)
        .map(|(identity, _)| identity.clone())
        .collect()
}

/// Remove every identity filed under `name` from each container and from the
/// name index. Returns the identities that were purged.
pub fn purge_by_name(
    containers: &mut [&mut dyn IdentityContainer],
    display_name_of: &mut NameIndex,
    name: &DisplayName,
) -> BTreeSet<ConnectionId> {
    let purged = identities_named(display_name_of, name);
    for identity in &purged {
        purge_identity(containers, display_name_of, identity);
    }
    purged
}

/// Remove a single identity from each container and from the name index.
pub fn purge_identity(
    containers: &mut [&mut dyn IdentityContainer],
    display_name_of: &mut NameIndex,
    identity: &ConnectionId,
) {
    for container in containers.iter_mut() {
        container.remove_identity(identity);
    }
    display_name_of.remove(identity);
}

/// Drop index entries whose identity is held by none of the containers.
pub fn collect_orphans(containers: &[&dyn IdentityContainer], display_name_of: &mut NameIndex) -> usize {
    let before = display_name_of.len();
    display_name_of.retain(|identity, _| containers.iter().any(|c| c.holds(identity)));
    before - display_name_of.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, &str)]) -> NameIndex {
        entries
            .iter()
            .map(|(id, name)| (ConnectionId::new(*id), DisplayName::new(*name)))
            .collect()
    }

    #[test]
    fn test_find_by_name() {
        let names = index(&[("a", "Kim"), ("b", "Lee")]);

        assert_eq!(
            find_by_name(&names, &DisplayName::new("Lee")),
            Some(&ConnectionId::new("b"))
        );
        assert_eq!(find_by_name(&names, &DisplayName::new("Park")), None);
    }

    #[test]
    fn test_display_name_trims() {
        assert_eq!(DisplayName::new("  지운 "), DisplayName::new("지운"));
        assert!(DisplayName::new("   ").is_blank());
    }

    #[test]
    fn test_purge_by_name_clears_every_container() {
        let mut names = index(&[("a", "Kim"), ("b", "Kim"), ("c", "Lee")]);
        let mut attending: BTreeSet<ConnectionId> =
            [ConnectionId::new("a"), ConnectionId::new("c")].into_iter().collect();
        let mut selections: BTreeMap<ConnectionId, u8> =
            [(ConnectionId::new("b"), 1u8)].into_iter().collect();

        let mut containers: [&mut dyn IdentityContainer; 2] = [&mut attending, &mut selections];
        let purged = purge_by_name(&mut containers, &mut names, &DisplayName::new("Kim"));

        assert_eq!(purged.len(), 2);
        assert_eq!(attending.len(), 1);
        assert!(attending.contains(&ConnectionId::new("c")));
        assert!(selections.is_empty());
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_purge_unknown_name_is_noop() {
        let mut names = index(&[("a", "Kim")]);
        let mut set: BTreeSet<ConnectionId> = [ConnectionId::new("a")].into_iter().collect();

        let mut containers: [&mut dyn IdentityContainer; 1] = [&mut set];
        let purged = purge_by_name(&mut containers, &mut names, &DisplayName::new("Park"));

        assert!(purged.is_empty());
        assert_eq!(set.len(), 1);
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_stored_names_are_trimmed() {
        let name: DisplayName = serde_json::from_str("\" Kim \"").unwrap();
        assert_eq!(name, DisplayName::new("Kim"));
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"Kim\"");

        let names: NameIndex = serde_json::from_str(r#"{"a": "Kim", "b": " Kim"}"#).unwrap();
        let found = identities_named(&names, &DisplayName::new("Kim"));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_ensure_context() {
        let id = ConnectionId::new("a");
        assert!(ensure_context(&id, &DisplayName::new("Kim")).is_ok());
        assert!(matches!(
            ensure_context(&id, &DisplayName::new(" ")),
            Err(ReconcileError::MissingIdentityContext(_))
        ));
        assert!(matches!(
            ensure_context(&ConnectionId::new(""), &DisplayName::new("Kim")),
            Err(ReconcileError::MissingIdentityContext(_))
        ));
    }

    #[test]
    fn test_collect_orphans() {
        let mut names = index(&[("a", "Kim"), ("b", "Lee")]);
        let set: BTreeSet<ConnectionId> = [ConnectionId::new("a")].into_iter().collect();

        let containers: [&dyn IdentityContainer; 1] = [&set];
        let dropped = collect_orphans(&containers, &mut names);

        assert_eq!(dropped, 1);
        assert!(names.contains_key(&ConnectionId::new("a")));
    }
}
