use crate::credentials::types::{mask_token, CredentialEntry, Result, TokenError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Authoritative in-memory store of per-owner credentials
///
/// Reads take a shared lock and clone a single entry, so concurrent `get`
/// calls never block each other. Every mutation replaces a whole entry under
/// the write lock; readers never observe a token from one write paired with
/// an expiry from another.
#[derive(Debug, Default)]
pub struct CredentialMap {
    entries: RwLock<HashMap<String, CredentialEntry>>,
}

impl CredentialMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the credential for `owner`
    ///
    /// Malformed input is logged and rejected without touching the map.
    /// Callers are free to ignore the error: a missing registration simply
    /// surfaces later as [`TokenError::NotFound`].
    pub fn register(&self, owner: &str, token: &str, expires_at: i64) -> Result<()> {
        validate_token(owner, token)?;
        validate_expiry(owner, expires_at)?;

        let previous = self
            .entries
            .write()
            .insert(owner.to_string(), CredentialEntry::new(token, expires_at));

        tracing::debug!(
            owner = %owner,
            token = %mask_token(token),
            expires_at,
            replaced = previous.is_some(),
            "Registered credential"
        );
        Ok(())
    }

    /// Remove the credential for `owner`, returning whether one existed
    pub fn unregister(&self, owner: &str) -> bool {
        let removed = self.entries.write().remove(owner).is_some();
        if removed {
            tracing::debug!(owner = %owner, "Unregistered credential");
        }
        removed
    }

    /// A copy of the current credential for `owner`
    pub fn get(&self, owner: &str) -> Option<CredentialEntry> {
        self.entries.read().get(owner).cloned()
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.entries.read().contains_key(owner)
    }

    /// Replace the token of an existing entry, keeping its expiry
    pub fn set_token(&self, owner: &str, token: &str) -> Result<()> {
        validate_token(owner, token)?;
        self.update(owner, |entry| entry.with_token(token))?;
        tracing::debug!(owner = %owner, token = %mask_token(token), "Updated credential token");
        Ok(())
    }

    /// Replace the expiry of an existing entry, keeping its token
    pub fn set_expiry(&self, owner: &str, expires_at: i64) -> Result<()> {
        validate_expiry(owner, expires_at)?;
        self.update(owner, |entry| entry.with_expiry(expires_at))?;
        tracing::debug!(owner = %owner, expires_at, "Updated credential expiry");
        Ok(())
    }

    /// Point-in-time copy of every entry
    ///
    /// The renewal sweep iterates over this copy, so renewing one entry never
    /// holds the lock against readers of another, and entries registered
    /// mid-sweep wait for the next sweep.
    pub fn snapshot(&self) -> Vec<(String, CredentialEntry)> {
        self.entries
            .read()
            .iter()
            .map(|(owner, entry)| (owner.clone(), entry.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Install a renewed entry if `owner` still holds `expected_token`
    ///
    /// Returns `false` when the entry was unregistered or replaced by a caller
    /// while the renewal call was in flight; the caller's value wins.
    pub(crate) fn replace_if_current(
        &self,
        owner: &str,
        expected_token: &str,
        renewed: CredentialEntry,
    ) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(owner) {
            Some(current) if current.token() == expected_token => {
                *current = renewed;
                true
            }
            _ => false,
        }
    }

    /// Evict `owner` if it still holds `expected_token`
    pub(crate) fn remove_if_current(&self, owner: &str, expected_token: &str) -> bool {
        let mut entries = self.entries.write();
        match entries.get(owner) {
            Some(current) if current.token() == expected_token => {
                entries.remove(owner);
                true
            }
            _ => false,
        }
    }

    fn update<F>(&self, owner: &str, f: F) -> Result<()>
    where
        F: FnOnce(&CredentialEntry) -> CredentialEntry,
    {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(owner)
            .ok_or_else(|| TokenError::NotFound(owner.to_string()))?;
        *entry = f(entry);
        Ok(())
    }
}

fn validate_token(owner: &str, token: &str) -> Result<()> {
    if token.trim().is_empty() {
        tracing::warn!(owner = %owner, "Rejected credential registration: token is missing");
        return Err(TokenError::Registration {
            owner: owner.to_string(),
            reason: "token is missing".to_string(),
        });
    }
    Ok(())
}

fn validate_expiry(owner: &str, expires_at: i64) -> Result<()> {
    if expires_at <= 0 {
        tracing::warn!(
            owner = %owner,
            expires_at,
            "Rejected credential registration: expiry is missing or invalid"
        );
        return Err(TokenError::Registration {
            owner: owner.to_string(),
            reason: format!("expiry {} is missing or invalid", expires_at),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let map = CredentialMap::new();
        map.register("t1", "token-a", 1_000).unwrap();

        let entry = map.get("t1").unwrap();
        assert_eq!(entry.token(), "token-a");
        assert_eq!(entry.expires_at(), 1_000);
        assert!(map.contains("t1"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_register_overwrites_existing_entry() {
        let map = CredentialMap::new();
        map.register("t1", "token-a", 1_000).unwrap();
        map.register("t1", "token-b", 2_000).unwrap();

        let entry = map.get("t1").unwrap();
        assert_eq!(entry.token(), "token-b");
        assert_eq!(entry.expires_at(), 2_000);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_register_rejects_missing_token() {
        let map = CredentialMap::new();
        let result = map.register("t1", "   ", 1_000);

        assert!(matches!(result, Err(TokenError::Registration { .. })));
        assert!(map.is_empty());
    }

    #[test]
    fn test_register_rejects_invalid_expiry() {
        let map = CredentialMap::new();
        assert!(map.register("t1", "token", 0).is_err());
        assert!(map.register("t1", "token", -5).is_err());
        assert!(map.get("t1").is_none());
    }

    #[test]
    fn test_rejected_registration_keeps_previous_entry() {
        let map = CredentialMap::new();
        map.register("t1", "token-a", 1_000).unwrap();
        assert!(map.register("t1", "", 2_000).is_err());
        assert_eq!(map.get("t1").unwrap().token(), "token-a");
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let map = CredentialMap::new();
        map.register("t1", "token-a", 1_000).unwrap();

        assert!(map.unregister("t1"));
        assert!(!map.unregister("t1"));
        assert!(!map.unregister("never-registered"));
        assert!(map.get("t1").is_none());
    }

    #[test]
    fn test_setters_update_single_field() {
        let map = CredentialMap::new();
        map.register("t1", "token-a", 1_000).unwrap();

        map.set_token("t1", "token-b").unwrap();
        let entry = map.get("t1").unwrap();
        assert_eq!(entry.token(), "token-b");
        assert_eq!(entry.expires_at(), 1_000);

        map.set_expiry("t1", 5_000).unwrap();
        let entry = map.get("t1").unwrap();
        assert_eq!(entry.token(), "token-b");
        assert_eq!(entry.expires_at(), 5_000);
    }

    #[test]
    fn test_setters_on_missing_owner() {
        let map = CredentialMap::new();
        assert!(matches!(
            map.set_token("ghost", "token"),
            Err(TokenError::NotFound(owner)) if owner == "ghost"
        ));
        assert!(matches!(map.set_expiry("ghost", 100), Err(TokenError::NotFound(_))));
        assert!(map.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let map = CredentialMap::new();
        map.register("t1", "token-a", 1_000).unwrap();
        map.register("t2", "token-b", 2_000).unwrap();

        let snapshot = map.snapshot();
        map.register("t3", "token-c", 3_000).unwrap();
        map.unregister("t1");

        assert_eq!(snapshot.len(), 2);
        let mut owners: Vec<_> = snapshot.iter().map(|(owner, _)| owner.as_str()).collect();
        owners.sort();
        assert_eq!(owners, vec!["t1", "t2"]);
    }

    #[test]
    fn test_replace_if_current() {
        let map = CredentialMap::new();
        map.register("t1", "old", 1_000).unwrap();

        assert!(map.replace_if_current("t1", "old", CredentialEntry::new("new", 2_000)));
        assert_eq!(map.get("t1").unwrap().token(), "new");

        // A second renewal result for the stale token is discarded
        assert!(!map.replace_if_current("t1", "old", CredentialEntry::new("newer", 3_000)));
        assert_eq!(map.get("t1").unwrap().token(), "new");

        // Unregistered entries are not resurrected
        map.unregister("t1");
        assert!(!map.replace_if_current("t1", "new", CredentialEntry::new("x", 1)));
        assert!(map.get("t1").is_none());
    }

    #[test]
    fn test_remove_if_current() {
        let map = CredentialMap::new();
        map.register("t1", "old", 1_000).unwrap();
        map.set_token("t1", "fresh").unwrap();

        assert!(!map.remove_if_current("t1", "old"));
        assert!(map.contains("t1"));
        assert!(map.remove_if_current("t1", "fresh"));
        assert!(!map.contains("t1"));
    }
}
