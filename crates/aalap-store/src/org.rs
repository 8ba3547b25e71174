use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const DEFAULT_ORG: &str = "default";

const MAX_NAME_LEN: usize = 64;

fn validate_name(kind: &str, name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::Configuration(format!("{kind} name is empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StoreError::Configuration(format!(
            "{kind} name exceeds {MAX_NAME_LEN} characters: {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StoreError::Configuration(format!(
            "{kind} name may only contain ASCII letters, digits, '-' and '_': {name}"
        )));
    }
    Ok(())
}

/// Tenant identifier. Doubles as a directory name, hence the restricted alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrgId(String);

impl OrgId {
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] for empty, overlong or path-unsafe names.
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        validate_name("organization", &id)?;
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self(DEFAULT_ORG.to_owned())
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrgId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OrgId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrgId> for String {
    fn from(value: OrgId) -> Self {
        value.0
    }
}

/// Address of one collection inside one organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    org: OrgId,
    collection: String,
}

impl CollectionKey {
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if the collection name is invalid.
    pub fn new(org: OrgId, collection: impl Into<String>) -> Result<Self, StoreError> {
        let collection = collection.into();
        validate_name("collection", &collection)?;
        Ok(Self { org, collection })
    }

    #[must_use]
    pub fn org(&self) -> &OrgId {
        &self.org
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_org_is_default() {
        assert_eq!(OrgId::default().as_str(), "default");
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(matches!(
            OrgId::new("../etc"),
            Err(StoreError::Configuration(_))
        ));
        assert!(OrgId::new("a/b").is_err());
        assert!(OrgId::new("").is_err());
        assert!(OrgId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn accepts_simple_names() {
        assert!(OrgId::new("acme-corp_2").is_ok());
    }

    #[test]
    fn collection_key_validates_collection() {
        let org = OrgId::new("acme").unwrap();
        assert!(CollectionKey::new(org.clone(), "documents").is_ok());
        assert!(CollectionKey::new(org, "docs and more").is_err());
    }

    #[test]
    fn collection_key_display() {
        let key = CollectionKey::new(OrgId::new("acme").unwrap(), "code").unwrap();
        assert_eq!(key.to_string(), "acme/code");
    }

    #[test]
    fn org_id_deserialize_validates() {
        let ok: Result<OrgId, _> = serde_json::from_str("\"acme\"");
        assert!(ok.is_ok());
        let bad: Result<OrgId, _> = serde_json::from_str("\"a b\"");
        assert!(bad.is_err());
    }
}
