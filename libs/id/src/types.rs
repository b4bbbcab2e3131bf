//! Typed UID definitions for the objects in a pod's ownership chain.
//!
//! The API server assigns every object a UUID at creation. Each kind gets
//! its own wrapper so ownership lookups cannot mix them up.

use crate::define_uid;

// =============================================================================
// Ownership Chain
// =============================================================================

define_uid!(ReplicaUid, "pod");
define_uid!(GroupUid, "replicaset");
define_uid!(WorkloadUid, "deployment");

// =============================================================================
// Resource Version
// =============================================================================

/// Optimistic-concurrency token attached to every stored object.
///
/// The value is opaque: it may only be compared for equality, never ordered
/// or parsed as a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    /// Creates a resource version from its string form.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the API server did not supply a version.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceVersion {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl serde::Serialize for ResourceVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self(value))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_replica_uid_roundtrip() {
        let uid = ReplicaUid::new();
        let s = uid.to_string();
        let parsed: ReplicaUid = s.parse().unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn test_parse_api_server_uid() {
        let uid: GroupUid = "3f0c9a4e-2b1d-4c55-9e0a-6f1f2d3c4b5a".parse().unwrap();
        assert_eq!(uid.to_string(), "3f0c9a4e-2b1d-4c55-9e0a-6f1f2d3c4b5a");
    }

    #[test]
    fn test_uid_empty() {
        let result: Result<ReplicaUid, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));
    }

    #[test]
    fn test_uid_invalid_reports_kind() {
        let err = "not-a-uid".parse::<WorkloadUid>().unwrap_err();
        match err {
            crate::IdError::InvalidUuid { kind, value, .. } => {
                assert_eq!(kind, "deployment");
                assert_eq!(value, "not-a-uid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_uid_json_roundtrip() {
        let uid = WorkloadUid::new();
        let json = serde_json::to_string(&uid).unwrap();
        let parsed: WorkloadUid = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn test_resource_version_is_opaque_string() {
        let rv: ResourceVersion = serde_json::from_str("\"184467\"").unwrap();
        assert_eq!(rv.as_str(), "184467");
        assert!(!rv.is_empty());
        assert!(ResourceVersion::default().is_empty());
    }

    proptest! {
        #[test]
        fn prop_any_uuid_parses(bytes in any::<[u8; 16]>()) {
            let uuid = crate::Uuid::from_bytes(bytes);
            let uid = ReplicaUid::from_uuid(uuid);
            let parsed: ReplicaUid = uid.to_string().parse().unwrap();
            prop_assert_eq!(parsed.uuid(), uuid);
        }
    }
}
