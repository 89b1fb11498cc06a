use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct $name(Uuid);

    impl $name {
      /// Allocate a fresh, time-ordered identifier.
      pub fn new() -> Self {
        Self(Uuid::now_v7())
      }

      pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
      }

      pub fn as_uuid(&self) -> Uuid {
        self.0
      }
    }

    impl Default for $name {
      fn default() -> Self {
        Self::new()
      }
    }

    impl From<Uuid> for $name {
      fn from(uuid: Uuid) -> Self {
        Self(uuid)
      }
    }

    impl From<$name> for Uuid {
      fn from(id: $name) -> Self {
        id.0
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
      }
    }

    impl FromStr for $name {
      type Err = uuid::Error;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
      }
    }
  };
}

define_id!(
  /// Identifier of an action. UUIDv7, so ids sort in creation order.
  ActionId
);

define_id!(
  /// Identifier of an artifact. UUIDv7, so ids sort in creation order.
  ArtifactId
);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ids_sort_in_creation_order() {
    let first = ActionId::new();
    let second = ActionId::new();
    assert!(first < second);
    assert!(first.as_uuid().as_bytes() < second.as_uuid().as_bytes());
  }

  #[test]
  fn test_parse_round_trip() {
    let id = ArtifactId::new();
    let parsed: ArtifactId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
    assert!("not-a-uuid".parse::<ArtifactId>().is_err());
  }
}
