//! Strongly-typed identifiers used across the stock ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a stocked item (SKU).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

/// Identifier of a warehouse (the grouping used by allocation filters).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(Uuid);

/// Identifier of a storage location (bin, staging lane, dock door, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(Uuid);

/// Identifier of a stock record (one item/location/lot/serial combination).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockRecordId(Uuid);

/// Identifier of an immutable ledger entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(Uuid);

/// Identifier of a container (LPN).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(Uuid);

/// Identifier of a demand request raised by a department.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(ItemId, "ItemId");
impl_uuid_newtype!(WarehouseId, "WarehouseId");
impl_uuid_newtype!(LocationId, "LocationId");
impl_uuid_newtype!(StockRecordId, "StockRecordId");
impl_uuid_newtype!(MovementId, "MovementId");
impl_uuid_newtype!(ContainerId, "ContainerId");
impl_uuid_newtype!(RequestId, "RequestId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_round_trip_and_rejects_garbage() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        let err = "not-a-uuid".parse::<LocationId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.starts_with("LocationId")));
    }
}
