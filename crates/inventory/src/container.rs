//! Containers (license plate numbers).
//!
//! A container groups the lines received together. Its lines are a
//! receipt-time snapshot: they document what arrived and drive putaway, but
//! they do not follow later issues or moves of the underlying stock.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{ContainerId, DomainError, DomainResult, Entity, ItemId, LocationId};

use crate::stock::StockKey;

/// Human-facing container code, e.g. `LPN-20240105-1704412800123`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerCode(String);

impl ContainerCode {
    pub const PREFIX: &'static str = "LPN";

    /// Build a code from the creation date and a disambiguator that the
    /// caller guarantees is unique.
    pub fn compose(date: NaiveDate, disambiguator: u64) -> Self {
        Self(format!("{}-{}-{}", Self::PREFIX, date.format("%Y%m%d"), disambiguator))
    }

    pub fn parse(s: impl Into<String>) -> DomainResult<Self> {
        let s = s.into();
        let mut parts = s.splitn(3, '-');
        let valid = parts.next() == Some(Self::PREFIX)
            && parts
                .next()
                .is_some_and(|d| NaiveDate::parse_from_str(d, "%Y%m%d").is_ok())
            && parts.next().is_some_and(|n| n.parse::<u64>().is_ok());
        if !valid {
            return Err(DomainError::invalid_id(format!("container code '{s}'")));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ContainerCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One received line inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLine {
    pub item_id: ItemId,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub expiry: Option<NaiveDate>,
    pub quantity: i64,
}

impl ContainerLine {
    pub fn new(item_id: ItemId, quantity: i64) -> Self {
        Self {
            item_id,
            lot: None,
            serial: None,
            expiry: None,
            quantity,
        }
    }

    pub fn with_lot(mut self, lot: impl Into<String>) -> Self {
        self.lot = Some(lot.into());
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn with_expiry(mut self, expiry: NaiveDate) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Stock key for this line at `location`.
    pub fn key_at(&self, location: LocationId) -> StockKey {
        StockKey {
            item_id: self.item_id,
            location_id: location,
            lot: self.lot.clone(),
            serial: self.serial.clone(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Open,
    Closed,
}

/// Container lifecycle: `Open` at receipt, `Closed` after putaway. Closed is
/// terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    id: ContainerId,
    code: ContainerCode,
    location_id: LocationId,
    status: ContainerStatus,
    lines: Vec<ContainerLine>,
    note: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl Container {
    pub fn open(
        id: ContainerId,
        code: ContainerCode,
        location_id: LocationId,
        lines: Vec<ContainerLine>,
        note: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("container needs at least one line"));
        }
        if lines.iter().any(|l| l.quantity <= 0) {
            return Err(DomainError::validation("container line quantity must be positive"));
        }
        Ok(Self {
            id,
            code,
            location_id,
            status: ContainerStatus::Open,
            lines,
            note: note.into(),
            created_at,
            closed_at: None,
        })
    }

    /// Rebuild from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: ContainerId,
        code: ContainerCode,
        location_id: LocationId,
        status: ContainerStatus,
        lines: Vec<ContainerLine>,
        note: String,
        created_at: DateTime<Utc>,
        closed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            code,
            location_id,
            status,
            lines,
            note,
            created_at,
            closed_at,
        }
    }

    pub fn id_typed(&self) -> ContainerId {
        self.id
    }

    pub fn code(&self) -> &ContainerCode {
        &self.code
    }

    pub fn location_id(&self) -> LocationId {
        self.location_id
    }

    pub fn status(&self) -> ContainerStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == ContainerStatus::Open
    }

    pub fn lines(&self) -> &[ContainerLine] {
        &self.lines
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn ensure_open(&self) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::ContainerAlreadyClosed(self.code.to_string()));
        }
        Ok(())
    }

    /// Terminal transition after a successful putaway.
    pub fn close_at(&mut self, destination: LocationId, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_open()?;
        self.location_id = destination;
        self.status = ContainerStatus::Closed;
        self.closed_at = Some(at);
        Ok(())
    }
}

impl Entity for Container {
    type Id = ContainerId;

    fn id(&self) -> ContainerId {
        self.id
    }
}
