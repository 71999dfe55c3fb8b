//! Inputs and results of orchestrated operations.
//!
//! Everything an operation needs is carried explicitly (actor, filter,
//! reference); nothing is read from ambient session state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use wms_core::{ContainerId, ExpectedVersion, ItemId, LocationId, StockRecordId};
use wms_inventory::{
    Container, ContainerLine, DemandRequest, LocationFilter, MovementRecord, PickPlan, PlanLine,
    StockRecord,
};

/// Caller-owned cancellation signal, checked only before a scope opens.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub expiry: Option<NaiveDate>,
    pub reference: String,
    pub actor: String,
    pub note: String,
}

impl ReceiveStock {
    pub fn new(
        item_id: ItemId,
        location_id: LocationId,
        quantity: i64,
        actor: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            item_id,
            location_id,
            quantity,
            lot: None,
            serial: None,
            expiry: None,
            reference: reference.into(),
            actor: actor.into(),
            note: String::new(),
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
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOutcome {
    pub record: StockRecord,
    pub movement: MovementRecord,
}

/// Issue stock along previously planned lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStock {
    pub item_id: ItemId,
    pub lines: Vec<PlanLine>,
    pub requested: i64,
    pub actor: String,
    pub reference: String,
    pub note: String,
}

impl IssueStock {
    pub fn from_plan(
        plan: &PickPlan,
        actor: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            item_id: plan.request().item_id,
            lines: plan.lines(),
            requested: plan.requested_quantity(),
            actor: actor.into(),
            reference: reference.into(),
            note: String::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueOutcome {
    pub requested: i64,
    pub issued: i64,
    /// Fewer than `requested` units went out.
    pub partial: bool,
    pub movements: Vec<MovementRecord>,
}

impl IssueOutcome {
    pub fn shortfall(&self) -> i64 {
        (self.requested - self.issued).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStock {
    pub record_id: StockRecordId,
    pub to_location: LocationId,
    pub quantity: i64,
    /// Pin the source record version the caller saw.
    pub expected_version: ExpectedVersion,
    pub actor: String,
    pub reference: String,
}

impl MoveStock {
    pub fn new(
        record_id: StockRecordId,
        to_location: LocationId,
        quantity: i64,
        actor: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            record_id,
            to_location,
            quantity,
            expected_version: ExpectedVersion::Any,
            actor: actor.into(),
            reference: reference.into(),
        }
    }

    pub fn expecting(mut self, version: ExpectedVersion) -> Self {
        self.expected_version = version;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// What is left at the source; `None` when it was emptied and deleted.
    pub source: Option<StockRecord>,
    pub destination: StockRecord,
    pub movement: MovementRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveContainer {
    pub location_id: LocationId,
    pub lines: Vec<ContainerLine>,
    pub reference: String,
    pub actor: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerReceipt {
    pub container: Container,
    pub movements: Vec<MovementRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutawayContainer {
    pub container_id: ContainerId,
    pub destination: LocationId,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutawayOutcome {
    pub container: Container,
    pub movements: Vec<MovementRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustCount {
    pub record_id: StockRecordId,
    pub counted: i64,
    pub reason: String,
    pub actor: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountOutcome {
    /// Counted minus previous on-hand.
    pub delta: i64,
    pub record: Option<StockRecord>,
    pub movement: MovementRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilRequest {
    pub request: DemandRequest,
    pub filter: LocationFilter,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfilOutcome {
    /// The request after the issue was applied; persisting it is the
    /// caller's concern.
    pub request: DemandRequest,
    pub issue: IssueOutcome,
}

/// Any orchestrated mutation, for callers that dispatch generically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StockCommand {
    Receive(ReceiveStock),
    Issue(IssueStock),
    Move(MoveStock),
    ReceiveContainer(ReceiveContainer),
    Putaway(PutawayContainer),
    AdjustCount(AdjustCount),
    FulfilRequest(FulfilRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Received(ReceiveOutcome),
    Issued(IssueOutcome),
    Moved(MoveOutcome),
    ContainerReceived(ContainerReceipt),
    PutAway(PutawayOutcome),
    Counted(CountOutcome),
    Fulfilled(FulfilOutcome),
}
