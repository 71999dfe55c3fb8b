//! Warehouse stock domain (pure, deterministic).
//!
//! Business rules for stock records, the movement ledger, containers (LPNs),
//! demand requests and FEFO/FIFO allocation planning. No IO, no clocks, no
//! storage: callers pass timestamps and snapshots explicitly.

pub mod allocation;
pub mod container;
pub mod events;
pub mod location;
pub mod movement;
pub mod replenishment;
pub mod request;
pub mod stock;

pub use allocation::{
    AllocationPolicy, AllocationRequest, Availability, BatchPickList, PickPlan, PickingAnalysis,
    PickingComplexity, PlanLine, PlanLines,
};
pub use container::{Container, ContainerCode, ContainerLine, ContainerStatus};
pub use events::{ContainerClosed, ContainerReceived, MovementNotification, StockEvent};
pub use location::{Location, LocationFilter};
pub use movement::{MovementRecord, MovementType, NewMovement};
pub use replenishment::{ReplenishmentRule, ReplenishmentSuggestion};
pub use request::{DemandRequest, RequestStatus};
pub use stock::{StockKey, StockPosition, StockRecord};
