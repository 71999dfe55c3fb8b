//! FEFO/FIFO allocation planning.
//!
//! Turns "item X, quantity Q, allowed locations F" into an ordered pick plan
//! over a snapshot of stock positions. Ordering:
//!
//! 1. expiry date ascending, records without expiry last (FEFO)
//! 2. received timestamp ascending (FIFO)
//! 3. location code, then record id (stable tie-break)
//!
//! Lines are produced greedily from the head of that ordering, each taking
//! `min(remaining, available)`. A plan that sums below the request is a
//! partial-availability result, not an error.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{DomainError, DomainResult, ItemId, LocationId, StockRecordId, WarehouseId};

use crate::location::LocationFilter;
use crate::stock::StockPosition;

/// Scoring knobs for plan lines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    /// Records expiring within this many days of `as_of` count as expiring soon.
    pub expiry_warning_days: i64,
    /// Priority bonus for expiring-soon records.
    pub expiring_bonus: u32,
    /// Cap on the one-point-per-day age bonus.
    pub max_age_bonus: u32,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            expiry_warning_days: 30,
            expiring_bonus: 100,
            max_age_bonus: 50,
        }
    }
}

impl AllocationPolicy {
    pub fn is_expiring_soon(&self, expiry: Option<NaiveDate>, as_of: DateTime<Utc>) -> bool {
        let Some(expiry) = expiry else {
            return false;
        };
        let horizon = Duration::try_days(self.expiry_warning_days)
            .and_then(|window| as_of.date_naive().checked_add_signed(window))
            .unwrap_or(NaiveDate::MAX);
        expiry <= horizon
    }

    /// Urgency score: expiring-soon bonus plus capped age in days.
    pub fn priority(
        &self,
        expiry: Option<NaiveDate>,
        received_at: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> u32 {
        let age = (as_of - received_at)
            .num_days()
            .clamp(0, i64::from(self.max_age_bonus));
        let bonus = if self.is_expiring_soon(expiry, as_of) {
            self.expiring_bonus
        } else {
            0
        };
        // `age` is clamped to a u32 range above.
        bonus + age as u32
    }
}

/// Query input for the planner. Everything is explicit; nothing is read from
/// ambient request state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub item_id: ItemId,
    pub quantity: i64,
    pub filter: LocationFilter,
    /// Reference time for expiry/age scoring.
    pub as_of: DateTime<Utc>,
}

impl AllocationRequest {
    pub fn new(item_id: ItemId, quantity: i64, as_of: DateTime<Utc>) -> Self {
        Self {
            item_id,
            quantity,
            filter: LocationFilter::Any,
            as_of,
        }
    }

    pub fn with_filter(mut self, filter: LocationFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("requested quantity must be positive"));
        }
        Ok(())
    }
}

/// One proposed pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLine {
    pub record_id: StockRecordId,
    /// Record version observed when the plan was computed.
    pub record_version: u64,
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub location_code: String,
    pub warehouse_id: WarehouseId,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub expiry: Option<NaiveDate>,
    pub received_at: DateTime<Utc>,
    pub available: i64,
    pub proposed: i64,
    pub priority: u32,
    pub expiring_soon: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    /// The plan covers the full request.
    Full,
    /// Some stock was found but not enough.
    Partial { planned: i64, shortfall: i64 },
    /// Nothing allocatable.
    None,
}

/// An ordered pick plan over a stock snapshot.
///
/// The plan keeps the sorted candidates, not the lines: `iter()` walks them
/// lazily and can be called any number of times with identical results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickPlan {
    request: AllocationRequest,
    policy: AllocationPolicy,
    candidates: Vec<StockPosition>,
}

impl PickPlan {
    pub fn build(
        request: AllocationRequest,
        policy: AllocationPolicy,
        positions: impl IntoIterator<Item = StockPosition>,
    ) -> DomainResult<Self> {
        request.validate()?;

        let mut candidates: Vec<StockPosition> = positions
            .into_iter()
            .filter(|p| {
                p.record.item_id() == request.item_id
                    && p.record.available() > 0
                    && request.filter.admits(&p.location)
            })
            .collect();
        candidates.sort_by(fefo_fifo_order);

        Ok(Self {
            request,
            policy,
            candidates,
        })
    }

    pub fn request(&self) -> &AllocationRequest {
        &self.request
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    pub fn iter(&self) -> PlanLines<'_> {
        PlanLines {
            candidates: self.candidates.iter(),
            remaining: self.request.quantity,
            request: &self.request,
            policy: self.policy,
        }
    }

    pub fn lines(&self) -> Vec<PlanLine> {
        self.iter().collect()
    }

    pub fn requested_quantity(&self) -> i64 {
        self.request.quantity
    }

    pub fn planned_quantity(&self) -> i64 {
        self.iter().map(|l| l.proposed).sum()
    }

    /// Available quantity across every admitted record, planned or not.
    pub fn total_available(&self) -> i64 {
        self.candidates.iter().map(|c| c.record.available()).sum()
    }

    pub fn availability(&self) -> Availability {
        let planned = self.planned_quantity();
        if planned == 0 {
            Availability::None
        } else if planned < self.request.quantity {
            Availability::Partial {
                planned,
                shortfall: self.request.quantity - planned,
            }
        } else {
            Availability::Full
        }
    }

    pub fn is_partial(&self) -> bool {
        !matches!(self.availability(), Availability::Full)
    }

    pub fn analyze(&self) -> PickingAnalysis {
        let lines = self.lines();
        let warehouses: BTreeSet<WarehouseId> = lines.iter().map(|l| l.warehouse_id).collect();
        let planned: i64 = lines.iter().map(|l| l.proposed).sum();

        PickingAnalysis {
            item_id: self.request.item_id,
            requested: self.request.quantity,
            total_available: self.total_available(),
            planned,
            locations_required: lines.len(),
            warehouses_involved: warehouses.len(),
            expiring_soon_count: lines.iter().filter(|l| l.expiring_soon).count(),
            can_fulfil: planned >= self.request.quantity,
            complexity: PickingComplexity::classify(lines.len(), warehouses.len()),
        }
    }
}

/// Lazy iterator over plan lines.
#[derive(Debug, Clone)]
pub struct PlanLines<'a> {
    candidates: std::slice::Iter<'a, StockPosition>,
    remaining: i64,
    request: &'a AllocationRequest,
    policy: AllocationPolicy,
}

impl Iterator for PlanLines<'_> {
    type Item = PlanLine;

    fn next(&mut self) -> Option<PlanLine> {
        while self.remaining > 0 {
            let candidate = self.candidates.next()?;
            let record = &candidate.record;
            let available = record.available();
            let take = self.remaining.min(available);
            if take <= 0 {
                continue;
            }
            self.remaining -= take;

            let as_of = self.request.as_of;
            return Some(PlanLine {
                record_id: record.id_typed(),
                record_version: record.version(),
                item_id: record.item_id(),
                location_id: candidate.location.id,
                location_code: candidate.location.code.clone(),
                warehouse_id: candidate.location.warehouse_id,
                lot: record.lot().map(str::to_owned),
                serial: record.serial().map(str::to_owned),
                expiry: record.expiry(),
                received_at: record.received_at(),
                available,
                proposed: take,
                priority: self.policy.priority(record.expiry(), record.received_at(), as_of),
                expiring_soon: self.policy.is_expiring_soon(record.expiry(), as_of),
            });
        }
        None
    }
}

fn fefo_fifo_order(a: &StockPosition, b: &StockPosition) -> Ordering {
    let expiry = |p: &StockPosition| p.record.expiry().unwrap_or(NaiveDate::MAX);
    expiry(a)
        .cmp(&expiry(b))
        .then_with(|| a.record.received_at().cmp(&b.record.received_at()))
        .then_with(|| a.location.code.cmp(&b.location.code))
        .then_with(|| a.record.id_typed().cmp(&b.record.id_typed()))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickingComplexity {
    Simple,
    Moderate,
    Complex,
}

impl PickingComplexity {
    pub fn classify(lines: usize, warehouses: usize) -> Self {
        if lines <= 1 {
            PickingComplexity::Simple
        } else if lines <= 3 {
            PickingComplexity::Moderate
        } else if warehouses > 1 {
            PickingComplexity::Complex
        } else {
            PickingComplexity::Moderate
        }
    }
}

/// Summary of what a plan asks of the picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickingAnalysis {
    pub item_id: ItemId,
    pub requested: i64,
    pub total_available: i64,
    pub planned: i64,
    pub locations_required: usize,
    pub warehouses_involved: usize,
    pub expiring_soon_count: usize,
    pub can_fulfil: bool,
    pub complexity: PickingComplexity,
}

/// Several item plans merged into one walk: by warehouse, then location code,
/// most urgent first within a location.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchPickList {
    lines: Vec<PlanLine>,
}

impl BatchPickList {
    pub fn from_plans<'a>(plans: impl IntoIterator<Item = &'a PickPlan>) -> Self {
        let mut lines: Vec<PlanLine> = plans.into_iter().flat_map(PickPlan::iter).collect();
        lines.sort_by(|a, b| {
            (a.warehouse_id, &a.location_code, Reverse(a.priority))
                .cmp(&(b.warehouse_id, &b.location_code, Reverse(b.priority)))
        });
        Self { lines }
    }

    pub fn lines(&self) -> &[PlanLine] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<PlanLine> {
        self.lines
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.proposed).sum()
    }
}
