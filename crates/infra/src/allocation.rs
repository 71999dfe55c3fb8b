//! Allocation engine service: fetches a fresh stock snapshot per call and
//! runs the pure planner over it. Nothing is cached between calls.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use wms_core::{ItemId, WarehouseId};
use wms_inventory::{
    AllocationPolicy, AllocationRequest, BatchPickList, LocationFilter, PickPlan, PickingAnalysis,
    ReplenishmentRule, ReplenishmentSuggestion,
};

use crate::store::{StockRepository, StoreError};

/// Read-only planning queries.
#[async_trait]
pub trait Allocator: Send + Sync {
    async fn plan(&self, request: AllocationRequest) -> Result<PickPlan, StoreError>;

    /// Plan several `(item, quantity)` lines and merge them into one walk.
    async fn plan_many(
        &self,
        lines: &[(ItemId, i64)],
        filter: &LocationFilter,
        as_of: DateTime<Utc>,
    ) -> Result<BatchPickList, StoreError>;

    async fn analyze(&self, request: AllocationRequest) -> Result<PickingAnalysis, StoreError>;
}

#[derive(Debug)]
pub struct AllocationEngine<S> {
    store: Arc<S>,
    policy: AllocationPolicy,
}

impl<S> Clone for AllocationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<S> AllocationEngine<S>
where
    S: StockRepository,
{
    pub fn new(store: Arc<S>, policy: AllocationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// Low-stock suggestions for the given rules, using committed on-hand
    /// within each rule's warehouse.
    pub async fn replenishment(
        &self,
        rules: &[ReplenishmentRule],
    ) -> Result<Vec<ReplenishmentSuggestion>, StoreError> {
        let mut suggestions = Vec::new();
        for rule in rules {
            rule.validate()?;
            let on_hand = self.on_hand_in(rule.item_id, rule.warehouse_id).await?;
            if let Some(s) = rule.evaluate(on_hand) {
                suggestions.push(s);
            }
        }
        Ok(suggestions)
    }

    async fn on_hand_in(&self, item: ItemId, warehouse: WarehouseId) -> Result<i64, StoreError> {
        let positions = self
            .store
            .positions(item, &LocationFilter::warehouses([warehouse]))
            .await?;
        Ok(positions.iter().map(|p| p.record.on_hand()).sum())
    }
}

#[async_trait]
impl<S> Allocator for AllocationEngine<S>
where
    S: StockRepository,
{
    #[instrument(
        skip(self, request),
        fields(item_id = %request.item_id, quantity = request.quantity),
        err
    )]
    async fn plan(&self, request: AllocationRequest) -> Result<PickPlan, StoreError> {
        request.validate()?;
        let positions = self.store.positions(request.item_id, &request.filter).await?;
        let plan = PickPlan::build(request, self.policy, positions)?;
        debug!(
            planned = plan.planned_quantity(),
            available = plan.total_available(),
            "allocation plan computed"
        );
        Ok(plan)
    }

    async fn plan_many(
        &self,
        lines: &[(ItemId, i64)],
        filter: &LocationFilter,
        as_of: DateTime<Utc>,
    ) -> Result<BatchPickList, StoreError> {
        let mut plans = Vec::with_capacity(lines.len());
        for (item, quantity) in lines {
            let request =
                AllocationRequest::new(*item, *quantity, as_of).with_filter(filter.clone());
            plans.push(self.plan(request).await?);
        }
        Ok(BatchPickList::from_plans(&plans))
    }

    async fn analyze(&self, request: AllocationRequest) -> Result<PickingAnalysis, StoreError> {
        Ok(self.plan(request).await?.analyze())
    }
}
