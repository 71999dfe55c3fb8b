//! Transaction orchestrator: the only entry point that mutates stock.
//!
//! Every mutation follows the same pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Check cancellation (the last point a caller can back out)
//!   ↓
//! 2. Open a scope on the store (bounded by `LedgerConfig::scope_timeout`)
//!   ↓
//! 3. Validate preconditions, mutate stock records, append ledger entries
//!   ↓
//! 4. Commit on success, roll back on any failure
//!   ↓
//! 5. Publish `StockEvent`s (best-effort, after commit)
//! ```
//!
//! Once step 2 succeeded the operation always reaches step 4: a scope is
//! never left half-applied. Timeouts and lost races surface as retryable
//! [`OperationError`]s; callers retry from a fresh read (new plan), never by
//! replaying a partially applied operation.
//!
//! Queries (`plan`, `analyze`, `history`, ...) read the committed snapshot
//! and take no scope.

pub mod commands;
pub mod error;

pub use commands::{
    AdjustCount, CancellationFlag, CommandOutcome, ContainerReceipt, CountOutcome, FulfilOutcome,
    FulfilRequest, IssueOutcome, IssueStock, MoveOutcome, MoveStock, PutawayContainer,
    PutawayOutcome, ReceiveContainer, ReceiveOutcome, ReceiveStock, StockCommand,
};
pub use error::OperationError;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use wms_core::{ContainerId, DomainError, ItemId};
use wms_events::{EventBus, EventEnvelope};
use wms_inventory::{
    AllocationRequest, BatchPickList, Container, ContainerClosed, ContainerCode, DemandRequest,
    LocationFilter,
    MovementNotification, MovementRecord, NewMovement, PickPlan, PickingAnalysis,
    ReplenishmentRule, ReplenishmentSuggestion, StockEvent, StockKey,
};

use crate::allocation::{AllocationEngine, Allocator};
use crate::clock::{Clock, SystemClock};
use crate::config::{LedgerConfig, StalePlanPolicy};
use crate::containers::ContainerManager;
use crate::publisher::EventPublisher;
use crate::store::LedgerStore;

pub struct TransactionOrchestrator<S, B>
where
    S: LedgerStore,
{
    store: Arc<S>,
    engine: AllocationEngine<S>,
    containers: ContainerManager<S>,
    publisher: EventPublisher<B>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<S, B> TransactionOrchestrator<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: Arc<S>, bus: B, config: LedgerConfig) -> Self {
        Self {
            engine: AllocationEngine::new(Arc::clone(&store), config.allocation),
            containers: ContainerManager::new(Arc::clone(&store)),
            publisher: EventPublisher::new(bus),
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn publisher(&self) -> &EventPublisher<B> {
        &self.publisher
    }

    /// Run any command, honouring `cancel` up to the moment the scope opens.
    pub async fn execute(
        &self,
        command: StockCommand,
        cancel: &CancellationFlag,
    ) -> Result<CommandOutcome, OperationError> {
        if cancel.is_cancelled() {
            return Err(OperationError::Cancelled);
        }
        let outcome = match command {
            StockCommand::Receive(cmd) => CommandOutcome::Received(self.receive(cmd).await?),
            StockCommand::Issue(cmd) => CommandOutcome::Issued(self.issue(cmd).await?),
            StockCommand::Move(cmd) => CommandOutcome::Moved(self.move_stock(cmd).await?),
            StockCommand::ReceiveContainer(cmd) => {
                CommandOutcome::ContainerReceived(self.receive_container(cmd).await?)
            }
            StockCommand::Putaway(cmd) => CommandOutcome::PutAway(self.putaway(cmd).await?),
            StockCommand::AdjustCount(cmd) => {
                CommandOutcome::Counted(self.adjust_count(cmd).await?)
            }
            StockCommand::FulfilRequest(cmd) => {
                CommandOutcome::Fulfilled(self.fulfil_request(cmd).await?)
            }
        };
        Ok(outcome)
    }

    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, location_id = %cmd.location_id, quantity = cmd.quantity),
        err
    )]
    pub async fn receive(&self, cmd: ReceiveStock) -> Result<ReceiveOutcome, OperationError> {
        let at = self.clock.now();
        let mut scope = self.store.begin(self.config.scope_timeout).await?;
        let result = self.receive_in(&mut scope, &cmd, at).await;
        let outcome = self.finish(scope, result).await?;

        info!(
            record_id = %outcome.record.id_typed(),
            on_hand = outcome.record.on_hand(),
            "stock received"
        );
        self.publish_all(std::iter::once(&outcome.movement), Vec::new(), at);
        Ok(outcome)
    }

    /// Issue along plan lines. Each line is re-read inside the scope; how a
    /// line that lost stock since planning is treated depends on
    /// [`StalePlanPolicy`].
    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, requested = cmd.requested, lines = cmd.lines.len()),
        err
    )]
    pub async fn issue(&self, cmd: IssueStock) -> Result<IssueOutcome, OperationError> {
        let at = self.clock.now();
        let mut scope = self.store.begin(self.config.scope_timeout).await?;
        let result = self.issue_in(&mut scope, &cmd, at).await;
        let outcome = self.finish(scope, result).await?;

        info!(
            issued = outcome.issued,
            partial = outcome.partial,
            "stock issued"
        );
        self.publish_all(outcome.movements.iter(), Vec::new(), at);
        Ok(outcome)
    }

    #[instrument(
        skip(self, cmd),
        fields(record_id = %cmd.record_id, to = %cmd.to_location, quantity = cmd.quantity),
        err
    )]
    pub async fn move_stock(&self, cmd: MoveStock) -> Result<MoveOutcome, OperationError> {
        let at = self.clock.now();
        let mut scope = self.store.begin(self.config.scope_timeout).await?;
        let result = self.move_in(&mut scope, &cmd, at).await;
        let outcome = self.finish(scope, result).await?;

        info!(
            destination_id = %outcome.destination.id_typed(),
            source_emptied = outcome.source.is_none(),
            "stock moved"
        );
        self.publish_all(std::iter::once(&outcome.movement), Vec::new(), at);
        Ok(outcome)
    }

    /// Receive several lines as one new open container.
    #[instrument(
        skip(self, cmd),
        fields(location_id = %cmd.location_id, lines = cmd.lines.len()),
        err
    )]
    pub async fn receive_container(
        &self,
        cmd: ReceiveContainer,
    ) -> Result<ContainerReceipt, OperationError> {
        let at = self.clock.now();
        let mut scope = self.store.begin(self.config.scope_timeout).await?;
        let result = self.receive_container_in(&mut scope, cmd, at).await;
        let receipt = self.finish(scope, result).await?;

        info!(code = %receipt.container.code(), "container received");
        self.publish_all(
            receipt.movements.iter(),
            vec![StockEvent::ContainerReceived((&receipt.container).into())],
            at,
        );
        Ok(receipt)
    }

    /// Move every line of an open container to `destination` and close it.
    /// All lines move or none do.
    #[instrument(
        skip(self, cmd),
        fields(container_id = %cmd.container_id, destination = %cmd.destination),
        err
    )]
    pub async fn putaway(&self, cmd: PutawayContainer) -> Result<PutawayOutcome, OperationError> {
        let at = self.clock.now();
        let mut scope = self.store.begin(self.config.scope_timeout).await?;
        let result = self.putaway_in(&mut scope, &cmd, at).await;
        let outcome = self.finish(scope, result).await?;

        info!(
            code = %outcome.container.code(),
            lines = outcome.movements.len(),
            "container put away"
        );
        let closed = StockEvent::ContainerClosed(ContainerClosed {
            container_id: outcome.container.id_typed(),
            code: outcome.container.code().clone(),
            destination: cmd.destination,
            occurred_at: at,
        });
        self.publish_all(outcome.movements.iter(), vec![closed], at);
        Ok(outcome)
    }

    #[instrument(skip(self, cmd), fields(record_id = %cmd.record_id, counted = cmd.counted), err)]
    pub async fn adjust_count(&self, cmd: AdjustCount) -> Result<CountOutcome, OperationError> {
        let at = self.clock.now();
        let mut scope = self.store.begin(self.config.scope_timeout).await?;
        let result = self.adjust_count_in(&mut scope, &cmd, at).await;
        let outcome = self.finish(scope, result).await?;

        info!(delta = outcome.delta, "count adjusted");
        self.publish_all(std::iter::once(&outcome.movement), Vec::new(), at);
        Ok(outcome)
    }

    /// Plan and issue the outstanding quantity of a new demand request, then
    /// apply the result to the request.
    ///
    /// The plan is built from positions locked inside the issuing scope, so
    /// it cannot go stale between planning and decrement.
    #[instrument(
        skip(self, cmd),
        fields(request_id = %cmd.request.id, item_id = %cmd.request.item_id),
        err
    )]
    pub async fn fulfil_request(
        &self,
        cmd: FulfilRequest,
    ) -> Result<FulfilOutcome, OperationError> {
        let FulfilRequest {
            mut request,
            filter,
            actor,
        } = cmd;
        request.ensure_new()?;

        let at = self.clock.now();
        let mut scope = self.store.begin(self.config.scope_timeout).await?;
        let result = self
            .fulfil_in(&mut scope, &request, filter, actor.clone(), at)
            .await;
        let issue = self.finish(scope, result).await?;
        self.publish_all(issue.movements.iter(), Vec::new(), at);

        let status = request.record_issue(issue.issued, actor, self.clock.now())?;
        info!(?status, issued = issue.issued, "request fulfilled");
        Ok(FulfilOutcome { request, issue })
    }

    /// Turn down a request that has not been fully served. No stock moves.
    #[instrument(skip_all, fields(request_id = %request.id), err)]
    pub fn reject_request(
        &self,
        mut request: DemandRequest,
        actor: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<DemandRequest, OperationError> {
        request.reject(actor, note, self.clock.now())?;
        info!("request rejected");
        Ok(request)
    }

    pub async fn plan(&self, request: AllocationRequest) -> Result<PickPlan, OperationError> {
        Ok(self.engine.plan(request).await?)
    }

    pub async fn plan_many(
        &self,
        lines: &[(ItemId, i64)],
        filter: &LocationFilter,
    ) -> Result<BatchPickList, OperationError> {
        Ok(self.engine.plan_many(lines, filter, self.clock.now()).await?)
    }

    pub async fn analyze(
        &self,
        request: AllocationRequest,
    ) -> Result<PickingAnalysis, OperationError> {
        Ok(self.engine.analyze(request).await?)
    }

    pub async fn replenishment(
        &self,
        rules: &[ReplenishmentRule],
    ) -> Result<Vec<ReplenishmentSuggestion>, OperationError> {
        Ok(self.engine.replenishment(rules).await?)
    }

    /// Ledger of `item` in commit order.
    pub async fn history(&self, item: ItemId) -> Result<Vec<MovementRecord>, OperationError> {
        Ok(self.store.history(item).await?)
    }

    pub async fn on_hand_total(&self, item: ItemId) -> Result<i64, OperationError> {
        Ok(self.store.on_hand_total(item).await?)
    }

    pub async fn container(&self, id: ContainerId) -> Result<Option<Container>, OperationError> {
        Ok(self.containers.get(id).await?)
    }

    pub async fn container_by_code(
        &self,
        code: &ContainerCode,
    ) -> Result<Option<Container>, OperationError> {
        Ok(self.containers.by_code(code).await?)
    }

    pub async fn open_containers(&self) -> Result<Vec<Container>, OperationError> {
        Ok(self.containers.open_containers().await?)
    }

    async fn receive_in(
        &self,
        scope: &mut S::Scope,
        cmd: &ReceiveStock,
        at: DateTime<Utc>,
    ) -> Result<ReceiveOutcome, OperationError> {
        let movement = NewMovement::receive(
            cmd.item_id,
            cmd.location_id,
            cmd.quantity,
            at,
            cmd.actor.clone(),
            cmd.reference.clone(),
        )
        .with_lot_serial(cmd.lot.clone(), cmd.serial.clone())
        .with_note(cmd.note.clone());
        movement.validate()?;

        self.store
            .location(scope, cmd.location_id)
            .await?
            .ensure_accepts_stock()?;

        let mut key = StockKey::new(cmd.item_id, cmd.location_id);
        key.lot = cmd.lot.clone();
        key.serial = cmd.serial.clone();
        let record = self
            .store
            .upsert_add(scope, &key, cmd.quantity, cmd.expiry, at)
            .await?;
        let movement = self.store.append(scope, movement).await?;
        Ok(ReceiveOutcome { record, movement })
    }

    async fn issue_in(
        &self,
        scope: &mut S::Scope,
        cmd: &IssueStock,
        at: DateTime<Utc>,
    ) -> Result<IssueOutcome, OperationError> {
        if cmd.requested <= 0 {
            return Err(OperationError::Validation(
                "requested quantity must be positive".to_string(),
            ));
        }

        let mut remaining = cmd.requested;
        let mut movements = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if remaining == 0 {
                break;
            }
            if line.item_id != cmd.item_id {
                return Err(OperationError::Validation(format!(
                    "plan line for item {} in an issue of item {}",
                    line.item_id, cmd.item_id
                )));
            }
            let wanted = line.proposed.min(remaining);
            if wanted <= 0 {
                continue;
            }

            let record = self.store.get(scope, line.record_id).await?;
            if let Some(found) = record.as_ref().filter(|r| r.item_id() != cmd.item_id) {
                return Err(OperationError::Validation(format!(
                    "record {} holds item {}, not {}",
                    line.record_id,
                    found.item_id(),
                    cmd.item_id
                )));
            }
            let available = record.as_ref().map_or(0, |r| r.available());
            let take = if available >= wanted {
                wanted
            } else {
                match self.config.stale_plan_policy {
                    StalePlanPolicy::Reject => {
                        return Err(OperationError::ConcurrentStockChanged(format!(
                            "record {} at {} has {available} available, plan expected {wanted}",
                            line.record_id, line.location_code
                        )));
                    }
                    StalePlanPolicy::Clamp => available.max(0),
                }
            };
            let Some(record) = record else { continue };
            if take == 0 {
                continue;
            }

            self.store.decrement(scope, line.record_id, take).await?;
            let movement = NewMovement::issue(
                cmd.item_id,
                record.location_id(),
                take,
                at,
                cmd.actor.clone(),
                cmd.reference.clone(),
            )
            .with_lot_serial(
                record.lot().map(str::to_owned),
                record.serial().map(str::to_owned),
            )
            .with_note(cmd.note.clone());
            movements.push(self.store.append(scope, movement).await?);
            remaining -= take;
        }

        let issued = cmd.requested - remaining;
        if issued == 0 {
            return Err(OperationError::NoStockAvailable(cmd.item_id));
        }
        Ok(IssueOutcome {
            requested: cmd.requested,
            issued,
            partial: issued < cmd.requested,
            movements,
        })
    }

    async fn fulfil_in(
        &self,
        scope: &mut S::Scope,
        request: &DemandRequest,
        filter: LocationFilter,
        actor: String,
        at: DateTime<Utc>,
    ) -> Result<IssueOutcome, OperationError> {
        let wanted = AllocationRequest::new(request.item_id, request.outstanding(), at)
            .with_filter(filter);
        let positions = self
            .store
            .list_available(scope, request.item_id, &wanted.filter)
            .await?;
        let plan = PickPlan::build(wanted, self.config.allocation, positions)?;
        let cmd = IssueStock::from_plan(&plan, actor, request.id.to_string())
            .with_note(format!("{} / {}", request.department, request.requester));
        self.issue_in(scope, &cmd, at).await
    }

    async fn move_in(
        &self,
        scope: &mut S::Scope,
        cmd: &MoveStock,
        at: DateTime<Utc>,
    ) -> Result<MoveOutcome, OperationError> {
        if cmd.quantity <= 0 {
            return Err(OperationError::Validation(
                "move quantity must be positive".to_string(),
            ));
        }
        let source = self
            .store
            .get(scope, cmd.record_id)
            .await?
            .ok_or_else(|| {
                OperationError::RecordNotFound(format!("stock record {}", cmd.record_id))
            })?;
        cmd.expected_version.check(source.version())?;
        if source.location_id() == cmd.to_location {
            return Err(OperationError::Validation(
                "source and destination are the same location".to_string(),
            ));
        }

        self.store
            .location(scope, cmd.to_location)
            .await?
            .ensure_accepts_stock()?;
        if cmd.quantity > source.available() {
            return Err(DomainError::insufficient(cmd.quantity, source.available()).into());
        }

        let remaining = self.store.decrement(scope, cmd.record_id, cmd.quantity).await?;
        let destination = self
            .store
            .upsert_add(
                scope,
                &source.key().at(cmd.to_location),
                cmd.quantity,
                source.expiry(),
                source.received_at(),
            )
            .await?;
        let movement = NewMovement::transfer(
            source.item_id(),
            source.location_id(),
            cmd.to_location,
            cmd.quantity,
            at,
            cmd.actor.clone(),
            cmd.reference.clone(),
        )
        .with_lot_serial(
            source.lot().map(str::to_owned),
            source.serial().map(str::to_owned),
        );
        let movement = self.store.append(scope, movement).await?;

        Ok(MoveOutcome {
            source: remaining,
            destination,
            movement,
        })
    }

    async fn receive_container_in(
        &self,
        scope: &mut S::Scope,
        cmd: ReceiveContainer,
        at: DateTime<Utc>,
    ) -> Result<ContainerReceipt, OperationError> {
        self.store
            .location(scope, cmd.location_id)
            .await?
            .ensure_accepts_stock()?;

        let container = self
            .containers
            .open_in(scope, cmd.location_id, cmd.lines, cmd.note, at)
            .await?;
        let note = format!("container {}", container.code());

        let mut movements = Vec::with_capacity(container.lines().len());
        for line in container.lines() {
            self.store
                .upsert_add(
                    scope,
                    &line.key_at(cmd.location_id),
                    line.quantity,
                    line.expiry,
                    at,
                )
                .await?;
            let movement = NewMovement::receive(
                line.item_id,
                cmd.location_id,
                line.quantity,
                at,
                cmd.actor.clone(),
                cmd.reference.clone(),
            )
            .with_lot_serial(line.lot.clone(), line.serial.clone())
            .with_note(note.clone());
            movements.push(self.store.append(scope, movement).await?);
        }

        Ok(ContainerReceipt {
            container,
            movements,
        })
    }

    async fn putaway_in(
        &self,
        scope: &mut S::Scope,
        cmd: &PutawayContainer,
        at: DateTime<Utc>,
    ) -> Result<PutawayOutcome, OperationError> {
        let mut container = self.containers.load_open(scope, cmd.container_id).await?;
        self.store
            .location(scope, cmd.destination)
            .await?
            .ensure_accepts_stock()?;
        let from = container.location_id();
        if from == cmd.destination {
            return Err(OperationError::Validation(format!(
                "container {} is already at the destination",
                container.code()
            )));
        }

        let note = format!("putaway {}", container.code());
        let mut movements = Vec::with_capacity(container.lines().len());
        for line in container.lines() {
            let key = line.key_at(from);
            let record = self.store.find(scope, &key).await?.ok_or_else(|| {
                OperationError::RecordNotFound(format!(
                    "stock of item {} for container {}",
                    line.item_id,
                    container.code()
                ))
            })?;
            if line.quantity > record.available() {
                return Err(DomainError::insufficient(line.quantity, record.available()).into());
            }

            self.store
                .decrement(scope, record.id_typed(), line.quantity)
                .await?;
            self.store
                .upsert_add(
                    scope,
                    &key.at(cmd.destination),
                    line.quantity,
                    record.expiry(),
                    record.received_at(),
                )
                .await?;
            let movement = NewMovement::transfer(
                line.item_id,
                from,
                cmd.destination,
                line.quantity,
                at,
                cmd.actor.clone(),
                container.code().as_str(),
            )
            .with_lot_serial(line.lot.clone(), line.serial.clone())
            .with_note(note.clone());
            movements.push(self.store.append(scope, movement).await?);
        }

        self.containers
            .close_in(scope, &mut container, cmd.destination, at)
            .await?;
        Ok(PutawayOutcome {
            container,
            movements,
        })
    }

    async fn adjust_count_in(
        &self,
        scope: &mut S::Scope,
        cmd: &AdjustCount,
        at: DateTime<Utc>,
    ) -> Result<CountOutcome, OperationError> {
        let before = self
            .store
            .get(scope, cmd.record_id)
            .await?
            .ok_or_else(|| {
                OperationError::RecordNotFound(format!("stock record {}", cmd.record_id))
            })?;
        let (delta, record) = self.store.set_on_hand(scope, cmd.record_id, cmd.counted).await?;

        let movement = NewMovement::count_adjust(
            before.item_id(),
            before.location_id(),
            delta,
            at,
            cmd.actor.clone(),
            cmd.reference.clone(),
        )
        .with_lot_serial(
            before.lot().map(str::to_owned),
            before.serial().map(str::to_owned),
        )
        .with_note(cmd.reason.clone());
        let movement = self.store.append(scope, movement).await?;

        Ok(CountOutcome {
            delta,
            record,
            movement,
        })
    }

    /// Commit on success, roll back on failure. The scope is consumed either
    /// way.
    async fn finish<T>(
        &self,
        scope: S::Scope,
        result: Result<T, OperationError>,
    ) -> Result<T, OperationError>
    where
        T: Send,
    {
        match result {
            Ok(value) => {
                self.store.commit(scope).await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = self.store.rollback(scope).await {
                    warn!(%rollback, "scope rollback failed");
                }
                Err(error)
            }
        }
    }

    /// Container events go first, then one `MovementRecorded` per entry.
    fn publish_all<'a>(
        &self,
        movements: impl Iterator<Item = &'a MovementRecord>,
        mut events: Vec<StockEvent>,
        at: DateTime<Utc>,
    ) {
        events.extend(
            movements.map(|m| StockEvent::MovementRecorded(MovementNotification::from(m))),
        );
        let delivered = self.publisher.publish_all(&events, at);
        if delivered < events.len() {
            warn!(
                delivered,
                total = events.len(),
                "some stock events were not published"
            );
        }
    }
}
