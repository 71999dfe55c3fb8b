//! Integration tests for the full stock pipeline.
//!
//! Tests: Command → Orchestrator → Store + Ledger → EventBus → Projection
//!
//! Verifies:
//! - Quantity is conserved across receive/issue/move sequences
//! - Concurrent issues never take more than was available
//! - Failed operations leave no stock change and no ledger entry behind
//! - Published notifications rebuild the same balances as the ledger

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{NaiveDate, Utc};
    use serde_json::Value as JsonValue;

    use wms_core::{ItemId, LocationId, WarehouseId};
    use wms_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
    use wms_inventory::{AllocationRequest, ContainerLine, Location, LocationFilter, MovementType};

    use crate::config::{LedgerConfig, StalePlanPolicy};
    use crate::orchestrator::{
        IssueStock, MoveStock, OperationError, PutawayContainer, ReceiveContainer, ReceiveStock,
        TransactionOrchestrator,
    };
    use crate::projections::LedgerBalanceProjection;
    use crate::store::{InMemoryStockStore, StockRepository, StockStore};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Orchestrator = TransactionOrchestrator<InMemoryStockStore, Bus>;

    fn setup_with(config: LedgerConfig) -> (Arc<Orchestrator>, Bus) {
        wms_observability::init_for_tests();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryStockStore::new());
        let orchestrator = TransactionOrchestrator::new(store, Arc::clone(&bus), config);
        (Arc::new(orchestrator), bus)
    }

    fn setup() -> (Arc<Orchestrator>, Bus) {
        setup_with(LedgerConfig::default())
    }

    async fn add_location(o: &Orchestrator, warehouse: WarehouseId, code: &str) -> LocationId {
        let location = Location::new(LocationId::new(), code, warehouse).unwrap();
        o.store().save_location(&location).await.unwrap();
        location.id
    }

    async fn receive(o: &Orchestrator, item: ItemId, at: LocationId, qty: i64) {
        o.receive(ReceiveStock::new(item, at, qty, "receiver", "PO-100"))
            .await
            .unwrap();
    }

    async fn issue(o: &Orchestrator, item: ItemId, qty: i64) -> Result<i64, OperationError> {
        let plan = o.plan(AllocationRequest::new(item, qty, Utc::now())).await?;
        let outcome = o.issue(IssueStock::from_plan(&plan, "picker", "REQ")).await?;
        Ok(outcome.issued)
    }

    fn drain_into(
        sub: &Subscription<EventEnvelope<JsonValue>>,
        projection: &LedgerBalanceProjection,
    ) {
        for envelope in sub.drain() {
            projection.apply_envelope(&envelope).unwrap();
        }
    }

    #[tokio::test]
    async fn quantity_is_conserved_across_receive_issue_and_move() {
        let (o, _bus) = setup();
        let wh = WarehouseId::new();
        let item = ItemId::new();
        let a = add_location(&o, wh, "A-01").await;
        let b = add_location(&o, wh, "B-01").await;

        let mut received = 0;
        let mut issued = 0;
        for (i, qty) in [7_i64, 3, 12, 5].into_iter().enumerate() {
            receive(&o, item, if i % 2 == 0 { a } else { b }, qty).await;
            received += qty;

            issued += issue(&o, item, 4).await.unwrap();

            let positions = o
                .store()
                .positions(item, &LocationFilter::locations([a]))
                .await
                .unwrap();
            if let Some(p) = positions.first() {
                o.move_stock(MoveStock::new(p.record.id_typed(), b, 1, "mover", "MV"))
                    .await
                    .unwrap();
            }

            assert_eq!(o.on_hand_total(item).await.unwrap(), received - issued);
        }

        let ledger_net: i64 = o
            .history(item)
            .await
            .unwrap()
            .iter()
            .map(|m| m.net_effect())
            .sum();
        assert_eq!(ledger_net, received - issued);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_issues_never_exceed_available() {
        let (o, _bus) = setup();
        let item = ItemId::new();
        let a = add_location(&o, WarehouseId::new(), "A-01").await;
        receive(&o, item, a, 10).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let o = Arc::clone(&o);
            handles.push(tokio::spawn(async move { issue(&o, item, 3).await }));
        }

        let mut total = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(issued) => total += issued,
                Err(OperationError::ConcurrentStockChanged(_))
                | Err(OperationError::NoStockAvailable(_)) => {}
                Err(other) => panic!("unexpected failure: {other:?}"),
            }
        }

        assert!(total <= 10);
        assert_eq!(o.on_hand_total(item).await.unwrap(), 10 - total);
        let ledger_issued: i64 = o
            .history(item)
            .await
            .unwrap()
            .iter()
            .filter(|m| m.kind == MovementType::Issue)
            .map(|m| m.quantity)
            .sum();
        assert_eq!(ledger_issued, total);
    }

    #[tokio::test]
    async fn expiring_stock_is_issued_first() {
        let (o, _bus) = setup();
        let wh = WarehouseId::new();
        let item = ItemId::new();
        let l1 = add_location(&o, wh, "L1").await;
        let l2 = add_location(&o, wh, "L2").await;
        o.receive(
            ReceiveStock::new(item, l1, 5, "r", "PO")
                .with_expiry(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
        )
        .await
        .unwrap();
        receive(&o, item, l2, 5).await;

        let plan = o.plan(AllocationRequest::new(item, 7, Utc::now())).await.unwrap();
        let lines: Vec<(LocationId, i64)> =
            plan.iter().map(|l| (l.location_id, l.proposed)).collect();
        assert_eq!(lines, vec![(l1, 5), (l2, 2)]);

        let outcome = o.issue(IssueStock::from_plan(&plan, "picker", "REQ")).await.unwrap();
        assert!(!outcome.partial);
        assert_eq!(outcome.movements.len(), 2);
        assert_eq!(outcome.movements[0].from_location, Some(l1));
        assert_eq!(o.on_hand_total(item).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_putaway_rolls_back_every_line() {
        let (o, _bus) = setup();
        let wh = WarehouseId::new();
        let (x, y) = (ItemId::new(), ItemId::new());
        let dock = add_location(&o, wh, "DOCK").await;
        let shelf = add_location(&o, wh, "S-01").await;
        let other = add_location(&o, wh, "S-02").await;

        let receipt = o
            .receive_container(ReceiveContainer {
                location_id: dock,
                lines: vec![ContainerLine::new(x, 4), ContainerLine::new(y, 6)],
                reference: "ASN-9".into(),
                actor: "receiver".into(),
                note: String::new(),
            })
            .await
            .unwrap();

        // Someone moves part of Y off the dock behind the container's back.
        let y_at_dock = o.store().positions(y, &LocationFilter::locations([dock])).await.unwrap();
        o.move_stock(MoveStock::new(y_at_dock[0].record.id_typed(), other, 2, "mover", "MV"))
            .await
            .unwrap();
        let ledger_before = o.history(x).await.unwrap().len();

        let err = o
            .putaway(PutawayContainer {
                container_id: receipt.container.id_typed(),
                destination: shelf,
                actor: "putaway".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::InsufficientStock {
                requested: 6,
                available: 4
            }
        ));

        let x_at_dock = o.store().positions(x, &LocationFilter::locations([dock])).await.unwrap();
        assert_eq!(x_at_dock[0].record.on_hand(), 4);
        assert_eq!(o.history(x).await.unwrap().len(), ledger_before);
        let container = o.container(receipt.container.id_typed()).await.unwrap().unwrap();
        assert!(container.is_open());
        assert_eq!(container.location_id(), dock);
    }

    #[tokio::test]
    async fn held_scope_makes_writers_time_out() {
        let (o, _bus) = setup_with(LedgerConfig {
            scope_timeout: Duration::from_millis(50),
            ..LedgerConfig::default()
        });
        let item = ItemId::new();
        let a = add_location(&o, WarehouseId::new(), "A-01").await;

        let held = o.store().begin(Duration::from_secs(1)).await.unwrap();
        let err = o
            .receive(ReceiveStock::new(item, a, 1, "r", "PO"))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::OperationTimedOut(_)));
        assert!(err.is_retryable());

        o.store().rollback(held).await.unwrap();
        receive(&o, item, a, 1).await;
        assert_eq!(o.on_hand_total(item).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn published_movements_match_ledger_replay() {
        let (o, bus) = setup();
        let sub = bus.subscribe();
        let live = LedgerBalanceProjection::new();
        let wh = WarehouseId::new();
        let item = ItemId::new();
        let a = add_location(&o, wh, "A-01").await;
        let b = add_location(&o, wh, "B-01").await;

        receive(&o, item, a, 9).await;
        receive(&o, item, b, 2).await;
        issue(&o, item, 5).await.unwrap();
        let at_b = o.store().positions(item, &LocationFilter::locations([b])).await.unwrap();
        o.move_stock(MoveStock::new(at_b[0].record.id_typed(), a, 1, "mover", "MV"))
            .await
            .unwrap();
        drain_into(&sub, &live);

        let replayed = LedgerBalanceProjection::new();
        let count = replayed.rebuild(&**o.store(), 2).await.unwrap();
        assert_eq!(count, o.history(item).await.unwrap().len());

        for location in [a, b] {
            assert_eq!(live.on_hand(item, location), replayed.on_hand(item, location));
        }
        assert_eq!(live.item_total(item), o.on_hand_total(item).await.unwrap());
    }

    #[tokio::test]
    async fn clamp_policy_turns_lost_stock_into_partial_issue() {
        let (o, _bus) = setup_with(LedgerConfig {
            stale_plan_policy: StalePlanPolicy::Clamp,
            ..LedgerConfig::default()
        });
        let wh = WarehouseId::new();
        let item = ItemId::new();
        let a = add_location(&o, wh, "A-01").await;
        let b = add_location(&o, wh, "B-01").await;
        receive(&o, item, a, 6).await;

        let stale = o.plan(AllocationRequest::new(item, 6, Utc::now())).await.unwrap();
        let record_id = stale.lines()[0].record_id;
        o.move_stock(MoveStock::new(record_id, b, 4, "mover", "MV"))
            .await
            .unwrap();

        let outcome = o.issue(IssueStock::from_plan(&stale, "picker", "REQ")).await.unwrap();
        assert_eq!(outcome.issued, 2);
        assert!(outcome.partial);
        assert_eq!(o.on_hand_total(item).await.unwrap(), 4);
    }

    #[derive(Debug)]
    struct DeadBus;

    impl EventBus<EventEnvelope<JsonValue>> for DeadBus {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            Err("bus offline")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            Subscription::new(std::sync::mpsc::channel().1)
        }
    }

    #[tokio::test]
    async fn publication_failure_keeps_the_committed_mutation() {
        let o = TransactionOrchestrator::new(
            Arc::new(InMemoryStockStore::new()),
            DeadBus,
            LedgerConfig::default(),
        );
        let item = ItemId::new();
        let location = Location::new(LocationId::new(), "A-01", WarehouseId::new()).unwrap();
        o.store().save_location(&location).await.unwrap();

        o.receive(ReceiveStock::new(item, location.id, 3, "r", "PO"))
            .await
            .unwrap();

        assert_eq!(o.publisher().failures(), 1);
        assert_eq!(o.on_hand_total(item).await.unwrap(), 3);
        assert_eq!(o.history(item).await.unwrap().len(), 1);
    }
}
