//! End-to-end tests for the order workflow over the in-memory stores.
//!
//! Verifies:
//! - stock counters are conserved across create, failed create and cancel
//! - a failed creation releases every lock it took and persists nothing
//! - status changes keep the order and its delivery in step
//! - cleanup failures after the point of no return become reconciliation gaps

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use orderflow_catalog::Product;
    use orderflow_core::{Clock, CustomerId, DomainError, FixedClock, OrderId, ProductId};
    use orderflow_delivery::{ConsigneeInfo, Delivery, DeliveryStatus, ShipmentDetails};
    use orderflow_inventory::{Inventory, StockMutation};
    use orderflow_orders::{Order, OrderLineRequest, OrderNo, OrderStatus};

    use crate::error::WorkflowError;
    use crate::id_generator::SequenceIdGenerator;
    use crate::ledger::InventoryLedger;
    use crate::store::{
        GapKind, InMemoryInventoryStore, InMemoryOrderStore, InventoryStore, OrderPage,
        OrderQuery, OrderStore, StatusWrite, StoreError, Stores,
    };
    use crate::workflow::{CreateOrderRequest, OrderWorkflow, ShipmentRequest};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    /// Inventory store that can be told to fail specific mutations.
    #[derive(Default)]
    struct FlakyInventory {
        inner: InMemoryInventoryStore,
        fail_lock: Mutex<HashSet<ProductId>>,
        fail_release: Mutex<HashSet<ProductId>>,
        fail_deduct: Mutex<HashSet<ProductId>>,
    }

    impl FlakyInventory {
        fn fail_lock_on(&self, product_id: ProductId) {
            self.fail_lock.lock().unwrap().insert(product_id);
        }

        fn fail_release_on(&self, product_id: ProductId) {
            self.fail_release.lock().unwrap().insert(product_id);
        }

        fn fail_deduct_on(&self, product_id: ProductId) {
            self.fail_deduct.lock().unwrap().insert(product_id);
        }
    }

    #[async_trait]
    impl InventoryStore for FlakyInventory {
        async fn insert(&self, inventory: &Inventory) -> Result<(), StoreError> {
            self.inner.insert(inventory).await
        }

        async fn get(&self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
            self.inner.get(product_id).await
        }

        async fn apply(
            &self,
            product_id: ProductId,
            mutation: StockMutation,
            at: DateTime<Utc>,
        ) -> Result<Inventory, StoreError> {
            let injected = match mutation {
                StockMutation::Lock { quantity } if self.fail_lock.lock().unwrap().contains(&product_id) => {
                    Some(StoreError::Domain(DomainError::insufficient_stock(product_id, quantity, 0)))
                }
                StockMutation::Release { .. } if self.fail_release.lock().unwrap().contains(&product_id) => {
                    Some(StoreError::Backend("connection reset".to_string()))
                }
                StockMutation::Deduct { .. } if self.fail_deduct.lock().unwrap().contains(&product_id) => {
                    Some(StoreError::Backend("connection reset".to_string()))
                }
                _ => None,
            };
            match injected {
                Some(err) => Err(err),
                None => self.inner.apply(product_id, mutation, at).await,
            }
        }

        async fn list_low_stock(&self) -> Result<Vec<Inventory>, StoreError> {
            self.inner.list_low_stock().await
        }

        async fn delete(&self, product_id: ProductId) -> Result<(), StoreError> {
            self.inner.delete(product_id).await
        }
    }

    /// Order store whose inserts always fail.
    #[derive(Default)]
    struct UnwritableOrders {
        inner: InMemoryOrderStore,
    }

    #[async_trait]
    impl OrderStore for UnwritableOrders {
        async fn create(&self, _order: &Order, _delivery: &Delivery) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }

        async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.get(order_id).await
        }

        async fn find_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, StoreError> {
            self.inner.find_by_order_no(order_no).await
        }

        async fn get_delivery(&self, order_id: OrderId) -> Result<Option<Delivery>, StoreError> {
            self.inner.get_delivery(order_id).await
        }

        async fn save_transition(&self, write: &StatusWrite) -> Result<(), StoreError> {
            self.inner.save_transition(write).await
        }

        async fn list(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
            self.inner.list(query).await
        }

        async fn references_product(&self, product_id: ProductId) -> Result<bool, StoreError> {
            self.inner.references_product(product_id).await
        }
    }

    /// Order store that commits a delivery-details edit just before the next
    /// guarded write, as a concurrent request would.
    #[derive(Default)]
    struct InterleavedOrders {
        inner: InMemoryOrderStore,
        pending_edit: Mutex<Option<ShipmentDetails>>,
    }

    impl InterleavedOrders {
        fn edit_before_next_write(&self, details: ShipmentDetails) {
            *self.pending_edit.lock().unwrap() = Some(details);
        }
    }

    #[async_trait]
    impl OrderStore for InterleavedOrders {
        async fn create(&self, order: &Order, delivery: &Delivery) -> Result<(), StoreError> {
            self.inner.create(order, delivery).await
        }

        async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.get(order_id).await
        }

        async fn find_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, StoreError> {
            self.inner.find_by_order_no(order_no).await
        }

        async fn get_delivery(&self, order_id: OrderId) -> Result<Option<Delivery>, StoreError> {
            self.inner.get_delivery(order_id).await
        }

        async fn save_transition(&self, write: &StatusWrite) -> Result<(), StoreError> {
            let pending = self.pending_edit.lock().unwrap().take();
            if let Some(details) = pending {
                let order_id = write.order.id_typed();
                let order = self.inner.get(order_id).await?.unwrap();
                let stored = self.inner.get_delivery(order_id).await?.unwrap();
                let mut edited = stored.clone();
                edited.update_details(&details, test_time())?;
                self.inner
                    .save_transition(&StatusWrite {
                        expected_order: order.status(),
                        order,
                        expected_delivery: stored.status(),
                        expected_tracking: stored.tracking().clone(),
                        delivery: edited,
                    })
                    .await?;
            }
            self.inner.save_transition(write).await
        }

        async fn list(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
            self.inner.list(query).await
        }

        async fn references_product(&self, product_id: ProductId) -> Result<bool, StoreError> {
            self.inner.references_product(product_id).await
        }
    }

    struct Fixture {
        stores: Stores,
        workflow: OrderWorkflow,
        products: Vec<ProductId>,
    }

    impl Fixture {
        async fn stock(&self, product_id: ProductId) -> Inventory {
            self.workflow.ledger().get_availability(product_id).await.unwrap()
        }
    }

    /// One product per `(unit_price, stock)`, returned in ascending id order.
    async fn setup(stores: Stores, products: &[(u64, i64)]) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(test_time()));
        let ledger = InventoryLedger::new(&stores, clock.clone());
        let workflow = OrderWorkflow::new(
            &stores,
            ledger.clone(),
            Arc::new(SequenceIdGenerator::default()),
            clock,
        );

        let mut ids = Vec::new();
        for (i, (price, stock)) in products.iter().enumerate() {
            let product = Product::new(ProductId::new(), format!("Product {i}"), *price).unwrap();
            stores.catalog.upsert_product(&product).await.unwrap();
            ledger
                .create_inventory(product.id, Some(*stock), Some(0))
                .await
                .unwrap();
            ids.push(product.id);
        }
        ids.sort();

        Fixture {
            stores,
            workflow,
            products: ids,
        }
    }

    fn consignee() -> ConsigneeInfo {
        ConsigneeInfo::new("Ada Lovelace", "+44 20 7946 0000", "12 St James's Square, London", None)
            .unwrap()
    }

    fn request(customer_id: CustomerId, lines: &[(ProductId, i64)]) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id,
            order_no: None,
            items: lines
                .iter()
                .map(|(product_id, quantity)| OrderLineRequest {
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .collect(),
            consignee: consignee(),
            estimate_time: None,
        }
    }

    fn domain(err: WorkflowError) -> DomainError {
        match err {
            WorkflowError::Domain(d) => d,
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stock_is_conserved_across_create_failed_create_and_cancel() {
        let fx = setup(Stores::in_memory(), &[(250, 10)]).await;
        let p = fx.products[0];

        let x = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 7)]))
            .await
            .unwrap();
        assert_eq!(x.order.status(), OrderStatus::Created);
        assert_eq!(x.delivery.status(), DeliveryStatus::Paying);
        assert_eq!(x.order.total_amount(), 1750);
        let inv = fx.stock(p).await;
        assert_eq!((inv.stock(), inv.locked_stock()), (10, 7));

        let err = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 5)]))
            .await
            .unwrap_err();
        assert!(matches!(
            domain(err),
            DomainError::InsufficientStock { requested: 5, available: 3, .. }
        ));
        assert_eq!(fx.stock(p).await.locked_stock(), 7);
        let page = fx.workflow.list_orders(&OrderQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let cancelled = fx.workflow.cancel_order(x.order.id_typed()).await.unwrap();
        assert_eq!(cancelled.order.status(), OrderStatus::Cancelled);
        assert_eq!(cancelled.delivery.status(), DeliveryStatus::Cancelled);
        let inv = fx.stock(p).await;
        assert_eq!((inv.stock(), inv.locked_stock()), (10, 0));
    }

    #[tokio::test]
    async fn failed_lock_releases_locks_already_taken() {
        let inventory = Arc::new(FlakyInventory::default());
        let stores = Stores {
            inventory: inventory.clone(),
            ..Stores::in_memory()
        };
        let fx = setup(stores, &[(100, 10), (100, 10)]).await;
        let (a, b) = (fx.products[0], fx.products[1]);
        inventory.fail_lock_on(b);

        let err = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(b, 4), (a, 3)]))
            .await
            .unwrap_err();

        assert!(matches!(domain(err), DomainError::InsufficientStock { .. }));
        assert_eq!(fx.stock(a).await.locked_stock(), 0);
        assert_eq!(fx.stock(b).await.locked_stock(), 0);
        let page = fx.workflow.list_orders(&OrderQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(fx.workflow.reconciliation_gaps().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_persist_releases_every_lock() {
        let stores = Stores {
            orders: Arc::new(UnwritableOrders::default()),
            ..Stores::in_memory()
        };
        let fx = setup(stores, &[(100, 10), (100, 10)]).await;
        let (a, b) = (fx.products[0], fx.products[1]);

        let err = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(a, 2), (b, 3)]))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Store(StoreError::Backend(_))));
        assert_eq!(fx.stock(a).await.locked_stock(), 0);
        assert_eq!(fx.stock(b).await.locked_stock(), 0);
    }

    #[tokio::test]
    async fn compensation_failure_is_recorded_as_a_gap() {
        let inventory = Arc::new(FlakyInventory::default());
        let stores = Stores {
            inventory: inventory.clone(),
            ..Stores::in_memory()
        };
        let fx = setup(stores, &[(100, 10), (100, 10)]).await;
        let (a, b) = (fx.products[0], fx.products[1]);
        inventory.fail_lock_on(b);
        inventory.fail_release_on(a);

        let err = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(a, 3), (b, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::InsufficientStock { .. }));

        let gaps = fx.workflow.reconciliation_gaps().await.unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, GapKind::CompensationRelease);
        assert_eq!(gaps[0].product_id, a);
        assert_eq!(gaps[0].quantity, 3);
        assert!(gaps[0].order_no.starts_with("ORD"));
        // The lock could not be undone, so it is still held.
        assert_eq!(fx.stock(a).await.locked_stock(), 3);
    }

    #[tokio::test]
    async fn unknown_or_inactive_products_fail_before_locking() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];

        let missing = ProductId::new();
        let err = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 1), (missing, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::NotFound { entity: "product", .. }));

        let product = fx.stores.catalog.get_product(p).await.unwrap().unwrap();
        fx.stores
            .catalog
            .upsert_product(&product.deactivated())
            .await
            .unwrap();
        let err = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
        assert_eq!(fx.stock(p).await.locked_stock(), 0);
    }

    #[tokio::test]
    async fn duplicate_lines_are_merged_and_prices_snapshotted() {
        let fx = setup(Stores::in_memory(), &[(120, 10), (80, 10)]).await;
        let (a, b) = (fx.products[0], fx.products[1]);

        let detail = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(b, 1), (a, 2), (a, 3)]))
            .await
            .unwrap();

        let items = detail.order.items();
        assert_eq!(items.len(), 2);
        assert_eq!((items[0].product_id, items[0].quantity), (a, 5));
        assert_eq!((items[1].product_id, items[1].quantity), (b, 1));
        assert_eq!(detail.order.total_amount(), 5 * 120 + 80);
        assert_eq!(fx.stock(a).await.locked_stock(), 5);

        let repriced = Product::new(a, "Product 0", 999).unwrap();
        fx.stores.catalog.upsert_product(&repriced).await.unwrap();
        let stored = fx
            .workflow
            .get_order_detail(detail.order.id_typed())
            .await
            .unwrap();
        assert_eq!(stored.order.items()[0].unit_price, 120);
        assert_eq!(stored.order.total_amount(), 680);
    }

    #[tokio::test]
    async fn repeated_order_number_returns_the_existing_order() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];
        let customer = CustomerId::new();

        let mut req = request(customer, &[(p, 4)]);
        req.order_no = Some("client-42".to_string());
        let first = fx.workflow.create_order(req.clone()).await.unwrap();
        let second = fx.workflow.create_order(req.clone()).await.unwrap();

        assert_eq!(first.order.id_typed(), second.order.id_typed());
        assert_eq!(second.order.order_no().as_str(), "client-42");
        assert_eq!(fx.stock(p).await.locked_stock(), 4);

        req.customer_id = CustomerId::new();
        let err = fx.workflow.create_order(req).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn generated_order_numbers_embed_order_time() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];

        let a = fx.workflow.create_order(request(CustomerId::new(), &[(p, 1)])).await.unwrap();
        let b = fx.workflow.create_order(request(CustomerId::new(), &[(p, 1)])).await.unwrap();

        let millis = test_time().timestamp_millis();
        assert_eq!(a.order.order_no().as_str(), format!("ORD{millis}000001"));
        assert_ne!(a.order.order_no(), b.order.order_no());
    }

    #[tokio::test]
    async fn full_lifecycle_deducts_stock_on_receipt() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];
        let created = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 4)]))
            .await
            .unwrap();
        let id = created.order.id_typed();

        let paid = fx.workflow.update_order_status(id, OrderStatus::Paid).await.unwrap();
        assert_eq!(paid.order.status(), OrderStatus::Paid);
        assert_eq!(paid.delivery.status(), DeliveryStatus::Shipping);

        let shipped = fx
            .workflow
            .ship_order(
                id,
                ShipmentRequest {
                    tracking_no: Some("SF1234567890".to_string()),
                    shipper: Some("SF Express".to_string()),
                    estimate_time: Some("2024-05-03".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(shipped.order.status(), OrderStatus::Shipping);
        assert_eq!(shipped.delivery.status(), DeliveryStatus::Receipting);
        let tracking = shipped.delivery.tracking();
        assert_eq!(tracking.tracking_no.as_deref(), Some("SF1234567890"));
        assert_eq!(
            tracking.estimate_time,
            Some(Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap())
        );
        assert_eq!(tracking.ship_time, Some(test_time()));

        let done = fx
            .workflow
            .update_order_status(id, OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.order.status(), OrderStatus::Completed);
        assert_eq!(done.delivery.status(), DeliveryStatus::Completed);
        assert_eq!(done.delivery.tracking().delivery_time, Some(test_time()));
        let inv = fx.stock(p).await;
        assert_eq!((inv.stock(), inv.locked_stock()), (6, 0));

        let err = fx.workflow.cancel_order(id).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::AlreadyTerminal { .. }));
    }

    #[tokio::test]
    async fn status_routing_rejects_illegal_targets() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];
        let id = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 1)]))
            .await
            .unwrap()
            .order
            .id_typed();

        for target in [OrderStatus::Created, OrderStatus::Shipping, OrderStatus::Completed] {
            let err = fx.workflow.update_order_status(id, target).await.unwrap_err();
            assert!(
                matches!(domain(err), DomainError::InvalidTransition { machine: "order", .. }),
                "{target} from CREATED"
            );
        }
        let detail = fx.workflow.get_order_detail(id).await.unwrap();
        assert_eq!(detail.order.status(), OrderStatus::Created);
        assert_eq!(detail.delivery.status(), DeliveryStatus::Paying);

        fx.workflow.cancel_order(id).await.unwrap();
        for target in [OrderStatus::Created, OrderStatus::Paid, OrderStatus::Cancelled] {
            let err = fx.workflow.update_order_status(id, target).await.unwrap_err();
            assert!(matches!(domain(err), DomainError::AlreadyTerminal { .. }));
        }
        assert_eq!(fx.stock(p).await.locked_stock(), 0);

        let err = fx.workflow.confirm_payment(OrderId::new()).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::NotFound { entity: "order", .. }));
    }

    #[tokio::test]
    async fn closing_after_sale_completes_the_order_and_deducts_stock() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];
        let id = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 2)]))
            .await
            .unwrap()
            .order
            .id_typed();
        fx.workflow.confirm_payment(id).await.unwrap();

        let err = fx.workflow.apply_after_sale(id).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::InvalidTransition { machine: "delivery", .. }));

        fx.workflow.ship_order(id, ShipmentRequest::default()).await.unwrap();
        let processing = fx.workflow.apply_after_sale(id).await.unwrap();
        assert_eq!(processing.order.status(), OrderStatus::Shipping);
        assert_eq!(processing.delivery.status(), DeliveryStatus::Processing);

        // PROCESSING has no edge to CANCELLED or COMPLETED.
        let err = fx.workflow.cancel_order(id).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::InvalidTransition { machine: "delivery", .. }));
        let err = fx.workflow.confirm_delivery(id).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::InvalidTransition { machine: "delivery", .. }));
        assert_eq!(fx.stock(p).await.locked_stock(), 2);

        let processed = fx.workflow.complete_after_sale(id).await.unwrap();
        assert_eq!(processed.delivery.status(), DeliveryStatus::Processed);
        assert_eq!(processed.order.status(), OrderStatus::Completed);

        let inv = fx.stock(p).await;
        assert_eq!(inv.locked_stock(), 0);
        assert_eq!(inv.stock(), 8);
        assert_eq!(inv.available_stock(), 8);

        let err = fx.workflow.cancel_order(id).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::AlreadyTerminal { .. }));
        let err = fx.workflow.complete_after_sale(id).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::InvalidTransition { .. }));
        assert_eq!(fx.stock(p).await.stock(), 8);
    }

    #[tokio::test]
    async fn failed_deduction_on_after_sale_close_becomes_a_gap() {
        let inventory = Arc::new(FlakyInventory::default());
        let stores = Stores {
            inventory: inventory.clone(),
            ..Stores::in_memory()
        };
        let fx = setup(stores, &[(100, 10)]).await;
        let p = fx.products[0];
        let id = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 3)]))
            .await
            .unwrap()
            .order
            .id_typed();
        fx.workflow.confirm_payment(id).await.unwrap();
        fx.workflow.ship_order(id, ShipmentRequest::default()).await.unwrap();
        fx.workflow.apply_after_sale(id).await.unwrap();

        inventory.fail_deduct_on(p);
        let detail = fx.workflow.complete_after_sale(id).await.unwrap();
        assert_eq!(detail.order.status(), OrderStatus::Completed);
        assert_eq!(fx.stock(p).await.locked_stock(), 3);

        let gaps = fx.workflow.reconciliation_gaps().await.unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, GapKind::CompletionDeduct);
        assert_eq!(gaps[0].quantity, 3);
    }

    #[tokio::test]
    async fn cancel_and_deduct_failures_become_gaps() {
        let inventory = Arc::new(FlakyInventory::default());
        let stores = Stores {
            inventory: inventory.clone(),
            ..Stores::in_memory()
        };
        let fx = setup(stores, &[(100, 10), (100, 10)]).await;
        let (a, b) = (fx.products[0], fx.products[1]);

        let cancelled = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(a, 2), (b, 3)]))
            .await
            .unwrap();
        inventory.fail_release_on(a);
        let detail = fx.workflow.cancel_order(cancelled.order.id_typed()).await.unwrap();
        assert_eq!(detail.order.status(), OrderStatus::Cancelled);
        assert_eq!(fx.stock(a).await.locked_stock(), 2);
        assert_eq!(fx.stock(b).await.locked_stock(), 0);

        let completed = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(b, 1)]))
            .await
            .unwrap();
        let id = completed.order.id_typed();
        fx.workflow.confirm_payment(id).await.unwrap();
        fx.workflow.ship_order(id, ShipmentRequest::default()).await.unwrap();
        inventory.fail_deduct_on(b);
        let detail = fx.workflow.confirm_delivery(id).await.unwrap();
        assert_eq!(detail.order.status(), OrderStatus::Completed);

        let gaps = fx.workflow.reconciliation_gaps().await.unwrap();
        let kinds: Vec<_> = gaps.iter().map(|g| (g.kind, g.product_id, g.quantity)).collect();
        assert_eq!(
            kinds,
            vec![(GapKind::CancelRelease, a, 2), (GapKind::CompletionDeduct, b, 1)]
        );
        assert_eq!(gaps[0].order_no, cancelled.order.order_no().as_str());
    }

    #[tokio::test]
    async fn delivery_details_are_editable_until_terminal() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];
        let id = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 1)]))
            .await
            .unwrap()
            .order
            .id_typed();

        let edited = fx
            .workflow
            .update_delivery_details(
                id,
                ShipmentRequest {
                    shipper: Some("Royal Mail".to_string()),
                    estimate_time: Some("not a date".to_string()),
                    ..ShipmentRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.delivery.status(), DeliveryStatus::Paying);
        assert_eq!(edited.delivery.tracking().shipper.as_deref(), Some("Royal Mail"));
        assert_eq!(edited.delivery.tracking().estimate_time, None);

        let err = fx
            .workflow
            .update_delivery_details(id, ShipmentRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));

        fx.workflow.cancel_order(id).await.unwrap();
        let err = fx
            .workflow
            .update_delivery_details(
                id,
                ShipmentRequest {
                    tracking_no: Some("X1".to_string()),
                    ..ShipmentRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn shipment_computed_before_a_details_edit_is_rejected() {
        let orders = Arc::new(InterleavedOrders::default());
        let stores = Stores {
            orders: orders.clone(),
            ..Stores::in_memory()
        };
        let fx = setup(stores, &[(100, 10)]).await;
        let p = fx.products[0];
        let id = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 1)]))
            .await
            .unwrap()
            .order
            .id_typed();
        fx.workflow.confirm_payment(id).await.unwrap();

        orders.edit_before_next_write(ShipmentDetails::new(
            Some("TRK-EDIT".to_string()),
            None,
            None,
        ));
        let shipment = ShipmentRequest {
            tracking_no: Some("TRK-SHIP".to_string()),
            shipper: Some("DHL".to_string()),
            ..ShipmentRequest::default()
        };
        let err = fx.workflow.ship_order(id, shipment.clone()).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::Conflict(_)));

        let current = fx.workflow.get_order_detail(id).await.unwrap();
        assert_eq!(current.order.status(), OrderStatus::Paid);
        assert_eq!(current.delivery.status(), DeliveryStatus::Shipping);
        assert_eq!(current.delivery.tracking().tracking_no.as_deref(), Some("TRK-EDIT"));
        assert_eq!(current.delivery.tracking().shipper, None);

        let shipped = fx.workflow.ship_order(id, shipment).await.unwrap();
        assert_eq!(shipped.delivery.status(), DeliveryStatus::Receipting);
        assert_eq!(shipped.delivery.tracking().tracking_no.as_deref(), Some("TRK-SHIP"));
    }

    #[tokio::test]
    async fn list_orders_filters_by_customer_and_status() {
        let fx = setup(Stores::in_memory(), &[(100, 50)]).await;
        let p = fx.products[0];
        let alice = CustomerId::new();
        let bob = CustomerId::new();

        let first = fx.workflow.create_order(request(alice, &[(p, 1)])).await.unwrap();
        fx.workflow.create_order(request(alice, &[(p, 1)])).await.unwrap();
        fx.workflow.create_order(request(bob, &[(p, 1)])).await.unwrap();
        fx.workflow.confirm_payment(first.order.id_typed()).await.unwrap();

        let mine = fx
            .workflow
            .list_orders(&OrderQuery {
                customer_id: Some(alice),
                ..OrderQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.total, 2);
        assert!(mine.orders.iter().all(|o| o.customer_id() == alice));

        let paid = fx
            .workflow
            .list_orders(&OrderQuery {
                status: Some(OrderStatus::Paid),
                ..OrderQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(paid.total, 1);
        assert_eq!(paid.orders[0].id_typed(), first.order.id_typed());

        let err = fx
            .workflow
            .list_orders(&OrderQuery {
                size: 0,
                ..OrderQuery::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_payment_confirmations_apply_once() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];
        let id = fx
            .workflow
            .create_order(request(CustomerId::new(), &[(p, 1)]))
            .await
            .unwrap()
            .order
            .id_typed();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let workflow = fx.workflow.clone();
            handles.push(tokio::spawn(async move { workflow.confirm_payment(id).await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(matches!(
                    domain(err),
                    DomainError::InvalidTransition { .. } | DomainError::Conflict(_)
                )),
            }
        }
        assert_eq!(succeeded, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cancel_and_ship_leave_a_consistent_pair() {
        for _ in 0..20 {
            let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
            let p = fx.products[0];
            let id = fx
                .workflow
                .create_order(request(CustomerId::new(), &[(p, 3)]))
                .await
                .unwrap()
                .order
                .id_typed();
            fx.workflow.confirm_payment(id).await.unwrap();

            let canceller = fx.workflow.clone();
            let shipper = fx.workflow.clone();
            let cancel = tokio::spawn(async move { canceller.cancel_order(id).await });
            let ship = tokio::spawn(async move {
                shipper.ship_order(id, ShipmentRequest::default()).await
            });
            let cancelled = cancel.await.unwrap().is_ok();
            let _ = ship.await.unwrap();

            let detail = fx.workflow.get_order_detail(id).await.unwrap();
            let locked = fx.stock(p).await.locked_stock();
            match detail.order.status() {
                OrderStatus::Cancelled => {
                    assert!(cancelled);
                    assert_eq!(detail.delivery.status(), DeliveryStatus::Cancelled);
                    assert_eq!(locked, 0);
                }
                OrderStatus::Shipping => {
                    assert!(!cancelled);
                    assert_eq!(detail.delivery.status(), DeliveryStatus::Receipting);
                    assert_eq!(locked, 3);
                }
                other => panic!("unexpected order status {other}"),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_never_oversell() {
        let fx = setup(Stores::in_memory(), &[(100, 10)]).await;
        let p = fx.products[0];

        let mut handles = Vec::new();
        for _ in 0..25 {
            let workflow = fx.workflow.clone();
            handles.push(tokio::spawn(async move {
                workflow.create_order(request(CustomerId::new(), &[(p, 3)])).await
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 3);
        let inv = fx.stock(p).await;
        assert_eq!((inv.stock(), inv.locked_stock()), (10, 9));
    }
}
