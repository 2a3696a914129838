//! Procurement module: supplier register and purchase orders.

use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{Action, ApiError, ApiResult, Module, Reply, StatusChange, reply, validate};
use platform_store::{Collection, record, stats};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: String,
    pub category: String,
    pub rating: f64,
    pub status: SupplierStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplierStatus {
    Active,
    Inactive,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl OrderLine {
    pub fn total_cents(&self) -> ApiResult<i64> {
        validate::line_total("line total", self.quantity, self.unit_price_cents)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub company_id: Uuid,
    pub supplier_id: Uuid,
    pub number: String,
    pub lines: Vec<OrderLine>,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub expected_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Submitted,
    Approved,
    Received,
    Cancelled,
}

impl OrderStatus {
    pub fn can_become(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Draft, Cancelled)
                | (Submitted, Approved)
                | (Submitted, Cancelled)
                | (Approved, Received)
                | (Approved, Cancelled)
        )
    }
}

record!(Supplier, "supplier");
record!(PurchaseOrder, "purchase order");

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSupplier {
    pub name: String,
    pub email: String,
    pub category: String,
    #[serde(default)]
    pub rating: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchaseOrder {
    pub supplier_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub expected_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierFilter {
    pub status: Option<SupplierStatus>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub supplier_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcurementMetrics {
    pub total_suppliers: usize,
    pub active_suppliers: usize,
    pub average_supplier_rating: f64,
    pub open_orders: usize,
    pub pending_approval: usize,
    pub committed_spend_cents: i64,
    pub received_spend_cents: i64,
}

fn order_number() -> String {
    format!("PO-{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[derive(Clone, Default)]
pub struct ProcurementService {
    suppliers: Collection<Supplier>,
    orders: Collection<PurchaseOrder>,
}

impl ProcurementService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_supplier(&self, tenant: Uuid, input: NewSupplier) -> ApiResult<Supplier> {
        let supplier = Supplier {
            id: Uuid::new_v4(),
            company_id: tenant,
            name: validate::text("name", &input.name)?,
            email: validate::email("email", &input.email)?,
            category: validate::text("category", &input.category)?,
            rating: validate::within("rating", input.rating, 0.0, 5.0)?,
            status: SupplierStatus::Active,
            created_at: Utc::now(),
        };
        let supplier = self.suppliers.insert(supplier).await;
        info!(supplier_id = %supplier.id, "supplier created");
        Ok(supplier)
    }

    pub async fn suppliers(&self, tenant: Uuid, filter: &SupplierFilter) -> Vec<Supplier> {
        self.suppliers
            .list(tenant, |s| filter.status.is_none_or(|status| s.status == status))
            .await
    }

    pub async fn update_supplier_status(
        &self,
        tenant: Uuid,
        id: Uuid,
        status: SupplierStatus,
    ) -> ApiResult<Supplier> {
        let supplier = self
            .suppliers
            .update(tenant, id, |s| s.status = status)
            .await?;
        info!(supplier_id = %id, ?status, "supplier status updated");
        Ok(supplier)
    }

    pub async fn create_purchase_order(
        &self,
        tenant: Uuid,
        input: NewPurchaseOrder,
    ) -> ApiResult<PurchaseOrder> {
        let supplier = self.suppliers.find(tenant, input.supplier_id).await?;
        if supplier.status != SupplierStatus::Active {
            return Err(ApiError::invalid(format!(
                "supplier {} is inactive",
                supplier.name
            )));
        }
        if input.lines.is_empty() {
            return Err(ApiError::invalid("purchase order needs at least one line"));
        }
        let mut lines = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            lines.push(OrderLine {
                description: validate::text("description", &line.description)?,
                quantity: validate::positive("quantity", line.quantity)?,
                unit_price_cents: validate::non_negative(
                    "unitPriceCents",
                    line.unit_price_cents,
                )?,
            });
        }
        let line_totals = lines
            .iter()
            .map(OrderLine::total_cents)
            .collect::<ApiResult<Vec<i64>>>()?;
        let order = PurchaseOrder {
            id: Uuid::new_v4(),
            company_id: tenant,
            supplier_id: supplier.id,
            number: order_number(),
            total_cents: validate::total("totalCents", line_totals)?,
            lines,
            status: OrderStatus::Draft,
            expected_date: input.expected_date,
            created_at: Utc::now(),
        };
        let order = self.orders.insert(order).await;
        info!(
            order_id = %order.id,
            number = %order.number,
            total_cents = order.total_cents,
            "purchase order created"
        );
        Ok(order)
    }

    pub async fn purchase_orders(&self, tenant: Uuid, filter: &OrderFilter) -> Vec<PurchaseOrder> {
        self.orders
            .list(tenant, |o| {
                filter.supplier_id.is_none_or(|id| o.supplier_id == id)
                    && filter.status.is_none_or(|s| o.status == s)
            })
            .await
    }

    pub async fn update_order_status(
        &self,
        tenant: Uuid,
        id: Uuid,
        status: OrderStatus,
    ) -> ApiResult<PurchaseOrder> {
        let order = self
            .orders
            .try_update(tenant, id, |o| {
                if !o.status.can_become(status) {
                    return Err(ApiError::invalid(format!(
                        "cannot move purchase order from {:?} to {:?}",
                        o.status, status
                    )));
                }
                o.status = status;
                Ok(())
            })
            .await?;
        info!(order_id = %id, ?status, "purchase order status updated");
        Ok(order)
    }

    pub async fn metrics(&self, tenant: Uuid) -> ProcurementMetrics {
        let suppliers = self.suppliers.all(tenant).await;
        let orders = self.orders.all(tenant).await;
        let spend = |status: OrderStatus| -> i64 {
            stats::cents(
                orders
                    .iter()
                    .filter(|o| o.status == status)
                    .map(|o| o.total_cents),
            )
        };
        ProcurementMetrics {
            total_suppliers: suppliers.len(),
            active_suppliers: suppliers
                .iter()
                .filter(|s| s.status == SupplierStatus::Active)
                .count(),
            average_supplier_rating: stats::average(suppliers.iter().map(|s| s.rating)),
            open_orders: orders
                .iter()
                .filter(|o| matches!(o.status, OrderStatus::Submitted | OrderStatus::Approved))
                .count(),
            pending_approval: orders
                .iter()
                .filter(|o| o.status == OrderStatus::Submitted)
                .count(),
            committed_spend_cents: spend(OrderStatus::Approved),
            received_spend_cents: spend(OrderStatus::Received),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ProcurementQuery {
    Metrics,
    ListSuppliers(SupplierFilter),
    ListPurchaseOrders(OrderFilter),
}

impl Action for ProcurementQuery {
    fn name(&self) -> &'static str {
        match self {
            ProcurementQuery::Metrics => "metrics",
            ProcurementQuery::ListSuppliers(_) => "listSuppliers",
            ProcurementQuery::ListPurchaseOrders(_) => "listPurchaseOrders",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ProcurementCommand {
    CreateSupplier(NewSupplier),
    UpdateSupplierStatus(StatusChange<SupplierStatus>),
    CreatePurchaseOrder(NewPurchaseOrder),
    UpdatePurchaseOrderStatus(StatusChange<OrderStatus>),
}

impl Action for ProcurementCommand {
    fn name(&self) -> &'static str {
        match self {
            ProcurementCommand::CreateSupplier(_) => "createSupplier",
            ProcurementCommand::UpdateSupplierStatus(_) => "updateSupplierStatus",
            ProcurementCommand::CreatePurchaseOrder(_) => "createPurchaseOrder",
            ProcurementCommand::UpdatePurchaseOrderStatus(_) => "updatePurchaseOrderStatus",
        }
    }
}

impl Module for ProcurementService {
    const NAME: &'static str = "procurement";

    type Query = ProcurementQuery;
    type Command = ProcurementCommand;

    async fn query(&self, tenant: Uuid, query: ProcurementQuery) -> ApiResult<Reply> {
        match query {
            ProcurementQuery::Metrics => reply(&self.metrics(tenant).await),
            ProcurementQuery::ListSuppliers(filter) => {
                reply(&self.suppliers(tenant, &filter).await)
            }
            ProcurementQuery::ListPurchaseOrders(filter) => {
                reply(&self.purchase_orders(tenant, &filter).await)
            }
        }
    }

    async fn command(&self, tenant: Uuid, command: ProcurementCommand) -> ApiResult<Reply> {
        match command {
            ProcurementCommand::CreateSupplier(input) => {
                Reply::created(&self.create_supplier(tenant, input).await?)
            }
            ProcurementCommand::UpdateSupplierStatus(change) => reply(
                &self
                    .update_supplier_status(tenant, change.id, change.status)
                    .await?,
            ),
            ProcurementCommand::CreatePurchaseOrder(input) => {
                Reply::created(&self.create_purchase_order(tenant, input).await?)
            }
            ProcurementCommand::UpdatePurchaseOrderStatus(change) => reply(
                &self
                    .update_order_status(tenant, change.id, change.status)
                    .await?,
            ),
        }
    }
}
