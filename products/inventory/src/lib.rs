//! Inventory module: product catalogue and the stock movement journal.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use platform_api::{Action, ApiError, ApiResult, ById, Module, Reply, deleted, reply, validate};
use platform_store::{Collection, record, stats};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub company_id: Uuid,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit_cost_cents: i64,
    pub quantity: i64,
    pub reorder_level: i64,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub company_id: Uuid,
    pub product_id: Uuid,
    pub kind: MovementKind,
    pub quantity: i64,
    pub quantity_after: i64,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Receipt,
    Issue,
    Adjustment,
}

record!(Product, "product");
record!(StockMovement, "stock movement");

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit_cost_cents: i64,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub reorder_level: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovement {
    pub product_id: Uuid,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reference: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub category: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryMetrics {
    pub total_products: usize,
    pub total_units: i64,
    pub stock_value_cents: i64,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub categories: Vec<String>,
}

#[derive(Clone, Default)]
pub struct InventoryService {
    products: Collection<Product>,
    movements: Collection<StockMovement>,
}

impl InventoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_product(&self, tenant: Uuid, input: NewProduct) -> ApiResult<Product> {
        let sku = validate::text("sku", &input.sku)?.to_uppercase();
        let product = Product {
            id: Uuid::new_v4(),
            company_id: tenant,
            sku: sku.clone(),
            name: validate::text("name", &input.name)?,
            category: validate::text("category", &input.category)?,
            unit_cost_cents: validate::non_negative("unitCostCents", input.unit_cost_cents)?,
            quantity: validate::non_negative("quantity", input.quantity)?,
            reorder_level: validate::non_negative("reorderLevel", input.reorder_level)?,
            created_at: Utc::now(),
        };
        let product = self
            .products
            .insert_unique(product, |p| p.sku == sku)
            .await
            .map_err(|_| ApiError::invalid(format!("sku {sku} already exists")))?;
        info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    pub async fn products(&self, tenant: Uuid, filter: &ProductFilter) -> Vec<Product> {
        self.products
            .list(tenant, |p| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| p.category.eq_ignore_ascii_case(c))
            })
            .await
    }

    pub async fn low_stock(&self, tenant: Uuid) -> Vec<Product> {
        self.products.list(tenant, Product::is_low_stock).await
    }

    pub async fn delete_product(&self, tenant: Uuid, id: Uuid) -> ApiResult<Product> {
        let product = self.products.remove(tenant, id).await?;
        info!(product_id = %id, "product deleted");
        Ok(product)
    }

    /// Apply a movement to the product's on-hand quantity and journal it.
    pub async fn record_movement(
        &self,
        tenant: Uuid,
        input: NewMovement,
    ) -> ApiResult<StockMovement> {
        let quantity = match input.kind {
            MovementKind::Adjustment => validate::non_negative("quantity", input.quantity)?,
            MovementKind::Receipt | MovementKind::Issue => {
                validate::positive("quantity", input.quantity)?
            }
        };
        let product = self
            .products
            .try_update(tenant, input.product_id, |p| {
                p.quantity = match input.kind {
                    MovementKind::Receipt => p.quantity.checked_add(quantity).ok_or_else(|| {
                        ApiError::invalid(format!("receipt would overflow stock for {}", p.sku))
                    })?,
                    MovementKind::Issue if quantity > p.quantity => {
                        return Err(ApiError::invalid(format!(
                            "insufficient stock for {}: {} on hand, {} requested",
                            p.sku, p.quantity, quantity
                        )));
                    }
                    MovementKind::Issue => p.quantity - quantity,
                    MovementKind::Adjustment => quantity,
                };
                Ok(())
            })
            .await?;
        if product.is_low_stock() {
            warn!(
                product_id = %product.id,
                quantity = product.quantity,
                "product at or below reorder level"
            );
        }
        let movement = StockMovement {
            id: Uuid::new_v4(),
            company_id: tenant,
            product_id: product.id,
            kind: input.kind,
            quantity,
            quantity_after: product.quantity,
            reference: validate::optional_text(input.reference),
            created_at: Utc::now(),
        };
        let movement = self.movements.insert(movement).await;
        info!(
            movement_id = %movement.id,
            kind = ?movement.kind,
            quantity,
            "stock movement recorded"
        );
        Ok(movement)
    }

    pub async fn movements(&self, tenant: Uuid, filter: &MovementFilter) -> Vec<StockMovement> {
        self.movements
            .list(tenant, |m| filter.product_id.is_none_or(|id| m.product_id == id))
            .await
    }

    pub async fn metrics(&self, tenant: Uuid) -> InventoryMetrics {
        let products = self.products.all(tenant).await;
        let categories: BTreeSet<String> = products.iter().map(|p| p.category.clone()).collect();
        InventoryMetrics {
            total_products: products.len(),
            total_units: stats::cents(products.iter().map(|p| p.quantity)),
            stock_value_cents: stats::cents(
                products
                    .iter()
                    .map(|p| p.quantity.saturating_mul(p.unit_cost_cents)),
            ),
            low_stock: products
                .iter()
                .filter(|p| p.quantity > 0 && p.is_low_stock())
                .count(),
            out_of_stock: products.iter().filter(|p| p.quantity == 0).count(),
            categories: categories.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InventoryQuery {
    Metrics,
    ListProducts(ProductFilter),
    ListLowStock,
    ListMovements(MovementFilter),
}

impl Action for InventoryQuery {
    fn name(&self) -> &'static str {
        match self {
            InventoryQuery::Metrics => "metrics",
            InventoryQuery::ListProducts(_) => "listProducts",
            InventoryQuery::ListLowStock => "listLowStock",
            InventoryQuery::ListMovements(_) => "listMovements",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InventoryCommand {
    CreateProduct(NewProduct),
    RecordMovement(NewMovement),
    DeleteProduct(ById),
}

impl Action for InventoryCommand {
    fn name(&self) -> &'static str {
        match self {
            InventoryCommand::CreateProduct(_) => "createProduct",
            InventoryCommand::RecordMovement(_) => "recordMovement",
            InventoryCommand::DeleteProduct(_) => "deleteProduct",
        }
    }

    fn is_destructive(&self) -> bool {
        matches!(self, InventoryCommand::DeleteProduct(_))
    }
}

impl Module for InventoryService {
    const NAME: &'static str = "inventory";

    type Query = InventoryQuery;
    type Command = InventoryCommand;

    async fn query(&self, tenant: Uuid, query: InventoryQuery) -> ApiResult<Reply> {
        match query {
            InventoryQuery::Metrics => reply(&self.metrics(tenant).await),
            InventoryQuery::ListProducts(filter) => reply(&self.products(tenant, &filter).await),
            InventoryQuery::ListLowStock => reply(&self.low_stock(tenant).await),
            InventoryQuery::ListMovements(filter) => {
                reply(&self.movements(tenant, &filter).await)
            }
        }
    }

    async fn command(&self, tenant: Uuid, command: InventoryCommand) -> ApiResult<Reply> {
        match command {
            InventoryCommand::CreateProduct(input) => {
                Reply::created(&self.create_product(tenant, input).await?)
            }
            InventoryCommand::RecordMovement(input) => {
                Reply::created(&self.record_movement(tenant, input).await?)
            }
            InventoryCommand::DeleteProduct(ById { id }) => {
                self.delete_product(tenant, id).await?;
                deleted(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(sku: &str, category: &str, cost: i64, qty: i64, reorder: i64) -> NewProduct {
        NewProduct {
            sku: sku.into(),
            name: format!("Item {sku}"),
            category: category.into(),
            unit_cost_cents: cost,
            quantity: qty,
            reorder_level: reorder,
        }
    }

    fn movement(product_id: Uuid, kind: MovementKind, quantity: i64) -> NewMovement {
        NewMovement {
            product_id,
            kind,
            quantity,
            reference: None,
        }
    }

    #[tokio::test]
    async fn skus_are_unique_per_company() {
        let inventory = InventoryService::new();
        let tenant = Uuid::new_v4();
        inventory
            .create_product(tenant, product("bolt-1", "Hardware", 10, 0, 0))
            .await
            .unwrap();
        assert!(matches!(
            inventory
                .create_product(tenant, product("BOLT-1", "Hardware", 10, 0, 0))
                .await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(inventory
            .create_product(Uuid::new_v4(), product("BOLT-1", "Hardware", 10, 0, 0))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn movements_adjust_on_hand_quantity() {
        let inventory = InventoryService::new();
        let tenant = Uuid::new_v4();
        let bolt = inventory
            .create_product(tenant, product("B1", "Hardware", 25, 10, 5))
            .await
            .unwrap();

        let receipt = inventory
            .record_movement(tenant, movement(bolt.id, MovementKind::Receipt, 15))
            .await
            .unwrap();
        assert_eq!(receipt.quantity_after, 25);
        let issue = inventory
            .record_movement(tenant, movement(bolt.id, MovementKind::Issue, 20))
            .await
            .unwrap();
        assert_eq!(issue.quantity_after, 5);

        assert!(matches!(
            inventory
                .record_movement(tenant, movement(bolt.id, MovementKind::Issue, 6))
                .await,
            Err(ApiError::InvalidInput(_))
        ));
        let adjusted = inventory
            .record_movement(tenant, movement(bolt.id, MovementKind::Adjustment, 42))
            .await
            .unwrap();
        assert_eq!(adjusted.quantity_after, 42);

        let journal = inventory
            .movements(
                tenant,
                &MovementFilter {
                    product_id: Some(bolt.id),
                },
            )
            .await;
        assert_eq!(journal.len(), 3);
        assert_eq!(journal[0].kind, MovementKind::Receipt);
    }

    #[tokio::test]
    async fn concurrent_creates_keep_one_sku() {
        let inventory = InventoryService::new();
        let tenant = Uuid::new_v4();
        let creates: Vec<_> = (0..16)
            .map(|_| {
                let inventory = inventory.clone();
                tokio::spawn(async move {
                    inventory
                        .create_product(tenant, product("gear", "Drivetrain", 450, 1, 0))
                        .await
                })
            })
            .collect();
        let mut created = 0;
        for create in creates {
            if create.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(inventory.products(tenant, &ProductFilter::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn oversized_receipts_are_rejected() {
        let inventory = InventoryService::new();
        let tenant = Uuid::new_v4();
        let bolt = inventory
            .create_product(tenant, product("B1", "Hardware", 25, 1, 0))
            .await
            .unwrap();

        let result = inventory
            .record_movement(tenant, movement(bolt.id, MovementKind::Receipt, i64::MAX))
            .await;
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
        let journal = inventory.movements(tenant, &MovementFilter::default()).await;
        assert!(journal.is_empty());

        inventory
            .record_movement(tenant, movement(bolt.id, MovementKind::Adjustment, i64::MAX))
            .await
            .unwrap();
        let metrics = inventory.metrics(tenant).await;
        assert_eq!(metrics.total_units, i64::MAX);
        assert_eq!(metrics.stock_value_cents, i64::MAX);
    }

    #[tokio::test]
    async fn movements_for_unknown_products_are_not_found() {
        let inventory = InventoryService::new();
        let result = inventory
            .record_movement(
                Uuid::new_v4(),
                movement(Uuid::new_v4(), MovementKind::Receipt, 1),
            )
            .await;
        assert!(matches!(result, Err(ApiError::NotFound { kind: "product", .. })));
    }

    #[tokio::test]
    async fn metrics_value_the_stock() {
        let inventory = InventoryService::new();
        let tenant = Uuid::new_v4();
        inventory
            .create_product(tenant, product("A", "Hardware", 100, 10, 2))
            .await
            .unwrap();
        inventory
            .create_product(tenant, product("B", "Paint", 250, 3, 5))
            .await
            .unwrap();
        let empty = inventory
            .create_product(tenant, product("C", "Paint", 999, 0, 1))
            .await
            .unwrap();

        let metrics = inventory.metrics(tenant).await;
        assert_eq!(metrics.total_products, 3);
        assert_eq!(metrics.total_units, 13);
        assert_eq!(metrics.stock_value_cents, 1_750);
        assert_eq!(metrics.low_stock, 1);
        assert_eq!(metrics.out_of_stock, 1);
        assert_eq!(metrics.categories, vec!["Hardware", "Paint"]);
        assert_eq!(inventory.low_stock(tenant).await.len(), 2);

        inventory.delete_product(tenant, empty.id).await.unwrap();
        assert_eq!(inventory.metrics(tenant).await.out_of_stock, 0);
    }
}
