//! Maintenance module: equipment register and work orders.
//!
//! Opening a work order takes its equipment out of the operational pool and
//! completing the last open order puts it back.

use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{
    Action, ApiError, ApiResult, ById, Module, Reply, StatusChange, deleted, reply, validate,
};
use platform_store::{Collection, record, stats};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub location: String,
    pub status: EquipmentStatus,
    pub last_service_date: Option<NaiveDate>,
    pub next_service_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    Operational,
    UnderMaintenance,
    OutOfService,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    pub id: Uuid,
    pub company_id: Uuid,
    pub equipment_id: Uuid,
    pub title: String,
    pub kind: WorkKind,
    pub priority: Priority,
    pub status: WorkStatus,
    pub cost_cents: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkKind {
    Preventive,
    Corrective,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl WorkStatus {
    pub fn is_open(self) -> bool {
        matches!(self, WorkStatus::Open | WorkStatus::InProgress)
    }
}

record!(Equipment, "equipment");
record!(WorkOrder, "work order");

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEquipment {
    pub name: String,
    pub location: String,
    pub last_service_date: Option<NaiveDate>,
    pub next_service_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkOrder {
    pub equipment_id: Uuid,
    pub title: String,
    pub kind: WorkKind,
    pub priority: Priority,
    #[serde(default)]
    pub cost_cents: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderUpdate {
    pub id: Uuid,
    pub status: WorkStatus,
    pub cost_cents: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentFilter {
    pub status: Option<EquipmentStatus>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderFilter {
    pub equipment_id: Option<Uuid>,
    pub status: Option<WorkStatus>,
    pub priority: Option<Priority>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceMetrics {
    pub total_equipment: usize,
    pub operational: usize,
    pub under_maintenance: usize,
    pub out_of_service: usize,
    pub service_due: usize,
    pub open_work_orders: usize,
    pub critical_open: usize,
    pub total_cost_cents: i64,
    pub preventive_ratio: f64,
}

#[derive(Clone, Default)]
pub struct MaintenanceService {
    equipment: Collection<Equipment>,
    work_orders: Collection<WorkOrder>,
}

impl MaintenanceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_equipment(
        &self,
        tenant: Uuid,
        input: NewEquipment,
    ) -> ApiResult<Equipment> {
        let equipment = Equipment {
            id: Uuid::new_v4(),
            company_id: tenant,
            name: validate::text("name", &input.name)?,
            location: validate::text("location", &input.location)?,
            status: EquipmentStatus::Operational,
            last_service_date: input.last_service_date,
            next_service_date: input.next_service_date,
            created_at: Utc::now(),
        };
        let equipment = self.equipment.insert(equipment).await;
        info!(equipment_id = %equipment.id, "equipment registered");
        Ok(equipment)
    }

    pub async fn equipment(&self, tenant: Uuid, filter: &EquipmentFilter) -> Vec<Equipment> {
        self.equipment
            .list(tenant, |e| filter.status.is_none_or(|s| e.status == s))
            .await
    }

    pub async fn delete_equipment(&self, tenant: Uuid, id: Uuid) -> ApiResult<Equipment> {
        let open = self
            .work_orders
            .list(tenant, |w| w.equipment_id == id && w.status.is_open())
            .await;
        if !open.is_empty() {
            return Err(ApiError::invalid(format!(
                "equipment has {} open work orders",
                open.len()
            )));
        }
        let removed = self.equipment.remove(tenant, id).await?;
        info!(equipment_id = %id, "equipment deleted");
        Ok(removed)
    }

    #[instrument(name = "maintenance.create_work_order", skip_all, fields(%tenant))]
    pub async fn create_work_order(
        &self,
        tenant: Uuid,
        input: NewWorkOrder,
    ) -> ApiResult<WorkOrder> {
        let title = validate::text("title", &input.title)?;
        let cost_cents = validate::non_negative("costCents", input.cost_cents)?;
        let down = input.kind == WorkKind::Corrective && input.priority == Priority::Critical;
        self.equipment
            .update(tenant, input.equipment_id, |e| {
                e.status = if down || e.status == EquipmentStatus::OutOfService {
                    EquipmentStatus::OutOfService
                } else {
                    EquipmentStatus::UnderMaintenance
                };
            })
            .await?;
        let order = WorkOrder {
            id: Uuid::new_v4(),
            company_id: tenant,
            equipment_id: input.equipment_id,
            title,
            kind: input.kind,
            priority: input.priority,
            status: WorkStatus::Open,
            cost_cents,
            completed_at: None,
            created_at: Utc::now(),
        };
        let order = self.work_orders.insert(order).await;
        info!(
            work_order_id = %order.id,
            equipment_id = %order.equipment_id,
            priority = ?order.priority,
            "work order opened"
        );
        Ok(order)
    }

    pub async fn work_orders(&self, tenant: Uuid, filter: &WorkOrderFilter) -> Vec<WorkOrder> {
        self.work_orders
            .list(tenant, |w| {
                filter.equipment_id.is_none_or(|id| w.equipment_id == id)
                    && filter.status.is_none_or(|s| w.status == s)
                    && filter.priority.is_none_or(|p| w.priority == p)
            })
            .await
    }

    pub async fn update_work_order(
        &self,
        tenant: Uuid,
        update: WorkOrderUpdate,
    ) -> ApiResult<WorkOrder> {
        let cost = update
            .cost_cents
            .map(|c| validate::non_negative("costCents", c))
            .transpose()?;
        let order = self
            .work_orders
            .try_update(tenant, update.id, |w| {
                if !w.status.is_open() {
                    return Err(ApiError::invalid(format!(
                        "work order already {:?}",
                        w.status
                    )));
                }
                w.status = update.status;
                if let Some(cost) = cost {
                    w.cost_cents = cost;
                }
                if update.status == WorkStatus::Completed {
                    w.completed_at = Some(Utc::now());
                }
                Ok(())
            })
            .await?;
        info!(work_order_id = %order.id, status = ?order.status, "work order updated");

        if !order.status.is_open() {
            self.release_equipment(tenant, &order).await?;
        }
        Ok(order)
    }

    async fn release_equipment(&self, tenant: Uuid, closed: &WorkOrder) -> ApiResult<()> {
        let still_open = self
            .work_orders
            .list(tenant, |w| {
                w.equipment_id == closed.equipment_id && w.status.is_open()
            })
            .await;
        let completed = closed.status == WorkStatus::Completed;
        let today = Utc::now().date_naive();
        let result = self
            .equipment
            .update(tenant, closed.equipment_id, |e| {
                if completed {
                    e.last_service_date = Some(today);
                }
                if still_open.is_empty() {
                    e.status = EquipmentStatus::Operational;
                }
            })
            .await;
        // The equipment may have been deleted while the order was open.
        match result {
            Ok(_) | Err(platform_store::StoreError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn metrics(&self, tenant: Uuid) -> MaintenanceMetrics {
        let equipment = self.equipment.all(tenant).await;
        let orders = self.work_orders.all(tenant).await;
        let today = Utc::now().date_naive();
        let count =
            |status: EquipmentStatus| equipment.iter().filter(|e| e.status == status).count();

        MaintenanceMetrics {
            total_equipment: equipment.len(),
            operational: count(EquipmentStatus::Operational),
            under_maintenance: count(EquipmentStatus::UnderMaintenance),
            out_of_service: count(EquipmentStatus::OutOfService),
            service_due: equipment
                .iter()
                .filter(|e| e.next_service_date.is_some_and(|d| d <= today))
                .count(),
            open_work_orders: orders.iter().filter(|w| w.status.is_open()).count(),
            critical_open: orders
                .iter()
                .filter(|w| w.status.is_open() && w.priority == Priority::Critical)
                .count(),
            total_cost_cents: stats::cents(
                orders
                    .iter()
                    .filter(|w| w.status == WorkStatus::Completed)
                    .map(|w| w.cost_cents),
            ),
            preventive_ratio: stats::percentage(
                orders
                    .iter()
                    .filter(|w| w.kind == WorkKind::Preventive)
                    .count(),
                orders.len(),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MaintenanceQuery {
    Metrics,
    ListEquipment(EquipmentFilter),
    ListWorkOrders(WorkOrderFilter),
}

impl Action for MaintenanceQuery {
    fn name(&self) -> &'static str {
        match self {
            MaintenanceQuery::Metrics => "metrics",
            MaintenanceQuery::ListEquipment(_) => "listEquipment",
            MaintenanceQuery::ListWorkOrders(_) => "listWorkOrders",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MaintenanceCommand {
    CreateEquipment(NewEquipment),
    DeleteEquipment(ById),
    CreateWorkOrder(NewWorkOrder),
    UpdateWorkOrderStatus(WorkOrderUpdate),
}

impl Action for MaintenanceCommand {
    fn name(&self) -> &'static str {
        match self {
            MaintenanceCommand::CreateEquipment(_) => "createEquipment",
            MaintenanceCommand::DeleteEquipment(_) => "deleteEquipment",
            MaintenanceCommand::CreateWorkOrder(_) => "createWorkOrder",
            MaintenanceCommand::UpdateWorkOrderStatus(_) => "updateWorkOrderStatus",
        }
    }

    fn is_destructive(&self) -> bool {
        matches!(self, MaintenanceCommand::DeleteEquipment(_))
    }
}

impl From<StatusChange<WorkStatus>> for WorkOrderUpdate {
    fn from(change: StatusChange<WorkStatus>) -> Self {
        Self {
            id: change.id,
            status: change.status,
            cost_cents: None,
        }
    }
}

impl Module for MaintenanceService {
    const NAME: &'static str = "maintenance";

    type Query = MaintenanceQuery;
    type Command = MaintenanceCommand;

    async fn query(&self, tenant: Uuid, query: MaintenanceQuery) -> ApiResult<Reply> {
        match query {
            MaintenanceQuery::Metrics => reply(&self.metrics(tenant).await),
            MaintenanceQuery::ListEquipment(filter) => {
                reply(&self.equipment(tenant, &filter).await)
            }
            MaintenanceQuery::ListWorkOrders(filter) => {
                reply(&self.work_orders(tenant, &filter).await)
            }
        }
    }

    async fn command(&self, tenant: Uuid, command: MaintenanceCommand) -> ApiResult<Reply> {
        match command {
            MaintenanceCommand::CreateEquipment(input) => {
                Reply::created(&self.create_equipment(tenant, input).await?)
            }
            MaintenanceCommand::DeleteEquipment(ById { id }) => {
                self.delete_equipment(tenant, id).await?;
                deleted(id)
            }
            MaintenanceCommand::CreateWorkOrder(input) => {
                Reply::created(&self.create_work_order(tenant, input).await?)
            }
            MaintenanceCommand::UpdateWorkOrderStatus(update) => {
                reply(&self.update_work_order(tenant, update).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn press(next_service_date: Option<NaiveDate>) -> NewEquipment {
        NewEquipment {
            name: "Hydraulic press".into(),
            location: "Hall B".into(),
            last_service_date: None,
            next_service_date,
        }
    }

    fn work(
        equipment_id: Uuid,
        kind: WorkKind,
        priority: Priority,
        cost_cents: i64,
    ) -> NewWorkOrder {
        NewWorkOrder {
            equipment_id,
            title: "Replace seals".into(),
            kind,
            priority,
            cost_cents,
        }
    }

    fn moved(id: Uuid, status: WorkStatus) -> WorkOrderUpdate {
        StatusChange { id, status }.into()
    }

    async fn status_of(service: &MaintenanceService, tenant: Uuid, id: Uuid) -> EquipmentStatus {
        service
            .equipment(tenant, &EquipmentFilter::default())
            .await
            .into_iter()
            .find(|e| e.id == id)
            .map(|e| e.status)
            .unwrap()
    }

    #[tokio::test]
    async fn critical_corrective_orders_take_equipment_down() {
        let maintenance = MaintenanceService::new();
        let tenant = Uuid::new_v4();
        let press = maintenance.create_equipment(tenant, press(None)).await.unwrap();

        maintenance
            .create_work_order(tenant, work(press.id, WorkKind::Preventive, Priority::Low, 0))
            .await
            .unwrap();
        assert_eq!(
            status_of(&maintenance, tenant, press.id).await,
            EquipmentStatus::UnderMaintenance
        );
        maintenance
            .create_work_order(
                tenant,
                work(press.id, WorkKind::Corrective, Priority::Critical, 0),
            )
            .await
            .unwrap();
        assert_eq!(
            status_of(&maintenance, tenant, press.id).await,
            EquipmentStatus::OutOfService
        );
    }

    #[tokio::test]
    async fn completing_the_last_order_restores_equipment() {
        let maintenance = MaintenanceService::new();
        let tenant = Uuid::new_v4();
        let press = maintenance.create_equipment(tenant, press(None)).await.unwrap();
        let first = maintenance
            .create_work_order(tenant, work(press.id, WorkKind::Corrective, Priority::High, 0))
            .await
            .unwrap();
        let second = maintenance
            .create_work_order(tenant, work(press.id, WorkKind::Preventive, Priority::Low, 0))
            .await
            .unwrap();

        let done = maintenance
            .update_work_order(
                tenant,
                WorkOrderUpdate {
                    id: first.id,
                    status: WorkStatus::Completed,
                    cost_cents: Some(45_000),
                },
            )
            .await
            .unwrap();
        assert!(done.completed_at.is_some());
        assert_eq!(done.cost_cents, 45_000);
        assert_eq!(
            status_of(&maintenance, tenant, press.id).await,
            EquipmentStatus::UnderMaintenance
        );

        maintenance
            .update_work_order(tenant, moved(second.id, WorkStatus::Cancelled))
            .await
            .unwrap();
        let restored = maintenance
            .equipment(tenant, &EquipmentFilter::default())
            .await
            .remove(0);
        assert_eq!(restored.status, EquipmentStatus::Operational);
        assert_eq!(restored.last_service_date, Some(Utc::now().date_naive()));

        assert!(matches!(
            maintenance
                .update_work_order(tenant, moved(first.id, WorkStatus::Open))
                .await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn equipment_with_open_orders_cannot_be_deleted() {
        let maintenance = MaintenanceService::new();
        let tenant = Uuid::new_v4();
        let press = maintenance.create_equipment(tenant, press(None)).await.unwrap();
        let order = maintenance
            .create_work_order(tenant, work(press.id, WorkKind::Corrective, Priority::Low, 0))
            .await
            .unwrap();
        assert!(maintenance.delete_equipment(tenant, press.id).await.is_err());
        maintenance
            .update_work_order(tenant, moved(order.id, WorkStatus::Completed))
            .await
            .unwrap();
        maintenance.delete_equipment(tenant, press.id).await.unwrap();
        assert!(maintenance
            .equipment(tenant, &EquipmentFilter::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn metrics_count_due_service_and_costs() {
        let maintenance = MaintenanceService::new();
        let tenant = Uuid::new_v4();
        let today = Utc::now().date_naive();
        let overdue = maintenance
            .create_equipment(tenant, press(Some(today - Duration::days(3))))
            .await
            .unwrap();
        maintenance
            .create_equipment(tenant, press(Some(today + Duration::days(30))))
            .await
            .unwrap();

        let done = maintenance
            .create_work_order(
                tenant,
                work(overdue.id, WorkKind::Preventive, Priority::Medium, 12_000),
            )
            .await
            .unwrap();
        maintenance
            .update_work_order(tenant, moved(done.id, WorkStatus::Completed))
            .await
            .unwrap();
        maintenance
            .create_work_order(
                tenant,
                work(overdue.id, WorkKind::Corrective, Priority::Critical, 8_000),
            )
            .await
            .unwrap();

        let metrics = maintenance.metrics(tenant).await;
        assert_eq!(metrics.total_equipment, 2);
        assert_eq!(metrics.operational, 1);
        assert_eq!(metrics.out_of_service, 1);
        assert_eq!(metrics.service_due, 1);
        assert_eq!(metrics.open_work_orders, 1);
        assert_eq!(metrics.critical_open, 1);
        assert_eq!(metrics.total_cost_cents, 12_000);
        assert_eq!(metrics.preventive_ratio, 50.0);
    }
}
