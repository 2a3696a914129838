//! Logistics module: outbound shipments and the delivery fleet.

use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{Action, ApiError, ApiResult, Module, Reply, StatusChange, reply, validate};
use platform_store::{Collection, record, stats};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

const TRACKING_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub tracking_number: String,
    pub origin: String,
    pub destination: String,
    pub carrier: String,
    pub weight_kg: f64,
    pub cost_cents: i64,
    pub status: ShipmentStatus,
    pub ship_date: NaiveDate,
    pub estimated_delivery: NaiveDate,
    pub delivered_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Shipment {
    pub fn on_time(&self) -> bool {
        self.delivered_on
            .is_some_and(|day| day <= self.estimated_delivery)
    }
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    InTransit,
    Delivered,
    Delayed,
    Cancelled,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Uuid,
    pub company_id: Uuid,
    pub plate: String,
    pub capacity_kg: f64,
    pub status: VehicleStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    Available,
    InUse,
    Maintenance,
}

record!(Shipment, "shipment");
record!(Vehicle, "vehicle");

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShipment {
    pub origin: String,
    pub destination: String,
    pub carrier: String,
    pub weight_kg: f64,
    #[serde(default)]
    pub cost_cents: i64,
    pub ship_date: NaiveDate,
    pub estimated_delivery: NaiveDate,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentUpdate {
    pub id: Uuid,
    pub status: ShipmentStatus,
    /// Delivery date when `status` is `DELIVERED`; defaults to today.
    pub delivered_on: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    pub plate: String,
    pub capacity_kg: f64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
    pub carrier: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracking {
    pub tracking_number: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleFilter {
    pub status: Option<VehicleStatus>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogisticsMetrics {
    pub total_shipments: usize,
    pub in_transit: usize,
    pub delivered: usize,
    pub delayed: usize,
    pub on_time_rate: f64,
    pub freight_cost_cents: i64,
    pub total_weight_kg: f64,
    pub fleet_size: usize,
    pub fleet_availability: f64,
}

fn tracking_number() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..10)
        .map(|_| TRACKING_ALPHABET[rng.gen_range(0..TRACKING_ALPHABET.len())] as char)
        .collect();
    format!("TRK{suffix}")
}

#[derive(Clone, Default)]
pub struct LogisticsService {
    shipments: Collection<Shipment>,
    vehicles: Collection<Vehicle>,
}

impl LogisticsService {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(name = "logistics.create_shipment", skip_all, fields(%tenant))]
    pub async fn create_shipment(&self, tenant: Uuid, input: NewShipment) -> ApiResult<Shipment> {
        if input.estimated_delivery < input.ship_date {
            return Err(ApiError::invalid(
                "estimatedDelivery must not be before shipDate",
            ));
        }
        if !(input.weight_kg > 0.0) {
            return Err(ApiError::invalid("weightKg must be positive"));
        }
        let shipment = Shipment {
            id: Uuid::new_v4(),
            company_id: tenant,
            tracking_number: tracking_number(),
            origin: validate::text("origin", &input.origin)?,
            destination: validate::text("destination", &input.destination)?,
            carrier: validate::text("carrier", &input.carrier)?,
            weight_kg: input.weight_kg,
            cost_cents: validate::non_negative("costCents", input.cost_cents)?,
            status: ShipmentStatus::Pending,
            ship_date: input.ship_date,
            estimated_delivery: input.estimated_delivery,
            delivered_on: None,
            created_at: Utc::now(),
        };
        let shipment = self.shipments.insert(shipment).await;
        info!(
            shipment_id = %shipment.id,
            tracking = %shipment.tracking_number,
            "shipment created"
        );
        Ok(shipment)
    }

    pub async fn shipments(&self, tenant: Uuid, filter: &ShipmentFilter) -> Vec<Shipment> {
        self.shipments
            .list(tenant, |s| {
                filter.status.is_none_or(|status| s.status == status)
                    && filter
                        .carrier
                        .as_deref()
                        .is_none_or(|carrier| s.carrier.eq_ignore_ascii_case(carrier))
            })
            .await
    }

    pub async fn track(&self, tenant: Uuid, tracking_number: &str) -> ApiResult<Shipment> {
        let wanted = tracking_number.trim().to_uppercase();
        self.shipments
            .list(tenant, |s| s.tracking_number == wanted)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found("shipment", wanted))
    }

    pub async fn update_shipment_status(
        &self,
        tenant: Uuid,
        update: ShipmentUpdate,
    ) -> ApiResult<Shipment> {
        let today = Utc::now().date_naive();
        let shipment = self
            .shipments
            .update(tenant, update.id, |s| {
                s.status = update.status;
                s.delivered_on = match update.status {
                    ShipmentStatus::Delivered => Some(update.delivered_on.unwrap_or(today)),
                    _ => None,
                };
            })
            .await?;
        if shipment.status == ShipmentStatus::Delayed {
            warn!(
                shipment_id = %shipment.id,
                tracking = %shipment.tracking_number,
                "shipment delayed"
            );
        } else {
            info!(shipment_id = %shipment.id, status = ?shipment.status, "shipment updated");
        }
        Ok(shipment)
    }

    pub async fn register_vehicle(&self, tenant: Uuid, input: NewVehicle) -> ApiResult<Vehicle> {
        if !(input.capacity_kg > 0.0) {
            return Err(ApiError::invalid("capacityKg must be positive"));
        }
        let plate = validate::text("plate", &input.plate)?.to_uppercase();
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            company_id: tenant,
            plate: plate.clone(),
            capacity_kg: input.capacity_kg,
            status: VehicleStatus::Available,
            created_at: Utc::now(),
        };
        let vehicle = self
            .vehicles
            .insert_unique(vehicle, |v| v.plate == plate)
            .await
            .map_err(|_| ApiError::invalid(format!("plate {plate} already registered")))?;
        info!(vehicle_id = %vehicle.id, plate = %vehicle.plate, "vehicle registered");
        Ok(vehicle)
    }

    pub async fn vehicles(&self, tenant: Uuid, filter: &VehicleFilter) -> Vec<Vehicle> {
        self.vehicles
            .list(tenant, |v| filter.status.is_none_or(|s| v.status == s))
            .await
    }

    pub async fn update_vehicle_status(
        &self,
        tenant: Uuid,
        change: StatusChange<VehicleStatus>,
    ) -> ApiResult<Vehicle> {
        let vehicle = self
            .vehicles
            .update(tenant, change.id, |v| v.status = change.status)
            .await?;
        info!(vehicle_id = %vehicle.id, status = ?vehicle.status, "vehicle updated");
        Ok(vehicle)
    }

    pub async fn metrics(&self, tenant: Uuid) -> LogisticsMetrics {
        let shipments = self.shipments.all(tenant).await;
        let vehicles = self.vehicles.all(tenant).await;
        let count =
            |status: ShipmentStatus| shipments.iter().filter(|s| s.status == status).count();
        let delivered = count(ShipmentStatus::Delivered);
        let live: Vec<&Shipment> = shipments
            .iter()
            .filter(|s| s.status != ShipmentStatus::Cancelled)
            .collect();

        LogisticsMetrics {
            total_shipments: shipments.len(),
            in_transit: count(ShipmentStatus::InTransit),
            delivered,
            delayed: count(ShipmentStatus::Delayed),
            on_time_rate: stats::percentage(
                shipments.iter().filter(|s| s.on_time()).count(),
                delivered,
            ),
            freight_cost_cents: stats::cents(live.iter().map(|s| s.cost_cents)),
            total_weight_kg: stats::round2(live.iter().map(|s| s.weight_kg).sum()),
            fleet_size: vehicles.len(),
            fleet_availability: stats::percentage(
                vehicles
                    .iter()
                    .filter(|v| v.status == VehicleStatus::Available)
                    .count(),
                vehicles.len(),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum LogisticsQuery {
    Metrics,
    ListShipments(ShipmentFilter),
    TrackShipment(Tracking),
    ListVehicles(VehicleFilter),
}

impl Action for LogisticsQuery {
    fn name(&self) -> &'static str {
        match self {
            LogisticsQuery::Metrics => "metrics",
            LogisticsQuery::ListShipments(_) => "listShipments",
            LogisticsQuery::TrackShipment(_) => "trackShipment",
            LogisticsQuery::ListVehicles(_) => "listVehicles",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum LogisticsCommand {
    CreateShipment(NewShipment),
    UpdateShipmentStatus(ShipmentUpdate),
    RegisterVehicle(NewVehicle),
    UpdateVehicleStatus(StatusChange<VehicleStatus>),
}

impl Action for LogisticsCommand {
    fn name(&self) -> &'static str {
        match self {
            LogisticsCommand::CreateShipment(_) => "createShipment",
            LogisticsCommand::UpdateShipmentStatus(_) => "updateShipmentStatus",
            LogisticsCommand::RegisterVehicle(_) => "registerVehicle",
            LogisticsCommand::UpdateVehicleStatus(_) => "updateVehicleStatus",
        }
    }
}

impl Module for LogisticsService {
    const NAME: &'static str = "logistics";

    type Query = LogisticsQuery;
    type Command = LogisticsCommand;

    async fn query(&self, tenant: Uuid, query: LogisticsQuery) -> ApiResult<Reply> {
        match query {
            LogisticsQuery::Metrics => reply(&self.metrics(tenant).await),
            LogisticsQuery::ListShipments(filter) => reply(&self.shipments(tenant, &filter).await),
            LogisticsQuery::TrackShipment(Tracking { tracking_number }) => {
                reply(&self.track(tenant, &tracking_number).await?)
            }
            LogisticsQuery::ListVehicles(filter) => reply(&self.vehicles(tenant, &filter).await),
        }
    }

    async fn command(&self, tenant: Uuid, command: LogisticsCommand) -> ApiResult<Reply> {
        match command {
            LogisticsCommand::CreateShipment(input) => {
                Reply::created(&self.create_shipment(tenant, input).await?)
            }
            LogisticsCommand::UpdateShipmentStatus(update) => {
                reply(&self.update_shipment_status(tenant, update).await?)
            }
            LogisticsCommand::RegisterVehicle(input) => {
                Reply::created(&self.register_vehicle(tenant, input).await?)
            }
            LogisticsCommand::UpdateVehicleStatus(change) => {
                reply(&self.update_vehicle_status(tenant, change).await?)
            }
        }
    }
}
