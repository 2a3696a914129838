//! Fixed asset register with straight-line and double declining balance
//! depreciation.
//!
//! Schedules are computed on demand from the purchase data; nothing about
//! depreciation is stored on the asset itself.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{Action, ApiError, ApiResult, ById, Module, Reply, reply, validate};
use platform_store::{Collection, record};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FixedAsset {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub category: String,
    pub purchase_date: NaiveDate,
    pub cost_cents: i64,
    pub salvage_value_cents: i64,
    pub useful_life_years: u32,
    pub method: DepreciationMethod,
    pub status: AssetStatus,
    pub disposed_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepreciationMethod {
    StraightLine,
    DecliningBalance,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Active,
    Disposed,
}

record!(FixedAsset, "asset");

#[derive(Copy, Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    pub year: u32,
    pub opening_cents: i64,
    pub depreciation_cents: i64,
    pub closing_cents: i64,
}

/// Longest useful life accepted at registration.
pub const MAX_USEFUL_LIFE_YEARS: u32 = 100;

impl FixedAsset {
    /// Year-by-year depreciation over the useful life. The last row always
    /// closes at the salvage value.
    pub fn schedule(&self) -> Vec<ScheduleRow> {
        self.rows().collect()
    }

    fn rows(&self) -> impl Iterator<Item = ScheduleRow> + '_ {
        let life = self.useful_life_years.max(1);
        let depreciable = self.cost_cents - self.salvage_value_cents;
        let mut opening = self.cost_cents;

        (1..=life).map(move |year| {
            let planned = match self.method {
                DepreciationMethod::StraightLine => depreciable / i64::from(life),
                DepreciationMethod::DecliningBalance => {
                    (opening as f64 * 2.0 / f64::from(life)).round() as i64
                }
            };
            let floor = opening - self.salvage_value_cents;
            let depreciation = if year == life { floor } else { planned.min(floor) };
            let row = ScheduleRow {
                year,
                opening_cents: opening,
                depreciation_cents: depreciation,
                closing_cents: opening - depreciation,
            };
            opening = row.closing_cents;
            row
        })
    }

    /// Carrying value on `as_of`: cost until the first anniversary, then the
    /// closing value of the last completed year.
    pub fn book_value(&self, as_of: NaiveDate) -> i64 {
        let years = as_of.years_since(self.purchase_date).unwrap_or(0);
        if years == 0 {
            return self.cost_cents;
        }
        if years >= self.useful_life_years {
            return self.salvage_value_cents;
        }
        self.rows()
            .nth(years as usize - 1)
            .map_or(self.salvage_value_cents, |row| row.closing_cents)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub name: String,
    pub category: String,
    pub purchase_date: NaiveDate,
    pub cost_cents: i64,
    #[serde(default)]
    pub salvage_value_cents: i64,
    pub useful_life_years: u32,
    pub method: DepreciationMethod,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disposal {
    pub id: Uuid,
    pub disposed_on: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFilter {
    pub category: Option<String>,
    pub status: Option<AssetStatus>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsOf {
    pub as_of: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookValueQuery {
    pub id: Uuid,
    pub as_of: Option<NaiveDate>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookValue {
    pub asset_id: Uuid,
    pub as_of: NaiveDate,
    pub book_value_cents: i64,
    pub accumulated_depreciation_cents: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub asset_id: Uuid,
    pub method: DepreciationMethod,
    pub rows: Vec<ScheduleRow>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetrics {
    pub as_of: Option<NaiveDate>,
    pub total_assets: usize,
    pub active_assets: usize,
    pub total_cost_cents: i64,
    pub total_book_value_cents: i64,
    pub accumulated_depreciation_cents: i64,
    pub cost_by_category: BTreeMap<String, i64>,
}

#[derive(Clone, Default)]
pub struct AssetService {
    assets: Collection<FixedAsset>,
}

impl AssetService {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(name = "assets.register", skip_all, fields(%tenant))]
    pub async fn register(&self, tenant: Uuid, input: NewAsset) -> ApiResult<FixedAsset> {
        let cost_cents = validate::non_negative("costCents", input.cost_cents)?;
        let salvage_value_cents =
            validate::non_negative("salvageValueCents", input.salvage_value_cents)?;
        if salvage_value_cents > cost_cents {
            return Err(ApiError::invalid(
                "salvageValueCents must not exceed costCents",
            ));
        }
        if !(1..=MAX_USEFUL_LIFE_YEARS).contains(&input.useful_life_years) {
            return Err(ApiError::invalid(format!(
                "usefulLifeYears must be between 1 and {MAX_USEFUL_LIFE_YEARS}"
            )));
        }
        let asset = FixedAsset {
            id: Uuid::new_v4(),
            company_id: tenant,
            name: validate::text("name", &input.name)?,
            category: validate::text("category", &input.category)?,
            purchase_date: input.purchase_date,
            cost_cents,
            salvage_value_cents,
            useful_life_years: input.useful_life_years,
            method: input.method,
            status: AssetStatus::Active,
            disposed_on: None,
            created_at: Utc::now(),
        };
        let asset = self.assets.insert(asset).await;
        info!(asset_id = %asset.id, method = ?asset.method, "asset registered");
        Ok(asset)
    }

    pub async fn assets(&self, tenant: Uuid, filter: &AssetFilter) -> Vec<FixedAsset> {
        self.assets
            .list(tenant, |a| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| a.category.eq_ignore_ascii_case(c))
                    && filter.status.is_none_or(|s| a.status == s)
            })
            .await
    }

    pub async fn schedule(&self, tenant: Uuid, id: Uuid) -> ApiResult<Schedule> {
        let asset = self.assets.find(tenant, id).await?;
        Ok(Schedule {
            asset_id: asset.id,
            method: asset.method,
            rows: asset.schedule(),
        })
    }

    pub async fn book_value(
        &self,
        tenant: Uuid,
        id: Uuid,
        as_of: Option<NaiveDate>,
    ) -> ApiResult<BookValue> {
        let asset = self.assets.find(tenant, id).await?;
        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
        let value = asset.book_value(as_of);
        Ok(BookValue {
            asset_id: asset.id,
            as_of,
            book_value_cents: value,
            accumulated_depreciation_cents: asset.cost_cents - value,
        })
    }

    pub async fn dispose(&self, tenant: Uuid, disposal: Disposal) -> ApiResult<FixedAsset> {
        let today = Utc::now().date_naive();
        let asset = self
            .assets
            .try_update(tenant, disposal.id, |a| {
                if a.status == AssetStatus::Disposed {
                    return Err(ApiError::invalid("asset already disposed"));
                }
                let day = disposal.disposed_on.unwrap_or(today);
                if day < a.purchase_date {
                    return Err(ApiError::invalid(
                        "disposedOn must not be before purchaseDate",
                    ));
                }
                a.status = AssetStatus::Disposed;
                a.disposed_on = Some(day);
                Ok(())
            })
            .await?;
        info!(asset_id = %asset.id, "asset disposed");
        Ok(asset)
    }

    pub async fn metrics(&self, tenant: Uuid, as_of: Option<NaiveDate>) -> AssetMetrics {
        let assets = self.assets.all(tenant).await;
        let day = as_of.unwrap_or_else(|| Utc::now().date_naive());
        let active: Vec<&FixedAsset> = assets
            .iter()
            .filter(|a| a.status == AssetStatus::Active)
            .collect();

        let mut metrics = AssetMetrics {
            as_of,
            total_assets: assets.len(),
            active_assets: active.len(),
            ..AssetMetrics::default()
        };
        for asset in active {
            let value = asset.book_value(day);
            metrics.total_cost_cents = metrics.total_cost_cents.saturating_add(asset.cost_cents);
            metrics.total_book_value_cents = metrics.total_book_value_cents.saturating_add(value);
            metrics.accumulated_depreciation_cents = metrics
                .accumulated_depreciation_cents
                .saturating_add(asset.cost_cents - value);
            let by_category = metrics
                .cost_by_category
                .entry(asset.category.clone())
                .or_default();
            *by_category = by_category.saturating_add(asset.cost_cents);
        }
        metrics
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AssetQuery {
    Metrics(AsOf),
    ListAssets(AssetFilter),
    DepreciationSchedule(ById),
    BookValue(BookValueQuery),
}

impl Action for AssetQuery {
    fn name(&self) -> &'static str {
        match self {
            AssetQuery::Metrics(_) => "metrics",
            AssetQuery::ListAssets(_) => "listAssets",
            AssetQuery::DepreciationSchedule(_) => "depreciationSchedule",
            AssetQuery::BookValue(_) => "bookValue",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AssetCommand {
    RegisterAsset(NewAsset),
    DisposeAsset(Disposal),
}

impl Action for AssetCommand {
    fn name(&self) -> &'static str {
        match self {
            AssetCommand::RegisterAsset(_) => "registerAsset",
            AssetCommand::DisposeAsset(_) => "disposeAsset",
        }
    }

    fn is_destructive(&self) -> bool {
        matches!(self, AssetCommand::DisposeAsset(_))
    }
}

impl Module for AssetService {
    const NAME: &'static str = "assets";

    type Query = AssetQuery;
    type Command = AssetCommand;

    async fn query(&self, tenant: Uuid, query: AssetQuery) -> ApiResult<Reply> {
        match query {
            AssetQuery::Metrics(AsOf { as_of }) => reply(&self.metrics(tenant, as_of).await),
            AssetQuery::ListAssets(filter) => reply(&self.assets(tenant, &filter).await),
            AssetQuery::DepreciationSchedule(ById { id }) => {
                reply(&self.schedule(tenant, id).await?)
            }
            AssetQuery::BookValue(BookValueQuery { id, as_of }) => {
                reply(&self.book_value(tenant, id, as_of).await?)
            }
        }
    }

    async fn command(&self, tenant: Uuid, command: AssetCommand) -> ApiResult<Reply> {
        match command {
            AssetCommand::RegisterAsset(input) => {
                Reply::created(&self.register(tenant, input).await?)
            }
            AssetCommand::DisposeAsset(disposal) => reply(&self.dispose(tenant, disposal).await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lathe(method: DepreciationMethod) -> NewAsset {
        NewAsset {
            name: "CNC lathe".into(),
            category: "Machinery".into(),
            purchase_date: date(2020, 1, 15),
            cost_cents: 1_000_000,
            salvage_value_cents: 100_000,
            useful_life_years: 5,
            method,
        }
    }

    #[tokio::test]
    async fn straight_line_spreads_evenly() {
        let assets = AssetService::new();
        let tenant = Uuid::new_v4();
        let asset = assets
            .register(tenant, lathe(DepreciationMethod::StraightLine))
            .await
            .unwrap();
        let schedule = assets.schedule(tenant, asset.id).await.unwrap();

        assert_eq!(schedule.rows.len(), 5);
        assert!(schedule.rows.iter().all(|r| r.depreciation_cents == 180_000));
        assert_eq!(schedule.rows[0].closing_cents, 820_000);
        assert_eq!(schedule.rows[4].closing_cents, 100_000);
    }

    #[tokio::test]
    async fn declining_balance_front_loads_and_stops_at_salvage() {
        let assets = AssetService::new();
        let tenant = Uuid::new_v4();
        let asset = assets
            .register(tenant, lathe(DepreciationMethod::DecliningBalance))
            .await
            .unwrap();
        let rows = assets.schedule(tenant, asset.id).await.unwrap().rows;

        let depreciation: Vec<i64> = rows.iter().map(|r| r.depreciation_cents).collect();
        assert_eq!(depreciation, vec![400_000, 240_000, 144_000, 86_400, 29_600]);
        assert_eq!(rows[4].closing_cents, 100_000);
        assert!(rows.iter().all(|r| r.closing_cents >= 100_000));
    }

    #[tokio::test]
    async fn book_value_follows_completed_years() {
        let assets = AssetService::new();
        let tenant = Uuid::new_v4();
        let asset = assets
            .register(tenant, lathe(DepreciationMethod::StraightLine))
            .await
            .unwrap();
        let at = |day| asset.book_value(day);

        assert_eq!(at(date(2020, 6, 1)), 1_000_000);
        assert_eq!(at(date(2021, 1, 14)), 1_000_000);
        assert_eq!(at(date(2021, 1, 15)), 820_000);
        assert_eq!(at(date(2023, 3, 1)), 460_000);
        assert_eq!(at(date(2030, 1, 1)), 100_000);
        assert_eq!(at(date(2019, 1, 1)), 1_000_000);

        let value = assets
            .book_value(tenant, asset.id, Some(date(2022, 2, 1)))
            .await
            .unwrap();
        assert_eq!(value.book_value_cents, 640_000);
        assert_eq!(value.accumulated_depreciation_cents, 360_000);
    }

    #[tokio::test]
    async fn registration_rejects_impossible_values() {
        let assets = AssetService::new();
        let tenant = Uuid::new_v4();
        let mut salvage_too_high = lathe(DepreciationMethod::StraightLine);
        salvage_too_high.salvage_value_cents = 2_000_000;
        let mut no_life = lathe(DepreciationMethod::StraightLine);
        no_life.useful_life_years = 0;
        let mut endless = lathe(DepreciationMethod::DecliningBalance);
        endless.useful_life_years = u32::MAX;

        for input in [salvage_too_high, no_life, endless] {
            assert!(matches!(
                assets.register(tenant, input).await,
                Err(ApiError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn longest_life_is_accepted() {
        let assets = AssetService::new();
        let tenant = Uuid::new_v4();
        let mut building = lathe(DepreciationMethod::StraightLine);
        building.useful_life_years = MAX_USEFUL_LIFE_YEARS;
        building.salvage_value_cents = 0;
        let asset = assets.register(tenant, building).await.unwrap();

        let rows = assets.schedule(tenant, asset.id).await.unwrap().rows;
        assert_eq!(rows.len(), 100);
        assert_eq!(rows[99].closing_cents, 0);
        assert_eq!(asset.book_value(date(2022, 1, 15)), 980_000);
    }

    #[tokio::test]
    async fn disposal_is_final_and_leaves_metrics() {
        let assets = AssetService::new();
        let tenant = Uuid::new_v4();
        let lathe_sl = assets
            .register(tenant, lathe(DepreciationMethod::StraightLine))
            .await
            .unwrap();
        let mut van = lathe(DepreciationMethod::StraightLine);
        van.name = "Delivery van".into();
        van.category = "Vehicles".into();
        van.cost_cents = 500_000;
        van.salvage_value_cents = 0;
        let van = assets.register(tenant, van).await.unwrap();

        let disposal = Disposal {
            id: van.id,
            disposed_on: Some(date(2022, 5, 1)),
        };
        assets.dispose(tenant, disposal.clone()).await.unwrap();
        assert!(matches!(
            assets.dispose(tenant, disposal).await,
            Err(ApiError::InvalidInput(_))
        ));

        let metrics = assets.metrics(tenant, Some(date(2021, 2, 1))).await;
        assert_eq!(metrics.total_assets, 2);
        assert_eq!(metrics.active_assets, 1);
        assert_eq!(metrics.total_cost_cents, 1_000_000);
        assert_eq!(metrics.total_book_value_cents, 820_000);
        assert_eq!(metrics.accumulated_depreciation_cents, 180_000);
        assert_eq!(metrics.cost_by_category.get("Machinery"), Some(&1_000_000));
        assert!(!metrics.cost_by_category.contains_key("Vehicles"));
        assert_eq!(lathe_sl.status, AssetStatus::Active);
    }
}
