//! Quality module: inspections and non-conformance reports.

use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{Action, ApiError, ApiResult, Module, Reply, StatusChange, reply, validate};
use platform_store::{Collection, record, stats};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub id: Uuid,
    pub company_id: Uuid,
    pub reference: String,
    pub inspector: String,
    pub items_checked: u32,
    pub defects_found: u32,
    pub status: InspectionStatus,
    pub inspected_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionStatus {
    Scheduled,
    Passed,
    Failed,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NonConformance {
    pub id: Uuid,
    pub company_id: Uuid,
    pub inspection_id: Option<Uuid>,
    pub description: String,
    pub severity: Severity,
    pub status: NcStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NcStatus {
    Open,
    Investigating,
    Closed,
}

record!(Inspection, "inspection");
record!(NonConformance, "non-conformance");

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInspection {
    pub reference: String,
    pub inspector: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionResult {
    pub id: Uuid,
    pub items_checked: u32,
    pub defects_found: u32,
    /// Defects tolerated before the inspection fails.
    #[serde(default)]
    pub acceptable_defects: u32,
    pub inspected_on: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNonConformance {
    pub inspection_id: Option<Uuid>,
    pub description: String,
    pub severity: Severity,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionFilter {
    pub status: Option<InspectionStatus>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonConformanceFilter {
    pub severity: Option<Severity>,
    pub status: Option<NcStatus>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub total_inspections: usize,
    pub pass_rate: f64,
    pub defect_rate: f64,
    pub open_non_conformances: usize,
    pub critical_open: usize,
}

#[derive(Clone, Default)]
pub struct QualityService {
    inspections: Collection<Inspection>,
    non_conformances: Collection<NonConformance>,
}

impl QualityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn schedule_inspection(
        &self,
        tenant: Uuid,
        input: NewInspection,
    ) -> ApiResult<Inspection> {
        let inspection = Inspection {
            id: Uuid::new_v4(),
            company_id: tenant,
            reference: validate::text("reference", &input.reference)?,
            inspector: validate::text("inspector", &input.inspector)?,
            items_checked: 0,
            defects_found: 0,
            status: InspectionStatus::Scheduled,
            inspected_on: None,
            created_at: Utc::now(),
        };
        let inspection = self.inspections.insert(inspection).await;
        info!(
            inspection_id = %inspection.id,
            reference = %inspection.reference,
            "inspection scheduled"
        );
        Ok(inspection)
    }

    pub async fn inspections(&self, tenant: Uuid, filter: &InspectionFilter) -> Vec<Inspection> {
        self.inspections
            .list(tenant, |i| filter.status.is_none_or(|s| i.status == s))
            .await
    }

    pub async fn record_result(
        &self,
        tenant: Uuid,
        result: InspectionResult,
    ) -> ApiResult<Inspection> {
        if result.defects_found > result.items_checked {
            return Err(ApiError::invalid(
                "defectsFound must not exceed itemsChecked",
            ));
        }
        let status = if result.defects_found <= result.acceptable_defects {
            InspectionStatus::Passed
        } else {
            InspectionStatus::Failed
        };
        let inspection = self
            .inspections
            .update(tenant, result.id, |i| {
                i.items_checked = result.items_checked;
                i.defects_found = result.defects_found;
                i.status = status;
                let day = result.inspected_on.unwrap_or_else(|| Utc::now().date_naive());
                i.inspected_on = Some(day);
            })
            .await?;
        if status == InspectionStatus::Failed {
            warn!(
                inspection_id = %inspection.id,
                defects = inspection.defects_found,
                "inspection failed"
            );
        } else {
            info!(inspection_id = %inspection.id, "inspection passed");
        }
        Ok(inspection)
    }

    pub async fn raise_non_conformance(
        &self,
        tenant: Uuid,
        input: NewNonConformance,
    ) -> ApiResult<NonConformance> {
        let description = validate::text("description", &input.description)?;
        if let Some(inspection_id) = input.inspection_id {
            self.inspections.find(tenant, inspection_id).await?;
        }
        let report = NonConformance {
            id: Uuid::new_v4(),
            company_id: tenant,
            inspection_id: input.inspection_id,
            description,
            severity: input.severity,
            status: NcStatus::Open,
            created_at: Utc::now(),
        };
        let report = self.non_conformances.insert(report).await;
        info!(
            non_conformance_id = %report.id,
            severity = ?report.severity,
            "non-conformance raised"
        );
        Ok(report)
    }

    pub async fn non_conformances(
        &self,
        tenant: Uuid,
        filter: &NonConformanceFilter,
    ) -> Vec<NonConformance> {
        self.non_conformances
            .list(tenant, |nc| {
                filter.severity.is_none_or(|s| nc.severity == s)
                    && filter.status.is_none_or(|s| nc.status == s)
            })
            .await
    }

    pub async fn update_non_conformance_status(
        &self,
        tenant: Uuid,
        change: StatusChange<NcStatus>,
    ) -> ApiResult<NonConformance> {
        let report = self
            .non_conformances
            .update(tenant, change.id, |nc| nc.status = change.status)
            .await?;
        info!(non_conformance_id = %report.id, status = ?report.status, "non-conformance updated");
        Ok(report)
    }

    pub async fn metrics(&self, tenant: Uuid) -> QualityMetrics {
        let inspections = self.inspections.all(tenant).await;
        let reports = self.non_conformances.all(tenant).await;
        let completed: Vec<&Inspection> = inspections
            .iter()
            .filter(|i| i.status != InspectionStatus::Scheduled)
            .collect();
        let passed = completed
            .iter()
            .filter(|i| i.status == InspectionStatus::Passed)
            .count();
        let items: u64 = completed.iter().map(|i| u64::from(i.items_checked)).sum();
        let defects: u64 = completed.iter().map(|i| u64::from(i.defects_found)).sum();
        let open = |nc: &&NonConformance| nc.status != NcStatus::Closed;

        QualityMetrics {
            total_inspections: inspections.len(),
            pass_rate: stats::percentage(passed, completed.len()),
            defect_rate: stats::ratio_percent(defects as f64, items as f64),
            open_non_conformances: reports.iter().filter(open).count(),
            critical_open: reports
                .iter()
                .filter(open)
                .filter(|nc| nc.severity == Severity::Critical)
                .count(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum QualityQuery {
    Metrics,
    ListInspections(InspectionFilter),
    ListNonConformances(NonConformanceFilter),
}

impl Action for QualityQuery {
    fn name(&self) -> &'static str {
        match self {
            QualityQuery::Metrics => "metrics",
            QualityQuery::ListInspections(_) => "listInspections",
            QualityQuery::ListNonConformances(_) => "listNonConformances",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum QualityCommand {
    ScheduleInspection(NewInspection),
    RecordInspectionResult(InspectionResult),
    RaiseNonConformance(NewNonConformance),
    UpdateNonConformanceStatus(StatusChange<NcStatus>),
}

impl Action for QualityCommand {
    fn name(&self) -> &'static str {
        match self {
            QualityCommand::ScheduleInspection(_) => "scheduleInspection",
            QualityCommand::RecordInspectionResult(_) => "recordInspectionResult",
            QualityCommand::RaiseNonConformance(_) => "raiseNonConformance",
            QualityCommand::UpdateNonConformanceStatus(_) => "updateNonConformanceStatus",
        }
    }
}

impl Module for QualityService {
    const NAME: &'static str = "quality";

    type Query = QualityQuery;
    type Command = QualityCommand;

    async fn query(&self, tenant: Uuid, query: QualityQuery) -> ApiResult<Reply> {
        match query {
            QualityQuery::Metrics => reply(&self.metrics(tenant).await),
            QualityQuery::ListInspections(filter) => {
                reply(&self.inspections(tenant, &filter).await)
            }
            QualityQuery::ListNonConformances(filter) => {
                reply(&self.non_conformances(tenant, &filter).await)
            }
        }
    }

    async fn command(&self, tenant: Uuid, command: QualityCommand) -> ApiResult<Reply> {
        match command {
            QualityCommand::ScheduleInspection(input) => {
                Reply::created(&self.schedule_inspection(tenant, input).await?)
            }
            QualityCommand::RecordInspectionResult(result) => {
                reply(&self.record_result(tenant, result).await?)
            }
            QualityCommand::RaiseNonConformance(input) => {
                Reply::created(&self.raise_non_conformance(tenant, input).await?)
            }
            QualityCommand::UpdateNonConformanceStatus(change) => {
                reply(&self.update_non_conformance_status(tenant, change).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scheduled(quality: &QualityService, tenant: Uuid) -> Inspection {
        quality
            .schedule_inspection(
                tenant,
                NewInspection {
                    reference: "LOT-2041".into(),
                    inspector: "Mira".into(),
                },
            )
            .await
            .unwrap()
    }

    fn result(id: Uuid, items_checked: u32, defects_found: u32) -> InspectionResult {
        InspectionResult {
            id,
            items_checked,
            defects_found,
            acceptable_defects: 0,
            inspected_on: None,
        }
    }

    #[tokio::test]
    async fn results_decide_pass_or_fail() {
        let quality = QualityService::new();
        let tenant = Uuid::new_v4();
        let clean = scheduled(&quality, tenant).await;
        let dirty = scheduled(&quality, tenant).await;
        let tolerated = scheduled(&quality, tenant).await;

        let clean = quality.record_result(tenant, result(clean.id, 50, 0)).await.unwrap();
        assert_eq!(clean.status, InspectionStatus::Passed);
        assert!(clean.inspected_on.is_some());

        let dirty = quality.record_result(tenant, result(dirty.id, 50, 2)).await.unwrap();
        assert_eq!(dirty.status, InspectionStatus::Failed);

        let tolerated = quality
            .record_result(
                tenant,
                InspectionResult {
                    acceptable_defects: 3,
                    ..result(tolerated.id, 100, 3)
                },
            )
            .await
            .unwrap();
        assert_eq!(tolerated.status, InspectionStatus::Passed);
    }

    #[tokio::test]
    async fn defects_cannot_exceed_items() {
        let quality = QualityService::new();
        let tenant = Uuid::new_v4();
        let inspection = scheduled(&quality, tenant).await;
        assert!(matches!(
            quality.record_result(tenant, result(inspection.id, 2, 5)).await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            quality.record_result(tenant, result(Uuid::new_v4(), 2, 1)).await,
            Err(ApiError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn non_conformance_must_reference_a_known_inspection() {
        let quality = QualityService::new();
        let tenant = Uuid::new_v4();
        let missing = quality
            .raise_non_conformance(
                tenant,
                NewNonConformance {
                    inspection_id: Some(Uuid::new_v4()),
                    description: "Burrs on edge".into(),
                    severity: Severity::Minor,
                },
            )
            .await;
        assert!(matches!(missing, Err(ApiError::NotFound { .. })));
    }

    #[tokio::test]
    async fn metrics_cover_rates_and_open_reports() {
        let quality = QualityService::new();
        let tenant = Uuid::new_v4();
        let a = scheduled(&quality, tenant).await;
        let b = scheduled(&quality, tenant).await;
        scheduled(&quality, tenant).await;
        quality.record_result(tenant, result(a.id, 80, 0)).await.unwrap();
        quality.record_result(tenant, result(b.id, 20, 5)).await.unwrap();

        let critical = quality
            .raise_non_conformance(
                tenant,
                NewNonConformance {
                    inspection_id: Some(b.id),
                    description: "Weld cracks".into(),
                    severity: Severity::Critical,
                },
            )
            .await
            .unwrap();
        let minor = quality
            .raise_non_conformance(
                tenant,
                NewNonConformance {
                    inspection_id: None,
                    description: "Label misprint".into(),
                    severity: Severity::Minor,
                },
            )
            .await
            .unwrap();
        quality
            .update_non_conformance_status(
                tenant,
                StatusChange {
                    id: minor.id,
                    status: NcStatus::Closed,
                },
            )
            .await
            .unwrap();

        let metrics = quality.metrics(tenant).await;
        assert_eq!(metrics.total_inspections, 3);
        assert_eq!(metrics.pass_rate, 50.0);
        assert_eq!(metrics.defect_rate, 5.0);
        assert_eq!(metrics.open_non_conformances, 1);
        assert_eq!(metrics.critical_open, 1);
        assert_eq!(
            quality
                .non_conformances(
                    tenant,
                    &NonConformanceFilter {
                        severity: Some(Severity::Critical),
                        status: None,
                    },
                )
                .await[0]
                .id,
            critical.id
        );
    }
}
