//! Compliance module: framework controls and audits.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{Action, ApiError, ApiResult, Module, Reply, StatusChange, reply, validate};
use platform_store::{Collection, record, stats};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub id: Uuid,
    pub company_id: Uuid,
    pub framework: String,
    pub reference: String,
    pub title: String,
    pub owner: Option<String>,
    pub status: ControlStatus,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlStatus {
    Compliant,
    NonCompliant,
    InProgress,
    NotApplicable,
}

impl ControlStatus {
    fn is_settled(self) -> bool {
        matches!(self, ControlStatus::Compliant | ControlStatus::NotApplicable)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub framework: String,
    pub auditor: String,
    pub scheduled_for: NaiveDate,
    pub findings: u32,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Planned,
    InProgress,
    Completed,
}

record!(Control, "control");
record!(Audit, "audit");

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewControl {
    pub framework: String,
    pub reference: String,
    pub title: String,
    pub owner: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAudit {
    pub title: String,
    pub framework: String,
    pub auditor: String,
    pub scheduled_for: NaiveDate,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditUpdate {
    pub id: Uuid,
    pub status: AuditStatus,
    /// Findings count, recorded when the audit completes.
    pub findings: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFilter {
    pub framework: Option<String>,
    pub status: Option<ControlStatus>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub status: Option<AuditStatus>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceMetrics {
    pub total_controls: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub overall_score: f64,
    pub score_by_framework: BTreeMap<String, f64>,
    pub overdue_controls: usize,
    pub upcoming_audits: usize,
    pub open_findings: u64,
}

/// Share of applicable controls that are compliant.
pub fn score<'a>(controls: impl IntoIterator<Item = &'a Control>) -> f64 {
    let (compliant, applicable) = controls
        .into_iter()
        .filter(|c| c.status != ControlStatus::NotApplicable)
        .fold((0, 0), |(ok, all), c| {
            (ok + usize::from(c.status == ControlStatus::Compliant), all + 1)
        });
    stats::percentage(compliant, applicable)
}

#[derive(Clone, Default)]
pub struct ComplianceService {
    controls: Collection<Control>,
    audits: Collection<Audit>,
}

impl ComplianceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_control(&self, tenant: Uuid, input: NewControl) -> ApiResult<Control> {
        let control = Control {
            id: Uuid::new_v4(),
            company_id: tenant,
            framework: validate::text("framework", &input.framework)?,
            reference: validate::text("reference", &input.reference)?,
            title: validate::text("title", &input.title)?,
            owner: validate::optional_text(input.owner),
            status: ControlStatus::InProgress,
            due_date: input.due_date,
            created_at: Utc::now(),
        };
        let control = self.controls.insert(control).await;
        info!(control_id = %control.id, framework = %control.framework, "control created");
        Ok(control)
    }

    pub async fn controls(&self, tenant: Uuid, filter: &ControlFilter) -> Vec<Control> {
        self.controls
            .list(tenant, |c| {
                filter
                    .framework
                    .as_deref()
                    .is_none_or(|f| c.framework.eq_ignore_ascii_case(f))
                    && filter.status.is_none_or(|s| c.status == s)
            })
            .await
    }

    pub async fn update_control_status(
        &self,
        tenant: Uuid,
        change: StatusChange<ControlStatus>,
    ) -> ApiResult<Control> {
        let control = self
            .controls
            .update(tenant, change.id, |c| c.status = change.status)
            .await?;
        info!(control_id = %control.id, status = ?control.status, "control updated");
        Ok(control)
    }

    pub async fn schedule_audit(&self, tenant: Uuid, input: NewAudit) -> ApiResult<Audit> {
        let audit = Audit {
            id: Uuid::new_v4(),
            company_id: tenant,
            title: validate::text("title", &input.title)?,
            framework: validate::text("framework", &input.framework)?,
            auditor: validate::text("auditor", &input.auditor)?,
            scheduled_for: input.scheduled_for,
            findings: 0,
            status: AuditStatus::Planned,
            created_at: Utc::now(),
        };
        let audit = self.audits.insert(audit).await;
        info!(audit_id = %audit.id, scheduled_for = %audit.scheduled_for, "audit scheduled");
        Ok(audit)
    }

    pub async fn audits(&self, tenant: Uuid, filter: &AuditFilter) -> Vec<Audit> {
        self.audits
            .list(tenant, |a| filter.status.is_none_or(|s| a.status == s))
            .await
    }

    pub async fn update_audit_status(&self, tenant: Uuid, update: AuditUpdate) -> ApiResult<Audit> {
        let audit = self
            .audits
            .try_update(tenant, update.id, |a| {
                if a.status == AuditStatus::Completed {
                    return Err(ApiError::invalid("audit already completed"));
                }
                a.status = update.status;
                if update.status == AuditStatus::Completed {
                    a.findings = update.findings.unwrap_or(0);
                }
                Ok(())
            })
            .await?;
        info!(
            audit_id = %audit.id,
            status = ?audit.status,
            findings = audit.findings,
            "audit updated"
        );
        Ok(audit)
    }

    pub async fn metrics(&self, tenant: Uuid) -> ComplianceMetrics {
        let controls = self.controls.all(tenant).await;
        let audits = self.audits.all(tenant).await;
        let today = Utc::now().date_naive();

        let mut by_framework: BTreeMap<&str, Vec<&Control>> = BTreeMap::new();
        for control in &controls {
            by_framework
                .entry(control.framework.as_str())
                .or_default()
                .push(control);
        }

        ComplianceMetrics {
            total_controls: controls.len(),
            compliant: controls
                .iter()
                .filter(|c| c.status == ControlStatus::Compliant)
                .count(),
            non_compliant: controls
                .iter()
                .filter(|c| c.status == ControlStatus::NonCompliant)
                .count(),
            overall_score: score(&controls),
            score_by_framework: by_framework
                .into_iter()
                .map(|(framework, group)| (framework.to_string(), score(group)))
                .collect(),
            overdue_controls: controls
                .iter()
                .filter(|c| !c.status.is_settled() && c.due_date.is_some_and(|d| d < today))
                .count(),
            upcoming_audits: audits
                .iter()
                .filter(|a| a.status == AuditStatus::Planned)
                .count(),
            open_findings: audits
                .iter()
                .filter(|a| a.status == AuditStatus::Completed)
                .map(|a| u64::from(a.findings))
                .sum(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ComplianceQuery {
    Metrics,
    ListControls(ControlFilter),
    ListAudits(AuditFilter),
}

impl Action for ComplianceQuery {
    fn name(&self) -> &'static str {
        match self {
            ComplianceQuery::Metrics => "metrics",
            ComplianceQuery::ListControls(_) => "listControls",
            ComplianceQuery::ListAudits(_) => "listAudits",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ComplianceCommand {
    CreateControl(NewControl),
    UpdateControlStatus(StatusChange<ControlStatus>),
    ScheduleAudit(NewAudit),
    UpdateAuditStatus(AuditUpdate),
}

impl Action for ComplianceCommand {
    fn name(&self) -> &'static str {
        match self {
            ComplianceCommand::CreateControl(_) => "createControl",
            ComplianceCommand::UpdateControlStatus(_) => "updateControlStatus",
            ComplianceCommand::ScheduleAudit(_) => "scheduleAudit",
            ComplianceCommand::UpdateAuditStatus(_) => "updateAuditStatus",
        }
    }
}

impl Module for ComplianceService {
    const NAME: &'static str = "compliance";

    type Query = ComplianceQuery;
    type Command = ComplianceCommand;

    async fn query(&self, tenant: Uuid, query: ComplianceQuery) -> ApiResult<Reply> {
        match query {
            ComplianceQuery::Metrics => reply(&self.metrics(tenant).await),
            ComplianceQuery::ListControls(filter) => reply(&self.controls(tenant, &filter).await),
            ComplianceQuery::ListAudits(filter) => reply(&self.audits(tenant, &filter).await),
        }
    }

    async fn command(&self, tenant: Uuid, command: ComplianceCommand) -> ApiResult<Reply> {
        match command {
            ComplianceCommand::CreateControl(input) => {
                Reply::created(&self.create_control(tenant, input).await?)
            }
            ComplianceCommand::UpdateControlStatus(change) => {
                reply(&self.update_control_status(tenant, change).await?)
            }
            ComplianceCommand::ScheduleAudit(input) => {
                Reply::created(&self.schedule_audit(tenant, input).await?)
            }
            ComplianceCommand::UpdateAuditStatus(update) => {
                reply(&self.update_audit_status(tenant, update).await?)
            }
        }
    }
}
