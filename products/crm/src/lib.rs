//! CRM module: lead capture and the opportunity pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{
    Action, ApiError, ApiResult, ById, Module, Reply, StatusChange, deleted, reply, validate,
};
use platform_store::{Collection, record, stats};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: String,
    pub organization: Option<String>,
    pub source: LeadSource,
    pub estimated_value_cents: i64,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadSource {
    Website,
    Referral,
    Event,
    Outbound,
    Other,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: Uuid,
    pub company_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub title: String,
    pub amount_cents: i64,
    pub probability: u8,
    pub stage: Stage,
    pub expected_close: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Prospecting,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl Stage {
    pub fn is_closed(self) -> bool {
        matches!(self, Stage::Won | Stage::Lost)
    }
}

impl Opportunity {
    /// Amount scaled by the win probability, rounded down.
    pub fn weighted_cents(&self) -> i64 {
        let weighted = i128::from(self.amount_cents) * i128::from(self.probability) / 100;
        i64::try_from(weighted).unwrap_or(i64::MAX)
    }
}

record!(Lead, "lead");
record!(Opportunity, "opportunity");

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    pub name: String,
    pub email: String,
    pub organization: Option<String>,
    pub source: LeadSource,
    #[serde(default)]
    pub estimated_value_cents: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOpportunity {
    pub lead_id: Option<Uuid>,
    pub title: String,
    pub amount_cents: i64,
    pub probability: i64,
    pub expected_close: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChange {
    pub id: Uuid,
    pub stage: Stage,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityFilter {
    pub stage: Option<Stage>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrmMetrics {
    pub total_leads: usize,
    pub qualified_leads: usize,
    pub conversion_rate: f64,
    pub open_pipeline_cents: i64,
    pub weighted_pipeline_cents: i64,
    pub won_value_cents: i64,
    pub win_rate: f64,
}

#[derive(Clone, Default)]
pub struct CrmService {
    leads: Collection<Lead>,
    opportunities: Collection<Opportunity>,
}

impl CrmService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_lead(&self, tenant: Uuid, input: NewLead) -> ApiResult<Lead> {
        let lead = Lead {
            id: Uuid::new_v4(),
            company_id: tenant,
            name: validate::text("name", &input.name)?,
            email: validate::email("email", &input.email)?,
            organization: validate::optional_text(input.organization),
            source: input.source,
            estimated_value_cents: validate::non_negative(
                "estimatedValueCents",
                input.estimated_value_cents,
            )?,
            status: LeadStatus::New,
            created_at: Utc::now(),
        };
        let lead = self.leads.insert(lead).await;
        info!(lead_id = %lead.id, source = ?lead.source, "lead created");
        Ok(lead)
    }

    pub async fn leads(&self, tenant: Uuid, filter: &LeadFilter) -> Vec<Lead> {
        self.leads
            .list(tenant, |l| {
                filter.status.is_none_or(|s| l.status == s)
                    && filter.source.is_none_or(|s| l.source == s)
            })
            .await
    }

    pub async fn update_lead_status(
        &self,
        tenant: Uuid,
        id: Uuid,
        status: LeadStatus,
    ) -> ApiResult<Lead> {
        let lead = self.leads.update(tenant, id, |l| l.status = status).await?;
        info!(lead_id = %id, ?status, "lead status updated");
        Ok(lead)
    }

    pub async fn delete_lead(&self, tenant: Uuid, id: Uuid) -> ApiResult<Lead> {
        let lead = self.leads.remove(tenant, id).await?;
        info!(lead_id = %id, "lead deleted");
        Ok(lead)
    }

    pub async fn create_opportunity(
        &self,
        tenant: Uuid,
        input: NewOpportunity,
    ) -> ApiResult<Opportunity> {
        if let Some(lead_id) = input.lead_id {
            self.leads.find(tenant, lead_id).await?;
        }
        let probability = u8::try_from(input.probability)
            .ok()
            .filter(|p| (0..=100).contains(p))
            .ok_or_else(|| ApiError::invalid("probability must be between 0 and 100"))?;
        let opportunity = Opportunity {
            id: Uuid::new_v4(),
            company_id: tenant,
            lead_id: input.lead_id,
            title: validate::text("title", &input.title)?,
            amount_cents: validate::non_negative("amountCents", input.amount_cents)?,
            probability,
            stage: Stage::Prospecting,
            expected_close: input.expected_close,
            created_at: Utc::now(),
        };
        let opportunity = self.opportunities.insert(opportunity).await;
        info!(
            opportunity_id = %opportunity.id,
            amount_cents = opportunity.amount_cents,
            "opportunity created"
        );
        Ok(opportunity)
    }

    pub async fn opportunities(
        &self,
        tenant: Uuid,
        filter: &OpportunityFilter,
    ) -> Vec<Opportunity> {
        self.opportunities
            .list(tenant, |o| filter.stage.is_none_or(|s| o.stage == s))
            .await
    }

    /// Move an opportunity. Closing it pins the probability to 100 or 0.
    pub async fn update_opportunity_stage(
        &self,
        tenant: Uuid,
        id: Uuid,
        stage: Stage,
    ) -> ApiResult<Opportunity> {
        let opportunity = self
            .opportunities
            .update(tenant, id, |o| {
                o.stage = stage;
                match stage {
                    Stage::Won => o.probability = 100,
                    Stage::Lost => o.probability = 0,
                    _ => {}
                }
            })
            .await?;
        info!(opportunity_id = %id, ?stage, "opportunity stage moved");
        Ok(opportunity)
    }

    pub async fn metrics(&self, tenant: Uuid) -> CrmMetrics {
        let leads = self.leads.all(tenant).await;
        let opportunities = self.opportunities.all(tenant).await;

        let open: Vec<&Opportunity> = opportunities
            .iter()
            .filter(|o| !o.stage.is_closed())
            .collect();
        let won: Vec<&Opportunity> = opportunities
            .iter()
            .filter(|o| o.stage == Stage::Won)
            .collect();
        let closed = opportunities.len() - open.len();

        CrmMetrics {
            total_leads: leads.len(),
            qualified_leads: leads
                .iter()
                .filter(|l| l.status == LeadStatus::Qualified)
                .count(),
            conversion_rate: stats::percentage(
                leads
                    .iter()
                    .filter(|l| l.status == LeadStatus::Converted)
                    .count(),
                leads.len(),
            ),
            open_pipeline_cents: stats::cents(open.iter().map(|o| o.amount_cents)),
            weighted_pipeline_cents: stats::cents(open.iter().map(|o| o.weighted_cents())),
            won_value_cents: stats::cents(won.iter().map(|o| o.amount_cents)),
            win_rate: stats::percentage(won.len(), closed),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CrmQuery {
    Metrics,
    ListLeads(LeadFilter),
    ListOpportunities(OpportunityFilter),
}

impl Action for CrmQuery {
    fn name(&self) -> &'static str {
        match self {
            CrmQuery::Metrics => "metrics",
            CrmQuery::ListLeads(_) => "listLeads",
            CrmQuery::ListOpportunities(_) => "listOpportunities",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CrmCommand {
    CreateLead(NewLead),
    UpdateLeadStatus(StatusChange<LeadStatus>),
    DeleteLead(ById),
    CreateOpportunity(NewOpportunity),
    UpdateOpportunityStage(StageChange),
}

impl Action for CrmCommand {
    fn name(&self) -> &'static str {
        match self {
            CrmCommand::CreateLead(_) => "createLead",
            CrmCommand::UpdateLeadStatus(_) => "updateLeadStatus",
            CrmCommand::DeleteLead(_) => "deleteLead",
            CrmCommand::CreateOpportunity(_) => "createOpportunity",
            CrmCommand::UpdateOpportunityStage(_) => "updateOpportunityStage",
        }
    }

    fn is_destructive(&self) -> bool {
        matches!(self, CrmCommand::DeleteLead(_))
    }
}

impl Module for CrmService {
    const NAME: &'static str = "crm";

    type Query = CrmQuery;
    type Command = CrmCommand;

    async fn query(&self, tenant: Uuid, query: CrmQuery) -> ApiResult<Reply> {
        match query {
            CrmQuery::Metrics => reply(&self.metrics(tenant).await),
            CrmQuery::ListLeads(filter) => reply(&self.leads(tenant, &filter).await),
            CrmQuery::ListOpportunities(filter) => {
                reply(&self.opportunities(tenant, &filter).await)
            }
        }
    }

    async fn command(&self, tenant: Uuid, command: CrmCommand) -> ApiResult<Reply> {
        match command {
            CrmCommand::CreateLead(input) => {
                Reply::created(&self.create_lead(tenant, input).await?)
            }
            CrmCommand::UpdateLeadStatus(change) => {
                reply(&self.update_lead_status(tenant, change.id, change.status).await?)
            }
            CrmCommand::DeleteLead(ById { id }) => {
                self.delete_lead(tenant, id).await?;
                deleted(id)
            }
            CrmCommand::CreateOpportunity(input) => {
                Reply::created(&self.create_opportunity(tenant, input).await?)
            }
            CrmCommand::UpdateOpportunityStage(change) => reply(
                &self
                    .update_opportunity_stage(tenant, change.id, change.stage)
                    .await?,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(name: &str, source: LeadSource) -> NewLead {
        NewLead {
            name: name.into(),
            email: format!("{}@prospect.test", name.to_lowercase()),
            organization: Some("Prospect Ltd".into()),
            source,
            estimated_value_cents: 100_000,
        }
    }

    fn opportunity(title: &str, amount_cents: i64, probability: i64) -> NewOpportunity {
        NewOpportunity {
            lead_id: None,
            title: title.into(),
            amount_cents,
            probability,
            expected_close: None,
        }
    }

    #[tokio::test]
    async fn leads_filter_by_status_and_source() {
        let crm = CrmService::new();
        let tenant = Uuid::new_v4();
        let web = crm.create_lead(tenant, lead("Ann", LeadSource::Website)).await.unwrap();
        crm.create_lead(tenant, lead("Ben", LeadSource::Referral)).await.unwrap();
        crm.update_lead_status(tenant, web.id, LeadStatus::Qualified)
            .await
            .unwrap();

        let qualified = crm
            .leads(
                tenant,
                &LeadFilter {
                    status: Some(LeadStatus::Qualified),
                    source: None,
                },
            )
            .await;
        assert_eq!(qualified.len(), 1);
        assert_eq!(qualified[0].id, web.id);

        let referrals = crm
            .leads(
                tenant,
                &LeadFilter {
                    status: None,
                    source: Some(LeadSource::Referral),
                },
            )
            .await;
        assert_eq!(referrals.len(), 1);
    }

    #[tokio::test]
    async fn probability_must_be_a_percentage() {
        let crm = CrmService::new();
        let tenant = Uuid::new_v4();
        for probability in [120, -1, 356] {
            assert!(matches!(
                crm.create_opportunity(tenant, opportunity("Odd", 10, probability))
                    .await,
                Err(ApiError::InvalidInput(_))
            ));
        }
        let certain = crm
            .create_opportunity(tenant, opportunity("Certain", 10, 100))
            .await
            .unwrap();
        assert_eq!(certain.probability, 100);
        let mut linked = opportunity("Linked", 10, 50);
        linked.lead_id = Some(Uuid::new_v4());
        assert!(matches!(
            crm.create_opportunity(tenant, linked).await,
            Err(ApiError::NotFound { kind: "lead", .. })
        ));
    }

    #[tokio::test]
    async fn closing_pins_probability() {
        let crm = CrmService::new();
        let tenant = Uuid::new_v4();
        let deal = crm
            .create_opportunity(tenant, opportunity("Pilot", 50_000, 40))
            .await
            .unwrap();
        let won = crm
            .update_opportunity_stage(tenant, deal.id, Stage::Won)
            .await
            .unwrap();
        assert_eq!(won.probability, 100);
        let lost = crm
            .update_opportunity_stage(tenant, deal.id, Stage::Lost)
            .await
            .unwrap();
        assert_eq!(lost.probability, 0);
    }

    #[tokio::test]
    async fn metrics_weight_the_open_pipeline() {
        let crm = CrmService::new();
        let tenant = Uuid::new_v4();
        let converted = crm.create_lead(tenant, lead("Ann", LeadSource::Event)).await.unwrap();
        crm.create_lead(tenant, lead("Ben", LeadSource::Event)).await.unwrap();
        crm.update_lead_status(tenant, converted.id, LeadStatus::Converted)
            .await
            .unwrap();

        crm.create_opportunity(tenant, opportunity("A", 100_000, 50))
            .await
            .unwrap();
        crm.create_opportunity(tenant, opportunity("B", 40_000, 25))
            .await
            .unwrap();
        let won = crm
            .create_opportunity(tenant, opportunity("C", 70_000, 90))
            .await
            .unwrap();
        let lost = crm
            .create_opportunity(tenant, opportunity("D", 10_000, 10))
            .await
            .unwrap();
        crm.update_opportunity_stage(tenant, won.id, Stage::Won)
            .await
            .unwrap();
        crm.update_opportunity_stage(tenant, lost.id, Stage::Lost)
            .await
            .unwrap();

        let metrics = crm.metrics(tenant).await;
        assert_eq!(metrics.total_leads, 2);
        assert_eq!(metrics.conversion_rate, 50.0);
        assert_eq!(metrics.open_pipeline_cents, 140_000);
        assert_eq!(metrics.weighted_pipeline_cents, 60_000);
        assert_eq!(metrics.won_value_cents, 70_000);
        assert_eq!(metrics.win_rate, 50.0);
    }

    #[tokio::test]
    async fn huge_pipelines_do_not_overflow() {
        let crm = CrmService::new();
        let tenant = Uuid::new_v4();
        for title in ["Moonshot", "Megadeal"] {
            crm.create_opportunity(tenant, opportunity(title, i64::MAX, 99))
                .await
                .unwrap();
        }
        let metrics = crm.metrics(tenant).await;
        assert_eq!(metrics.open_pipeline_cents, i64::MAX);
        assert_eq!(metrics.weighted_pipeline_cents, i64::MAX);

        let single = opportunity("Single", 0, 0);
        let deal = crm.create_opportunity(tenant, single).await.unwrap();
        assert_eq!(deal.weighted_cents(), 0);
    }
}
