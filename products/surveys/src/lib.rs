//! Feedback surveys and their responses.

use chrono::{DateTime, Utc};
use platform_api::{
    Action, ApiError, ApiResult, ById, Module, Reply, StatusChange, reply, validate,
};
use platform_store::{Collection, record, stats};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: SurveyStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurveyStatus {
    Draft,
    Active,
    Closed,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub survey_id: Uuid,
    pub respondent: Option<String>,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn of(rating: u8) -> Self {
        match rating {
            4.. => Sentiment::Positive,
            3 => Sentiment::Neutral,
            _ => Sentiment::Negative,
        }
    }
}

record!(Survey, "survey");
record!(SurveyResponse, "survey response");

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSurvey {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResponse {
    pub survey_id: Uuid,
    pub respondent: Option<String>,
    pub rating: u8,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyFilter {
    pub status: Option<SurveyStatus>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFilter {
    pub survey_id: Option<Uuid>,
}

/// Rating breakdown over a set of responses.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub response_count: usize,
    pub average_rating: f64,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl Breakdown {
    pub fn of(responses: &[SurveyResponse]) -> Self {
        let share = |sentiment: Sentiment| {
            stats::percentage(
                responses
                    .iter()
                    .filter(|r| Sentiment::of(r.rating) == sentiment)
                    .count(),
                responses.len(),
            )
        };
        Self {
            response_count: responses.len(),
            average_rating: stats::average(responses.iter().map(|r| f64::from(r.rating))),
            positive: share(Sentiment::Positive),
            neutral: share(Sentiment::Neutral),
            negative: share(Sentiment::Negative),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveySummary {
    pub survey_id: Uuid,
    pub title: String,
    pub status: SurveyStatus,
    #[serde(flatten)]
    pub breakdown: Breakdown,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyMetrics {
    pub total_surveys: usize,
    pub active_surveys: usize,
    pub total_responses: usize,
    pub average_rating: f64,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
    pub net_sentiment: f64,
}

#[derive(Clone, Default)]
pub struct SurveyService {
    surveys: Collection<Survey>,
    responses: Collection<SurveyResponse>,
}

impl SurveyService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_survey(&self, tenant: Uuid, input: NewSurvey) -> ApiResult<Survey> {
        let survey = Survey {
            id: Uuid::new_v4(),
            company_id: tenant,
            title: validate::text("title", &input.title)?,
            description: validate::optional_text(input.description),
            status: SurveyStatus::Draft,
            created_at: Utc::now(),
        };
        let survey = self.surveys.insert(survey).await;
        info!(survey_id = %survey.id, "survey created");
        Ok(survey)
    }

    pub async fn surveys(&self, tenant: Uuid, filter: &SurveyFilter) -> Vec<Survey> {
        self.surveys
            .list(tenant, |s| filter.status.is_none_or(|status| s.status == status))
            .await
    }

    pub async fn update_survey_status(
        &self,
        tenant: Uuid,
        change: StatusChange<SurveyStatus>,
    ) -> ApiResult<Survey> {
        let survey = self
            .surveys
            .update(tenant, change.id, |s| s.status = change.status)
            .await?;
        info!(survey_id = %survey.id, status = ?survey.status, "survey status changed");
        Ok(survey)
    }

    pub async fn submit_response(
        &self,
        tenant: Uuid,
        input: NewResponse,
    ) -> ApiResult<SurveyResponse> {
        let survey = self.surveys.find(tenant, input.survey_id).await?;
        if survey.status != SurveyStatus::Active {
            return Err(ApiError::invalid(format!(
                "survey is not accepting responses ({:?})",
                survey.status
            )));
        }
        if !(1..=5).contains(&input.rating) {
            return Err(ApiError::invalid("rating must be between 1 and 5"));
        }
        let response = SurveyResponse {
            id: Uuid::new_v4(),
            company_id: tenant,
            survey_id: survey.id,
            respondent: validate::optional_text(input.respondent),
            rating: input.rating,
            comment: validate::optional_text(input.comment),
            created_at: Utc::now(),
        };
        let response = self.responses.insert(response).await;
        debug!(survey_id = %survey.id, rating = response.rating, "response recorded");
        Ok(response)
    }

    pub async fn responses(&self, tenant: Uuid, filter: &ResponseFilter) -> Vec<SurveyResponse> {
        self.responses
            .list(tenant, |r| filter.survey_id.is_none_or(|id| r.survey_id == id))
            .await
    }

    pub async fn summary(&self, tenant: Uuid, id: Uuid) -> ApiResult<SurveySummary> {
        let survey = self.surveys.find(tenant, id).await?;
        let responses = self.responses.list(tenant, |r| r.survey_id == id).await;
        Ok(SurveySummary {
            survey_id: survey.id,
            title: survey.title,
            status: survey.status,
            breakdown: Breakdown::of(&responses),
        })
    }

    pub async fn metrics(&self, tenant: Uuid) -> SurveyMetrics {
        let surveys = self.surveys.all(tenant).await;
        let responses = self.responses.all(tenant).await;
        let breakdown = Breakdown::of(&responses);

        SurveyMetrics {
            total_surveys: surveys.len(),
            active_surveys: surveys
                .iter()
                .filter(|s| s.status == SurveyStatus::Active)
                .count(),
            total_responses: breakdown.response_count,
            average_rating: breakdown.average_rating,
            positive: breakdown.positive,
            neutral: breakdown.neutral,
            negative: breakdown.negative,
            net_sentiment: stats::round2(breakdown.positive - breakdown.negative),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SurveyQuery {
    Metrics,
    ListSurveys(SurveyFilter),
    ListResponses(ResponseFilter),
    SurveySummary(ById),
}

impl Action for SurveyQuery {
    fn name(&self) -> &'static str {
        match self {
            SurveyQuery::Metrics => "metrics",
            SurveyQuery::ListSurveys(_) => "listSurveys",
            SurveyQuery::ListResponses(_) => "listResponses",
            SurveyQuery::SurveySummary(_) => "surveySummary",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SurveyCommand {
    CreateSurvey(NewSurvey),
    UpdateSurveyStatus(StatusChange<SurveyStatus>),
    SubmitResponse(NewResponse),
}

impl Action for SurveyCommand {
    fn name(&self) -> &'static str {
        match self {
            SurveyCommand::CreateSurvey(_) => "createSurvey",
            SurveyCommand::UpdateSurveyStatus(_) => "updateSurveyStatus",
            SurveyCommand::SubmitResponse(_) => "submitResponse",
        }
    }
}

impl Module for SurveyService {
    const NAME: &'static str = "surveys";

    type Query = SurveyQuery;
    type Command = SurveyCommand;

    async fn query(&self, tenant: Uuid, query: SurveyQuery) -> ApiResult<Reply> {
        match query {
            SurveyQuery::Metrics => reply(&self.metrics(tenant).await),
            SurveyQuery::ListSurveys(filter) => reply(&self.surveys(tenant, &filter).await),
            SurveyQuery::ListResponses(filter) => reply(&self.responses(tenant, &filter).await),
            SurveyQuery::SurveySummary(ById { id }) => reply(&self.summary(tenant, id).await?),
        }
    }

    async fn command(&self, tenant: Uuid, command: SurveyCommand) -> ApiResult<Reply> {
        match command {
            SurveyCommand::CreateSurvey(input) => {
                Reply::created(&self.create_survey(tenant, input).await?)
            }
            SurveyCommand::UpdateSurveyStatus(change) => {
                reply(&self.update_survey_status(tenant, change).await?)
            }
            SurveyCommand::SubmitResponse(input) => {
                Reply::created(&self.submit_response(tenant, input).await?)
            }
        }
    }
}
