use std::future::Future;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::ApiResult;

/// A decoded `action` from a module request.
pub trait Action {
    fn name(&self) -> &'static str;

    /// Destructive actions (deletes, disposals) need elevated privileges.
    fn is_destructive(&self) -> bool {
        false
    }
}

/// A business module mounted at `/api/<NAME>`.
///
/// `GET` requests decode [`Module::Query`] from the query string and `POST`
/// requests decode [`Module::Command`] from a JSON body tagged by `action`.
pub trait Module: Send + Sync + 'static {
    const NAME: &'static str;

    type Query: Action + DeserializeOwned + Send + 'static;
    type Command: Action + DeserializeOwned + Send + 'static;

    fn query(
        &self,
        tenant: Uuid,
        query: Self::Query,
    ) -> impl Future<Output = ApiResult<Reply>> + Send;

    fn command(
        &self,
        tenant: Uuid,
        command: Self::Command,
    ) -> impl Future<Output = ApiResult<Reply>> + Send;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Ok(Value),
    Created(Value),
}

impl Reply {
    pub fn body(&self) -> &Value {
        match self {
            Reply::Ok(body) | Reply::Created(body) => body,
        }
    }

    pub fn into_body(self) -> Value {
        match self {
            Reply::Ok(body) | Reply::Created(body) => body,
        }
    }

    pub fn created<T: Serialize>(value: &T) -> ApiResult<Self> {
        Ok(Reply::Created(serde_json::to_value(value)?))
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Ok(body) => (StatusCode::OK, Json(body)).into_response(),
            Reply::Created(body) => (StatusCode::CREATED, Json(body)).into_response(),
        }
    }
}

pub fn reply<T: Serialize>(value: &T) -> ApiResult<Reply> {
    Ok(Reply::Ok(serde_json::to_value(value)?))
}

pub fn deleted(id: Uuid) -> ApiResult<Reply> {
    Ok(Reply::Ok(json!({ "id": id, "deleted": true })))
}

/// Payload of every `update*Status` action.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange<S> {
    pub id: Uuid,
    pub status: S,
}

/// Payload of actions addressing a single record.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ById {
    pub id: Uuid,
}
