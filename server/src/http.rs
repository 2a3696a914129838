use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        FromRef, FromRequestParts, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{self, HeaderName, HeaderValue, Method, request::Parts},
    response::IntoResponse,
    routing::get,
};
use platform_api::{Action, ApiError, ApiResult, Module, Reply};
use platform_authn::{Session, decode_token, extract_token};
use platform_authz::{Access, PolicyContext, PolicyEngine};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{Modules, config::AppConfig};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub policy: Arc<PolicyEngine>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            policy: Arc::new(PolicyEngine),
        }
    }
}

/// Router state for one mounted module.
struct ModuleState<M> {
    app: AppState,
    module: Arc<M>,
}

impl<M> Clone for ModuleState<M> {
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
            module: Arc::clone(&self.module),
        }
    }
}

impl<M> FromRef<ModuleState<M>> for AppState {
    fn from_ref(state: &ModuleState<M>) -> Self {
        state.app.clone()
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState, modules: Modules) -> anyhow::Result<()> {
    let router = build_router(state, &modules);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, modules = Modules::names().len(), "erp server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let layer = CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::POST, Method::GET]);
    // Credentials cannot be combined with a wildcard origin.
    if allowed.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer
            .allow_credentials(true)
            .allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn build_router(state: AppState, modules: &Modules) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    let cors = cors_layer(&state.config.cors_allowed_origins);

    let router = Router::new().route("/health", get(health_handler));
    let router = mount(router, &state, Arc::clone(&modules.hr));
    let router = mount(router, &state, Arc::clone(&modules.crm));
    let router = mount(router, &state, Arc::clone(&modules.inventory));
    let router = mount(router, &state, Arc::clone(&modules.procurement));
    let router = mount(router, &state, Arc::clone(&modules.maintenance));
    let router = mount(router, &state, Arc::clone(&modules.quality));
    let router = mount(router, &state, Arc::clone(&modules.logistics));
    let router = mount(router, &state, Arc::clone(&modules.assets));
    let router = mount(router, &state, Arc::clone(&modules.compliance));
    let router = mount(router, &state, Arc::clone(&modules.surveys));
    let router = mount(router, &state, Arc::clone(&modules.finance));

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
            .layer(PropagateRequestIdLayer::new(header_name))
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// Serve `M` at `/api/<NAME>`: `GET` for queries and `POST` for commands.
fn mount<M: Module>(router: Router, state: &AppState, module: Arc<M>) -> Router {
    let routes = Router::new()
        .route(
            &format!("/api/{}", M::NAME),
            get(query_handler::<M>).post(command_handler::<M>),
        )
        .with_state(ModuleState {
            app: state.clone(),
            module,
        });
    router.merge(routes)
}

/// The caller's session, read from a bearer token or the session cookie.
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let authorization = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let cookie = parts
            .headers
            .get(http::header::COOKIE)
            .and_then(|value| value.to_str().ok());
        let token = extract_token(authorization, cookie).ok_or(ApiError::Unauthorized)?;
        let session = decode_token(&token, &app.config.auth).map_err(|err| {
            debug!(error = %err, "rejected session token");
            ApiError::Unauthorized
        })?;
        Ok(Self(session))
    }
}

fn authorize(state: &AppState, session: &Session, access: Access, resource: &str) -> ApiResult<()> {
    let ctx = PolicyContext {
        session,
        access,
        resource,
    };
    state.policy.check(&ctx).map_err(|err| {
        warn!(user_id = %session.user_id, error = %err, "access denied");
        ApiError::Forbidden
    })
}

async fn query_handler<M: Module>(
    State(state): State<ModuleState<M>>,
    CurrentSession(session): CurrentSession,
    query: Result<Query<M::Query>, QueryRejection>,
) -> ApiResult<Reply> {
    let Query(query) = query.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    authorize(&state.app, &session, Access::Read, M::NAME)?;

    let span = info_span!(
        "module.query",
        module = M::NAME,
        action = query.name(),
        company_id = %session.company_id,
    );
    state
        .module
        .query(session.company_id, query)
        .instrument(span)
        .await
}

async fn command_handler<M: Module>(
    State(state): State<ModuleState<M>>,
    CurrentSession(session): CurrentSession,
    command: Result<Json<M::Command>, JsonRejection>,
) -> ApiResult<Reply> {
    let Json(command) = command.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    let access = if command.is_destructive() {
        Access::Delete
    } else {
        Access::Write
    };
    authorize(&state.app, &session, access, M::NAME)?;

    let span = info_span!(
        "module.command",
        module = M::NAME,
        action = command.name(),
        company_id = %session.company_id,
        user_id = %session.user_id,
    );
    state
        .module
        .command(session.company_id, command)
        .instrument(span)
        .await
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        modules: Modules::names(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
    modules: Vec<&'static str>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
    info!("shutdown signal received");
}
