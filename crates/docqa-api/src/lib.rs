//! ---
//! docqa_section: "05-networking-external-interfaces"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Networking API surface for external integrations."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---

pub mod answer;
pub mod auth;
mod documents;
pub mod error;
pub mod index;
mod roles;
mod users;

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use docqa_authz::{
    AccessDenied, Action, Actor, AuditLog, AuthorizationGate, AuthzMetrics, GateError,
    IdentityError, IdentityProvider, NewUser, PolicyEvaluator, Resource, RoleAssignmentStore,
    RoleCatalog, Verdict,
};
use docqa_common::config::{ApiConfig, AppConfig, DocumentsConfig};
use docqa_common::ADMIN_ROLE;
use parking_lot::Mutex;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use answer::{Answer, AnswerBackend, ExtractiveAnswerBackend};
pub use auth::CurrentActor;
pub use error::ApiError;
pub use index::{DocumentIndex, DocumentRecord, InMemoryDocumentIndex, IndexError};

/// Shared API state exposed to handlers.
pub struct ApiState {
    identity: IdentityProvider,
    gate: AuthorizationGate,
    metrics: AuthzMetrics,
    index: Arc<dyn DocumentIndex>,
    answers: Option<Arc<dyn AnswerBackend>>,
    audit: Option<Mutex<AuditLog>>,
    documents: DocumentsConfig,
    token_ttl: Duration,
}

impl ApiState {
    pub fn new(identity: IdentityProvider, gate: AuthorizationGate, metrics: AuthzMetrics) -> Self {
        let documents = DocumentsConfig::default();
        Self {
            identity,
            gate,
            metrics,
            index: Arc::new(InMemoryDocumentIndex::new(
                documents.chunk_size,
                documents.chunk_overlap,
            )),
            answers: None,
            audit: None,
            documents,
            token_ttl: ApiConfig::default().token_ttl,
        }
    }

    /// Build the full runtime state: policy catalog, audit log and bootstrap admins.
    pub fn from_config(config: &AppConfig, registry: Arc<Registry>) -> Result<Self> {
        let catalog = Arc::new(
            RoleCatalog::from_config(&config.policy).context("invalid policy configuration")?,
        );
        let assignments = Arc::new(RoleAssignmentStore::new(catalog.clone()));
        let evaluator = PolicyEvaluator::new(catalog, assignments)
            .with_default_role(config.policy.default_role.clone());
        let gate = AuthorizationGate::new(evaluator);
        let metrics = AuthzMetrics::new(registry).context("failed to register metrics")?;
        let identity = IdentityProvider::new();

        for admin in &config.bootstrap.admins {
            let request = NewUser {
                email: admin.email.clone(),
                password: admin.password.clone(),
                full_name: admin.full_name.clone(),
            };
            match identity.register_admin(request) {
                Ok(account) => {
                    gate.assignments()
                        .assign(&account.id, ADMIN_ROLE)
                        .context("policy is missing the admin role")?;
                    info!(user = %account.id, email = %account.email, "bootstrap admin created");
                }
                Err(IdentityError::UserExists) => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to create bootstrap admin {}", admin.email))
                }
            }
        }

        let index = Arc::new(InMemoryDocumentIndex::new(
            config.documents.chunk_size,
            config.documents.chunk_overlap,
        ));
        let mut state = Self::new(identity, gate, metrics)
            .with_index(index)
            .with_documents_config(config.documents.clone())
            .with_token_ttl(config.api.token_ttl);
        if let Some(path) = &config.audit.path {
            state = state.with_audit_log(AuditLog::new(path)?);
        }
        Ok(state)
    }

    pub fn with_index(mut self, index: Arc<dyn DocumentIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn with_answer_backend(mut self, backend: Arc<dyn AnswerBackend>) -> Self {
        self.answers = Some(backend);
        self
    }

    pub fn with_audit_log(mut self, log: AuditLog) -> Self {
        self.audit = Some(Mutex::new(log));
        self
    }

    pub fn with_documents_config(mut self, documents: DocumentsConfig) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn identity(&self) -> &IdentityProvider {
        &self.identity
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn metrics(&self) -> &AuthzMetrics {
        &self.metrics
    }

    /// Check a request against the policy, counting the verdict and
    /// auditing denials.
    pub(crate) fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        resource: &Resource,
    ) -> Result<Verdict, ApiError> {
        match self.gate.authorize(actor, action, resource) {
            Ok(verdict) => {
                self.metrics.observe_verdict(&verdict);
                Ok(verdict)
            }
            Err(denied) => Err(self.reject(denied)),
        }
    }

    pub(crate) fn reject(&self, denied: AccessDenied) -> ApiError {
        self.metrics.inc_denial();
        warn!(
            actor = %denied.actor_id,
            action = %denied.action,
            resource = %denied.resource,
            "access denied"
        );
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.lock().record_denial(&denied) {
                error!(error = %err, "failed to record denial in audit log");
            }
        }
        ApiError::from(denied)
    }

    pub(crate) fn gate_error(&self, err: GateError) -> ApiError {
        match err {
            GateError::Denied(denied) => self.reject(denied),
            GateError::Role(role) => role.into(),
        }
    }

    /// Append an audit entry and count a role mutation when `event` is one.
    pub(crate) fn record(&self, actor: &Actor, event: &str, metadata: Value) {
        if let Some(operation) = event.strip_prefix("role.") {
            self.metrics.inc_role_mutation(operation);
        }
        info!(actor = %actor.id, event, %metadata, "mutation applied");
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.lock().append(&actor.id, event, metadata) {
                error!(error = %err, event, "failed to append audit entry");
            }
        }
    }

    pub(crate) fn token_ttl(&self) -> Option<chrono::Duration> {
        if self.token_ttl.is_zero() {
            return None;
        }
        chrono::Duration::from_std(self.token_ttl).ok()
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("index", &self.index)
            .field("answers", &self.answers.is_some())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Assemble every route over the shared state.
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/metrics", get(metrics))
        .merge(users::routes())
        .merge(roles::routes())
        .merge(documents::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Spawn the REST API on `addr`.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = build_router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener.local_addr().unwrap_or(addr);
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

async fn root() -> Json<MessageResponse> {
    MessageResponse::new("Welcome to QA API")
}

async fn metrics(State(state): State<Arc<ApiState>>) -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.metrics.registry().gather(), &mut buffer)
        .map_err(|err| ApiError::internal(format!("failed to encode metrics: {err}")))?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        buffer,
    ))
}
