//! ---
//! docqa_section: "05-networking-external-interfaces"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "User registration, token issuance and profile routes."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use docqa_authz::{Action, Actor, IdentityError, NewUser, Resource, ResourceType, UserAccount, UserUpdate};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::CurrentActor;
use crate::error::ApiError;
use crate::{ApiState, MessageResponse};

pub(crate) fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/register", post(register))
        .route("/users/token", post(issue_token))
        .route("/users/me", get(me))
        .route("/users/by-name/:full_name", get(get_user_by_name))
        .route(
            "/users/:user_id",
            get(get_user).put(modify_user).delete(remove_user),
        )
}

#[derive(Debug, Serialize)]
struct UserResponse {
    id: String,
    email: String,
    full_name: String,
    is_admin: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    roles: Vec<String>,
    effective_roles: Vec<String>,
}

impl UserResponse {
    fn new(state: &ApiState, account: UserAccount) -> Self {
        let evaluator = state.gate().evaluator();
        let actor = account.actor();
        Self {
            roles: evaluator.assignments().roles_of(&account.id).iter().cloned().collect(),
            effective_roles: evaluator.effective_roles(&actor).iter().cloned().collect(),
            id: account.id,
            email: account.email,
            full_name: account.full_name,
            is_admin: account.is_admin,
            is_active: account.active,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_at: Option<DateTime<Utc>>,
}

async fn register(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<NewUser>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let account = state.identity().register(request)?;
    Ok((StatusCode::CREATED, Json(UserResponse::new(&state, account))))
}

async fn issue_token(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let key = state
        .identity()
        .login(&request.email, &request.password, state.token_ttl())
        .map_err(|err| {
            state.metrics().inc_auth_failure();
            ApiError::from(err)
        })?;
    Ok(Json(TokenResponse {
        access_token: key.secret,
        token_type: "bearer",
        expires_at: key.expires_at,
    }))
}

async fn me(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<UserResponse>, ApiError> {
    state.authorize(&actor, Action::Read, &Resource::user(actor.id.clone()))?;
    let account = state
        .identity()
        .get_user(&actor.id)
        .ok_or(IdentityError::UserNotFound)?;
    Ok(Json(UserResponse::new(&state, account)))
}

async fn list_users(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    state.authorize(&actor, Action::ManageUsers, &Resource::of_type(ResourceType::User))?;
    let users = state
        .identity()
        .list_users()
        .into_iter()
        .map(|account| UserResponse::new(&state, account))
        .collect();
    Ok(Json(users))
}

/// Resolve an optional account, authorizing `action` on it. Missing accounts are
/// only reported to callers allowed to manage users.
fn authorize_lookup(
    state: &ApiState,
    actor: &Actor,
    action: Action,
    account: Option<UserAccount>,
) -> Result<UserAccount, ApiError> {
    match account {
        Some(account) => {
            state.authorize(actor, action, &Resource::user(account.id.clone()))?;
            Ok(account)
        }
        None => {
            state.authorize(actor, Action::ManageUsers, &Resource::of_type(ResourceType::User))?;
            Err(IdentityError::UserNotFound.into())
        }
    }
}

async fn get_user(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let account = state.identity().get_user(&user_id);
    let account = authorize_lookup(&state, &actor, Action::Read, account)?;
    Ok(Json(UserResponse::new(&state, account)))
}

async fn get_user_by_name(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path(full_name): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let account = state.identity().find_by_name(&full_name);
    let account = authorize_lookup(&state, &actor, Action::Read, account)?;
    Ok(Json(UserResponse::new(&state, account)))
}

async fn modify_user(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path(user_id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    let account = state.identity().get_user(&user_id);
    authorize_lookup(&state, &actor, Action::Write, account)?;
    let account = state.identity().update_user(&user_id, update)?;
    Ok(Json(UserResponse::new(&state, account)))
}

async fn remove_user(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path(user_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let account = state.identity().get_user(&user_id);
    authorize_lookup(&state, &actor, Action::ManageUsers, account)?;
    let removed = state.identity().remove_user(&user_id)?;
    state.gate().assignments().forget_actor(&removed.id);
    state.record(&actor, "user.remove", json!({ "user_id": removed.id, "email": removed.email }));
    Ok(MessageResponse::new("User deleted successfully"))
}
