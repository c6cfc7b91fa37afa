//! ---
//! docqa_section: "05-networking-external-interfaces"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Role catalog and assignment routes."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use docqa_authz::{Action, Actor, GateError, IdentityError, Resource, ResourceType, RoleError, RoleSummary};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::CurrentActor;
use crate::error::ApiError;
use crate::{ApiState, MessageResponse};

pub(crate) fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:role", delete(delete_role))
        .route("/roles/:role/users", get(role_holders))
        .route(
            "/roles/:role/users/:user_id",
            post(assign_role).delete(remove_role),
        )
}

#[derive(Debug, Serialize)]
struct RolesResponse {
    roles: Vec<RoleSummary>,
}

#[derive(Debug, Deserialize)]
struct CreateRoleRequest {
    name: String,
}

#[derive(Debug, Serialize)]
struct RoleHolders {
    role: String,
    users: Vec<String>,
}

async fn list_roles(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<RolesResponse>, ApiError> {
    let roles = state
        .gate()
        .list_roles(&actor)
        .map_err(|denied| state.reject(denied))?;
    Ok(Json(RolesResponse { roles }))
}

async fn create_role(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let name = request.name.trim();
    state
        .gate()
        .create_role(&actor, name)
        .map_err(|err| state.gate_error(err))?;
    state.record(&actor, "role.create", json!({ "role": name }));
    Ok((
        StatusCode::CREATED,
        MessageResponse::new(format!("Role '{name}' created")),
    ))
}

async fn delete_role(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path(role): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .gate()
        .delete_role(&actor, &role)
        .map_err(|err| match err {
            GateError::Role(RoleError::UnknownRole(name)) => {
                ApiError::not_found(format!("role not found: {name}"))
            }
            other => state.gate_error(other),
        })?;
    state.record(&actor, "role.delete", json!({ "role": role }));
    Ok(MessageResponse::new(format!("Role '{role}' deleted")))
}

async fn role_holders(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path(role): Path<String>,
) -> Result<Json<RoleHolders>, ApiError> {
    state.authorize(&actor, Action::Read, &Resource::of_type(ResourceType::Role))?;
    if !state.gate().catalog().contains(&role) {
        return Err(ApiError::not_found(format!("role not found: {role}")));
    }
    let users = state.gate().assignments().holders_of(&role);
    Ok(Json(RoleHolders { role, users }))
}

/// Role mutations on a user require manage_roles before the target's existence is revealed.
fn ensure_target(state: &ApiState, actor: &Actor, user_id: &str) -> Result<(), ApiError> {
    state.authorize(actor, Action::ManageRoles, &Resource::of_type(ResourceType::Role))?;
    state
        .identity()
        .get_user(user_id)
        .map(|_| ())
        .ok_or_else(|| IdentityError::UserNotFound.into())
}

async fn assign_role(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path((role, user_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_target(&state, &actor, &user_id)?;
    state
        .gate()
        .assign_role(&actor, &user_id, &role)
        .map_err(|err| state.gate_error(err))?;
    state.record(&actor, "role.assign", json!({ "role": role, "user_id": user_id }));
    Ok(MessageResponse::new(format!("Role '{role}' assigned")))
}

async fn remove_role(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path((role, user_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_target(&state, &actor, &user_id)?;
    state
        .gate()
        .remove_role(&actor, &user_id, &role)
        .map_err(|err| state.gate_error(err))?;
    state.record(&actor, "role.remove", json!({ "role": role, "user_id": user_id }));
    Ok(MessageResponse::new(format!("Role '{role}' removed")))
}
