//! Admin account management.
//!
//! Viewing accounts needs `manage_users`; changing a role or disabling an
//! account needs `ban_users`. Nobody can do either to themselves.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{Permission, Role, UserId};

use super::{Audit, ClientIp, page_limit};
use crate::db::users::UserFilter;
use crate::db::{
    ActivityRepository, OrderRepository, RepositoryError, ReviewRepository, UserRepository,
};
use crate::error::{AppError, Result};
use crate::middleware::RequireStaff;
use crate::models::{ActivityAction, CurrentUser};
use crate::state::AppState;

const DEFAULT_DISABLE_REASON: &str = "Disabled by admin";

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET /api/admin/users?role=&q=`
pub async fn index(
    State(state): State<AppState>,
    staff: RequireStaff,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Value>> {
    staff.require(Permission::ManageUsers)?;
    let role = query
        .role
        .as_deref()
        .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("all"))
        .map(str::parse::<Role>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let repo = UserRepository::new(state.pool());
    let (users, total) = repo
        .list(&UserFilter {
            search: query.q.map(|q| q.trim().to_owned()).filter(|q| !q.is_empty()),
            role,
            limit: page_limit(query.limit),
            offset: query.offset.unwrap_or(0).max(0),
        })
        .await?;
    let role_counts: serde_json::Map<String, Value> = repo
        .role_counts()
        .await?
        .into_iter()
        .map(|(role, count)| (role.to_string(), json!(count)))
        .collect();

    Ok(Json(json!({ "users": users, "total": total, "roleCounts": role_counts })))
}

/// `GET /api/admin/users/{id}`
///
/// The account with its orders, reviews and recent activity.
pub async fn show(
    State(state): State<AppState>,
    staff: RequireStaff,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    staff.require(Permission::ManageUsers)?;
    let id = UserId::new(id);
    let user = UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    let orders = OrderRepository::new(state.pool())
        .list_for_customer(user.id, &user.email)
        .await?;
    let reviews = ReviewRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    let activity = ActivityRepository::new(state.pool())
        .recent(Some(user.id), 20)
        .await?;

    Ok(Json(json!({
        "user": user,
        "orders": orders,
        "reviews": reviews,
        "activity": activity,
    })))
}

fn reject_self(actor: &CurrentUser, target: UserId, message: &str) -> Result<()> {
    if actor.id == target {
        return Err(AppError::BadRequest(message.to_string()));
    }
    Ok(())
}

fn user_not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("User".to_string()),
        other => other.into(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: String,
}

/// `POST /api/admin/users/{id}/role`
#[tracing::instrument(skip(state, staff, ip, body))]
pub async fn change_role(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(id): Path<i64>,
    Json(body): Json<RoleChange>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::BanUsers)?;
    let role: Role = body
        .role
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid role".to_string()))?;
    let id = UserId::new(id);
    reject_self(actor, id, "Cannot change your own role")?;

    let user = UserRepository::new(state.pool())
        .set_role(id, role)
        .await
        .map_err(user_not_found)?;

    tracing::info!(user_id = %id, %role, actor = %actor.id, "Role changed");
    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::ChangeUserRole,
            id,
            Some(format!("Changed role to {role}")),
        )
        .await;

    Ok(Json(json!({ "user": user })))
}

#[derive(Debug, Default, Deserialize)]
pub struct DisableRequest {
    pub reason: Option<String>,
}

/// `POST /api/admin/users/{id}/disable`
#[tracing::instrument(skip(state, staff, ip, body))]
pub async fn disable(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(id): Path<i64>,
    body: Option<Json<DisableRequest>>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::BanUsers)?;
    let id = UserId::new(id);
    reject_self(actor, id, "Cannot disable your own account")?;

    let reason = body
        .and_then(|Json(b)| b.reason)
        .map(|r| r.trim().to_owned())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_DISABLE_REASON.to_owned());

    let user = UserRepository::new(state.pool())
        .disable(id, Some(&reason))
        .await
        .map_err(user_not_found)?;

    tracing::info!(user_id = %id, actor = %actor.id, "User disabled");
    Audit::new(actor, ip)
        .record(&state, ActivityAction::DisableUser, id, Some(reason))
        .await;

    Ok(Json(json!({ "user": user })))
}

/// `POST /api/admin/users/{id}/enable`
#[tracing::instrument(skip(state, staff, ip))]
pub async fn enable(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::BanUsers)?;
    let id = UserId::new(id);

    let user = UserRepository::new(state.pool())
        .enable(id)
        .await
        .map_err(user_not_found)?;

    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::EnableUser,
            id,
            Some("Account re-enabled".to_string()),
        )
        .await;

    Ok(Json(json!({ "user": user })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use vendora_core::Email;

    fn admin(id: i64) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            email: Email::parse("admin@example.com").unwrap(),
            name: None,
            role: Role::Admin,
        }
    }

    #[test]
    fn test_reject_self() {
        assert!(reject_self(&admin(1), UserId::new(1), "no").is_err());
        assert!(reject_self(&admin(1), UserId::new(2), "no").is_ok());
    }
}
