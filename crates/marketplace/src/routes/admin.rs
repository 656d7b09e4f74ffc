//! Protected area handlers.

use axum::Json;
use serde::Serialize;

use crate::middleware::RequireUser;
use crate::supabase::AuthUser;

/// Body of `GET /admin`.
#[derive(Debug, Serialize)]
pub struct AdminSummary {
    pub user: AuthUser,
}

/// Show the signed-in user. Anonymous visitors never reach this handler.
pub async fn index(RequireUser(user): RequireUser) -> Json<AdminSummary> {
    Json(AdminSummary { user })
}
