use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::AppState;

/// Registers the caller, or returns their existing account.
pub async fn register(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let account = state.store.upsert_account(user.id(), state.clock.now()).await?;

    if !account.is_active() {
        warn!("Registration attempt by {} account {}", account.status, user.id());
        return Err(AuthError::Unauthorized.into());
    }

    info!("Account ready for user {}", user.id());
    Ok(HttpResponse::Ok().json(json!({
        "user_id": account.user_id,
        "status": account.status,
        "created_at": account.created_at.to_rfc3339(),
    })))
}

pub async fn wallet(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let account = state
        .store
        .find_account(user.id())
        .await?
        .ok_or(DatabaseError::NotFound)?;
    let balance = state.ledger.balance(user.id()).await?;
    let today = state.clock.today();

    Ok(HttpResponse::Ok().json(json!({
        "user_id": account.user_id,
        "balance_cents": balance.cents(),
        "balance": balance.to_string(),
        "ads_today": account.ads_on(today),
        "daily_max_sessions": state.ads.policy().daily_max_sessions,
        "total_ads_watched": account.total_ads_watched,
    })))
}
