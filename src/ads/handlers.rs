use actix_web::{web, HttpResponse};
use serde_json::{json, Value};
use std::sync::Arc;

use super::outcome::{
    CancelOutcome, Denial, Eligibility, IssueOutcome, Rejection, TimerOutcome, VerifyOutcome,
};
use super::token::parse_session_id;
use crate::auth::AuthenticatedUser;
use crate::countdown::{CountdownSpec, LogSink};
use crate::error::AppError;
use crate::AppState;

fn with_remaining(mut body: Value, remaining_seconds: Option<i64>) -> Value {
    if let (Some(remaining), Some(map)) = (remaining_seconds, body.as_object_mut()) {
        map.insert("remaining_seconds".into(), json!(remaining));
    }
    body
}

fn denied(denial: Denial) -> HttpResponse {
    let body = json!({ "status": "denied", "reason": denial.code() });
    HttpResponse::Ok().json(with_remaining(body, denial.remaining_seconds()))
}

fn rejected(rejection: Rejection) -> HttpResponse {
    let body = json!({ "status": "rejected", "reason": rejection.code() });
    HttpResponse::Ok().json(with_remaining(body, rejection.remaining_seconds()))
}

pub async fn eligibility(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    match state.ads.can_issue(user.id()).await? {
        Eligibility::Eligible => Ok(HttpResponse::Ok().json(json!({ "status": "eligible" }))),
        Eligibility::Denied(denial) => Ok(denied(denial)),
    }
}

pub async fn issue(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    match state.ads.issue(user.id()).await? {
        IssueOutcome::Issued(session) => Ok(HttpResponse::Created().json(json!({
            "status": "issued",
            "session_id": session.session_id,
            "destination": session.destination,
            "valid_until": session.valid_until.to_rfc3339(),
            "required_wait_seconds": state.ads.policy().required_wait.num_seconds(),
            "amount_cents": session.reward.cents(),
        }))),
        IssueOutcome::Denied(denial) => Ok(denied(denial)),
    }
}

pub async fn status(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let session_id = parse_session_id(path.into_inner())?;
    let Some(view) = state.ads.status(&session_id, user.id()).await? else {
        return Ok(HttpResponse::NotFound().json(json!({
            "status": "denied",
            "reason": Denial::NotFound.code(),
        })));
    };

    let body = json!({
        "status": view.phase.code(),
        "session_id": view.session_id,
        "destination": view.destination,
        "valid_until": view.valid_until.to_rfc3339(),
        "timer_start_time": view.timer_start_time.map(|t| t.to_rfc3339()),
        "amount_cents": view.reward.cents(),
        "verified_at": view.verified_at.map(|t| t.to_rfc3339()),
        "dwell_seconds": view.dwell_seconds,
    });
    Ok(HttpResponse::Ok().json(with_remaining(body, view.remaining_seconds)))
}

pub async fn start_timer(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let session_id = parse_session_id(path.into_inner())?;
    match state.ads.start_timer(&session_id, user.id()).await? {
        TimerOutcome::Started { started_at } => {
            let required_wait = state.ads.policy().required_wait;
            state
                .countdowns
                .start(
                    CountdownSpec {
                        session_id,
                        user_id: user.id(),
                        started_at,
                        required_wait,
                    },
                    Arc::new(LogSink),
                )
                .await;

            Ok(HttpResponse::Ok().json(json!({
                "status": "started",
                "started_at": started_at.to_rfc3339(),
                "remaining_seconds": required_wait.num_seconds(),
            })))
        }
        TimerOutcome::Denied(denial) => Ok(denied(denial)),
    }
}

pub async fn verify(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let session_id = parse_session_id(path.into_inner())?;
    let outcome = state.ads.verify(&session_id, user.id()).await?;

    // A premature tap leaves the timer running; anything else ends it.
    if !matches!(outcome, VerifyOutcome::Rejected(Rejection::TooEarly { .. })) {
        state.countdowns.cancel(&session_id).await;
    }

    match outcome {
        VerifyOutcome::Rewarded { amount } => Ok(HttpResponse::Ok().json(json!({
            "status": "rewarded",
            "amount_cents": amount.cents(),
        }))),
        VerifyOutcome::Rejected(rejection) => Ok(rejected(rejection)),
    }
}

pub async fn cancel(
    user: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let session_id = parse_session_id(path.into_inner())?;
    let outcome = state.ads.cancel(&session_id, user.id()).await?;

    match outcome {
        CancelOutcome::Cancelled => {
            state.countdowns.cancel(&session_id).await;
            Ok(HttpResponse::Ok().json(json!({ "status": "cancelled" })))
        }
        CancelOutcome::NotFound => Ok(rejected(Rejection::NotFound)),
        CancelOutcome::AlreadyRewarded => Ok(rejected(Rejection::AlreadyRewarded)),
    }
}
