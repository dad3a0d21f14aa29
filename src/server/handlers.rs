//! HTTP handlers for the reference gateway
//!
//! Each handler is a thin shell over [`GatewayStore`]; store errors are turned
//! into the `{error, suggestions}` body the gateway client understands.

use actix_web::{web, HttpResponse, Result};
use chrono::Local;
use serde::Serialize;

use crate::gateway::{
    CredentialSubmission, ErrorBody, ManualAttendanceRequest, VerificationChallengeRequest,
    VerificationRequest,
};

use super::store::{GatewayStore, StoreError, StoreStats};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    #[serde(flatten)]
    stats: StoreStats,
}

/// Convert `StoreError` to HTTP response
fn error_to_response(error: &StoreError) -> HttpResponse {
    let body = ErrorBody {
        error: error.to_string(),
        suggestions: Vec::new(),
    };
    match error {
        StoreError::NotFound(_) => HttpResponse::NotFound().json(body),
        StoreError::Invalid(_) => HttpResponse::BadRequest().json(body),
        StoreError::Conflict(_) => HttpResponse::Conflict().json(body),
        StoreError::Roster(_) | StoreError::Random => {
            log::error!("Gateway store failure: {error}");
            HttpResponse::InternalServerError().json(ErrorBody {
                error: "An internal error occurred".to_string(),
                suggestions: Vec::new(),
            })
        }
    }
}

fn respond<T: Serialize>(result: Result<T, StoreError>) -> HttpResponse {
    match result {
        Ok(value) => HttpResponse::Ok().json(value),
        Err(e) => error_to_response(&e),
    }
}

/// Health check with group and student counts
///
/// # Errors
///
/// Never fails; the `Result` matches the actix handler signature.
pub async fn health(store: web::Data<GatewayStore>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        stats: store.stats(),
    }))
}

/// List every group
///
/// # Errors
///
/// Never fails; the `Result` matches the actix handler signature.
pub async fn list_groups(store: web::Data<GatewayStore>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(store.groups()))
}

/// List the students of a group
///
/// # Errors
///
/// Never fails; store errors become error responses.
pub async fn list_students(
    path: web::Path<String>,
    store: web::Data<GatewayStore>,
) -> Result<HttpResponse> {
    Ok(respond(store.students(&path)))
}

/// Issue a registration challenge for a student
///
/// # Errors
///
/// Never fails; store errors become error responses.
pub async fn registration_challenge(
    path: web::Path<String>,
    store: web::Data<GatewayStore>,
) -> Result<HttpResponse> {
    Ok(respond(store.registration_challenge(&path)))
}

/// Store the credential produced by a registration ceremony
///
/// # Errors
///
/// Never fails; store errors become error responses.
pub async fn submit_credential(
    path: web::Path<String>,
    body: web::Json<CredentialSubmission>,
    store: web::Data<GatewayStore>,
) -> Result<HttpResponse> {
    let student_id = path.into_inner();
    Ok(match store.store_credential(&student_id, body.into_inner()) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "studentId": student_id,
            "hasCredential": true,
        })),
        Err(e) => error_to_response(&e),
    })
}

/// Issue a verification challenge scoped to a group
///
/// # Errors
///
/// Never fails; store errors become error responses.
pub async fn verification_challenge(
    body: web::Json<VerificationChallengeRequest>,
    store: web::Data<GatewayStore>,
) -> Result<HttpResponse> {
    Ok(respond(store.verification_challenge(&body.group_id)))
}

/// Resolve a credential and record attendance on a match
///
/// # Errors
///
/// Never fails; store errors become error responses.
pub async fn verify(
    body: web::Json<VerificationRequest>,
    store: web::Data<GatewayStore>,
) -> Result<HttpResponse> {
    Ok(respond(store.verify(&body, Local::now().naive_local())))
}

/// Record attendance without a fingerprint
///
/// # Errors
///
/// Never fails; store errors become error responses.
pub async fn record_attendance(
    path: web::Path<String>,
    body: web::Json<ManualAttendanceRequest>,
    store: web::Data<GatewayStore>,
) -> Result<HttpResponse> {
    if body.student_id != *path {
        return Ok(error_to_response(&StoreError::Invalid(
            "studentId does not match the request path".to_string(),
        )));
    }
    Ok(respond(store.record_attendance(
        &path,
        body.method,
        Local::now().naive_local(),
    )))
}

/// Attendance history of a student
///
/// # Errors
///
/// Never fails; store errors become error responses.
pub async fn list_attendance(
    path: web::Path<String>,
    store: web::Data<GatewayStore>,
) -> Result<HttpResponse> {
    Ok(respond(store.attendance(&path)))
}
