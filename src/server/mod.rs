//! Reference attendance gateway
//!
//! An in-memory actix-web implementation of the backend contract, seeded from
//! a TOML roster. It backs local development and the end-to-end tests; no
//! data survives a restart.

pub mod handlers;
pub mod store;

use actix_web::web;

pub use store::{GatewayStore, RosterFile, StoreError, StoreStats};

/// Register every gateway route under `/api`
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/groups", web::get().to(handlers::list_groups))
            .route(
                "/groups/{group_id}/students",
                web::get().to(handlers::list_students),
            )
            .route(
                "/students/{student_id}/credential/challenge",
                web::post().to(handlers::registration_challenge),
            )
            .route(
                "/students/{student_id}/credential",
                web::post().to(handlers::submit_credential),
            )
            .route(
                "/students/{student_id}/attendance",
                web::post().to(handlers::record_attendance),
            )
            .route(
                "/students/{student_id}/attendance",
                web::get().to(handlers::list_attendance),
            )
            .route(
                "/attendance/challenge",
                web::post().to(handlers::verification_challenge),
            )
            .route("/attendance/verify", web::post().to(handlers::verify)),
    );
}
