#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::Path;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use rollcall::{
    server::{configure_services, GatewayStore, RosterFile},
    settings::RollcallSettings,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = RollcallSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let roster = RosterFile::load(Path::new(&settings.server.roster_file))
        .map_err(|e| std::io::Error::other(format!("Failed to load roster: {e}")))?;
    let store = GatewayStore::from_roster(roster)
        .map_err(|e| std::io::Error::other(format!("Failed to seed gateway: {e}")))?;

    start_server(store, settings).await
}

/// Start the reference gateway
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(store: GatewayStore, settings: RollcallSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &store, &settings);

    let store = web::Data::new(store);
    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Content-Type", "Accept"])
            .max_age(3600);

        App::new()
            .app_data(store.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, store: &GatewayStore, settings: &RollcallSettings) {
    let stats = store.stats();
    println!("Starting Rollcall reference gateway on http://{bind_address}");
    println!(
        "Roster: {} ({} groups, {} students)",
        settings.server.roster_file, stats.groups, stats.students
    );
    println!("Relying party: {}", settings.relying_party.name);
    println!();
    println!("Enrollment endpoints:");
    println!("  POST /api/students/{{id}}/credential/challenge - Issue registration challenge");
    println!("  POST /api/students/{{id}}/credential           - Store registered credential");
    println!();
    println!("Attendance endpoints:");
    println!("  POST /api/attendance/challenge         - Issue group verification challenge");
    println!("  POST /api/attendance/verify            - Resolve credential and record attendance");
    println!("  POST /api/students/{{id}}/attendance     - Record manual attendance");
    println!("  GET  /api/students/{{id}}/attendance     - Attendance history");
    println!();
    println!("System endpoints:");
    println!("  GET  /api/health            - Health check");
    println!("  GET  /api/groups            - List groups");
    println!("  GET  /api/groups/{{id}}/students - List a group's students");
}
