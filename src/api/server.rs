use chrono::{DateTime, Utc};
use log::info;
use rocket::config::Config;
use rocket::fairing::AdHoc;
use rocket::http::{Header, Method, Status};
use rocket::serde::json::Json;
use rocket::{catch, catchers, get, options, routes, Build, Request, Rocket};
use serde::Serialize;

use crate::api::response::ErrorBody;
use crate::api::{cache, lyrics, search, songs, AppState, API_PREFIX};

#[derive(Serialize)]
struct VersionResponse {
    version: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[get("/version")]
fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[get("/health")]
fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
    })
}

/// Preflight requests for any path; the CORS headers are added by the fairing
#[options("/<_..>")]
fn preflight() -> Status {
    Status::NoContent
}

#[catch(404)]
fn not_found() -> Json<ErrorBody> {
    Json(ErrorBody::new("Route not found"))
}

#[catch(422)]
fn unprocessable(request: &Request<'_>) -> Json<ErrorBody> {
    Json(ErrorBody {
        message: Some(format!("Invalid request body for {}", request.uri())),
        ..ErrorBody::new("Invalid request")
    })
}

#[catch(400)]
fn bad_request() -> Json<ErrorBody> {
    Json(ErrorBody::new("Bad request"))
}

#[catch(500)]
fn internal_error() -> Json<ErrorBody> {
    Json(ErrorBody::new("Internal server error"))
}

/// Response fairing allowing the configured frontend origin
fn cors(frontend_url: String) -> AdHoc {
    AdHoc::on_response("CORS", move |_request, response| {
        let origin = frontend_url.clone();
        Box::pin(async move {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
            response.set_header(Header::new(
                "Access-Control-Allow-Methods",
                [Method::Get, Method::Post, Method::Put, Method::Delete, Method::Options]
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ));
            response.set_header(Header::new("Access-Control-Allow-Headers", "Content-Type, Authorization"));
            response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
        })
    })
}

/// Assemble the server for the given state without launching it
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let webserver = &state.config.webserver;
    let figment = Config::figment()
        .merge(("port", webserver.port))
        .merge(("address", webserver.host.clone()));
    let frontend_url = webserver.frontend_url.clone();

    let mut api_routes = routes![get_version, health, preflight];
    api_routes.extend(search::routes());
    api_routes.extend(songs::routes());
    api_routes.extend(lyrics::routes());
    api_routes.extend(cache::routes());

    rocket::custom(figment)
        .mount(API_PREFIX, api_routes)
        .register("/", catchers![not_found, unprocessable, bad_request, internal_error])
        .attach(cors(frontend_url))
        .manage(state)
}

/// Start the Rocket server and run until it shuts down
pub async fn start_rocket_server(state: AppState) -> Result<(), rocket::Error> {
    info!(
        "Starting webserver on {}:{} ({})",
        state.config.webserver.host, state.config.webserver.port, state.config.environment
    );
    let _rocket = build_rocket(state).launch().await?;
    Ok(())
}
