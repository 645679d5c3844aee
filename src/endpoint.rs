/// HTTP facade republishing the cached station catalog.
///
/// Endpoints:
/// - GET /health                                  - Service health check
/// - GET /version                                 - Build information
/// - GET /stations                                - Full GeoJSON catalog
/// - GET /stations/{station_ref}                  - All sensors of one station
/// - GET /stations/{station_ref}/sensors/{sensor} - One sensor of one station
/// - GET /regions/{region_id}/stations            - Every sensor in a region
///
/// Routing is the pure function `route`; the tiny_http loop only moves bytes.

use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::PoisonError;
use tracing::{info, warn};

use crate::poller::SharedCatalog;
use crate::stations::StationsLatest;

pub const SERVICE_NAME: &str = "rivers_service";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const ENDPOINTS: &[&str] = &[
    "/health",
    "/version",
    "/stations",
    "/stations/{station_ref}",
    "/stations/{station_ref}/sensors/{sensor_ref}",
    "/regions/{region_id}/stations",
];

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Maps a request to a status code and JSON body. Query strings are ignored.
pub fn route(method: &str, url: &str, catalog: &StationsLatest) -> (u16, Value) {
    if !method.eq_ignore_ascii_case("GET") {
        return (405, json!({ "error": "Method not allowed", "allowed": ["GET"] }));
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    match segments.as_slice() {
        ["health"] => handle_health(catalog),
        ["version"] => (200, json!({ "name": SERVICE_NAME, "version": VERSION })),
        ["stations"] => collection(catalog),
        ["stations", station_ref] => non_empty(catalog.by_id(station_ref), || {
            json!({ "error": "Station not found", "station_ref": station_ref })
        }),
        ["stations", station_ref, "sensors", sensor_ref] => {
            non_empty(catalog.by_station_and_sensor(station_ref, sensor_ref), || {
                json!({
                    "error": "Sensor not found",
                    "station_ref": station_ref,
                    "sensor_ref": sensor_ref
                })
            })
        }
        ["regions", region_id, "stations"] => match region_id.parse::<i64>() {
            Ok(id) => collection(&catalog.by_region(id)),
            Err(_) => (400, json!({ "error": "Invalid region id", "region_id": region_id })),
        },
        _ => (404, json!({ "error": "Not found", "available_endpoints": ENDPOINTS })),
    }
}

fn handle_health(catalog: &StationsLatest) -> (u16, Value) {
    (
        200,
        json!({
            "status": "ok",
            "service": SERVICE_NAME,
            "version": VERSION,
            "stations": catalog.station_count()
        }),
    )
}

fn collection(catalog: &StationsLatest) -> (u16, Value) {
    match serde_json::to_value(catalog) {
        Ok(body) => (200, body),
        Err(e) => (500, json!({ "error": e.to_string() })),
    }
}

fn non_empty(found: StationsLatest, not_found: impl FnOnce() -> Value) -> (u16, Value) {
    if found.features.is_empty() {
        (404, not_found())
    } else {
        collection(&found)
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Serves the catalog on `0.0.0.0:{port}` until the process exits.
pub fn start_endpoint_server(port: u16, catalog: SharedCatalog) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    info!(port, "HTTP endpoint listening");
    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", port);
    for endpoint in ENDPOINTS {
        println!("   GET {}", endpoint);
    }
    println!();

    for request in server.incoming_requests() {
        let (status, body) = {
            let catalog = catalog.read().unwrap_or_else(PoisonError::into_inner);
            route(request.method().as_str(), request.url(), &catalog)
        };

        if let Err(e) = request.respond(create_response(status, &body)) {
            warn!(error = %e, "failed to send response");
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &Value) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| "{}".to_string());
    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));

    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
