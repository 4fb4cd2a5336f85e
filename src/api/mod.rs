mod admin;
mod health;
mod sensors;
mod telemetry;

pub use admin::reset_geo_database;
pub use health::health_check;
pub use sensors::{
    create_sensor, delete_sensor, get_sensor, get_sensor_by_name, list_sensors, sensors_near,
};
pub use telemetry::{get_telemetry, record_telemetry};

use crate::security::{require_admin, AdminGate};
use crate::service::SensorService;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared state for all handlers
pub struct AppState {
    pub service: SensorService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: SensorService) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

/// Build the HTTP router. Admin routes are only mounted when a gate is given.
pub fn router(state: Arc<AppState>, admin_gate: Option<AdminGate>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/sensors", post(create_sensor).get(list_sensors))
        .route("/sensors/near", get(sensors_near))
        .route("/sensors/by-name/:name", get(get_sensor_by_name))
        .route("/sensors/:id", get(get_sensor).delete(delete_sensor))
        .route(
            "/sensors/:id/telemetry",
            post(record_telemetry).get(get_telemetry),
        )
        .with_state(state.clone());

    if let Some(gate) = admin_gate {
        let admin = Router::new()
            .route("/geo/:database", delete(reset_geo_database))
            .route_layer(middleware::from_fn_with_state(Arc::new(gate), require_admin))
            .with_state(state);
        app = app.nest("/admin", admin);
    }

    app.layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Stores;
    use axum::{
        body::{to_bytes, Body},
        extract::ConnectInfo,
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with_gate(gate: Option<AdminGate>) -> Router {
        let service = SensorService::new(Stores::in_memory(), Duration::from_secs(1), 4);
        router(Arc::new(AppState::new(service)), gate)
    }

    fn app() -> Router {
        app_with_gate(None)
    }

    fn sensor_body(name: &str, latitude: f64, longitude: f64) -> Value {
        json!({
            "name": name,
            "type": "thermometer",
            "mac_address": "00:1B:44:11:3A:B7",
            "manufacturer": "Acme",
            "model": "T-1000",
            "serial_number": "SN-0001",
            "firmware_version": "1.0.3",
            "latitude": latitude,
            "longitude": longitude
        })
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_query_near() {
        let app = app();

        let response = send(&app, json_request("POST", "/sensors", &sensor_body("temp-01", 40.0, -3.0))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["name"], "temp-01");

        let response = send(
            &app,
            empty_request("GET", "/sensors/near?latitude=40.0&longitude=-3.0&radius=1000"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let near = body_json(response).await;
        let near = near.as_array().unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0]["name"], "temp-01");
        assert_eq!(near[0]["id"], created["id"]);
        assert_eq!(near[0]["location"]["type"], "Point");
        assert!(near[0]["temperature"].is_null());
    }

    #[tokio::test]
    async fn test_telemetry_round_trip() {
        let app = app();
        let report = json!({
            "temperature": 21.5,
            "humidity": 40.0,
            "battery_level": 88.0,
            "velocity": 0.0,
            "last_seen": "2024-05-01T12:00:00Z"
        });

        let response = send(&app, json_request("POST", "/sensors/7/telemetry", &report)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, empty_request("GET", "/sensors/7/telemetry")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "sensor_id": 7,
                "temperature": 21.5,
                "humidity": 40.0,
                "battery_level": 88.0,
                "velocity": 0.0,
                "last_seen": "2024-05-01T12:00:00Z"
            })
        );
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app();

        let response = send(&app, empty_request("DELETE", "/sensors/99")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");

        let response = send(&app, empty_request("GET", "/sensors/99/telemetry")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, json_request("POST", "/sensors", &sensor_body("bad", 100.0, 0.0))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"], "validation_error");

        send(&app, json_request("POST", "/sensors", &sensor_body("dup", 1.0, 1.0))).await;
        let response = send(&app, json_request("POST", "/sensors", &sensor_body("dup", 1.0, 1.0))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_malformed_requests_use_error_body() {
        let app = app();

        let req = Request::builder()
            .method("POST")
            .uri("/sensors")
            .header("content-type", "application/json")
            .body(Body::from("{\"name\": "))
            .unwrap();
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_request");

        let req = Request::builder()
            .method("POST")
            .uri("/sensors/7/telemetry")
            .body(Body::from("{}"))
            .unwrap();
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(response).await["error"], "invalid_request");

        let response = send(&app, empty_request("GET", "/sensors/abc")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_request");

        let response = send(&app, empty_request("GET", "/sensors/near?latitude=40.0&longitude=-3.0")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_request");
        assert!(body["message"].as_str().unwrap().contains("radius"));
    }

    #[tokio::test]
    async fn test_list_get_and_delete() {
        let app = app();
        for (name, lat) in [("a", 10.0), ("b", 11.0), ("c", 12.0)] {
            send(&app, json_request("POST", "/sensors", &sensor_body(name, lat, 0.0))).await;
        }

        let response = send(&app, empty_request("GET", "/sensors?skip=1&limit=1")).await;
        let page = body_json(response).await;
        assert_eq!(page, json!([{ "id": 2, "name": "b" }]));

        let response = send(&app, empty_request("GET", "/sensors/by-name/c")).await;
        assert_eq!(body_json(response).await["id"], 3);

        let response = send(&app, empty_request("DELETE", "/sensors/2")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, empty_request("GET", "/sensors/2")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &app,
            empty_request("GET", "/sensors/near?latitude=11.0&longitude=0.0&radius=10"),
        )
        .await;
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_health_reports_stores() {
        let response = send(&app(), empty_request("GET", "/health")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["mongodb_connected"], true);
    }

    #[tokio::test]
    async fn test_admin_routes_absent_without_token() {
        let response = send(&app(), empty_request("DELETE", "/admin/geo/SensorsDB")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_reset_requires_token() {
        let gate = AdminGate::new(Some("s3cret".to_string()), vec![]);
        let app = app_with_gate(gate);
        send(&app, json_request("POST", "/sensors", &sensor_body("temp-01", 40.0, -3.0))).await;

        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)));

        let mut req = empty_request("DELETE", "/admin/geo/SensorsDB");
        req.extensions_mut().insert(peer);
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut req = Request::builder()
            .method("DELETE")
            .uri("/admin/geo/SensorsDB")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(peer);
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            empty_request("GET", "/sensors/near?latitude=40.0&longitude=-3.0&radius=1000"),
        )
        .await;
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_admin_reset_rejects_foreign_ip() {
        let gate = AdminGate::new(Some("s3cret".to_string()), vec![]);
        let app = app_with_gate(gate);

        let mut req = Request::builder()
            .method("DELETE")
            .uri("/admin/geo/SensorsDB")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 40000))));

        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
