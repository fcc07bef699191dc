//! HTTP/JSON adapter.
//!
//! Thin translation between axum handlers and [`Calendar`]. Storage errors
//! map onto status codes; every response body on failure is an
//! [`ErrorResponse`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use calendar_protocol::http::{
    CreatedResponse, DayQuery, ErrorResponse, EventPayload, EventRecord, HealthResponse,
    RangeQuery, UserPayload, UserRecord,
};
use calendar_storage::{StorageError, StorageErrorCode};

use crate::app::Calendar;
use crate::config::HttpConfig;
use crate::error::{ServerError, ServerResult};
use crate::signals::ShutdownSignal;

/// A storage error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(StorageError);

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self(e)
    }
}

/// Status code for a storage error code.
pub fn status_for(code: StorageErrorCode) -> StatusCode {
    match code {
        StorageErrorCode::NotFound => StatusCode::NOT_FOUND,
        StorageErrorCode::Validation => StatusCode::BAD_REQUEST,
        StorageErrorCode::Transport => StatusCode::SERVICE_UNAVAILABLE,
        StorageErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = ErrorResponse::new(code.as_str(), self.0.message());
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Builds the router over a shared calendar.
pub fn router(calendar: Arc<Calendar>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/create/user", post(create_user))
        .route("/select/users", get(select_users))
        .route("/delete/user/{id}", delete(delete_user))
        .route("/create/event", post(create_event))
        .route("/select/events", get(select_events))
        .route("/update/event", put(update_event))
        .route("/delete/event/{id}", delete(delete_event))
        .route("/select/events/day", get(select_events_for_day))
        .route("/select/events/week", get(select_events_for_week))
        .route("/select/events/month", get(select_events_for_month))
        .layer(TraceLayer::new_for_http())
        .with_state(calendar)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn create_user(
    State(calendar): State<Arc<Calendar>>,
    Json(payload): Json<UserPayload>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let id = calendar.create_user(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn select_users(State(calendar): State<Arc<Calendar>>) -> ApiResult<Json<Vec<UserRecord>>> {
    let users = calendar.select_users().await?;
    Ok(Json(users.into_iter().map(UserRecord::from).collect()))
}

async fn delete_user(
    State(calendar): State<Arc<Calendar>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    calendar.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_event(
    State(calendar): State<Arc<Calendar>>,
    Json(payload): Json<EventPayload>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let id = calendar.create_event(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn select_events(
    State(calendar): State<Arc<Calendar>>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    Ok(records(calendar.select_events().await?))
}

async fn update_event(
    State(calendar): State<Arc<Calendar>>,
    Json(record): Json<EventRecord>,
) -> ApiResult<StatusCode> {
    calendar.update_event(record.into()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_event(
    State(calendar): State<Arc<Calendar>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    calendar.delete_event(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn select_events_for_day(
    State(calendar): State<Arc<Calendar>>,
    Query(query): Query<DayQuery>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    Ok(records(calendar.select_events_for_day(query.reference()).await?))
}

async fn select_events_for_week(
    State(calendar): State<Arc<Calendar>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    Ok(records(calendar.select_events_for_week(query.reference()).await?))
}

async fn select_events_for_month(
    State(calendar): State<Arc<Calendar>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    Ok(records(calendar.select_events_for_month(query.reference()).await?))
}

fn records(events: Vec<calendar_core::Event>) -> Json<Vec<EventRecord>> {
    Json(events.into_iter().map(EventRecord::from).collect())
}

/// A bound HTTP listener, ready to serve.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    /// Binds the listener. Failing here is a setup failure.
    pub async fn bind(config: &HttpConfig, calendar: Arc<Calendar>) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                component: "http",
                addr: config.addr,
                source,
            })?;
        Ok(Self {
            listener,
            router: router(calendar),
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` fires, then lets in-flight requests finish.
    pub async fn serve(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.local_addr()?;
        info!(%addr, "HTTP server listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await
            .map_err(|e| ServerError::serve("http", e.to_string()))?;
        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use calendar_storage::MemoryStorage;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(Calendar::new(Arc::new(MemoryStorage::new()))))
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn event_body() -> serde_json::Value {
        serde_json::json!({
            "title": "Planning",
            "description": "Q3",
            "beginning": "2025-02-05T10:00:00Z",
            "finish": "2025-02-05T11:00:00Z",
            "notification": "2025-02-05T09:45:00.750Z",
            "userId": "u-1"
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn event_lifecycle() {
        let app = app();

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/create/event", event_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(get_request("/select/events/day?date=2025-02-05"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let events = body_json(response).await;
        assert_eq!(events[0]["id"], id.as_str());
        assert_eq!(events[0]["notification"], "2025-02-05T09:45:00Z");

        let mut updated = events[0].clone();
        updated["title"] = "Planning (moved)".into();
        let response = app
            .clone()
            .oneshot(json_request(Method::PUT, "/update/event", updated))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(format!("/delete/event/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(get_request("/select/events")).await.unwrap();
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let app = app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/delete/user/nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "not_found");

        let mut ghost = event_body();
        ghost["id"] = "ghost".into();
        let response = app
            .oneshot(json_request(Method::PUT, "/update/event", ghost))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_event_is_bad_request() {
        let mut body = event_body();
        body["finish"] = "2025-02-05T09:00:00Z".into();
        let response = app()
            .oneshot(json_request(Method::POST, "/create/event", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "validation");
    }

    #[tokio::test]
    async fn users_round_trip_through_json() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/create/user",
                serde_json::json!({
                    "firstName": "Ada",
                    "lastName": "Lovelace",
                    "email": "ada@example.com",
                    "age": 36
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app.oneshot(get_request("/select/users")).await.unwrap();
        let users = body_json(response).await;
        assert_eq!(users[0]["firstName"], "Ada");
        assert_eq!(users[0]["age"], 36);
    }

    #[tokio::test]
    async fn malformed_query_is_rejected() {
        let response = app()
            .oneshot(get_request("/select/events/week?startDate=yesterday"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn far_future_week_is_empty() {
        let response = app()
            .oneshot(get_request("/select/events/week?startDate=%2B262142-12-30"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(StorageErrorCode::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(StorageErrorCode::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(StorageErrorCode::Transport),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(StorageErrorCode::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let calendar = Arc::new(Calendar::new(Arc::new(MemoryStorage::new())));
        let config = HttpConfig::new(crate::config::ephemeral_addr());
        let server = HttpServer::bind(&config, calendar).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let root = crate::signals::ShutdownHandle::new();
        let task = tokio::spawn(server.serve(root.wait()));
        root.trigger();
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
