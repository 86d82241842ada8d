//! HTTP request handlers.
//!
//! Thin adapters from routes to [`Supervisor`] calls. Errors are rendered by
//! the `ResponseError` impls in [`crate::api::actix_error`].

use crate::api::actix_error::ApiError;
use crate::api::events::event_stream;
use crate::api::types::{CommandRequest, CreateServerRequest, StopQuery};
use crate::events::EventBus;
use crate::server::{ServerId, Supervisor};
use actix_web::{
    HttpRequest, HttpResponse, Responder,
    web::{self, Data, Json, Path, Query},
};
use std::sync::Arc;
use std::time::Duration;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiState {
    /// Server registry
    pub supervisor: Arc<Supervisor>,
    /// Bus streamed on `/events`
    pub bus: EventBus,
    /// Idle interval after which `/events` writes a keep-alive comment
    pub keep_alive: Duration,
}

type HandlerResult = Result<HttpResponse, ApiError>;

/// Register every route of the API
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/events", web::get().to(events))
        .route("/servers", web::get().to(list_servers))
        .route("/servers", web::post().to(create_server))
        .route("/servers/{id}", web::get().to(get_server))
        .route("/servers/{id}", web::delete().to(delete_server))
        .route("/servers/{id}/start", web::post().to(start_server))
        .route("/servers/{id}/stop", web::post().to(stop_server))
        .route("/servers/{id}/restart", web::post().to(restart_server))
        .route("/servers/{id}/cmd", web::post().to(send_command))
        .route("/servers/{id}/logs", web::get().to(server_logs));
}

pub async fn health() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("ok")
}

/// `GET /events`: live SSE stream of every server event
pub async fn events(state: Data<ApiState>, req: HttpRequest) -> impl Responder {
    let subscriber = state.bus.subscribe();
    tracing::debug!(
        peer = ?req.peer_addr(),
        subscribers = state.bus.subscriber_count(),
        "Client attached to event stream"
    );

    HttpResponse::Ok()
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("X-Accel-Buffering", "no"))
        .streaming(event_stream(subscriber, state.keep_alive))
}

pub async fn list_servers(state: Data<ApiState>) -> HandlerResult {
    Ok(HttpResponse::Ok().json(state.supervisor.list_all()))
}

pub async fn get_server(state: Data<ApiState>, id: Path<String>) -> HandlerResult {
    let info = state.supervisor.get_by_id(&ServerId::new(id.into_inner()))?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn create_server(
    state: Data<ApiState>,
    body: Json<CreateServerRequest>,
) -> HandlerResult {
    let info = state.supervisor.create(body.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn delete_server(state: Data<ApiState>, id: Path<String>) -> HandlerResult {
    state
        .supervisor
        .delete(&ServerId::new(id.into_inner()))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn start_server(state: Data<ApiState>, id: Path<String>) -> HandlerResult {
    let info = state.supervisor.start(&ServerId::new(id.into_inner())).await?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn stop_server(
    state: Data<ApiState>,
    id: Path<String>,
    query: Query<StopQuery>,
) -> HandlerResult {
    let info = state
        .supervisor
        .stop(&ServerId::new(id.into_inner()), !query.force)
        .await?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn restart_server(state: Data<ApiState>, id: Path<String>) -> HandlerResult {
    let info = state
        .supervisor
        .restart(&ServerId::new(id.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn send_command(
    state: Data<ApiState>,
    id: Path<String>,
    body: Json<CommandRequest>,
) -> HandlerResult {
    let command = body.command.trim();
    if command.is_empty() {
        return Err(ApiError::InvalidRequest("command is empty".to_string()));
    }
    if command.contains(['\n', '\r']) {
        return Err(ApiError::InvalidRequest(
            "command must be a single line".to_string(),
        ));
    }

    state
        .supervisor
        .send_command(&ServerId::new(id.into_inner()), command)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// `GET /servers/{id}/logs`: recent console output as plain text
pub async fn server_logs(state: Data<ApiState>, id: Path<String>) -> HandlerResult {
    let text = state.supervisor.logs_text(&ServerId::new(id.into_inner()))?;
    if text.is_empty() {
        return Ok(HttpResponse::NoContent().finish());
    }
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(text))
}
