//! gRPC adapter for `calendar.EventService` and `calendar.UserService`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, info_span, warn};

use calendar_core::{Event as DomainEvent, NewEvent};
use calendar_protocol::ProtocolError;
use calendar_protocol::grpc::event_service_server::{EventService, EventServiceServer};
use calendar_protocol::grpc::user_service_server::{UserService, UserServiceServer};
use calendar_protocol::grpc::{DateRequest, Event, Events, Id, User, Users, Void};
use calendar_storage::{StorageError, StorageErrorCode};

use crate::app::Calendar;
use crate::config::GrpcConfig;
use crate::error::{ServerError, ServerResult};
use crate::signals::ShutdownSignal;

/// Maps a storage error onto a gRPC status.
pub fn status_from_storage(err: StorageError) -> Status {
    let message = err.message().to_string();
    match err.code() {
        StorageErrorCode::NotFound => Status::not_found(message),
        StorageErrorCode::Validation => Status::invalid_argument(message),
        StorageErrorCode::Transport => {
            warn!(error = %err, "Storage unavailable");
            Status::unavailable(message)
        }
        StorageErrorCode::Internal => {
            warn!(error = %err, "Storage failure");
            Status::internal(message)
        }
    }
}

fn status_from_protocol(err: ProtocolError) -> Status {
    Status::invalid_argument(err.to_string())
}

/// `calendar.EventService` over a shared calendar.
#[derive(Debug, Clone)]
pub struct EventApi {
    calendar: Arc<Calendar>,
}

impl EventApi {
    pub fn new(calendar: Arc<Calendar>) -> Self {
        Self { calendar }
    }
}

#[tonic::async_trait]
impl EventService for EventApi {
    async fn create_event(&self, request: Request<Event>) -> Result<Response<Id>, Status> {
        let event = NewEvent::try_from(request.into_inner()).map_err(status_from_protocol)?;
        let id = self
            .calendar
            .create_event(event)
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(Id { id }))
    }

    async fn select_events(&self, _: Request<Void>) -> Result<Response<Events>, Status> {
        let events = self
            .calendar
            .select_events()
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(events.into_iter().collect()))
    }

    async fn update_event(&self, request: Request<Event>) -> Result<Response<Void>, Status> {
        let event = DomainEvent::try_from(request.into_inner()).map_err(status_from_protocol)?;
        if event.id.is_empty() {
            return Err(Status::invalid_argument("event id is required"));
        }
        self.calendar
            .update_event(event)
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(Void {}))
    }

    async fn delete_event(&self, request: Request<Id>) -> Result<Response<Void>, Status> {
        self.calendar
            .delete_event(&request.into_inner().id)
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(Void {}))
    }

    async fn select_events_for_day(
        &self,
        request: Request<DateRequest>,
    ) -> Result<Response<Events>, Status> {
        let date = request.get_ref().reference().map_err(status_from_protocol)?;
        let events = self
            .calendar
            .select_events_for_day(date)
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(events.into_iter().collect()))
    }

    async fn select_events_for_week(
        &self,
        request: Request<DateRequest>,
    ) -> Result<Response<Events>, Status> {
        let date = request.get_ref().reference().map_err(status_from_protocol)?;
        let events = self
            .calendar
            .select_events_for_week(date)
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(events.into_iter().collect()))
    }

    async fn select_events_for_month(
        &self,
        request: Request<DateRequest>,
    ) -> Result<Response<Events>, Status> {
        let date = request.get_ref().reference().map_err(status_from_protocol)?;
        let events = self
            .calendar
            .select_events_for_month(date)
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(events.into_iter().collect()))
    }
}

/// `calendar.UserService` over a shared calendar.
#[derive(Debug, Clone)]
pub struct UserApi {
    calendar: Arc<Calendar>,
}

impl UserApi {
    pub fn new(calendar: Arc<Calendar>) -> Self {
        Self { calendar }
    }
}

#[tonic::async_trait]
impl UserService for UserApi {
    async fn create_user(&self, request: Request<User>) -> Result<Response<Id>, Status> {
        let id = self
            .calendar
            .create_user(request.into_inner().into())
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(Id { id }))
    }

    async fn select_users(&self, _: Request<Void>) -> Result<Response<Users>, Status> {
        let users = self
            .calendar
            .select_users()
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(users.into_iter().collect()))
    }

    async fn delete_user(&self, request: Request<Id>) -> Result<Response<Void>, Status> {
        self.calendar
            .delete_user(&request.into_inner().id)
            .await
            .map_err(status_from_storage)?;
        Ok(Response::new(Void {}))
    }
}

/// A bound gRPC listener, ready to serve.
pub struct GrpcServer {
    listener: TcpListener,
    calendar: Arc<Calendar>,
}

impl GrpcServer {
    /// Binds the listener. Failing here is a setup failure.
    pub async fn bind(config: &GrpcConfig, calendar: Arc<Calendar>) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                component: "grpc",
                addr: config.addr,
                source,
            })?;
        Ok(Self { listener, calendar })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` fires, then lets in-flight calls finish.
    pub async fn serve(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.local_addr()?;
        info!(%addr, "gRPC server listening");

        Server::builder()
            .trace_fn(|req| info_span!("grpc", path = %req.uri().path()))
            .add_service(EventServiceServer::new(EventApi::new(self.calendar.clone())))
            .add_service(UserServiceServer::new(UserApi::new(self.calendar)))
            .serve_with_incoming_shutdown(TcpListenerStream::new(self.listener), shutdown.wait())
            .await
            .map_err(|e| ServerError::serve("grpc", e.to_string()))?;

        info!("gRPC server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_protocol::grpc::event_service_client::EventServiceClient;
    use calendar_protocol::grpc::user_service_client::UserServiceClient;
    use calendar_protocol::grpc::to_timestamp;
    use calendar_storage::MemoryStorage;
    use chrono::{Duration, TimeZone, Utc};
    use tonic::Code;

    use crate::config::ephemeral_addr;
    use crate::signals::ShutdownHandle;

    fn calendar() -> Arc<Calendar> {
        Arc::new(Calendar::new(Arc::new(MemoryStorage::new())))
    }

    fn wire_event() -> Event {
        let at = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        Event {
            id: String::new(),
            title: "Retro".to_string(),
            description: "Sprint 12".to_string(),
            beginning: Some(to_timestamp(at)),
            finish: Some(to_timestamp(at + Duration::hours(1))),
            notification: Some(to_timestamp(at - Duration::minutes(10))),
            user_id: "u-1".to_string(),
        }
    }

    #[tokio::test]
    async fn event_api_direct_calls() {
        let api = EventApi::new(calendar());
        let id = api
            .create_event(Request::new(wire_event()))
            .await
            .unwrap()
            .into_inner()
            .id;

        let date = Utc.with_ymd_and_hms(2025, 2, 5, 0, 0, 0).unwrap();
        let events = api
            .select_events_for_day(Request::new(DateRequest::new(date)))
            .await
            .unwrap()
            .into_inner()
            .events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);

        let status = api
            .delete_event(Request::new(Id {
                id: "missing".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn missing_fields_are_invalid_arguments() {
        let api = EventApi::new(calendar());

        let mut event = wire_event();
        event.beginning = None;
        let status = api.create_event(Request::new(event)).await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status = api
            .update_event(Request::new(wire_event()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status = api
            .select_events_for_week(Request::new(DateRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[test]
    fn storage_errors_map_to_status_codes() {
        let cases = [
            (StorageError::not_found("x"), Code::NotFound),
            (StorageError::validation("x"), Code::InvalidArgument),
            (StorageError::transport("x"), Code::Unavailable),
            (StorageError::internal("x"), Code::Internal),
        ];
        for (err, code) in cases {
            assert_eq!(status_from_storage(err).code(), code);
        }
    }

    #[tokio::test]
    async fn serves_both_services_over_tcp() {
        let server = GrpcServer::bind(&GrpcConfig::new(ephemeral_addr()), calendar())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let root = ShutdownHandle::new();
        let task = tokio::spawn(server.serve(root.wait()));

        let endpoint = format!("http://{addr}");
        let mut users = UserServiceClient::connect(endpoint.clone()).await.unwrap();
        let id = users
            .create_user(User {
                id: String::new(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                age: 36,
            })
            .await
            .unwrap()
            .into_inner()
            .id;
        let listed = users.select_users(Void {}).await.unwrap().into_inner().users;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);

        let mut events = EventServiceClient::connect(endpoint).await.unwrap();
        let status = events
            .delete_event(Id {
                id: "missing".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        drop(users);
        drop(events);
        root.trigger();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
