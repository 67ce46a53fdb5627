//! Session controller. Sessions are also auto-created by the execution
//! pipelines through this controller's Create path, so auto-created and
//! caller-provided sessions are indistinguishable.

use stigmer_api::v1::session_command_controller_server::SessionCommandController as SessionCommandApi;
use stigmer_api::v1::session_query_controller_server::SessionQueryController as SessionQueryApi;
use stigmer_api::v1::{
    ApiResourceId, ApiResourceKind, ApiResourceReference, ListResourcesRequest, Session,
    SessionList,
};
use tonic::{Request, Response, Status};

use crate::base::{Base, ControllerDeps};
use crate::boundary::respond;

/// Serves SessionCommandController and SessionQueryController.
#[derive(Debug)]
pub struct SessionController {
    base: Base<Session>,
}

impl SessionController {
    /// Create the controller.
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            base: Base::new(deps),
        }
    }
}

#[tonic::async_trait]
impl SessionCommandApi for SessionController {
    async fn apply(&self, request: Request<Session>) -> Result<Response<Session>, Status> {
        let session = request.into_inner();
        let result = match self.base.should_create(&session).await {
            Ok(true) => self.base.create(session).await,
            Ok(false) => self.base.update(session).await,
            Err(err) => Err(err),
        };
        respond(result, ApiResourceKind::Session, "apply")
    }

    async fn create(&self, request: Request<Session>) -> Result<Response<Session>, Status> {
        respond(
            self.base.create(request.into_inner()).await,
            ApiResourceKind::Session,
            "create",
        )
    }

    async fn update(&self, request: Request<Session>) -> Result<Response<Session>, Status> {
        respond(
            self.base.update(request.into_inner()).await,
            ApiResourceKind::Session,
            "update",
        )
    }

    async fn delete(&self, request: Request<ApiResourceId>) -> Result<Response<Session>, Status> {
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::Session,
            "delete",
        )
    }
}

#[tonic::async_trait]
impl SessionQueryApi for SessionController {
    async fn get(&self, request: Request<ApiResourceId>) -> Result<Response<Session>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::Session,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<Session>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::Session,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<SessionList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| SessionList { items });
        respond(result, ApiResourceKind::Session, "list")
    }
}
