//! Skill controller: the standard pipelines with no kind-specific steps.

use stigmer_api::v1::skill_command_controller_server::SkillCommandController as SkillCommandApi;
use stigmer_api::v1::skill_query_controller_server::SkillQueryController as SkillQueryApi;
use stigmer_api::v1::{
    ApiResourceId, ApiResourceKind, ApiResourceReference, ListResourcesRequest, Skill, SkillList,
};
use tonic::{Request, Response, Status};

use crate::base::{Base, ControllerDeps};
use crate::boundary::respond;

/// Serves SkillCommandController and SkillQueryController.
#[derive(Debug)]
pub struct SkillController {
    base: Base<Skill>,
}

impl SkillController {
    /// Create the controller.
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            base: Base::new(deps),
        }
    }
}

#[tonic::async_trait]
impl SkillCommandApi for SkillController {
    async fn apply(&self, request: Request<Skill>) -> Result<Response<Skill>, Status> {
        let skill = request.into_inner();
        let result = match self.base.should_create(&skill).await {
            Ok(true) => self.base.create(skill).await,
            Ok(false) => self.base.update(skill).await,
            Err(err) => Err(err),
        };
        respond(result, ApiResourceKind::Skill, "apply")
    }

    async fn create(&self, request: Request<Skill>) -> Result<Response<Skill>, Status> {
        respond(
            self.base.create(request.into_inner()).await,
            ApiResourceKind::Skill,
            "create",
        )
    }

    async fn update(&self, request: Request<Skill>) -> Result<Response<Skill>, Status> {
        respond(
            self.base.update(request.into_inner()).await,
            ApiResourceKind::Skill,
            "update",
        )
    }

    async fn delete(&self, request: Request<ApiResourceId>) -> Result<Response<Skill>, Status> {
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::Skill,
            "delete",
        )
    }
}

#[tonic::async_trait]
impl SkillQueryApi for SkillController {
    async fn get(&self, request: Request<ApiResourceId>) -> Result<Response<Skill>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::Skill,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<Skill>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::Skill,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<SkillList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| SkillList { items });
        respond(result, ApiResourceKind::Skill, "list")
    }
}
