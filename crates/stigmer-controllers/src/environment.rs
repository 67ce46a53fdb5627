//! Environment controller. Secret values are encrypted before persist;
//! reads return ciphertext. Decryption happens only inside the execution
//! create-pipeline when building an ExecutionContext.

use std::sync::Arc;

use stigmer_api::v1::environment_command_controller_server::EnvironmentCommandController as EnvironmentCommandApi;
use stigmer_api::v1::environment_query_controller_server::EnvironmentQueryController as EnvironmentQueryApi;
use stigmer_api::v1::{
    ApiResourceId, ApiResourceKind, ApiResourceReference, Environment, EnvironmentList,
    ListResourcesRequest,
};
use stigmer_crypto::SecretBox;
use stigmer_pipeline::PipelineError;
use tonic::{Request, Response, Status};

use crate::base::{Base, ControllerDeps};
use crate::boundary::respond;

/// Serves EnvironmentCommandController and EnvironmentQueryController.
pub struct EnvironmentController {
    base: Base<Environment>,
    secrets: Arc<SecretBox>,
}

impl std::fmt::Debug for EnvironmentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentController").finish_non_exhaustive()
    }
}

impl EnvironmentController {
    /// Create the controller.
    #[must_use]
    pub fn new(deps: ControllerDeps, secrets: Arc<SecretBox>) -> Self {
        Self {
            base: Base::new(deps),
            secrets,
        }
    }

    /// Encrypt every secret value in the spec in place. Values that
    /// already decrypt under our key are left untouched, so re-applying
    /// a previously read environment does not double-encrypt.
    fn seal_secrets(&self, environment: &mut Environment) -> Result<(), PipelineError> {
        let Some(spec) = environment.spec.as_mut() else {
            return Ok(());
        };
        for (key, value) in &mut spec.data {
            if !value.is_secret {
                continue;
            }
            if self.secrets.decrypt(&value.value).is_ok() {
                continue;
            }
            value.value = self.secrets.encrypt(&value.value).map_err(|e| {
                PipelineError::internal(format!("encrypting {key}: {e}"))
            })?;
        }
        Ok(())
    }

    async fn do_create(&self, mut environment: Environment) -> Result<Environment, PipelineError> {
        self.seal_secrets(&mut environment)?;
        self.base.create(environment).await
    }

    async fn do_update(&self, mut environment: Environment) -> Result<Environment, PipelineError> {
        self.seal_secrets(&mut environment)?;
        self.base.update(environment).await
    }
}

#[tonic::async_trait]
impl EnvironmentCommandApi for EnvironmentController {
    async fn apply(
        &self,
        request: Request<Environment>,
    ) -> Result<Response<Environment>, Status> {
        let environment = request.into_inner();
        let result = match self.base.should_create(&environment).await {
            Ok(true) => self.do_create(environment).await,
            Ok(false) => self.do_update(environment).await,
            Err(err) => Err(err),
        };
        respond(result, ApiResourceKind::Environment, "apply")
    }

    async fn create(
        &self,
        request: Request<Environment>,
    ) -> Result<Response<Environment>, Status> {
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::Environment,
            "create",
        )
    }

    async fn update(
        &self,
        request: Request<Environment>,
    ) -> Result<Response<Environment>, Status> {
        respond(
            self.do_update(request.into_inner()).await,
            ApiResourceKind::Environment,
            "update",
        )
    }

    async fn delete(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<Environment>, Status> {
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::Environment,
            "delete",
        )
    }
}

#[tonic::async_trait]
impl EnvironmentQueryApi for EnvironmentController {
    async fn get(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<Environment>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::Environment,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<Environment>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::Environment,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<EnvironmentList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| EnvironmentList { items });
        respond(result, ApiResourceKind::Environment, "list")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stigmer_api::Resource;
    use stigmer_api::v1::{ApiResourceMetadata, EnvVarValue, EnvironmentSpec};
    use stigmer_core::{IdGenerator, SystemClock};
    use stigmer_store::MemoryKvStore;

    fn controller() -> EnvironmentController {
        let deps = ControllerDeps::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(IdGenerator::new()),
            Arc::new(SystemClock),
        );
        EnvironmentController::new(deps, Arc::new(SecretBox::new(&SecretBox::generate_key())))
    }

    fn environment_with_secret() -> Environment {
        Environment {
            metadata: Some(ApiResourceMetadata {
                name: "prod".to_string(),
                org: "acme".to_string(),
                ..Default::default()
            }),
            spec: Some(EnvironmentSpec {
                data: [
                    (
                        "GITHUB_TOKEN".to_string(),
                        EnvVarValue {
                            value: "ghp_abc".to_string(),
                            is_secret: true,
                        },
                    ),
                    (
                        "REGION".to_string(),
                        EnvVarValue {
                            value: "eu-west-1".to_string(),
                            is_secret: false,
                        },
                    ),
                ]
                .into_iter()
                .collect(),
            }),
            status: None,
        }
    }

    #[tokio::test]
    async fn secrets_are_sealed_on_create() {
        let controller = controller();
        let created = controller
            .do_create(environment_with_secret())
            .await
            .unwrap();

        let data = &created.spec.as_ref().unwrap().data;
        assert_ne!(data["GITHUB_TOKEN"].value, "ghp_abc");
        assert!(!data["GITHUB_TOKEN"].value.contains("ghp_abc"));
        assert_eq!(data["REGION"].value, "eu-west-1");

        // Stored bytes carry no plaintext either.
        let raw = controller
            .base
            .store
            .raw(created.id())
            .await
            .unwrap()
            .unwrap();
        assert!(!raw.windows(7).any(|w| w == b"ghp_abc"));
    }

    #[tokio::test]
    async fn reapplying_sealed_values_does_not_double_encrypt() {
        let controller = controller();
        let created = controller
            .do_create(environment_with_secret())
            .await
            .unwrap();
        let sealed = created.spec.as_ref().unwrap().data["GITHUB_TOKEN"].value.clone();

        let updated = controller.do_update(created).await.unwrap();
        assert_eq!(
            updated.spec.as_ref().unwrap().data["GITHUB_TOKEN"].value,
            sealed
        );
    }
}
