//! The in-process test stack.

use std::sync::Arc;

use stigmer_api::v1::agent_command_controller_client::AgentCommandControllerClient;
use stigmer_api::v1::agent_execution_command_controller_client::AgentExecutionCommandControllerClient;
use stigmer_api::v1::agent_execution_query_controller_client::AgentExecutionQueryControllerClient;
use stigmer_api::v1::agent_instance_command_controller_client::AgentInstanceCommandControllerClient;
use stigmer_api::v1::agent_instance_query_controller_client::AgentInstanceQueryControllerClient;
use stigmer_api::v1::agent_query_controller_client::AgentQueryControllerClient;
use stigmer_api::v1::environment_command_controller_client::EnvironmentCommandControllerClient;
use stigmer_api::v1::execution_context_query_controller_client::ExecutionContextQueryControllerClient;
use stigmer_api::v1::session_query_controller_client::SessionQueryControllerClient;
use stigmer_api::v1::workflow_command_controller_client::WorkflowCommandControllerClient;
use stigmer_controllers::ControllerDeps;
use stigmer_core::{IdGenerator, SystemClock};
use stigmer_crypto::SecretBox;
use stigmer_fabric::{Controllers, DownstreamClients, KindStampLayer, Loopback, RequestLogLayer};
use stigmer_orchestration::activities::{
    AgentExecutionActivities, SystemActivities, WorkflowExecutionActivities,
};
use stigmer_orchestration::port::ActivityHandler;
use stigmer_orchestration::{
    LocalEngine, TemporalConfig, WorkerRegistry, WorkflowCreator, WorkflowValidation, workflows,
};
use stigmer_store::{KvStore, MemoryKvStore};
use tonic::transport::{Channel, Server};

/// A fully wired in-process control plane.
pub struct TestStack {
    /// Raw store handle, for on-disk byte assertions.
    pub kv: MemoryKvStore,
    /// The controller set.
    pub controllers: Controllers,
    /// The loopback channel clients are built from.
    pub channel: Channel,
    /// The local orchestration engine (also the completion client).
    pub engine: LocalEngine,
    /// Worker registry; tests register fake runner activities here.
    pub registry: WorkerRegistry,
    /// Secret box matching the stack's encryption key.
    pub secrets: Arc<SecretBox>,
    server_task: tokio::task::JoinHandle<()>,
}

impl TestStack {
    /// Bring up the full stack with orchestration wired.
    pub async fn start() -> Self {
        Self::start_inner(true).await
    }

    /// Bring up the stack with Temporal degraded: no creators, no
    /// validators. Executions stay PENDING.
    pub async fn start_degraded() -> Self {
        Self::start_inner(false).await
    }

    async fn start_inner(orchestrated: bool) -> Self {
        let kv = MemoryKvStore::new();
        let secrets = Arc::new(SecretBox::new(&SecretBox::generate_key()));
        let deps = ControllerDeps::new(
            Arc::new(kv.clone()) as Arc<dyn KvStore>,
            Arc::new(IdGenerator::new()),
            Arc::new(SystemClock),
        );
        let controllers = Controllers::new(&deps, &secrets);

        let (loopback, incoming) = Loopback::new();
        let routes = controllers.routes();
        let server_task = tokio::spawn(async move {
            let _ = Server::builder()
                .layer(RequestLogLayer::new())
                .layer(KindStampLayer::new())
                .add_routes(routes)
                .serve_with_incoming(incoming)
                .await;
        });

        let channel = loopback.dial().await.expect("loopback dial");
        let clients = DownstreamClients::new(channel.clone());
        clients.inject(&controllers);

        let registry = WorkerRegistry::new();
        let engine = LocalEngine::new(registry.clone());

        if orchestrated {
            workflows::register_execution_workflow(&registry, workflows::AGENT_EXECUTION);
            workflows::register_execution_workflow(&registry, workflows::WORKFLOW_EXECUTION);
            workflows::register_validation_workflow(&registry);
            AgentExecutionActivities::new(channel.clone()).register(&registry);
            WorkflowExecutionActivities::new(channel.clone()).register(&registry);
            SystemActivities::new(Arc::new(engine.clone())).register(&registry);

            let service: Arc<dyn stigmer_orchestration::WorkflowService> =
                Arc::new(engine.clone());
            let temporal = TemporalConfig::default();
            controllers
                .agent_execution
                .set_workflow_creator(Arc::new(WorkflowCreator::agent_execution(
                    Arc::clone(&service),
                    temporal.clone(),
                )));
            controllers
                .workflow_execution
                .set_workflow_creator(Arc::new(WorkflowCreator::workflow_execution(
                    Arc::clone(&service),
                    temporal.clone(),
                )));
            let validation = Arc::new(WorkflowValidation::new(Arc::clone(&service), temporal));
            controllers.workflow.set_spec_validator(validation.clone());
            controllers.workflow_execution.set_spec_validator(validation);
        }

        Self {
            kv,
            controllers,
            channel,
            engine,
            registry,
            secrets,
            server_task,
        }
    }

    /// Register a fake runner activity on a runner queue.
    pub fn register_runner_activity(&self, queue: &str, name: &str, handler: ActivityHandler) {
        self.registry.register_activity(queue, name, handler);
    }

    /// Agent command client over the loopback.
    #[must_use]
    pub fn agent_command(&self) -> AgentCommandControllerClient<Channel> {
        AgentCommandControllerClient::new(self.channel.clone())
    }

    /// Agent query client over the loopback.
    #[must_use]
    pub fn agent_query(&self) -> AgentQueryControllerClient<Channel> {
        AgentQueryControllerClient::new(self.channel.clone())
    }

    /// AgentInstance command client over the loopback.
    #[must_use]
    pub fn agent_instance_command(&self) -> AgentInstanceCommandControllerClient<Channel> {
        AgentInstanceCommandControllerClient::new(self.channel.clone())
    }

    /// AgentInstance query client over the loopback.
    #[must_use]
    pub fn agent_instance_query(&self) -> AgentInstanceQueryControllerClient<Channel> {
        AgentInstanceQueryControllerClient::new(self.channel.clone())
    }

    /// AgentExecution command client over the loopback.
    #[must_use]
    pub fn agent_execution_command(&self) -> AgentExecutionCommandControllerClient<Channel> {
        AgentExecutionCommandControllerClient::new(self.channel.clone())
    }

    /// AgentExecution query client over the loopback.
    #[must_use]
    pub fn agent_execution_query(&self) -> AgentExecutionQueryControllerClient<Channel> {
        AgentExecutionQueryControllerClient::new(self.channel.clone())
    }

    /// Workflow command client over the loopback.
    #[must_use]
    pub fn workflow_command(&self) -> WorkflowCommandControllerClient<Channel> {
        WorkflowCommandControllerClient::new(self.channel.clone())
    }

    /// Environment command client over the loopback.
    #[must_use]
    pub fn environment_command(&self) -> EnvironmentCommandControllerClient<Channel> {
        EnvironmentCommandControllerClient::new(self.channel.clone())
    }

    /// Session query client over the loopback.
    #[must_use]
    pub fn session_query(&self) -> SessionQueryControllerClient<Channel> {
        SessionQueryControllerClient::new(self.channel.clone())
    }

    /// ExecutionContext query client over the loopback.
    #[must_use]
    pub fn execution_context_query(&self) -> ExecutionContextQueryControllerClient<Channel> {
        ExecutionContextQueryControllerClient::new(self.channel.clone())
    }
}

impl Drop for TestStack {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

impl std::fmt::Debug for TestStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStack").finish_non_exhaustive()
    }
}
