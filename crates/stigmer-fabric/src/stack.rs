//! The server stack: controller set, route assembly, downstream client
//! construction and injection.
//!
//! Both listeners are served through [`routes`], so the layer chain and
//! service set cannot drift between the external and in-process paths.

use std::sync::Arc;

use stigmer_api::v1::agent_command_controller_server::AgentCommandControllerServer;
use stigmer_api::v1::agent_execution_command_controller_server::AgentExecutionCommandControllerServer;
use stigmer_api::v1::agent_execution_query_controller_server::AgentExecutionQueryControllerServer;
use stigmer_api::v1::agent_instance_command_controller_client::AgentInstanceCommandControllerClient;
use stigmer_api::v1::agent_instance_command_controller_server::AgentInstanceCommandControllerServer;
use stigmer_api::v1::agent_instance_query_controller_client::AgentInstanceQueryControllerClient;
use stigmer_api::v1::agent_instance_query_controller_server::AgentInstanceQueryControllerServer;
use stigmer_api::v1::agent_query_controller_client::AgentQueryControllerClient;
use stigmer_api::v1::agent_query_controller_server::AgentQueryControllerServer;
use stigmer_api::v1::environment_command_controller_server::EnvironmentCommandControllerServer;
use stigmer_api::v1::environment_query_controller_client::EnvironmentQueryControllerClient;
use stigmer_api::v1::environment_query_controller_server::EnvironmentQueryControllerServer;
use stigmer_api::v1::execution_context_command_controller_client::ExecutionContextCommandControllerClient;
use stigmer_api::v1::execution_context_command_controller_server::ExecutionContextCommandControllerServer;
use stigmer_api::v1::execution_context_query_controller_server::ExecutionContextQueryControllerServer;
use stigmer_api::v1::session_command_controller_client::SessionCommandControllerClient;
use stigmer_api::v1::session_command_controller_server::SessionCommandControllerServer;
use stigmer_api::v1::session_query_controller_server::SessionQueryControllerServer;
use stigmer_api::v1::skill_command_controller_server::SkillCommandControllerServer;
use stigmer_api::v1::skill_query_controller_server::SkillQueryControllerServer;
use stigmer_api::v1::workflow_command_controller_server::WorkflowCommandControllerServer;
use stigmer_api::v1::workflow_execution_command_controller_server::WorkflowExecutionCommandControllerServer;
use stigmer_api::v1::workflow_execution_query_controller_server::WorkflowExecutionQueryControllerServer;
use stigmer_api::v1::workflow_instance_command_controller_server::WorkflowInstanceCommandControllerServer;
use stigmer_api::v1::workflow_instance_query_controller_client::WorkflowInstanceQueryControllerClient;
use stigmer_api::v1::workflow_instance_query_controller_server::WorkflowInstanceQueryControllerServer;
use stigmer_api::v1::workflow_query_controller_client::WorkflowQueryControllerClient;
use stigmer_api::v1::workflow_query_controller_server::WorkflowQueryControllerServer;
use stigmer_controllers::{
    AgentController, AgentExecutionController, AgentInstanceController, ControllerDeps,
    EnvironmentController, ExecutionContextController, SessionController, SkillController,
    WorkflowController, WorkflowExecutionController, WorkflowInstanceController,
};
use stigmer_crypto::SecretBox;
use tonic::service::Routes;
use tonic::transport::Channel;

/// The full controller set, shared by both listeners.
#[derive(Clone)]
pub struct Controllers {
    /// Agent controller.
    pub agent: Arc<AgentController>,
    /// AgentInstance controller.
    pub agent_instance: Arc<AgentInstanceController>,
    /// AgentExecution controller.
    pub agent_execution: Arc<AgentExecutionController>,
    /// Workflow controller.
    pub workflow: Arc<WorkflowController>,
    /// WorkflowInstance controller.
    pub workflow_instance: Arc<WorkflowInstanceController>,
    /// WorkflowExecution controller.
    pub workflow_execution: Arc<WorkflowExecutionController>,
    /// Skill controller.
    pub skill: Arc<SkillController>,
    /// Session controller.
    pub session: Arc<SessionController>,
    /// Environment controller.
    pub environment: Arc<EnvironmentController>,
    /// ExecutionContext controller.
    pub execution_context: Arc<ExecutionContextController>,
}

impl Controllers {
    /// Build every controller over the shared dependencies. Downstream
    /// clients are not wired yet; see [`DownstreamClients::inject`].
    #[must_use]
    pub fn new(deps: &ControllerDeps, secrets: &Arc<SecretBox>) -> Self {
        Self {
            agent: Arc::new(AgentController::new(deps.clone())),
            agent_instance: Arc::new(AgentInstanceController::new(deps.clone())),
            agent_execution: Arc::new(AgentExecutionController::new(
                deps.clone(),
                Arc::clone(secrets),
            )),
            workflow: Arc::new(WorkflowController::new(deps.clone())),
            workflow_instance: Arc::new(WorkflowInstanceController::new(deps.clone())),
            workflow_execution: Arc::new(WorkflowExecutionController::new(
                deps.clone(),
                Arc::clone(secrets),
            )),
            skill: Arc::new(SkillController::new(deps.clone())),
            session: Arc::new(SessionController::new(deps.clone())),
            environment: Arc::new(EnvironmentController::new(
                deps.clone(),
                Arc::clone(secrets),
            )),
            execution_context: Arc::new(ExecutionContextController::new(deps.clone())),
        }
    }

    /// Assemble the route set served on every listener.
    #[must_use]
    pub fn routes(&self) -> Routes {
        Routes::new(AgentCommandControllerServer::from_arc(Arc::clone(&self.agent)))
            .add_service(AgentQueryControllerServer::from_arc(Arc::clone(&self.agent)))
            .add_service(AgentInstanceCommandControllerServer::from_arc(Arc::clone(
                &self.agent_instance,
            )))
            .add_service(AgentInstanceQueryControllerServer::from_arc(Arc::clone(
                &self.agent_instance,
            )))
            .add_service(AgentExecutionCommandControllerServer::from_arc(Arc::clone(
                &self.agent_execution,
            )))
            .add_service(AgentExecutionQueryControllerServer::from_arc(Arc::clone(
                &self.agent_execution,
            )))
            .add_service(WorkflowCommandControllerServer::from_arc(Arc::clone(
                &self.workflow,
            )))
            .add_service(WorkflowQueryControllerServer::from_arc(Arc::clone(
                &self.workflow,
            )))
            .add_service(WorkflowInstanceCommandControllerServer::from_arc(Arc::clone(
                &self.workflow_instance,
            )))
            .add_service(WorkflowInstanceQueryControllerServer::from_arc(Arc::clone(
                &self.workflow_instance,
            )))
            .add_service(WorkflowExecutionCommandControllerServer::from_arc(Arc::clone(
                &self.workflow_execution,
            )))
            .add_service(WorkflowExecutionQueryControllerServer::from_arc(Arc::clone(
                &self.workflow_execution,
            )))
            .add_service(SkillCommandControllerServer::from_arc(Arc::clone(&self.skill)))
            .add_service(SkillQueryControllerServer::from_arc(Arc::clone(&self.skill)))
            .add_service(SessionCommandControllerServer::from_arc(Arc::clone(
                &self.session,
            )))
            .add_service(SessionQueryControllerServer::from_arc(Arc::clone(
                &self.session,
            )))
            .add_service(EnvironmentCommandControllerServer::from_arc(Arc::clone(
                &self.environment,
            )))
            .add_service(EnvironmentQueryControllerServer::from_arc(Arc::clone(
                &self.environment,
            )))
            .add_service(ExecutionContextCommandControllerServer::from_arc(Arc::clone(
                &self.execution_context,
            )))
            .add_service(ExecutionContextQueryControllerServer::from_arc(Arc::clone(
                &self.execution_context,
            )))
    }
}

impl std::fmt::Debug for Controllers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controllers").finish_non_exhaustive()
    }
}

/// Typed clients over the loopback channel, one per consumed service.
#[derive(Clone)]
pub struct DownstreamClients {
    /// The shared loopback channel.
    pub channel: Channel,
    agent_query: AgentQueryControllerClient<Channel>,
    agent_instance_command: AgentInstanceCommandControllerClient<Channel>,
    agent_instance_query: AgentInstanceQueryControllerClient<Channel>,
    workflow_query: WorkflowQueryControllerClient<Channel>,
    workflow_instance_query: WorkflowInstanceQueryControllerClient<Channel>,
    environment_query: EnvironmentQueryControllerClient<Channel>,
    session_command: SessionCommandControllerClient<Channel>,
    execution_context_command: ExecutionContextCommandControllerClient<Channel>,
}

impl DownstreamClients {
    /// Construct every client from the dialled loopback channel.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            agent_query: AgentQueryControllerClient::new(channel.clone()),
            agent_instance_command: AgentInstanceCommandControllerClient::new(channel.clone()),
            agent_instance_query: AgentInstanceQueryControllerClient::new(channel.clone()),
            workflow_query: WorkflowQueryControllerClient::new(channel.clone()),
            workflow_instance_query: WorkflowInstanceQueryControllerClient::new(channel.clone()),
            environment_query: EnvironmentQueryControllerClient::new(channel.clone()),
            session_command: SessionCommandControllerClient::new(channel.clone()),
            execution_context_command: ExecutionContextCommandControllerClient::new(
                channel.clone(),
            ),
            channel,
        }
    }

    /// Inject every controller's downstream clients. Mandatory ordering:
    /// the loopback server is already consuming connections when this
    /// runs, and the TCP listener starts only afterwards.
    pub fn inject(&self, controllers: &Controllers) {
        controllers
            .agent
            .set_instance_client(self.agent_instance_command.clone());
        controllers.agent.set_agent_client(self.agent_query.clone());

        controllers
            .agent_instance
            .set_agent_client(self.agent_query.clone());
        controllers
            .agent_instance
            .set_environment_client(self.environment_query.clone());

        controllers
            .agent_execution
            .set_instance_client(self.agent_instance_query.clone());
        controllers
            .agent_execution
            .set_agent_client(self.agent_query.clone());
        controllers
            .agent_execution
            .set_environment_client(self.environment_query.clone());
        controllers
            .agent_execution
            .set_session_client(self.session_command.clone());
        controllers
            .agent_execution
            .set_context_client(self.execution_context_command.clone());

        controllers
            .workflow_instance
            .set_workflow_client(self.workflow_query.clone());
        controllers
            .workflow_instance
            .set_environment_client(self.environment_query.clone());

        controllers
            .workflow_execution
            .set_instance_client(self.workflow_instance_query.clone());
        controllers
            .workflow_execution
            .set_workflow_client(self.workflow_query.clone());
        controllers
            .workflow_execution
            .set_environment_client(self.environment_query.clone());
        controllers
            .workflow_execution
            .set_context_client(self.execution_context_command.clone());
    }
}

impl std::fmt::Debug for DownstreamClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamClients").finish_non_exhaustive()
    }
}
