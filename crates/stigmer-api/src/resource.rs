//! The [`Resource`] trait family tying generated message types to the
//! kind registry.

use crate::API_VERSION;
use crate::v1::{
    Agent, AgentExecution, AgentExecutionList, AgentInstance, AgentInstanceList, AgentList,
    ApiResourceKind, ApiResourceMetadata, Environment, EnvironmentList, ExecutionContext,
    ExecutionPhase, Session, SessionList, Skill, SkillList, Workflow, WorkflowExecution,
    WorkflowExecutionList, WorkflowInstance, WorkflowInstanceList, WorkflowList,
};

/// A persisted resource kind: a generated message with the common
/// `{metadata, spec, status}` envelope.
pub trait Resource:
    prost::Message + Default + Clone + PartialEq + Send + Sync + 'static
{
    /// The kind this message represents.
    const KIND: ApiResourceKind;

    /// Shared metadata envelope, if set.
    fn meta(&self) -> Option<&ApiResourceMetadata>;

    /// Mutable metadata envelope, created when absent.
    fn meta_mut(&mut self) -> &mut ApiResourceMetadata;

    /// Resource id, empty when unset.
    fn id(&self) -> &str {
        self.meta().map_or("", |m| m.id.as_str())
    }

    /// Human-readable name, empty when unset.
    fn name(&self) -> &str {
        self.meta().map_or("", |m| m.name.as_str())
    }

    /// Derived slug, empty when unset.
    fn slug(&self) -> &str {
        self.meta().map_or("", |m| m.slug.as_str())
    }

    /// Tenancy label, empty when unset.
    fn org(&self) -> &str {
        self.meta().map_or("", |m| m.org.as_str())
    }
}

macro_rules! impl_resource {
    ($ty:ident, $kind:ident) => {
        impl Resource for $ty {
            const KIND: ApiResourceKind = ApiResourceKind::$kind;

            fn meta(&self) -> Option<&ApiResourceMetadata> {
                self.metadata.as_ref()
            }

            fn meta_mut(&mut self) -> &mut ApiResourceMetadata {
                self.metadata.get_or_insert_with(ApiResourceMetadata::default)
            }
        }
    };
}

impl_resource!(Agent, Agent);
impl_resource!(AgentInstance, AgentInstance);
impl_resource!(AgentExecution, AgentExecution);
impl_resource!(Workflow, Workflow);
impl_resource!(WorkflowInstance, WorkflowInstance);
impl_resource!(WorkflowExecution, WorkflowExecution);
impl_resource!(Skill, Skill);
impl_resource!(Session, Session);
impl_resource!(Environment, Environment);
impl_resource!(ExecutionContext, ExecutionContext);

/// Execution kinds share the phase machine and the callback-token slot.
pub trait ExecutionResource: Resource {
    /// Current phase, `Unspecified` when status is absent.
    fn phase(&self) -> ExecutionPhase;

    /// Set the phase, creating status when absent.
    fn set_phase(&mut self, phase: ExecutionPhase);

    /// Record the Temporal workflow id driving this execution.
    fn set_workflow_id(&mut self, workflow_id: &str);

    /// Record a terminal error message.
    fn set_error(&mut self, error: &str);

    /// Terminal error message, empty when none.
    fn error(&self) -> &str;

    /// Task token of the external activity awaiting this execution.
    /// Empty when the execution is a standalone run.
    fn callback_token(&self) -> &[u8];

    /// Reference to the bound instance.
    fn instance_ref(&self) -> &str;
}

impl ExecutionResource for AgentExecution {
    fn phase(&self) -> ExecutionPhase {
        self.status.as_ref().map_or(ExecutionPhase::Unspecified, |s| s.phase())
    }

    fn set_phase(&mut self, phase: ExecutionPhase) {
        self.status.get_or_insert_with(Default::default).set_phase(phase);
    }

    fn set_workflow_id(&mut self, workflow_id: &str) {
        self.status.get_or_insert_with(Default::default).temporal_workflow_id =
            workflow_id.to_string();
    }

    fn set_error(&mut self, error: &str) {
        self.status.get_or_insert_with(Default::default).error = error.to_string();
    }

    fn error(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.error.as_str())
    }

    fn callback_token(&self) -> &[u8] {
        self.spec.as_ref().map_or(&[], |s| s.callback_token.as_slice())
    }

    fn instance_ref(&self) -> &str {
        self.spec.as_ref().map_or("", |s| s.agent_instance_ref.as_str())
    }
}

impl ExecutionResource for WorkflowExecution {
    fn phase(&self) -> ExecutionPhase {
        self.status.as_ref().map_or(ExecutionPhase::Unspecified, |s| s.phase())
    }

    fn set_phase(&mut self, phase: ExecutionPhase) {
        self.status.get_or_insert_with(Default::default).set_phase(phase);
    }

    fn set_workflow_id(&mut self, workflow_id: &str) {
        self.status.get_or_insert_with(Default::default).temporal_workflow_id =
            workflow_id.to_string();
    }

    fn set_error(&mut self, error: &str) {
        self.status.get_or_insert_with(Default::default).error = error.to_string();
    }

    fn error(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.error.as_str())
    }

    fn callback_token(&self) -> &[u8] {
        self.spec.as_ref().map_or(&[], |s| s.callback_token.as_slice())
    }

    fn instance_ref(&self) -> &str {
        self.spec.as_ref().map_or("", |s| s.workflow_instance_ref.as_str())
    }
}

/// Messages whose outbound copies carry the stamped `api_version`/`kind`
/// pair: every resource, and every list of resources.
pub trait Stamp {
    /// Stamp `api_version` and `kind` into every metadata envelope.
    fn stamp(&mut self);
}

macro_rules! impl_stamp_resource {
    ($ty:ident) => {
        impl Stamp for $ty {
            fn stamp(&mut self) {
                let meta = self.meta_mut();
                meta.api_version = API_VERSION.to_string();
                meta.set_kind(<$ty as Resource>::KIND);
            }
        }
    };
}

impl_stamp_resource!(Agent);
impl_stamp_resource!(AgentInstance);
impl_stamp_resource!(AgentExecution);
impl_stamp_resource!(Workflow);
impl_stamp_resource!(WorkflowInstance);
impl_stamp_resource!(WorkflowExecution);
impl_stamp_resource!(Skill);
impl_stamp_resource!(Session);
impl_stamp_resource!(Environment);
impl_stamp_resource!(ExecutionContext);

macro_rules! impl_stamp_list {
    ($ty:ident) => {
        impl Stamp for $ty {
            fn stamp(&mut self) {
                for item in &mut self.items {
                    item.stamp();
                }
            }
        }
    };
}

impl_stamp_list!(AgentList);
impl_stamp_list!(AgentInstanceList);
impl_stamp_list!(AgentExecutionList);
impl_stamp_list!(WorkflowList);
impl_stamp_list!(WorkflowInstanceList);
impl_stamp_list!(WorkflowExecutionList);
impl_stamp_list!(SkillList);
impl_stamp_list!(SessionList);
impl_stamp_list!(EnvironmentList);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_sets_version_and_kind() {
        let mut agent = Agent::default();
        agent.stamp();
        let meta = agent.meta().unwrap();
        assert_eq!(meta.api_version, API_VERSION);
        assert_eq!(meta.kind(), ApiResourceKind::Agent);
    }

    #[test]
    fn stamp_list_covers_every_item() {
        let mut list = AgentList {
            items: vec![Agent::default(), Agent::default()],
        };
        list.stamp();
        for item in &list.items {
            assert_eq!(item.meta().unwrap().kind(), ApiResourceKind::Agent);
        }
    }

    #[test]
    fn execution_phase_roundtrip() {
        let mut exec = AgentExecution::default();
        assert_eq!(exec.phase(), ExecutionPhase::Unspecified);
        exec.set_phase(ExecutionPhase::Running);
        assert_eq!(exec.phase(), ExecutionPhase::Running);
    }
}
