//! Static table mapping gRPC method paths to kind-stamp functions.
//!
//! The table is built once at startup; the server's egress layer performs
//! only a map lookup per request and applies the matching function to the
//! decoded response message. Paths absent from the table pass through
//! untouched.

use std::collections::HashMap;

use crate::resource::{Resource, Stamp};
use crate::v1::{
    AgentExecution, AgentExecutionList, AgentInstance, AgentInstanceList, AgentList,
    Environment, EnvironmentList, ExecutionContext, Session, SessionList, Skill, SkillList,
    Workflow, WorkflowExecution, WorkflowExecutionList, WorkflowInstance, WorkflowInstanceList,
    WorkflowList,
};

/// Decode a serialized response message, stamp it, and re-encode it.
/// Returns `None` when the bytes do not decode as the expected type.
pub type StampFn = fn(&[u8]) -> Option<Vec<u8>>;

fn restamp<T: Stamp + prost::Message + Default>(buf: &[u8]) -> Option<Vec<u8>> {
    let mut message = T::decode(buf).ok()?;
    message.stamp();
    Some(message.encode_to_vec())
}

fn add_standard<R, L>(table: &mut HashMap<String, StampFn>, kind_name: &str)
where
    R: Resource + Stamp,
    L: Stamp + prost::Message + Default,
{
    for method in ["Apply", "Create", "Update", "Delete"] {
        table.insert(
            format!("/stigmer.v1.{kind_name}CommandController/{method}"),
            restamp::<R> as StampFn,
        );
    }
    for method in ["Get", "GetByReference"] {
        table.insert(
            format!("/stigmer.v1.{kind_name}QueryController/{method}"),
            restamp::<R> as StampFn,
        );
    }
    table.insert(
        format!("/stigmer.v1.{kind_name}QueryController/List"),
        restamp::<L> as StampFn,
    );
}

/// Build the full method-path → stamp-function table.
#[must_use]
pub fn stamp_table() -> HashMap<String, StampFn> {
    let mut table = HashMap::new();

    add_standard::<crate::v1::Agent, AgentList>(&mut table, "Agent");
    add_standard::<AgentInstance, AgentInstanceList>(&mut table, "AgentInstance");
    add_standard::<AgentExecution, AgentExecutionList>(&mut table, "AgentExecution");
    add_standard::<Workflow, WorkflowList>(&mut table, "Workflow");
    add_standard::<WorkflowInstance, WorkflowInstanceList>(&mut table, "WorkflowInstance");
    add_standard::<WorkflowExecution, WorkflowExecutionList>(&mut table, "WorkflowExecution");
    add_standard::<Skill, SkillList>(&mut table, "Skill");
    add_standard::<Session, SessionList>(&mut table, "Session");
    add_standard::<Environment, EnvironmentList>(&mut table, "Environment");

    // Executions expose the status subresource.
    table.insert(
        "/stigmer.v1.AgentExecutionCommandController/UpdateStatus".to_string(),
        restamp::<AgentExecution> as StampFn,
    );
    table.insert(
        "/stigmer.v1.WorkflowExecutionCommandController/UpdateStatus".to_string(),
        restamp::<WorkflowExecution> as StampFn,
    );

    // ExecutionContext has the reduced internal surface.
    for path in [
        "/stigmer.v1.ExecutionContextCommandController/Create",
        "/stigmer.v1.ExecutionContextCommandController/Delete",
        "/stigmer.v1.ExecutionContextQueryController/Get",
    ] {
        table.insert(path.to_string(), restamp::<ExecutionContext> as StampFn);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::{Agent, ApiResourceKind};
    use prost::Message;

    #[test]
    fn table_covers_agent_create() {
        let table = stamp_table();
        assert!(table.contains_key("/stigmer.v1.AgentCommandController/Create"));
        assert!(table.contains_key("/stigmer.v1.ExecutionContextQueryController/Get"));
        assert!(!table.contains_key("/stigmer.v1.ExecutionContextCommandController/Apply"));
    }

    #[test]
    fn restamp_roundtrips_and_stamps() {
        let table = stamp_table();
        let stamp = table["/stigmer.v1.AgentCommandController/Create"];

        let mut agent = Agent::default();
        agent.metadata = Some(crate::v1::ApiResourceMetadata {
            id: "agt-1".to_string(),
            name: "reviewer".to_string(),
            ..Default::default()
        });

        let stamped = stamp(&agent.encode_to_vec()).unwrap();
        let decoded = Agent::decode(stamped.as_slice()).unwrap();
        let meta = decoded.metadata.unwrap();
        assert_eq!(meta.api_version, crate::API_VERSION);
        assert_eq!(meta.kind(), ApiResourceKind::Agent);
        assert_eq!(meta.id, "agt-1");
    }

    #[test]
    fn restamp_rejects_garbage() {
        let table = stamp_table();
        let stamp = table["/stigmer.v1.AgentCommandController/Create"];
        assert!(stamp(&[0xff, 0xff, 0xff, 0xff]).is_none());
    }
}
