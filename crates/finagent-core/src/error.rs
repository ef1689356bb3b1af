use crate::collaborators::CollaboratorError;
use finagent_telemetry::AgentKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("classification failed: {0}")]
    Classification(#[source] CollaboratorError),

    #[error("{agent} responder failed: {source}")]
    Responder {
        agent: AgentKind,
        #[source]
        source: CollaboratorError,
    },
}
