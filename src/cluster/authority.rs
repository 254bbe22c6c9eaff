//! Leader-only admin command gating
//!
//! Every mutating admin command is authorized against the current leadership
//! view, and authorized again at the moment of execution so a leadership
//! change between intake and apply cannot slip a command through. Rejections
//! carry the current leader's identity so callers can redirect.

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

use super::election::ElectionNode;

/// The admin commands subject to leadership gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum AdminCommand {
    AddServer { url: String },
    RemoveServer { id: String },
    PauseServer { id: String },
    ResumeServer { id: String },
    StopServer { id: String },
    RestartServer { id: String },
}

impl AdminCommand {
    pub fn name(&self) -> &'static str {
        match self {
            AdminCommand::AddServer { .. } => "ADD_SERVER",
            AdminCommand::RemoveServer { .. } => "REMOVE_SERVER",
            AdminCommand::PauseServer { .. } => "PAUSE_SERVER",
            AdminCommand::ResumeServer { .. } => "RESUME_SERVER",
            AdminCommand::StopServer { .. } => "STOP_SERVER",
            AdminCommand::RestartServer { .. } => "RESTART_SERVER",
        }
    }
}

/// Structured rejection returned when a non-leader receives an admin
/// command. `current_leader_id`/`current_leader_url` may be absent while an
/// election is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRejection {
    pub reason: String,
    pub current_leader_id: Option<String>,
    pub current_leader_url: Option<String>,
}

impl CommandRejection {
    pub fn not_leader(leader_id: Option<String>, leader_url: Option<String>) -> Self {
        Self {
            reason: "NOT_LEADER".to_string(),
            current_leader_id: leader_id,
            current_leader_url: leader_url,
        }
    }
}

/// Source of truth for "am I allowed to run admin commands right now".
///
/// The DB tier answers from its own election; the federated tier
/// additionally requires federated leadership for cross-cluster commands.
pub trait LeadershipView: Send + Sync {
    fn is_leader(&self) -> bool;
    fn leader_id(&self) -> Option<String>;
    fn leader_url(&self) -> Option<String>;
}

impl LeadershipView for ElectionNode {
    fn is_leader(&self) -> bool {
        ElectionNode::is_leader(self)
    }

    fn leader_id(&self) -> Option<String> {
        ElectionNode::leader_id(self)
    }

    fn leader_url(&self) -> Option<String> {
        ElectionNode::leader_url(self)
    }
}

/// Checks leadership before admin commands run.
pub struct CommandGate<V: LeadershipView> {
    view: std::sync::Arc<V>,
}

impl<V: LeadershipView> CommandGate<V> {
    pub fn new(view: std::sync::Arc<V>) -> Self {
        Self { view }
    }

    /// Cheap pre-check, suitable at request intake.
    pub fn authorize(&self, command: &AdminCommand) -> std::result::Result<(), CommandRejection> {
        if self.view.is_leader() {
            Ok(())
        } else {
            tracing::warn!(command = command.name(), "rejecting admin command: not the leader");
            Err(CommandRejection::not_leader(
                self.view.leader_id(),
                self.view.leader_url(),
            ))
        }
    }

    /// Run `apply` under the gate, re-checking leadership at execution time.
    /// A node that lost leadership after intake still rejects here.
    pub fn execute<T>(
        &self,
        command: &AdminCommand,
        apply: impl FnOnce() -> Result<T>,
    ) -> std::result::Result<Result<T>, CommandRejection> {
        self.authorize(command)?;
        let outcome = apply();
        self.authorize(command)?;
        if outcome.is_ok() {
            tracing::info!(command = command.name(), "admin command applied");
        }
        Ok(outcome)
    }
}

impl From<CommandRejection> for Error {
    fn from(rejection: CommandRejection) -> Self {
        Error::NotLeader {
            leader_id: rejection.current_leader_id,
            leader_url: rejection.current_leader_url,
        }
    }
}
