// Authoritative record of active agents

use crate::agents::palette::ColorPalette;
use crate::error::{CoordinatorError, DuplicateKind, Result};
use crate::events::{
    AgentRegisteredPayload, AgentStatusChangedPayload, AgentUnregisteredPayload, CoordinatorEvent,
    EventBatch, FileModifiedPayload,
};
use crate::models::{Agent, AgentMeta, AgentStatus};
use crate::utils::monotonic_now;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};

/// Registry of agents keyed by agent id, with a thread id reverse index
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
    /// thread id -> agent id
    threads: HashMap<String, String>,
    /// Agent ids in registration order
    order: Vec<String>,
    palette: ColorPalette,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::with_palette(ColorPalette::default())
    }

    pub fn with_palette(palette: ColorPalette) -> Self {
        Self {
            agents: HashMap::new(),
            threads: HashMap::new(),
            order: Vec::new(),
            palette,
        }
    }

    /// Register a new agent. Both the agent id and the thread id must be unused.
    pub fn register(&mut self, meta: AgentMeta, events: &mut EventBatch) -> Result<Agent> {
        if self.agents.contains_key(&meta.agent_id) {
            return Err(CoordinatorError::DuplicateAgent {
                kind: DuplicateKind::AgentId,
                value: meta.agent_id,
            });
        }
        if self.threads.contains_key(&meta.thread_id) {
            return Err(CoordinatorError::DuplicateAgent {
                kind: DuplicateKind::ThreadId,
                value: meta.thread_id,
            });
        }

        // An explicit color does not consume a palette slot
        let color = match meta.color {
            Some(color) => color,
            None => self.palette.next_color(),
        };

        let now = Utc::now();
        let agent = Agent {
            agent_id: meta.agent_id.clone(),
            thread_id: meta.thread_id.clone(),
            status: meta.status,
            modified_files: BTreeSet::new(),
            color,
            created_at: now,
            last_active_at: now,
        };

        self.threads
            .insert(agent.thread_id.clone(), agent.agent_id.clone());
        self.order.push(agent.agent_id.clone());
        self.agents.insert(agent.agent_id.clone(), agent.clone());

        log::info!(
            "[AgentRegistry] Registered agent {} (thread {}, color {})",
            agent.agent_id,
            agent.thread_id,
            agent.color
        );
        events.push(CoordinatorEvent::AgentRegistered(AgentRegisteredPayload {
            agent_id: agent.agent_id.clone(),
            thread_id: agent.thread_id.clone(),
            color: agent.color.clone(),
            status: agent.status,
        }));

        Ok(agent)
    }

    /// Remove an agent. Missing agents are a no-op and return `None`.
    pub fn unregister(
        &mut self,
        agent_id: &str,
        orphaned_diffs: usize,
        events: &mut EventBatch,
    ) -> Option<Agent> {
        let agent = self.agents.remove(agent_id)?;
        self.threads.remove(&agent.thread_id);
        self.order.retain(|id| id != agent_id);

        log::info!(
            "[AgentRegistry] Unregistered agent {} ({} orphaned diffs)",
            agent_id,
            orphaned_diffs
        );
        events.push(CoordinatorEvent::AgentUnregistered(AgentUnregisteredPayload {
            agent_id: agent.agent_id.clone(),
            thread_id: agent.thread_id.clone(),
            orphaned_diffs,
        }));

        Some(agent)
    }

    /// Update an agent's status. Returns false (and logs) if the agent is gone.
    pub fn update_status(
        &mut self,
        agent_id: &str,
        status: AgentStatus,
        events: &mut EventBatch,
    ) -> bool {
        let Some(agent) = self.agents.get_mut(agent_id) else {
            log::warn!(
                "[AgentRegistry] Ignoring status update to {} for unknown agent {}",
                status,
                agent_id
            );
            return false;
        };

        let old_status = agent.status;
        agent.status = status;
        agent.last_active_at = monotonic_now(agent.last_active_at);

        events.push(CoordinatorEvent::AgentStatusChanged(AgentStatusChangedPayload {
            agent_id: agent_id.to_string(),
            old_status,
            new_status: status,
        }));
        true
    }

    /// Record that an agent has an open diff in `uri`.
    /// Returns whether the file was newly added to the agent's set.
    pub fn add_modified_file(
        &mut self,
        agent_id: &str,
        uri: &str,
        events: &mut EventBatch,
    ) -> Result<bool> {
        let agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| CoordinatorError::UnknownAgent(agent_id.to_string()))?;

        let added = agent.modified_files.insert(uri.to_string());
        agent.last_active_at = monotonic_now(agent.last_active_at);

        events.push(CoordinatorEvent::AgentFileModified(FileModifiedPayload {
            agent_id: agent_id.to_string(),
            uri: uri.to_string(),
        }));
        Ok(added)
    }

    /// Drop `uri` from an agent's modified set. Returns whether it was present.
    pub fn remove_modified_file(&mut self, agent_id: &str, uri: &str) -> Result<bool> {
        let agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| CoordinatorError::UnknownAgent(agent_id.to_string()))?;
        Ok(agent.modified_files.remove(uri))
    }

    /// Agents whose modified set contains `uri`, in registration order
    pub fn agents_modifying_file(&self, uri: &str) -> Vec<&Agent> {
        self.list()
            .into_iter()
            .filter(|a| a.modified_files.contains(uri))
            .collect()
    }

    pub fn get(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.get(agent_id)
    }

    pub fn get_by_thread_id(&self, thread_id: &str) -> Option<&Agent> {
        self.threads
            .get(thread_id)
            .and_then(|agent_id| self.agents.get(agent_id))
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// All agents in registration order
    pub fn list(&self) -> Vec<&Agent> {
        self.order
            .iter()
            .filter_map(|id| self.agents.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
