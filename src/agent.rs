use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{AgentConfig, TemplatesConfig};
use crate::ids;
use crate::llm::TextGenerator;
use crate::prompts::PromptState;
use crate::store::{Cache, MemoryStore};
use crate::types::{MemoryRecord, Profile};

/// Side effect run after a reply has been sent and stored.
#[async_trait]
pub trait ResponseHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_response(&self, source: &MemoryRecord, replies: &[MemoryRecord]) -> Result<()>;
}

/// Everything the clients share: identity, persona and the injected
/// collaborators. Built once in `main` and handed out as `Arc<Agent>`.
pub struct Agent {
    pub id: Uuid,
    pub persona: AgentConfig,
    pub profile: Profile,
    pub templates: TemplatesConfig,
    pub memory: Arc<dyn MemoryStore>,
    pub cache: Arc<dyn Cache>,
    pub model: Arc<dyn TextGenerator>,
    pub hooks: Vec<Arc<dyn ResponseHook>>,
}

impl Agent {
    pub fn new(
        persona: AgentConfig,
        profile: Profile,
        memory: Arc<dyn MemoryStore>,
        cache: Arc<dyn Cache>,
        model: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            id: ids::agent_uuid(&persona.name),
            persona,
            profile,
            templates: TemplatesConfig::default(),
            memory,
            cache,
            model,
            hooks: Vec::new(),
        }
    }

    pub fn with_templates(mut self, templates: TemplatesConfig) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn ResponseHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Fresh prompt state for the persona.
    pub fn prompt_state(&self) -> PromptState {
        PromptState::for_persona(&self.persona, &self.profile.username)
    }

    /// Memory-store user id for a social-network user; the agent's own
    /// account maps to the agent id.
    pub fn user_uuid(&self, user_id: &str) -> Uuid {
        if user_id == self.profile.id {
            self.id
        } else {
            ids::user_uuid(user_id)
        }
    }
}
