//! Responder directory — an external collaborator, consumed as an interface.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Contact means for one responder. A missing field means that channel is
/// skipped for this target, not an error.
#[derive(Debug, Clone, Default)]
pub struct ResponderContact {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub push_token: Option<String>,
}

#[async_trait]
pub trait ResponderDirectory: Send + Sync {
    async fn get_contact(&self, responder_id: &str) -> Option<ResponderContact>;

    /// Team lead for a responder, used for level-1 escalation fan-out.
    async fn team_lead_of(&self, responder_id: &str) -> Option<String>;

    /// All responders currently available in the region, used for level-2+
    /// escalation fan-out.
    async fn available_responders(&self) -> Vec<String>;
}

/// In-memory directory for the API binary and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: RwLock<DirectoryState>,
}

#[derive(Default)]
struct DirectoryState {
    contacts: HashMap<String, ResponderContact>,
    team_leads: HashMap<String, String>,
    available: Vec<String>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, responder_id: impl Into<String>, contact: ResponderContact) {
        let responder_id = responder_id.into();
        let mut state = self.inner.write().await;
        state.contacts.insert(responder_id.clone(), contact);
        if !state.available.contains(&responder_id) {
            state.available.push(responder_id);
        }
    }

    pub async fn set_team_lead(
        &self,
        responder_id: impl Into<String>,
        lead_id: impl Into<String>,
    ) {
        let mut state = self.inner.write().await;
        state.team_leads.insert(responder_id.into(), lead_id.into());
    }

    pub async fn set_available(&self, responder_ids: Vec<String>) {
        let mut state = self.inner.write().await;
        state.available = responder_ids;
    }
}

#[async_trait]
impl ResponderDirectory for MemoryDirectory {
    async fn get_contact(&self, responder_id: &str) -> Option<ResponderContact> {
        self.inner.read().await.contacts.get(responder_id).cloned()
    }

    async fn team_lead_of(&self, responder_id: &str) -> Option<String> {
        self.inner.read().await.team_leads.get(responder_id).cloned()
    }

    async fn available_responders(&self) -> Vec<String> {
        self.inner.read().await.available.clone()
    }
}
