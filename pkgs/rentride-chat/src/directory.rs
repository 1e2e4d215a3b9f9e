//! Role-aware contact directory
//!
//! | actor    | contacts                                   |
//! |----------|--------------------------------------------|
//! | admin    | every customer and host                    |
//! | host     | support admins, customers who booked them  |
//! | customer | support admins, hosts they booked          |
//!
//! A failed lookup degrades to an empty list instead of an error. Hosts and
//! customers always get at least one support contact: when no admin resolves,
//! a placeholder is synthesized.

use rentride_store::{Actor, ConversationStore, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::ChatConfig;
use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    Support,
    Host,
    Customer,
}

impl From<Role> for Relationship {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => Relationship::Support,
            Role::Host => Relationship::Host,
            Role::Customer => Relationship::Customer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub actor: Actor,
    pub relationship: Relationship,
    /// Synthesized support contact, not a real admin account
    pub is_placeholder: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDirectory {
    pub entries: Vec<ContactEntry>,
    /// At least one lookup failed and was replaced by an empty list
    pub degraded: bool,
}

impl ContactDirectory {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, actor_id: &str) -> Option<&ContactEntry> {
        self.entries.iter().find(|e| e.actor.id == actor_id)
    }

    pub fn with_relationship(
        &self,
        relationship: Relationship,
    ) -> impl Iterator<Item = &ContactEntry> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.relationship == relationship)
    }

    fn push_all(&mut self, actors: Vec<Actor>, seen: &mut HashSet<String>) {
        for actor in actors {
            if seen.insert(actor.id.clone()) {
                self.entries.push(ContactEntry {
                    relationship: actor.role.into(),
                    actor,
                    is_placeholder: false,
                });
            }
        }
    }
}

pub struct DirectoryResolver {
    store: Arc<dyn ConversationStore>,
    support_id: String,
    support_name: String,
}

impl DirectoryResolver {
    pub fn new(store: Arc<dyn ConversationStore>, config: &ChatConfig) -> Self {
        Self {
            store,
            support_id: config.support_contact_id.clone(),
            support_name: config.support_contact_name.clone(),
        }
    }

    /// Contacts `actor` may chat with; never fails
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn resolve_contacts(&self, actor: &Actor) -> ContactDirectory {
        let lookups: &[Role] = match actor.role {
            Role::Admin => &[Role::Customer, Role::Host],
            Role::Host => &[Role::Admin, Role::Customer],
            Role::Customer => &[Role::Admin, Role::Host],
        };

        let mut directory = ContactDirectory::default();
        let mut seen = HashSet::from([actor.id.clone()]);

        for role in lookups {
            match self.lookup(*role).await {
                Ok(actors) => directory.push_all(actors, &mut seen),
                Err(err) => {
                    warn!(%role, error = %err, "directory lookup degraded to empty list");
                    directory.degraded = true;
                }
            }
        }

        let has_support = directory.with_relationship(Relationship::Support).next().is_some();
        if actor.role != Role::Admin && !has_support {
            debug!("no support admin resolved, adding placeholder");
            directory.entries.insert(0, self.placeholder());
        }

        directory
    }

    async fn lookup(&self, role: Role) -> Result<Vec<Actor>, ChatError> {
        let actors = self
            .store
            .directory(role)
            .await
            .map_err(|err| ChatError::DirectoryFetchFailure(format!("{role}: {err}")))?;

        Ok(actors.into_iter().filter(|a| a.role == role).collect())
    }

    fn placeholder(&self) -> ContactEntry {
        ContactEntry {
            actor: Actor::new(self.support_id.clone(), self.support_name.clone(), Role::Admin),
            relationship: Relationship::Support,
            is_placeholder: true,
        }
    }
}
