//! Known users, built from the bootstrap snapshot.

use crate::schema::{ClientEntity, ParticipantData, UserId};
use std::collections::HashMap;
use tracing::debug;

/// Name given to users nothing is known about.
pub const UNKNOWN_USER_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub first_name: String,
    pub photo_url: Option<String>,
    pub emails: Vec<String>,
    pub is_self: bool,
}

impl User {
    fn from_entity(entity: &ClientEntity, is_self: bool) -> Self {
        let properties = &entity.properties;
        let full_name = properties
            .display_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string());
        let first_name = properties
            .first_name
            .clone()
            .unwrap_or_else(|| first_word(&full_name));
        Self {
            id: entity.id.clone(),
            full_name,
            first_name,
            photo_url: properties.photo_url.clone(),
            emails: properties.emails.clone(),
            is_self,
        }
    }

    fn from_participant(participant: &ParticipantData, is_self: bool) -> Self {
        let full_name = participant
            .fallback_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string());
        Self {
            id: participant.id.clone(),
            first_name: first_word(&full_name),
            full_name,
            photo_url: None,
            emails: Vec::new(),
            is_self,
        }
    }

    fn unknown(id: &UserId) -> Self {
        Self {
            id: id.clone(),
            full_name: UNKNOWN_USER_NAME.to_string(),
            first_name: UNKNOWN_USER_NAME.to_string(),
            photo_url: None,
            emails: Vec::new(),
            is_self: false,
        }
    }
}

fn first_word(name: &str) -> String {
    name.split_whitespace()
        .next()
        .unwrap_or(UNKNOWN_USER_NAME)
        .to_string()
}

/// Users keyed by id.
#[derive(Debug, Clone, Default)]
pub struct UserList {
    self_id: Option<UserId>,
    users: HashMap<UserId, User>,
}

impl UserList {
    /// Build from the caller's entity, contact entities and conversation participants.
    ///
    /// Entity data wins over a participant's fallback name; the first entity seen for an id wins
    /// over later duplicates.
    pub fn new(
        self_entity: &ClientEntity,
        entities: &[ClientEntity],
        participants: &[ParticipantData],
    ) -> Self {
        let mut users = HashMap::new();
        users.insert(self_entity.id.clone(), User::from_entity(self_entity, true));
        for entity in entities {
            users
                .entry(entity.id.clone())
                .or_insert_with(|| User::from_entity(entity, false));
        }
        for participant in participants {
            users
                .entry(participant.id.clone())
                .or_insert_with(|| User::from_participant(participant, false));
        }
        debug!("Initialized user list with {} users", users.len());

        Self {
            self_id: Some(self_entity.id.clone()),
            users,
        }
    }

    /// The user with `id`, or an "Unknown" placeholder.
    pub fn get(&self, id: &UserId) -> User {
        match self.users.get(id) {
            Some(user) => user.clone(),
            None => {
                debug!("UserList returning unknown User for UserID {:?}", id);
                User::unknown(id)
            }
        }
    }

    pub fn self_user(&self) -> Option<User> {
        self.self_id.as_ref().map(|id| self.get(id))
    }

    pub fn all(&self) -> Vec<User> {
        self.users.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
