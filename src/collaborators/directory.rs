use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Display data for a platform user, used to enrich DTOs and audit views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
}

/// Read-only view of the platform user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn profile(&self, user_id: Uuid) -> Option<UserProfile>;
}

/// In-memory directory used by tests and local development.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<Uuid, UserProfile>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users
            .write()
            .expect("directory lock")
            .insert(profile.id, profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn profile(&self, user_id: Uuid) -> Option<UserProfile> {
        self.users
            .read()
            .expect("directory lock")
            .get(&user_id)
            .cloned()
    }
}
