//! Per-device participant identity

use tracing::info;
use uuid::Uuid;

use crate::error::IdentityError;
use crate::local_store::LocalStore;

pub const USER_ID_KEY: &str = "keystroke_user_uuid";
pub const CONSENT_KEY: &str = "keystroke_consent";
const CONSENT_GIVEN: &str = "yes";

/// Stable user id, generated once per device after consent
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    store: LocalStore,
}

impl DeviceIdentity {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub async fn has_consent(&self) -> Result<bool, IdentityError> {
        Ok(self.store.get(CONSENT_KEY).await?.as_deref() == Some(CONSENT_GIVEN))
    }

    pub async fn record_consent(&self) -> Result<(), IdentityError> {
        self.store.set(CONSENT_KEY, CONSENT_GIVEN).await?;
        info!("Consent recorded");
        Ok(())
    }

    /// The stored user id, generating and persisting one on first use
    pub async fn user_id(&self) -> Result<String, IdentityError> {
        if !self.has_consent().await? {
            return Err(IdentityError::ConsentRequired);
        }

        if let Some(existing) = self.store.get(USER_ID_KEY).await? {
            let existing = existing.trim();
            if !existing.is_empty() {
                return Ok(existing.to_string());
            }
        }

        let user_id = Uuid::new_v4().to_string();
        self.store.set(USER_ID_KEY, &user_id).await?;
        info!("Generated user id {}", user_id);
        Ok(user_id)
    }
}
