use crate::domain::models::UserPrefs;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::KeyValueStore;
use std::sync::Arc;

pub const MODEL_KEY: &str = "@ai_model_name";
pub const USER_PREFS_KEY: &str = "@user_prefs";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// API key, preferred model and work-pattern preferences.
#[derive(Clone)]
pub struct SettingsStore {
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(credentials: Arc<dyn CredentialStore>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { credentials, store }
    }

    /// Stored key, or `None` when missing or blank.
    pub fn api_key(&self) -> Result<Option<String>, InfraError> {
        Ok(self
            .credentials
            .load_api_key()?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }

    pub fn set_api_key(&self, api_key: &str) -> Result<(), InfraError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(InfraError::InvalidConfig(
                "api key must not be empty".to_string(),
            ));
        }
        self.credentials.save_api_key(api_key)
    }

    pub fn clear_api_key(&self) -> Result<(), InfraError> {
        self.credentials.delete_api_key()
    }

    pub fn preferred_model(&self) -> Result<String, InfraError> {
        Ok(self
            .store
            .get(MODEL_KEY)?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()))
    }

    pub fn set_preferred_model(&self, model_id: &str) -> Result<(), InfraError> {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(InfraError::InvalidConfig(
                "model id must not be empty".to_string(),
            ));
        }
        self.store.set(MODEL_KEY, model_id)
    }

    pub fn user_prefs(&self) -> Result<UserPrefs, InfraError> {
        match self.store.get(USER_PREFS_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(UserPrefs::default()),
        }
    }

    pub fn save_user_prefs(&self, prefs: &UserPrefs) -> Result<(), InfraError> {
        prefs.validate().map_err(InfraError::InvalidConfig)?;
        self.store.set(USER_PREFS_KEY, &serde_json::to_string(prefs)?)
    }
}
