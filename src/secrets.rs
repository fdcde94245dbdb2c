use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::utils::error::SecretError;

/// Capability interface over the credential storage backend. Secrets are
/// fetched once at startup and held read-only for the process lifetime;
/// any retrieval failure is fatal.
#[async_trait]
pub trait SecretManager: Send + Sync {
    async fn get_raw(&self, name: &str) -> Result<String, SecretError>;
}

/// Fetch a secret and JSON-decode it.
pub async fn get_json<T: DeserializeOwned>(
    manager: &dyn SecretManager,
    name: &str,
) -> Result<T, SecretError> {
    let raw = manager.get_raw(name).await?;
    serde_json::from_str(&raw).map_err(|source| SecretError::Decode {
        name: name.to_string(),
        source,
    })
}

/// Environment-backed secret storage. Secrets are looked up as
/// `STOCKHAWK_<BUYER>_<NAME>`, uppercased.
pub struct EnvSecretManager {
    buyer: String,
}

impl EnvSecretManager {
    pub fn new(buyer: &str) -> Self {
        Self {
            buyer: buyer.to_string(),
        }
    }

    fn var_name(&self, name: &str) -> String {
        format!("STOCKHAWK_{}_{}", self.buyer, name)
            .to_uppercase()
            .replace('-', "_")
    }
}

#[async_trait]
impl SecretManager for EnvSecretManager {
    async fn get_raw(&self, name: &str) -> Result<String, SecretError> {
        std::env::var(self.var_name(name)).map_err(|_| SecretError::Missing {
            name: name.to_string(),
        })
    }
}

/// Store account credentials.
#[derive(Clone, Deserialize)]
pub struct StoreCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Payment card details used to fill the payment form. Redacted from all
/// Debug output so they can never land in logs.
#[derive(Clone, Deserialize)]
pub struct PaymentCard {
    pub number: String,
    pub exp_date: String,
    pub owner: String,
    pub cpt: String,
}

impl fmt::Debug for PaymentCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentCard")
            .field("number", &"<redacted>")
            .field("exp_date", &"<redacted>")
            .field("owner", &self.owner)
            .field("cpt", &"<redacted>")
            .finish()
    }
}
