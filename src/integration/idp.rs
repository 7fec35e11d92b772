use std::env;

use crate::integration::Result;

/// Shared-secret contract with the account service: it signs bearer tokens,
/// this service only verifies them.
#[derive(Clone)]
pub struct Config {
    secret: String,
}

impl Config {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn env() -> Result<Self> {
        let secret = env::var("JWT_SECRET")?;
        Ok(Self { secret })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}
