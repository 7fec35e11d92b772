use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use log::debug;
use serde::Deserialize;

use crate::integration::idp;
use crate::user;

use super::Identity;

#[async_trait::async_trait]
pub trait AuthService {
    /// Verifies a bearer token and yields the `(sub, display name)` pair the
    /// account service baked into it.
    async fn verify(&self, token: &str) -> super::Result<Identity>;
}

#[derive(Deserialize)]
struct TokenClaims {
    sub: user::Sub,
    name: String,
    #[allow(dead_code)]
    exp: usize,
}

#[derive(Clone)]
pub struct JwtAuthService {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthService {
    pub fn new(config: &idp::Config) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            key: DecodingKey::from_secret(config.secret().as_bytes()),
            validation,
        }
    }
}

#[async_trait::async_trait]
impl AuthService for JwtAuthService {
    async fn verify(&self, token: &str) -> super::Result<Identity> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                debug!("token rejected: {e}");
                super::Error::TokenMalformed
            })?;

        Ok(Identity {
            sub: data.claims.sub,
            name: data.claims.name,
        })
    }
}

#[cfg(test)]
mod test {
    use jsonwebtoken::{EncodingKey, Header};
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Claims<'c> {
        sub: &'c str,
        name: &'c str,
        exp: usize,
    }

    fn token(secret: &str, sub: &str, name: &str, exp: usize) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            &Claims { sub, name, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn should_verify_valid_token() {
        let service = JwtAuthService::new(&idp::Config::new("s3cret"));
        let token = token("s3cret", "u1", "alice", 4102444800);

        let identity = service.verify(&token).await.unwrap();

        assert_eq!(identity.sub, user::Sub("u1".into()));
        assert_eq!(identity.name, "alice");
    }

    #[tokio::test]
    async fn should_reject_wrong_secret() {
        let service = JwtAuthService::new(&idp::Config::new("s3cret"));
        let token = token("other", "u1", "alice", 4102444800);

        let result = service.verify(&token).await;

        assert!(matches!(result, Err(super::super::Error::TokenMalformed)));
    }

    #[tokio::test]
    async fn should_reject_expired_token() {
        let service = JwtAuthService::new(&idp::Config::new("s3cret"));
        let token = token("s3cret", "u1", "alice", 1);

        let result = service.verify(&token).await;

        assert!(matches!(result, Err(super::super::Error::TokenMalformed)));
    }

    #[tokio::test]
    async fn should_reject_garbage() {
        let service = JwtAuthService::new(&idp::Config::new("s3cret"));

        let result = service.verify("not-a-jwt").await;

        assert!(matches!(result, Err(super::super::Error::TokenMalformed)));
    }
}
