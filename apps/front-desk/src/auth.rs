//! Autenticação por token JWT (HS256) no cabeçalho `Authorization: Bearer`

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use clinic_queue::{ClinicId, IdentityProvider, Permissions, Session};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token inválido: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Claims carregadas pelo token de sessão
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Usuário
    pub sub: String,
    pub clinic: ClinicId,
    pub role: String,
    #[serde(default)]
    pub permissions: Permissions,
    /// Expiração (segundos desde a época)
    pub exp: usize,
}

impl From<Claims> for Session {
    fn from(claims: Claims) -> Self {
        Session {
            user_id: claims.sub,
            clinic_id: claims.clinic,
            role: claims.role,
            permissions: claims.permissions,
        }
    }
}

/// Provedor de identidade baseado em segredo compartilhado
pub struct JwtIdentity {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtIdentity {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Emite um token para a sessão, válido por `ttl`
    pub fn issue(&self, session: &Session, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: session.user_id.clone(),
            clinic: session.clinic_id.clone(),
            role: session.role.clone(),
            permissions: session.permissions.clone(),
            exp: (Utc::now() + ttl).timestamp().max(0) as usize,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

impl IdentityProvider for JwtIdentity {
    type Error = AuthError;

    fn session(&self, credential: &str) -> Result<Session, Self::Error> {
        let data = decode::<Claims>(credential, &self.decoding, &self.validation)?;
        debug!(user = %data.claims.sub, clinic = %data.claims.clinic, "Sessão autenticada");
        Ok(data.claims.into())
    }
}

/// Sessão extraída do cabeçalho da requisição
#[derive(Debug, Clone)]
pub struct AuthSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Cabeçalho Authorization ausente".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Esquema de autenticação inválido".to_string()))?;

        let session = state.identity.session(token.trim())?;
        Ok(AuthSession(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_queue::{Action, Area};

    fn session() -> Session {
        Session {
            user_id: "u1".to_string(),
            clinic_id: ClinicId::from("c1"),
            role: "receptionist".to_string(),
            permissions: Permissions::new().grant(Area::Queue, &[Action::CheckIn]),
        }
    }

    #[test]
    fn test_token_carries_session() {
        let identity = JwtIdentity::new(b"segredo");
        let token = identity.issue(&session(), Duration::minutes(5)).unwrap();
        assert_eq!(identity.session(&token).unwrap(), session());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtIdentity::new(b"segredo")
            .issue(&session(), Duration::minutes(5))
            .unwrap();
        assert!(JwtIdentity::new(b"outro").session(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let identity = JwtIdentity::new(b"segredo");
        let token = identity.issue(&session(), Duration::hours(-2)).unwrap();
        assert!(identity.session(&token).is_err());
    }
}
