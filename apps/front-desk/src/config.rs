//! Configuração do serviço lida de variáveis de ambiente

use anyhow::{anyhow, Context, Result};
use clinic_queue::{RoomPolicies, RoomPolicy, StoreConfig};
use std::net::SocketAddr;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Configuração completa do front-desk
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Endereço HTTP
    pub bind: SocketAddr,
    /// Banco e chave dos dados do paciente
    pub store: StoreConfig,
    /// Segredo HS256 dos tokens de sessão
    pub jwt_secret: String,
    /// Logs em JSON em vez de texto
    pub log_json: bool,
    pub policies: RoomPolicies,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Monta a configuração a partir de uma função de consulta
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind: SocketAddr = lookup("FRONT_DESK_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("FRONT_DESK_BIND inválido")?;

        let defaults = StoreConfig::default();
        let max_connections: u32 = match lookup("FRONT_DESK_MAX_CONNECTIONS") {
            Some(value) => value
                .parse()
                .context("FRONT_DESK_MAX_CONNECTIONS deve ser um inteiro")?,
            None => defaults.max_connections,
        };

        let store = StoreConfig {
            db_path: lookup("FRONT_DESK_DB_PATH").unwrap_or(defaults.db_path),
            key_phrase: required(&lookup, "FRONT_DESK_KEY_PHRASE")?,
            key_salt: required(&lookup, "FRONT_DESK_KEY_SALT")?,
            max_connections,
        };

        let mut policies = RoomPolicies::default();
        if let Some(value) = lookup("FRONT_DESK_ASSISTANT_EVICTS") {
            policies.assistant = RoomPolicy {
                evict_on_entry: parse_flag(&value)
                    .context("FRONT_DESK_ASSISTANT_EVICTS inválido")?,
            };
        }

        let log_json = match lookup("FRONT_DESK_LOG_JSON") {
            Some(value) => parse_flag(&value).context("FRONT_DESK_LOG_JSON inválido")?,
            None => false,
        };

        Ok(Self {
            bind,
            store,
            jwt_secret: required(&lookup, "FRONT_DESK_JWT_SECRET")?,
            log_json,
            policies,
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("Variável obrigatória ausente: {}", name))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Valor booleano inválido: {}", other)),
    }
}
