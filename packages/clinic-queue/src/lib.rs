//! Clinic Queue - fila de pacientes e salas de atendimento da recepção
//!
//! Esta biblioteca fornece:
//! - Modelos de agendamento, salas e turnos de moderação
//! - Armazenamento por clínica com notificação de cada escrita
//! - Ordenação da fila, reordenação, roteamento entre salas e chamadas
//! - Permissões por área e a fachada `FrontDesk` usada pelo serviço HTTP
//! - Criptografia dos dados descritivos do paciente

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub mod analytics;
pub mod announcer;
pub mod crypto;
pub mod desk;
pub mod error;
pub mod migrations;
pub mod models;
pub mod ordering;
pub mod permissions;
pub mod reorder;
pub mod router;
pub mod shifts;
pub mod store;
pub mod subscription;

pub use desk::{DetailsUpdate, FrontDesk};
pub use error::{PreconditionError, QueueError, QueueResult};
pub use models::{
    Appointment, AppointmentStatus, ClinicId, ClinicSettings, PatientDetails, RoomAvailability,
    RoomKind,
};
pub use permissions::{Action, Area, IdentityProvider, Permissions, Session};
pub use router::{RoomPolicies, RoomPolicy, Transition};
pub use store::{ClinicStore, ShiftStore, SqliteStore};
pub use subscription::{LiveQueueFeed, QueueBoard};

/// Configuração do armazenamento
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Frase secreta da qual a chave dos dados do paciente é derivada
    pub key_phrase: String,
    /// Salt da derivação (mínimo de 8 bytes)
    pub key_salt: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "data/front-desk.db".to_string(),
            key_phrase: "".to_string(), // Vazio por segurança, deve ser definido explicitamente
            key_salt: "".to_string(),
            max_connections: 5,
        }
    }
}

/// Inicializa o pool SQLite e aplica as migrações
pub async fn init_db_pool(config: &StoreConfig) -> Result<SqlitePool> {
    let db_path = Path::new(&config.db_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .context("Falha ao criar diretório para banco de dados")?;
        }
    }

    let connection_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .pragma("synchronous", "NORMAL");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connection_options)
        .await
        .context("Falha ao conectar ao banco de dados SQLite")?;

    migrations::run_migrations(&pool)
        .await
        .context("Falha ao aplicar migrações")?;

    info!("Banco de dados inicializado com sucesso: {}", config.db_path);
    Ok(pool)
}

/// Abre o armazenamento completo: pool, migrações e chave derivada
pub async fn open_store(config: &StoreConfig) -> Result<SqliteStore> {
    let key = crypto::EncryptionKey::derive(&config.key_phrase, config.key_salt.as_bytes())
        .context("Falha ao derivar a chave dos dados do paciente")?;
    let pool = init_db_pool(config).await?;
    Ok(SqliteStore::new(pool, key))
}
