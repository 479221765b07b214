//! Front Desk - serviço HTTP da recepção
//!
//! Expõe a fachada `FrontDesk` para as estações da recepção e para os
//! painéis da sala de espera (fila ao vivo via server-sent events).

use clinic_queue::{FrontDesk, SqliteStore};
use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

pub use auth::{AuthSession, JwtIdentity};
pub use config::AppConfig;
pub use error::ApiError;
pub use routes::build_router;

/// Informações geradas em tempo de build
pub mod build_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Estado compartilhado pelos handlers
#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<FrontDesk<SqliteStore>>,
    pub identity: Arc<JwtIdentity>,
}

impl AppState {
    pub fn new(desk: FrontDesk<SqliteStore>, identity: JwtIdentity) -> Self {
        Self {
            desk: Arc::new(desk),
            identity: Arc::new(identity),
        }
    }
}
