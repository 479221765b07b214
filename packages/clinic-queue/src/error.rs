//! Definições de erro para a biblioteca clinic-queue
//!
//! Este módulo define os tipos de erro usados pela fila, pelo roteador de salas
//! e pelo armazenamento

use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoError;
use crate::models::{AppointmentStatus, RoomKind};
use crate::permissions::{Action, Area};

/// Pré-condições de transição verificadas antes de qualquer escrita
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Sala em descanso: {0}")]
    RoomResting(RoomKind),

    #[error("Paciente já passou pela sala da assistente")]
    AlreadySheeted,

    #[error("Paciente já está na sala da assistente")]
    AlreadyInAssistant,

    #[error("Transição inválida: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Agendamentos pausados para esta clínica")]
    BookingPaused,
}

/// Erros das operações da fila
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Erro de banco de dados: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Erro de criptografia: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Erro de serialização: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Agendamento não encontrado: {0}")]
    NotFound(Uuid),

    #[error("Pré-condição não atendida: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Permissão negada: {area}/{action}")]
    PermissionDenied { area: Area, action: Action },

    #[error("Posição fora da fila: {index} (tamanho {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Moderador já possui turno aberto: {0}")]
    ShiftAlreadyOpen(String),

    #[error("Nenhum turno aberto para o moderador: {0}")]
    NoOpenShift(String),

    #[error("Registro corrompido: {0}")]
    Corrupted(String),
}

/// Tipo de resultado das operações da fila
pub type QueueResult<T> = Result<T, QueueError>;

impl QueueError {
    /// Indica se o erro é uma ação bloqueada (não uma falha de infraestrutura)
    pub fn is_blocked_action(&self) -> bool {
        matches!(
            self,
            QueueError::Precondition(_)
                | QueueError::PermissionDenied { .. }
                | QueueError::IndexOutOfRange { .. }
                | QueueError::ShiftAlreadyOpen(_)
                | QueueError::NoOpenShift(_)
        )
    }
}
