//! Modelos de dados da recepção
//!
//! Este módulo define as estruturas usadas pela fila de pacientes, pelas salas
//! de atendimento e pelos turnos de moderação

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Identificador da clínica (partição de todos os registros)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClinicId(String);

impl ClinicId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClinicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClinicId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Status possíveis de um agendamento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    /// Agendado, paciente ainda não chegou
    Booked,
    /// Paciente na recepção, aguardando na fila
    CheckedIn,
    /// Em consulta com o médico
    InExam,
    /// Na sala da assistente
    InAssistant,
    /// Atendimento concluído
    Completed,
    /// Cancelado
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Booked,
        AppointmentStatus::CheckedIn,
        AppointmentStatus::InExam,
        AppointmentStatus::InAssistant,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::CheckedIn => "checked-in",
            AppointmentStatus::InExam => "in-exam",
            AppointmentStatus::InAssistant => "in-assistant",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Status visíveis na fila ao vivo
    pub fn is_queue_eligible(&self) -> bool {
        matches!(self, AppointmentStatus::CheckedIn | AppointmentStatus::InAssistant)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Valor de status inválido: {}", s))
    }
}

/// Origem do agendamento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    /// Marcado com antecedência
    Scheduled,
    /// Chegou sem agendamento
    WalkIn,
}

impl BookingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingSource::Scheduled => "scheduled",
            BookingSource::WalkIn => "walk_in",
        }
    }
}

impl FromStr for BookingSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(BookingSource::Scheduled),
            "walk_in" => Ok(BookingSource::WalkIn),
            _ => Err(format!("Origem inválida: {}", s)),
        }
    }
}

/// Dados descritivos do paciente, armazenados criptografados
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDetails {
    pub patient_name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
}

/// Representa um agendamento
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Identificador único, atribuído pelo armazenamento
    pub id: Uuid,
    /// Clínica dona do registro
    pub clinic_id: ClinicId,
    /// Status atual
    pub status: AppointmentStatus,
    /// Posição explícita na fila (ausente = fim da fila)
    pub queue_order: Option<i64>,
    /// Momento do check-in em milissegundos desde a época
    pub check_in_time: Option<i64>,
    /// Já passou pela sala da assistente
    pub is_sheeted: bool,
    /// Origem do agendamento
    pub source: BookingSource,
    /// Valor pago em centavos
    pub payment_cents: Option<i64>,
    /// Dados descritivos do paciente
    pub details: PatientDetails,
    /// Criação do registro (ms, relógio do servidor)
    pub created_at: i64,
    /// Última escrita (ms, monotônico no servidor)
    pub updated_at: i64,
}

/// Dados para criação de um agendamento
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub status: AppointmentStatus,
    pub queue_order: Option<i64>,
    pub check_in_time: Option<i64>,
    pub source: BookingSource,
    pub payment_cents: Option<i64>,
    pub details: PatientDetails,
}

impl NewAppointment {
    /// Agendamento comum, ainda fora da fila
    pub fn booked(details: PatientDetails) -> Self {
        Self {
            status: AppointmentStatus::Booked,
            queue_order: None,
            check_in_time: None,
            source: BookingSource::Scheduled,
            payment_cents: None,
            details,
        }
    }

    /// Paciente sem agendamento, entra direto na fila sem posição explícita
    pub fn walk_in(details: PatientDetails, check_in_time: i64) -> Self {
        Self {
            status: AppointmentStatus::CheckedIn,
            queue_order: None,
            check_in_time: Some(check_in_time),
            source: BookingSource::WalkIn,
            payment_cents: None,
            details,
        }
    }

    pub fn with_payment(mut self, payment_cents: Option<i64>) -> Self {
        self.payment_cents = payment_cents;
        self
    }
}

/// Atualização parcial: apenas os campos presentes são escritos
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentPatch {
    pub status: Option<AppointmentStatus>,
    pub queue_order: Option<Option<i64>>,
    pub check_in_time: Option<Option<i64>>,
    pub is_sheeted: Option<bool>,
    pub payment_cents: Option<Option<i64>>,
    pub details: Option<PatientDetails>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn queue_order(order: i64) -> Self {
        Self {
            queue_order: Some(Some(order)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &AppointmentPatch::default()
    }
}

/// Salas de atendimento com ocupação única
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    /// Consultório do médico
    Exam,
    /// Sala da assistente
    Assistant,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Exam => "exam",
            RoomKind::Assistant => "assistant",
        }
    }

    /// Status de quem ocupa a sala
    pub fn occupied_status(&self) -> AppointmentStatus {
        match self {
            RoomKind::Exam => AppointmentStatus::InExam,
            RoomKind::Assistant => AppointmentStatus::InAssistant,
        }
    }

    /// Status para onde vai o ocupante despejado
    pub fn eviction_status(&self) -> AppointmentStatus {
        match self {
            RoomKind::Exam => AppointmentStatus::Completed,
            RoomKind::Assistant => AppointmentStatus::CheckedIn,
        }
    }
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exam" => Ok(RoomKind::Exam),
            "assistant" => Ok(RoomKind::Assistant),
            _ => Err(format!("Sala inválida: {}", s)),
        }
    }
}

/// Disponibilidade de uma sala
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomAvailability {
    #[default]
    Available,
    /// Profissional fora de serviço; transições para a sala são recusadas
    Resting,
}

/// Configurações operacionais da clínica
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicSettings {
    pub doctor: RoomAvailability,
    pub assistant: RoomAvailability,
    /// Recusa novos agendamentos (não afeta transições)
    pub booking_paused: bool,
}

impl ClinicSettings {
    pub fn availability(&self, room: RoomKind) -> RoomAvailability {
        match room {
            RoomKind::Exam => self.doctor,
            RoomKind::Assistant => self.assistant,
        }
    }

    pub fn is_resting(&self, room: RoomKind) -> bool {
        self.availability(room) == RoomAvailability::Resting
    }
}

/// Coleções do armazenamento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Appointments,
    Settings,
    RoomCalls,
    ModeratorShifts,
}

/// Notificação emitida a cada escrita bem-sucedida
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub collection: Collection,
    pub clinic_id: ClinicId,
    pub id: Option<Uuid>,
}

/// Turno de trabalho de um moderador de redes sociais
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorShift {
    pub id: Uuid,
    pub clinic_id: ClinicId,
    pub moderator_id: String,
    /// Início em ms
    pub started_at: i64,
    /// Fim em ms (ausente enquanto o turno está aberto)
    pub ended_at: Option<i64>,
}

impl ModeratorShift {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Duração em minutos completos (turnos abertos contam zero)
    pub fn worked_minutes(&self) -> i64 {
        self.ended_at
            .map(|end| (end - self.started_at).max(0) / 60_000)
            .unwrap_or(0)
    }
}
