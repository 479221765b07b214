//! Roteamento de pacientes entre a fila e as salas
//!
//! Cada clínica tem duas salas, consultório e assistente. Cada transição é uma
//! sequência de escritas independentes no armazenamento: não há transação nem
//! trava. O despejo de quem ocupa a sala e a entrada do novo paciente são duas
//! escritas separadas; um leitor pode observar a sala vazia entre elas.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PreconditionError, QueueError, QueueResult};
use crate::models::{Appointment, AppointmentPatch, AppointmentStatus, RoomKind};
use crate::ordering::QueueOrderingPolicy;
use crate::store::ClinicStore;

/// Comportamento de uma sala quando alguém entra com ela ocupada
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPolicy {
    /// Despeja o ocupante atual antes de admitir o novo paciente
    pub evict_on_entry: bool,
}

/// Políticas das duas salas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPolicies {
    pub exam: RoomPolicy,
    pub assistant: RoomPolicy,
}

impl Default for RoomPolicies {
    fn default() -> Self {
        Self {
            exam: RoomPolicy {
                evict_on_entry: true,
            },
            assistant: RoomPolicy {
                evict_on_entry: false,
            },
        }
    }
}

impl RoomPolicies {
    pub fn for_room(&self, room: RoomKind) -> RoomPolicy {
        match room {
            RoomKind::Exam => self.exam,
            RoomKind::Assistant => self.assistant,
        }
    }
}

/// Resultado de uma transição
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    Applied {
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        /// Ocupantes retirados da sala antes da entrada
        evicted: Vec<Uuid>,
    },
    /// Já estava no estado pedido
    Unchanged {
        appointment_id: Uuid,
        status: AppointmentStatus,
    },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Máquina de estados das salas
pub struct RoomRouter<S> {
    store: Arc<S>,
    policies: RoomPolicies,
}

impl<S: ClinicStore> RoomRouter<S> {
    pub fn new(store: Arc<S>, policies: RoomPolicies) -> Self {
        Self { store, policies }
    }

    /// Carrega o agendamento ou falha com `NotFound`
    pub async fn load(&self, id: Uuid) -> QueueResult<Appointment> {
        self.store
            .appointment(id)
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    /// Ocupantes atuais da sala
    pub async fn occupants(&self, appointment: &Appointment, room: RoomKind) -> QueueResult<Vec<Appointment>> {
        let occupied = room.occupied_status();
        Ok(self
            .store
            .list_appointments(&appointment.clinic_id)
            .await?
            .into_iter()
            .filter(|a| a.status == occupied)
            .collect())
    }

    /// Chegada do paciente agendado: entra no fim da fila
    pub async fn check_in(&self, id: Uuid) -> QueueResult<Transition> {
        let appointment = self.load(id).await?;
        match appointment.status {
            AppointmentStatus::CheckedIn => return Ok(unchanged(&appointment)),
            AppointmentStatus::Booked => {}
            from => return Err(rejected(id, from, AppointmentStatus::CheckedIn)),
        }

        // Fim da fila: depois da maior posição explícita, que pode ter buracos
        let all = self.store.list_appointments(&appointment.clinic_id).await?;
        let queue = QueueOrderingPolicy.live_queue(&all);
        let position = queue
            .iter()
            .filter_map(|a| a.queue_order)
            .max()
            .map(|last| last.saturating_add(1))
            .unwrap_or(queue.len() as i64);

        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::CheckedIn),
            queue_order: Some(Some(position)),
            // Carimbado uma única vez
            check_in_time: appointment
                .check_in_time
                .is_none()
                .then(|| Some(Utc::now().timestamp_millis())),
            ..Default::default()
        };
        self.store.update_appointment(id, patch).await?;

        info!(%id, clinic = %appointment.clinic_id, position, "Check-in realizado");
        Ok(applied(&appointment, AppointmentStatus::CheckedIn, Vec::new()))
    }

    /// Leva o paciente ao consultório, despejando o ocupante anterior
    pub async fn move_to_exam(&self, id: Uuid) -> QueueResult<Transition> {
        let appointment = self.load(id).await?;
        match appointment.status {
            AppointmentStatus::InExam => return Ok(unchanged(&appointment)),
            AppointmentStatus::CheckedIn | AppointmentStatus::InAssistant => {}
            from => return Err(rejected(id, from, AppointmentStatus::InExam)),
        }

        self.enter_room(&appointment, RoomKind::Exam, AppointmentPatch::status(AppointmentStatus::InExam))
            .await
    }

    /// Leva o paciente à sala da assistente; só uma vez por atendimento
    pub async fn move_to_assistant(&self, id: Uuid) -> QueueResult<Transition> {
        let appointment = self.load(id).await?;

        if appointment.status == AppointmentStatus::InAssistant {
            warn!(%id, "Paciente já está na sala da assistente");
            return Err(PreconditionError::AlreadyInAssistant.into());
        }
        if appointment.is_sheeted {
            warn!(%id, "Paciente já passou pela sala da assistente");
            return Err(PreconditionError::AlreadySheeted.into());
        }
        if appointment.status != AppointmentStatus::CheckedIn {
            return Err(rejected(id, appointment.status, AppointmentStatus::InAssistant));
        }

        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::InAssistant),
            is_sheeted: Some(true),
            ..Default::default()
        };
        self.enter_room(&appointment, RoomKind::Assistant, patch).await
    }

    /// Encerra o atendimento de quem está em uma sala
    pub async fn complete(&self, id: Uuid) -> QueueResult<Transition> {
        let appointment = self.load(id).await?;
        match appointment.status {
            AppointmentStatus::Completed => return Ok(unchanged(&appointment)),
            AppointmentStatus::InExam | AppointmentStatus::InAssistant => {}
            from => return Err(rejected(id, from, AppointmentStatus::Completed)),
        }

        self.store
            .update_appointment(id, AppointmentPatch::status(AppointmentStatus::Completed))
            .await?;

        info!(%id, from = %appointment.status, "Atendimento concluído");
        Ok(applied(&appointment, AppointmentStatus::Completed, Vec::new()))
    }

    /// Cancela antes do atendimento começar
    pub async fn cancel(&self, id: Uuid) -> QueueResult<Transition> {
        let appointment = self.load(id).await?;
        match appointment.status {
            AppointmentStatus::Cancelled => return Ok(unchanged(&appointment)),
            AppointmentStatus::Booked | AppointmentStatus::CheckedIn => {}
            from => return Err(rejected(id, from, AppointmentStatus::Cancelled)),
        }

        self.store
            .update_appointment(id, AppointmentPatch::status(AppointmentStatus::Cancelled))
            .await?;

        info!(%id, from = %appointment.status, "Agendamento cancelado");
        Ok(applied(&appointment, AppointmentStatus::Cancelled, Vec::new()))
    }

    async fn enter_room(
        &self,
        appointment: &Appointment,
        room: RoomKind,
        patch: AppointmentPatch,
    ) -> QueueResult<Transition> {
        let settings = self.store.settings(&appointment.clinic_id).await?;
        if settings.is_resting(room) {
            warn!(id = %appointment.id, %room, "Sala em descanso, transição recusada");
            return Err(PreconditionError::RoomResting(room).into());
        }

        let mut evicted = Vec::new();
        if self.policies.for_room(room).evict_on_entry {
            for occupant in self.occupants(appointment, room).await? {
                if occupant.id == appointment.id {
                    continue;
                }
                let target = room.eviction_status();
                self.store
                    .update_appointment(occupant.id, AppointmentPatch::status(target))
                    .await?;
                info!(id = %occupant.id, %room, to = %target, "Ocupante despejado da sala");
                evicted.push(occupant.id);
            }
        }

        let to = room.occupied_status();
        self.store.update_appointment(appointment.id, patch).await?;

        info!(
            id = %appointment.id,
            clinic = %appointment.clinic_id,
            %room,
            from = %appointment.status,
            evicted = evicted.len(),
            "Paciente encaminhado para a sala"
        );
        Ok(applied(appointment, to, evicted))
    }
}

fn applied(appointment: &Appointment, to: AppointmentStatus, evicted: Vec<Uuid>) -> Transition {
    Transition::Applied {
        appointment_id: appointment.id,
        from: appointment.status,
        to,
        evicted,
    }
}

fn unchanged(appointment: &Appointment) -> Transition {
    Transition::Unchanged {
        appointment_id: appointment.id,
        status: appointment.status,
    }
}

fn rejected(id: Uuid, from: AppointmentStatus, to: AppointmentStatus) -> QueueError {
    warn!(%id, %from, %to, "Transição inválida recusada");
    PreconditionError::InvalidTransition { from, to }.into()
}
