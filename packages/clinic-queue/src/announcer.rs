//! Ponteiro "chamando agora" por sala
//!
//! O ponteiro é persistido para que o painel do saguão e as telas da equipe
//! vejam o mesmo alvo. Ele só vale enquanto o agendamento apontado está
//! `checked-in`; fora disso a leitura trata a chamada como vencida.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::models::{Appointment, AppointmentStatus, ClinicId, RoomKind};
use crate::store::ClinicStore;

/// Resolve o ponteiro contra os agendamentos conhecidos
pub fn resolve_calling(pointer: Option<Uuid>, appointments: &[Appointment]) -> Option<&Appointment> {
    let id = pointer?;
    appointments
        .iter()
        .find(|a| a.id == id && a.status == AppointmentStatus::CheckedIn)
}

pub struct CallAnnouncer<S> {
    store: Arc<S>,
}

impl<S: ClinicStore> CallAnnouncer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Define ou limpa a chamada da sala
    pub async fn set_calling(
        &self,
        clinic_id: &ClinicId,
        room: RoomKind,
        appointment_id: Option<Uuid>,
    ) -> QueueResult<()> {
        if let Some(id) = appointment_id {
            let known = self
                .store
                .appointment(id)
                .await?
                .filter(|a| &a.clinic_id == clinic_id);
            if known.is_none() {
                return Err(QueueError::NotFound(id));
            }
        }

        self.store.set_calling(clinic_id, room, appointment_id).await?;
        info!(clinic = %clinic_id, %room, ?appointment_id, "Chamada atualizada");
        Ok(())
    }

    /// Quem está sendo chamado na sala, se a chamada ainda for válida
    pub async fn now_calling(
        &self,
        clinic_id: &ClinicId,
        room: RoomKind,
    ) -> QueueResult<Option<Appointment>> {
        let Some(id) = self.store.calling(clinic_id, room).await? else {
            return Ok(None);
        };

        Ok(self
            .store
            .appointment(id)
            .await?
            .filter(|a| &a.clinic_id == clinic_id && a.status == AppointmentStatus::CheckedIn))
    }
}
