//! Turnos dos moderadores que atendem as redes sociais

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::models::{ClinicId, ModeratorShift};
use crate::store::ShiftStore;

pub struct ShiftTracker<S> {
    store: Arc<S>,
}

impl<S: ShiftStore> ShiftTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Abre um turno; cada moderador tem no máximo um turno aberto
    pub async fn start_shift(
        &self,
        clinic_id: &ClinicId,
        moderator_id: &str,
    ) -> QueueResult<ModeratorShift> {
        if self.store.open_shift(clinic_id, moderator_id).await?.is_some() {
            return Err(QueueError::ShiftAlreadyOpen(moderator_id.to_string()));
        }

        let shift = ModeratorShift {
            id: Uuid::new_v4(),
            clinic_id: clinic_id.clone(),
            moderator_id: moderator_id.to_string(),
            started_at: Utc::now().timestamp_millis(),
            ended_at: None,
        };
        self.store.insert_shift(&shift).await?;

        info!(clinic = %clinic_id, moderator = moderator_id, "Turno iniciado");
        Ok(shift)
    }

    /// Fecha o turno aberto do moderador
    pub async fn end_shift(
        &self,
        clinic_id: &ClinicId,
        moderator_id: &str,
    ) -> QueueResult<ModeratorShift> {
        let mut shift = self
            .store
            .open_shift(clinic_id, moderator_id)
            .await?
            .ok_or_else(|| QueueError::NoOpenShift(moderator_id.to_string()))?;

        let ended_at = Utc::now().timestamp_millis().max(shift.started_at);
        self.store.close_shift(shift.id, ended_at).await?;
        shift.ended_at = Some(ended_at);

        info!(
            clinic = %clinic_id,
            moderator = moderator_id,
            minutes = shift.worked_minutes(),
            "Turno encerrado"
        );
        Ok(shift)
    }

    pub async fn shifts(
        &self,
        clinic_id: &ClinicId,
        moderator_id: Option<&str>,
    ) -> QueueResult<Vec<ModeratorShift>> {
        self.store.list_shifts(clinic_id, moderator_id).await
    }

    /// Minutos trabalhados em turnos já encerrados
    pub async fn worked_minutes(&self, clinic_id: &ClinicId, moderator_id: &str) -> QueueResult<i64> {
        Ok(self
            .shifts(clinic_id, Some(moderator_id))
            .await?
            .iter()
            .map(ModeratorShift::worked_minutes)
            .sum())
    }
}
