//! Inscrições em tempo real
//!
//! Uma inscrição entrega primeiro o estado atual da clínica e depois um novo
//! snapshot completo a cada escrita que toque a clínica. Não há entrega de
//! diferenças: quem lê sempre reconcilia contra o snapshot mais recente.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::announcer::resolve_calling;
use crate::error::QueueResult;
use crate::models::{Appointment, ClinicId, Collection, RoomKind, StoreEvent};
use crate::ordering::QueueOrderingPolicy;
use crate::store::ClinicStore;

/// Inscrição nos agendamentos de uma clínica
pub struct Subscription<S> {
    store: Arc<S>,
    clinic_id: ClinicId,
    events: broadcast::Receiver<StoreEvent>,
    watched: &'static [Collection],
    primed: bool,
}

impl<S: ClinicStore> Subscription<S> {
    pub fn new(store: Arc<S>, clinic_id: ClinicId) -> Self {
        Self::watching(store, clinic_id, &[Collection::Appointments])
    }

    /// Inscrição que também acorda com escritas nas coleções informadas
    pub fn watching(store: Arc<S>, clinic_id: ClinicId, watched: &'static [Collection]) -> Self {
        let events = store.subscribe();
        Self {
            store,
            clinic_id,
            events,
            watched,
            primed: false,
        }
    }

    /// Espera a próxima mudança relevante; `false` quando o canal fechou
    async fn changed(&mut self) -> bool {
        if !self.primed {
            self.primed = true;
            return true;
        }

        loop {
            match self.events.recv().await {
                Ok(event)
                    if event.clinic_id == self.clinic_id
                        && self.watched.contains(&event.collection) =>
                {
                    debug!(clinic = %self.clinic_id, ?event.collection, "Mudança recebida");
                    return true;
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(clinic = %self.clinic_id, skipped, "Inscrição atrasada, ressincronizando");
                    return true;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }

    /// Próximo snapshot completo dos agendamentos da clínica
    pub async fn next_snapshot(&mut self) -> QueueResult<Option<Vec<Appointment>>> {
        if !self.changed().await {
            return Ok(None);
        }
        self.store.list_appointments(&self.clinic_id).await.map(Some)
    }
}

/// Estado exibido no painel da fila
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueBoard {
    /// Fila ao vivo já ordenada
    pub queue: Vec<Appointment>,
    /// Quem está no consultório
    pub in_exam: Vec<Uuid>,
    /// Chamada válida do consultório
    pub exam_calling: Option<Uuid>,
    /// Chamada válida da sala da assistente
    pub assistant_calling: Option<Uuid>,
}

impl QueueBoard {
    /// Monta o painel a partir de um snapshot e dos ponteiros de chamada
    pub fn build(
        appointments: &[Appointment],
        exam_pointer: Option<Uuid>,
        assistant_pointer: Option<Uuid>,
    ) -> Self {
        Self {
            queue: QueueOrderingPolicy.live_queue(appointments),
            in_exam: appointments
                .iter()
                .filter(|a| a.status == RoomKind::Exam.occupied_status())
                .map(|a| a.id)
                .collect(),
            exam_calling: resolve_calling(exam_pointer, appointments).map(|a| a.id),
            assistant_calling: resolve_calling(assistant_pointer, appointments).map(|a| a.id),
        }
    }
}

/// Fila ao vivo empurrada a cada mudança de agendamentos ou chamadas
pub struct LiveQueueFeed<S> {
    subscription: Subscription<S>,
}

impl<S: ClinicStore> LiveQueueFeed<S> {
    pub fn new(store: Arc<S>, clinic_id: ClinicId) -> Self {
        Self {
            subscription: Subscription::watching(
                store,
                clinic_id,
                &[Collection::Appointments, Collection::RoomCalls],
            ),
        }
    }

    pub async fn next_board(&mut self) -> QueueResult<Option<QueueBoard>> {
        let Some(appointments) = self.subscription.next_snapshot().await? else {
            return Ok(None);
        };

        let store = &self.subscription.store;
        let clinic_id = &self.subscription.clinic_id;
        let exam = store.calling(clinic_id, RoomKind::Exam).await?;
        let assistant = store.calling(clinic_id, RoomKind::Assistant).await?;

        Ok(Some(QueueBoard::build(&appointments, exam, assistant)))
    }
}
