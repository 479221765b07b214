//! Reordenação da fila por arrastar e soltar
//!
//! Cada reordenação renumera a fila inteira com posições `0..N`, sem buracos,
//! e grava as N posições como escritas independentes e concorrentes. Outra
//! estação pode intercalar escritas; a próxima notificação do armazenamento
//! reconcilia a visão local.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{QueueError, QueueResult};
use crate::models::{Appointment, AppointmentPatch, ClinicId};
use crate::ordering::QueueOrderingPolicy;
use crate::store::ClinicStore;

/// Move o item de `from_index` para `to_index` e renumera todas as posições.
///
/// Fila vazia é devolvida como está; com itens, índices fora do intervalo
/// resultam em `IndexOutOfRange`.
pub fn reorder(
    mut queue: Vec<Appointment>,
    from_index: usize,
    to_index: usize,
) -> QueueResult<Vec<Appointment>> {
    let len = queue.len();
    if len == 0 {
        return Ok(queue);
    }
    for index in [from_index, to_index] {
        if index >= len {
            return Err(QueueError::IndexOutOfRange { index, len });
        }
    }

    let moved = queue.remove(from_index);
    queue.insert(to_index, moved);

    for (position, appointment) in queue.iter_mut().enumerate() {
        appointment.queue_order = Some(position as i64);
    }
    Ok(queue)
}

/// Serviço que aplica a reordenação sobre a fila atual da clínica
pub struct ReorderService<S> {
    store: Arc<S>,
}

impl<S: ClinicStore> ReorderService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Reordena a fila ao vivo da clínica e grava todas as novas posições.
    ///
    /// Todas as escritas são disparadas mesmo que alguma falhe; o primeiro erro
    /// é devolvido depois que todas terminam.
    pub async fn apply(
        &self,
        clinic_id: &ClinicId,
        from_index: usize,
        to_index: usize,
    ) -> QueueResult<Vec<Appointment>> {
        let all = self.store.list_appointments(clinic_id).await?;
        let queue = QueueOrderingPolicy.live_queue(&all);
        let reordered = reorder(queue, from_index, to_index)?;

        let writes = reordered.iter().map(|appointment| {
            let order = appointment.queue_order.unwrap_or_default();
            self.store
                .update_appointment(appointment.id, AppointmentPatch::queue_order(order))
        });
        let results = join_all(writes).await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            warn!(clinic = %clinic_id, failures, total = results.len(), "Reordenação gravada parcialmente");
        }
        if let Some(error) = results.into_iter().find_map(Result::err) {
            return Err(error);
        }

        info!(clinic = %clinic_id, from_index, to_index, total = reordered.len(), "Fila reordenada");
        Ok(reordered)
    }
}
