//! Ordem total da fila ao vivo
//!
//! A fila contém apenas pacientes `checked-in` ou `in-assistant`, ordenados por
//! `(queue_order, check_in_time)` crescentes. As duas chaves tratam ausência de
//! forma diferente: sem `queue_order` o paciente vai para o fim; sem
//! `check_in_time` ele vai para a frente entre os empatados. Registros antigos
//! sem check-in dependem desse comportamento, por isso ele é mantido.

use std::cmp::Ordering;

use crate::models::Appointment;

/// Compara a posição explícita; ausente fica depois de qualquer valor
fn cmp_queue_order(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Comparador total da fila ao vivo
pub fn queue_cmp(a: &Appointment, b: &Appointment) -> Ordering {
    cmp_queue_order(a.queue_order, b.queue_order)
        .then_with(|| a.check_in_time.unwrap_or(0).cmp(&b.check_in_time.unwrap_or(0)))
}

/// Política de ordenação da fila
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueOrderingPolicy;

impl QueueOrderingPolicy {
    /// Filtra e ordena a fila. A ordenação é estável: empates completos mantêm
    /// a ordem em que o armazenamento entregou os registros.
    pub fn live_queue<'a, I>(&self, appointments: I) -> Vec<Appointment>
    where
        I: IntoIterator<Item = &'a Appointment>,
    {
        let mut queue: Vec<Appointment> = appointments
            .into_iter()
            .filter(|a| a.status.is_queue_eligible())
            .cloned()
            .collect();
        queue.sort_by(queue_cmp);
        queue
    }
}
