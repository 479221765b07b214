//! Resumo diário da recepção: contagens por status e faturamento

use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Appointment, AppointmentStatus, BookingSource};

/// Números de um dia de atendimento
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    /// Agendamentos criados no dia, por status atual
    pub by_status: BTreeMap<String, u32>,
    pub total: u32,
    pub walk_ins: u32,
    /// Atendimentos concluídos com pagamento registrado
    pub paid: u32,
    /// Soma dos pagamentos dos atendimentos concluídos, em centavos
    pub revenue_cents: i64,
}

/// Intervalo `[início, fim)` do dia em ms UTC
fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
        .timestamp_millis();
    (start, start + 86_400_000)
}

/// Resume os agendamentos criados na data informada
pub fn summarize(appointments: &[Appointment], date: NaiveDate) -> DailySummary {
    let (start, end) = day_bounds(date);

    let mut summary = DailySummary {
        date,
        by_status: AppointmentStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect(),
        total: 0,
        walk_ins: 0,
        paid: 0,
        revenue_cents: 0,
    };

    for appointment in appointments
        .iter()
        .filter(|a| a.created_at >= start && a.created_at < end)
    {
        summary.total += 1;
        *summary
            .by_status
            .entry(appointment.status.as_str().to_string())
            .or_default() += 1;

        if appointment.source == BookingSource::WalkIn {
            summary.walk_ins += 1;
        }
        if appointment.status == AppointmentStatus::Completed {
            if let Some(payment) = appointment.payment_cents {
                summary.paid += 1;
                summary.revenue_cents = summary.revenue_cents.saturating_add(payment);
            }
        }
    }

    summary
}
