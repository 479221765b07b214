//! Fachada da recepção
//!
//! Toda operação passa pela sessão: a permissão da área é conferida e os
//! registros ficam restritos à clínica da sessão. Agendamentos de outra
//! clínica são tratados como inexistentes.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analytics::{summarize, DailySummary};
use crate::announcer::CallAnnouncer;
use crate::error::{PreconditionError, QueueError, QueueResult};
use crate::models::{
    Appointment, AppointmentPatch, ClinicSettings, ModeratorShift, NewAppointment, PatientDetails,
    RoomKind,
};
use crate::ordering::QueueOrderingPolicy;
use crate::permissions::{Action, Area, Session};
use crate::reorder::ReorderService;
use crate::router::{RoomPolicies, RoomRouter, Transition};
use crate::shifts::ShiftTracker;
use crate::store::{ClinicStore, ShiftStore};
use crate::subscription::{LiveQueueFeed, QueueBoard};

/// Alterações nos dados descritivos e no pagamento
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailsUpdate {
    pub details: Option<PatientDetails>,
    pub payment_cents: Option<Option<i64>>,
}

pub struct FrontDesk<S> {
    store: Arc<S>,
    router: RoomRouter<S>,
    reorder: ReorderService<S>,
    announcer: CallAnnouncer<S>,
    shifts: ShiftTracker<S>,
}

impl<S> FrontDesk<S>
where
    S: ClinicStore + ShiftStore + 'static,
{
    pub fn new(store: Arc<S>, policies: RoomPolicies) -> Self {
        Self {
            router: RoomRouter::new(store.clone(), policies),
            reorder: ReorderService::new(store.clone()),
            announcer: CallAnnouncer::new(store.clone()),
            shifts: ShiftTracker::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Carrega o agendamento dentro da clínica da sessão
    async fn scoped(&self, session: &Session, id: Uuid) -> QueueResult<Appointment> {
        match self.store.appointment(id).await? {
            Some(appointment) if appointment.clinic_id == session.clinic_id => Ok(appointment),
            Some(appointment) => {
                warn!(
                    %id,
                    user = %session.user_id,
                    owner = %appointment.clinic_id,
                    "Acesso a agendamento de outra clínica"
                );
                Err(QueueError::NotFound(id))
            }
            None => Err(QueueError::NotFound(id)),
        }
    }

    async fn create(&self, session: &Session, draft: NewAppointment) -> QueueResult<Appointment> {
        let settings = self.store.settings(&session.clinic_id).await?;
        if settings.booking_paused {
            warn!(clinic = %session.clinic_id, user = %session.user_id, "Agendamento recusado: pausado");
            return Err(PreconditionError::BookingPaused.into());
        }
        self.store.create_appointment(&session.clinic_id, draft).await
    }

    pub async fn appointment(&self, session: &Session, id: Uuid) -> QueueResult<Appointment> {
        session.require(Area::Appointments, Action::View)?;
        self.scoped(session, id).await
    }

    /// Novo agendamento, fora da fila até o check-in
    pub async fn book(
        &self,
        session: &Session,
        details: PatientDetails,
        payment_cents: Option<i64>,
    ) -> QueueResult<Appointment> {
        session.require(Area::Appointments, Action::Book)?;
        self.create(session, NewAppointment::booked(details).with_payment(payment_cents))
            .await
    }

    /// Paciente sem agendamento: entra na fila sem posição explícita
    pub async fn walk_in(
        &self,
        session: &Session,
        details: PatientDetails,
        payment_cents: Option<i64>,
    ) -> QueueResult<Appointment> {
        session.require(Area::Queue, Action::CheckIn)?;
        let draft = NewAppointment::walk_in(details, Utc::now().timestamp_millis())
            .with_payment(payment_cents);
        self.create(session, draft).await
    }

    pub async fn check_in(&self, session: &Session, id: Uuid) -> QueueResult<Transition> {
        session.require(Area::Queue, Action::CheckIn)?;
        self.scoped(session, id).await?;
        self.router.check_in(id).await
    }

    pub async fn move_to_exam(&self, session: &Session, id: Uuid) -> QueueResult<Transition> {
        session.require(Area::Rooms, Action::Route)?;
        self.scoped(session, id).await?;
        self.router.move_to_exam(id).await
    }

    pub async fn move_to_assistant(&self, session: &Session, id: Uuid) -> QueueResult<Transition> {
        session.require(Area::Rooms, Action::Route)?;
        self.scoped(session, id).await?;
        self.router.move_to_assistant(id).await
    }

    pub async fn complete(&self, session: &Session, id: Uuid) -> QueueResult<Transition> {
        session.require(Area::Rooms, Action::Complete)?;
        self.scoped(session, id).await?;
        self.router.complete(id).await
    }

    pub async fn cancel(&self, session: &Session, id: Uuid) -> QueueResult<Transition> {
        session.require(Area::Appointments, Action::Cancel)?;
        self.scoped(session, id).await?;
        self.router.cancel(id).await
    }

    /// Atualiza dados do paciente e/ou pagamento
    pub async fn update_details(
        &self,
        session: &Session,
        id: Uuid,
        update: DetailsUpdate,
    ) -> QueueResult<Appointment> {
        if update.details.is_some() {
            session.require(Area::Appointments, Action::Manage)?;
        }
        if update.payment_cents.is_some() {
            session.require(Area::Accounting, Action::Manage)?;
        }
        self.scoped(session, id).await?;

        let patch = AppointmentPatch {
            details: update.details,
            payment_cents: update.payment_cents,
            ..Default::default()
        };
        if !patch.is_empty() {
            self.store.update_appointment(id, patch).await?;
            info!(%id, user = %session.user_id, "Dados do agendamento atualizados");
        }
        self.scoped(session, id).await
    }

    pub async fn reorder(
        &self,
        session: &Session,
        from_index: usize,
        to_index: usize,
    ) -> QueueResult<Vec<Appointment>> {
        session.require(Area::Queue, Action::Reorder)?;
        self.reorder
            .apply(&session.clinic_id, from_index, to_index)
            .await
    }

    pub async fn live_queue(&self, session: &Session) -> QueueResult<Vec<Appointment>> {
        session.require(Area::Queue, Action::View)?;
        let all = self.store.list_appointments(&session.clinic_id).await?;
        Ok(QueueOrderingPolicy.live_queue(&all))
    }

    /// Painel atual: fila, consultório e chamadas válidas
    pub async fn board(&self, session: &Session) -> QueueResult<QueueBoard> {
        session.require(Area::Queue, Action::View)?;
        let all = self.store.list_appointments(&session.clinic_id).await?;
        let exam = self.store.calling(&session.clinic_id, RoomKind::Exam).await?;
        let assistant = self
            .store
            .calling(&session.clinic_id, RoomKind::Assistant)
            .await?;
        Ok(QueueBoard::build(&all, exam, assistant))
    }

    /// Painel empurrado a cada mudança
    pub fn subscribe_queue(&self, session: &Session) -> QueueResult<LiveQueueFeed<S>> {
        session.require(Area::Queue, Action::View)?;
        Ok(LiveQueueFeed::new(self.store.clone(), session.clinic_id.clone()))
    }

    pub async fn set_calling(
        &self,
        session: &Session,
        room: RoomKind,
        appointment_id: Option<Uuid>,
    ) -> QueueResult<()> {
        session.require(Area::Queue, Action::Call)?;
        self.announcer
            .set_calling(&session.clinic_id, room, appointment_id)
            .await
    }

    pub async fn now_calling(
        &self,
        session: &Session,
        room: RoomKind,
    ) -> QueueResult<Option<Appointment>> {
        session.require(Area::Queue, Action::View)?;
        self.announcer.now_calling(&session.clinic_id, room).await
    }

    pub async fn settings(&self, session: &Session) -> QueueResult<ClinicSettings> {
        session.require(Area::Settings, Action::View)?;
        self.store.settings(&session.clinic_id).await
    }

    pub async fn update_settings(
        &self,
        session: &Session,
        settings: ClinicSettings,
    ) -> QueueResult<ClinicSettings> {
        session.require(Area::Settings, Action::Manage)?;
        self.store.save_settings(&session.clinic_id, settings).await?;
        Ok(settings)
    }

    pub async fn daily_summary(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> QueueResult<DailySummary> {
        session.require(Area::Analytics, Action::View)?;
        let all = self.store.list_appointments(&session.clinic_id).await?;
        Ok(summarize(&all, date))
    }

    /// Abre o turno do próprio usuário da sessão
    pub async fn start_shift(&self, session: &Session) -> QueueResult<ModeratorShift> {
        session.require(Area::Moderators, Action::TrackShift)?;
        self.shifts
            .start_shift(&session.clinic_id, &session.user_id)
            .await
    }

    pub async fn end_shift(&self, session: &Session) -> QueueResult<ModeratorShift> {
        session.require(Area::Moderators, Action::TrackShift)?;
        self.shifts
            .end_shift(&session.clinic_id, &session.user_id)
            .await
    }

    pub async fn shifts(
        &self,
        session: &Session,
        moderator_id: Option<&str>,
    ) -> QueueResult<Vec<ModeratorShift>> {
        session.require(Area::Moderators, Action::View)?;
        self.shifts.shifts(&session.clinic_id, moderator_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, ClinicId};
    use crate::permissions::{Permissions, ADMIN_ROLE};
    use crate::store::test_support::temp_store;
    use crate::store::SqliteStore;

    fn session(clinic: &str, role: &str, permissions: Permissions) -> Session {
        Session {
            user_id: format!("{}-user", role),
            clinic_id: ClinicId::from(clinic),
            role: role.to_string(),
            permissions,
        }
    }

    fn admin(clinic: &str) -> Session {
        session(clinic, ADMIN_ROLE, Permissions::new())
    }

    fn patient(name: &str) -> PatientDetails {
        PatientDetails {
            patient_name: name.to_string(),
            ..Default::default()
        }
    }

    async fn desk() -> (tempfile::TempDir, FrontDesk<SqliteStore>) {
        let (dir, store) = temp_store().await;
        (dir, FrontDesk::new(store, RoomPolicies::default()))
    }

    #[tokio::test]
    async fn test_full_visit() -> QueueResult<()> {
        let (_dir, desk) = desk().await;
        let staff = admin("c1");

        let booked = desk.book(&staff, patient("Ana"), Some(25_000)).await?;
        let walk_in = desk.walk_in(&staff, patient("Bruno"), None).await?;
        desk.check_in(&staff, booked.id).await?;

        let queue = desk.live_queue(&staff).await?;
        assert_eq!(
            queue.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![booked.id, walk_in.id]
        );

        desk.move_to_assistant(&staff, booked.id).await?;
        desk.move_to_exam(&staff, booked.id).await?;
        desk.move_to_exam(&staff, walk_in.id).await?;
        desk.complete(&staff, walk_in.id).await?;

        let board = desk.board(&staff).await?;
        assert!(board.queue.is_empty());
        assert!(board.in_exam.is_empty());

        let today = Utc::now().date_naive();
        let summary = desk.daily_summary(&staff, today).await?;
        assert_eq!(summary.by_status["completed"], 2);
        assert_eq!(summary.revenue_cents, 25_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_booking_paused_blocks_creation_only() -> QueueResult<()> {
        let (_dir, desk) = desk().await;
        let staff = admin("c1");
        let early = desk.walk_in(&staff, patient("Ana"), None).await?;

        desk.update_settings(
            &staff,
            ClinicSettings {
                booking_paused: true,
                ..Default::default()
            },
        )
        .await?;

        assert!(matches!(
            desk.book(&staff, patient("Bruno"), None).await,
            Err(QueueError::Precondition(PreconditionError::BookingPaused))
        ));
        assert!(matches!(
            desk.walk_in(&staff, patient("Carla"), None).await,
            Err(QueueError::Precondition(PreconditionError::BookingPaused))
        ));
        assert!(desk.move_to_exam(&staff, early.id).await?.is_applied());
        Ok(())
    }

    #[tokio::test]
    async fn test_permissions_are_enforced() -> QueueResult<()> {
        let (_dir, desk) = desk().await;
        let receptionist = session(
            "c1",
            "receptionist",
            Permissions::new().grant(Area::Queue, &[Action::CheckIn]),
        );

        let a = desk.walk_in(&receptionist, patient("Ana"), None).await?;
        assert!(matches!(
            desk.move_to_exam(&receptionist, a.id).await,
            Err(QueueError::PermissionDenied {
                area: Area::Rooms,
                action: Action::Route
            })
        ));
        assert!(matches!(
            desk.reorder(&receptionist, 0, 0).await,
            Err(QueueError::PermissionDenied { .. })
        ));
        assert!(desk.live_queue(&receptionist).await.is_ok());
        assert!(desk.settings(&receptionist).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_other_clinic_records_are_invisible() -> QueueResult<()> {
        let (_dir, desk) = desk().await;
        let north = admin("north");
        let south = admin("south");

        let a = desk.walk_in(&north, patient("Ana"), None).await?;
        assert!(matches!(
            desk.move_to_exam(&south, a.id).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(desk.live_queue(&south).await?.is_empty());
        assert_eq!(
            desk.store().appointment(a.id).await?.unwrap().status,
            AppointmentStatus::CheckedIn
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_update_details_and_payment() -> QueueResult<()> {
        let (_dir, desk) = desk().await;
        let staff = admin("c1");
        let a = desk.book(&staff, patient("Ana"), None).await?;

        let updated = desk
            .update_details(
                &staff,
                a.id,
                DetailsUpdate {
                    details: Some(PatientDetails {
                        diagnosis: Some("Sinusite".to_string()),
                        ..patient("Ana")
                    }),
                    payment_cents: Some(Some(30_000)),
                },
            )
            .await?;
        assert_eq!(updated.details.diagnosis.as_deref(), Some("Sinusite"));
        assert_eq!(updated.payment_cents, Some(30_000));

        let clerk = session(
            "c1",
            "clerk",
            Permissions::new().grant(Area::Appointments, &[Action::Manage]),
        );
        let denied = desk
            .update_details(
                &clerk,
                a.id,
                DetailsUpdate {
                    payment_cents: Some(None),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            denied,
            Err(QueueError::PermissionDenied {
                area: Area::Accounting,
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_moderator_shift_uses_session_user() -> QueueResult<()> {
        let (_dir, desk) = desk().await;
        let moderator = session(
            "c1",
            "moderator",
            Permissions::new().grant(Area::Moderators, &[Action::TrackShift]),
        );

        let shift = desk.start_shift(&moderator).await?;
        assert_eq!(shift.moderator_id, "moderator-user");
        desk.end_shift(&moderator).await?;

        let shifts = desk.shifts(&moderator, Some("moderator-user")).await?;
        assert_eq!(shifts.len(), 1);
        assert!(!shifts[0].is_open());
        Ok(())
    }
}
