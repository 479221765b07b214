//! Armazenamento de documentos da recepção
//!
//! `ClinicStore` é a costura com o banco: CRUD por coleção e id, listagens
//! sempre filtradas por clínica e notificação de cada escrita para quem
//! estiver inscrito. `SqliteStore` é a implementação sobre SQLite.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::{open_details, seal_details, EncryptedData, EncryptionKey};
use crate::error::{QueueError, QueueResult};
use crate::models::{
    Appointment, AppointmentPatch, ClinicId, ClinicSettings, Collection, ModeratorShift,
    NewAppointment, RoomAvailability, RoomKind, StoreEvent,
};

/// Capacidade do canal de notificações
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;

const APPOINTMENT_COLUMNS: &str = "id, clinic_id, status, queue_order, check_in_time, is_sheeted, \
     source, payment_cents, details_ciphertext, details_nonce, created_at, updated_at";

/// Armazenamento de agendamentos, configurações e chamadas por clínica
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClinicStore: Send + Sync {
    /// Cria o agendamento; o armazenamento atribui id e carimbos de tempo
    async fn create_appointment(
        &self,
        clinic_id: &ClinicId,
        draft: NewAppointment,
    ) -> QueueResult<Appointment>;

    async fn appointment(&self, id: Uuid) -> QueueResult<Option<Appointment>>;

    /// Todos os agendamentos da clínica, na ordem de inserção
    async fn list_appointments(&self, clinic_id: &ClinicId) -> QueueResult<Vec<Appointment>>;

    /// Escreve apenas os campos presentes no patch
    async fn update_appointment(&self, id: Uuid, patch: AppointmentPatch) -> QueueResult<()>;

    async fn delete_appointment(&self, id: Uuid) -> QueueResult<()>;

    async fn settings(&self, clinic_id: &ClinicId) -> QueueResult<ClinicSettings>;

    async fn save_settings(&self, clinic_id: &ClinicId, settings: ClinicSettings)
        -> QueueResult<()>;

    async fn calling(&self, clinic_id: &ClinicId, room: RoomKind) -> QueueResult<Option<Uuid>>;

    async fn set_calling(
        &self,
        clinic_id: &ClinicId,
        room: RoomKind,
        appointment_id: Option<Uuid>,
    ) -> QueueResult<()>;

    /// Recebe uma notificação por escrita bem-sucedida
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Armazenamento dos turnos de moderação
#[async_trait]
pub trait ShiftStore: Send + Sync {
    async fn open_shift(
        &self,
        clinic_id: &ClinicId,
        moderator_id: &str,
    ) -> QueueResult<Option<ModeratorShift>>;

    async fn insert_shift(&self, shift: &ModeratorShift) -> QueueResult<()>;

    async fn close_shift(&self, id: Uuid, ended_at: i64) -> QueueResult<()>;

    async fn list_shifts(
        &self,
        clinic_id: &ClinicId,
        moderator_id: Option<&str>,
    ) -> QueueResult<Vec<ModeratorShift>>;
}

/// Linha de agendamento ainda criptografada
struct AppointmentRow {
    id: String,
    clinic_id: String,
    status: String,
    queue_order: Option<i64>,
    check_in_time: Option<i64>,
    is_sheeted: bool,
    source: String,
    payment_cents: Option<i64>,
    details_ciphertext: Vec<u8>,
    details_nonce: Vec<u8>,
    created_at: i64,
    updated_at: i64,
}

impl FromRow<'_, SqliteRow> for AppointmentRow {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            clinic_id: row.try_get("clinic_id")?,
            status: row.try_get("status")?,
            queue_order: row.try_get("queue_order")?,
            check_in_time: row.try_get("check_in_time")?,
            is_sheeted: row.try_get("is_sheeted")?,
            source: row.try_get("source")?,
            payment_cents: row.try_get("payment_cents")?,
            details_ciphertext: row.try_get("details_ciphertext")?,
            details_nonce: row.try_get("details_nonce")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl AppointmentRow {
    fn decode(self, key: &EncryptionKey) -> QueueResult<Appointment> {
        let details = open_details(
            &EncryptedData {
                ciphertext: self.details_ciphertext,
                nonce: self.details_nonce,
            },
            key,
        )?;

        Ok(Appointment {
            id: parse_id(&self.id)?,
            clinic_id: ClinicId::new(self.clinic_id),
            status: self.status.parse().map_err(QueueError::Corrupted)?,
            queue_order: self.queue_order,
            check_in_time: self.check_in_time,
            is_sheeted: self.is_sheeted,
            source: self.source.parse().map_err(QueueError::Corrupted)?,
            payment_cents: self.payment_cents,
            details,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct ShiftRow {
    id: String,
    clinic_id: String,
    moderator_id: String,
    started_at: i64,
    ended_at: Option<i64>,
}

impl FromRow<'_, SqliteRow> for ShiftRow {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            clinic_id: row.try_get("clinic_id")?,
            moderator_id: row.try_get("moderator_id")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }
}

impl ShiftRow {
    fn decode(self) -> QueueResult<ModeratorShift> {
        Ok(ModeratorShift {
            id: parse_id(&self.id)?,
            clinic_id: ClinicId::new(self.clinic_id),
            moderator_id: self.moderator_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
        })
    }
}

fn parse_id(raw: &str) -> QueueResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| QueueError::Corrupted(format!("id {}: {}", raw, e)))
}

/// Implementação de `ClinicStore` e `ShiftStore` sobre SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    key: Arc<EncryptionKey>,
    events: broadcast::Sender<StoreEvent>,
    last_stamp: Arc<AtomicI64>,
}

impl SqliteStore {
    /// Cria o armazenamento sobre um pool já migrado
    pub fn new(pool: SqlitePool, key: EncryptionKey) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pool,
            key: Arc::new(key),
            events,
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Carimbo do servidor em ms, estritamente crescente nesta instância
    pub fn server_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_stamp
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    fn notify(&self, collection: Collection, clinic_id: ClinicId, id: Option<Uuid>) {
        // Sem inscritos o envio falha, o que não é erro
        let _ = self.events.send(StoreEvent {
            collection,
            clinic_id,
            id,
        });
    }
}

#[async_trait]
impl ClinicStore for SqliteStore {
    async fn create_appointment(
        &self,
        clinic_id: &ClinicId,
        draft: NewAppointment,
    ) -> QueueResult<Appointment> {
        let id = Uuid::new_v4();
        let stamp = self.server_timestamp();
        let EncryptedData { ciphertext, nonce } = seal_details(&draft.details, &self.key)?;

        sqlx::query(&format!(
            "INSERT INTO appointments ({}) VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)",
            APPOINTMENT_COLUMNS
        ))
        .bind(id.to_string())
        .bind(clinic_id.as_str())
        .bind(draft.status.as_str())
        .bind(draft.queue_order)
        .bind(draft.check_in_time)
        .bind(draft.source.as_str())
        .bind(draft.payment_cents)
        .bind(ciphertext)
        .bind(nonce)
        .bind(stamp)
        .bind(stamp)
        .execute(&self.pool)
        .await?;

        info!(%id, clinic = %clinic_id, status = %draft.status, "Agendamento criado");
        self.notify(Collection::Appointments, clinic_id.clone(), Some(id));

        Ok(Appointment {
            id,
            clinic_id: clinic_id.clone(),
            status: draft.status,
            queue_order: draft.queue_order,
            check_in_time: draft.check_in_time,
            is_sheeted: false,
            source: draft.source,
            payment_cents: draft.payment_cents,
            details: draft.details,
            created_at: stamp,
            updated_at: stamp,
        })
    }

    async fn appointment(&self, id: Uuid) -> QueueResult<Option<Appointment>> {
        let row: Option<AppointmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM appointments WHERE id = ?",
            APPOINTMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.decode(&self.key)).transpose()
    }

    async fn list_appointments(&self, clinic_id: &ClinicId) -> QueueResult<Vec<Appointment>> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM appointments WHERE clinic_id = ? ORDER BY rowid",
            APPOINTMENT_COLUMNS
        ))
        .bind(clinic_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        debug!(clinic = %clinic_id, total = rows.len(), "Agendamentos carregados");
        rows.into_iter().map(|r| r.decode(&self.key)).collect()
    }

    async fn update_appointment(&self, id: Uuid, patch: AppointmentPatch) -> QueueResult<()> {
        let stamp = self.server_timestamp();

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE appointments SET updated_at = ");
        builder.push_bind(stamp);

        if let Some(status) = patch.status {
            builder.push(", status = ").push_bind(status.as_str());
        }
        if let Some(queue_order) = patch.queue_order {
            builder.push(", queue_order = ").push_bind(queue_order);
        }
        if let Some(check_in_time) = patch.check_in_time {
            builder.push(", check_in_time = ").push_bind(check_in_time);
        }
        if let Some(is_sheeted) = patch.is_sheeted {
            builder.push(", is_sheeted = ").push_bind(is_sheeted);
        }
        if let Some(payment_cents) = patch.payment_cents {
            builder.push(", payment_cents = ").push_bind(payment_cents);
        }
        if let Some(details) = &patch.details {
            let EncryptedData { ciphertext, nonce } = seal_details(details, &self.key)?;
            builder
                .push(", details_ciphertext = ")
                .push_bind(ciphertext)
                .push(", details_nonce = ")
                .push_bind(nonce);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id.to_string())
            .push(" RETURNING clinic_id");

        let clinic_id: Option<String> = builder
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await?;
        let clinic_id = clinic_id.ok_or(QueueError::NotFound(id))?;

        debug!(%id, ?patch.status, ?patch.queue_order, "Agendamento atualizado");
        self.notify(Collection::Appointments, ClinicId::new(clinic_id), Some(id));
        Ok(())
    }

    async fn delete_appointment(&self, id: Uuid) -> QueueResult<()> {
        let clinic_id: Option<String> =
            sqlx::query_scalar("DELETE FROM appointments WHERE id = ? RETURNING clinic_id")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        let clinic_id = clinic_id.ok_or(QueueError::NotFound(id))?;

        info!(%id, clinic = %clinic_id, "Agendamento removido");
        self.notify(Collection::Appointments, ClinicId::new(clinic_id), Some(id));
        Ok(())
    }

    async fn settings(&self, clinic_id: &ClinicId) -> QueueResult<ClinicSettings> {
        let row: Option<(bool, bool, bool)> = sqlx::query_as(
            "SELECT doctor_resting, assistant_resting, booking_paused \
             FROM clinic_settings WHERE clinic_id = ?",
        )
        .bind(clinic_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let availability = |resting: bool| {
            if resting {
                RoomAvailability::Resting
            } else {
                RoomAvailability::Available
            }
        };

        Ok(row
            .map(|(doctor, assistant, booking_paused)| ClinicSettings {
                doctor: availability(doctor),
                assistant: availability(assistant),
                booking_paused,
            })
            .unwrap_or_default())
    }

    async fn save_settings(
        &self,
        clinic_id: &ClinicId,
        settings: ClinicSettings,
    ) -> QueueResult<()> {
        sqlx::query(
            "INSERT INTO clinic_settings \
                 (clinic_id, doctor_resting, assistant_resting, booking_paused, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (clinic_id) DO UPDATE SET \
                 doctor_resting = excluded.doctor_resting, \
                 assistant_resting = excluded.assistant_resting, \
                 booking_paused = excluded.booking_paused, \
                 updated_at = excluded.updated_at",
        )
        .bind(clinic_id.as_str())
        .bind(settings.is_resting(RoomKind::Exam))
        .bind(settings.is_resting(RoomKind::Assistant))
        .bind(settings.booking_paused)
        .bind(self.server_timestamp())
        .execute(&self.pool)
        .await?;

        info!(clinic = %clinic_id, ?settings, "Configurações da clínica salvas");
        self.notify(Collection::Settings, clinic_id.clone(), None);
        Ok(())
    }

    async fn calling(&self, clinic_id: &ClinicId, room: RoomKind) -> QueueResult<Option<Uuid>> {
        let pointer: Option<Option<String>> = sqlx::query_scalar(
            "SELECT appointment_id FROM room_calls WHERE clinic_id = ? AND room = ?",
        )
        .bind(clinic_id.as_str())
        .bind(room.as_str())
        .fetch_optional(&self.pool)
        .await?;

        pointer.flatten().as_deref().map(parse_id).transpose()
    }

    async fn set_calling(
        &self,
        clinic_id: &ClinicId,
        room: RoomKind,
        appointment_id: Option<Uuid>,
    ) -> QueueResult<()> {
        sqlx::query(
            "INSERT INTO room_calls (clinic_id, room, appointment_id, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (clinic_id, room) DO UPDATE SET \
                 appointment_id = excluded.appointment_id, \
                 updated_at = excluded.updated_at",
        )
        .bind(clinic_id.as_str())
        .bind(room.as_str())
        .bind(appointment_id.map(|id| id.to_string()))
        .bind(self.server_timestamp())
        .execute(&self.pool)
        .await?;

        self.notify(Collection::RoomCalls, clinic_id.clone(), appointment_id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ShiftStore for SqliteStore {
    async fn open_shift(
        &self,
        clinic_id: &ClinicId,
        moderator_id: &str,
    ) -> QueueResult<Option<ModeratorShift>> {
        let row: Option<ShiftRow> = sqlx::query_as(
            "SELECT id, clinic_id, moderator_id, started_at, ended_at FROM moderator_shifts \
             WHERE clinic_id = ? AND moderator_id = ? AND ended_at IS NULL \
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(clinic_id.as_str())
        .bind(moderator_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ShiftRow::decode).transpose()
    }

    async fn insert_shift(&self, shift: &ModeratorShift) -> QueueResult<()> {
        sqlx::query(
            "INSERT INTO moderator_shifts (id, clinic_id, moderator_id, started_at, ended_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(shift.id.to_string())
        .bind(shift.clinic_id.as_str())
        .bind(&shift.moderator_id)
        .bind(shift.started_at)
        .bind(shift.ended_at)
        .execute(&self.pool)
        .await?;

        self.notify(Collection::ModeratorShifts, shift.clinic_id.clone(), Some(shift.id));
        Ok(())
    }

    async fn close_shift(&self, id: Uuid, ended_at: i64) -> QueueResult<()> {
        let clinic_id: Option<String> = sqlx::query_scalar(
            "UPDATE moderator_shifts SET ended_at = ? WHERE id = ? RETURNING clinic_id",
        )
        .bind(ended_at)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        let clinic_id = clinic_id.ok_or(QueueError::NotFound(id))?;

        self.notify(Collection::ModeratorShifts, ClinicId::new(clinic_id), Some(id));
        Ok(())
    }

    async fn list_shifts(
        &self,
        clinic_id: &ClinicId,
        moderator_id: Option<&str>,
    ) -> QueueResult<Vec<ModeratorShift>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, clinic_id, moderator_id, started_at, ended_at \
             FROM moderator_shifts WHERE clinic_id = ",
        );
        builder.push_bind(clinic_id.as_str());
        if let Some(moderator_id) = moderator_id {
            builder.push(" AND moderator_id = ").push_bind(moderator_id);
        }
        builder.push(" ORDER BY started_at");

        let rows: Vec<ShiftRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(ShiftRow::decode).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_store;
    use super::*;
    use crate::models::{AppointmentStatus, PatientDetails};

    fn details(name: &str) -> PatientDetails {
        PatientDetails {
            patient_name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_list_scoped_by_clinic() -> QueueResult<()> {
        let (_dir, store) = temp_store().await;
        let north = ClinicId::from("north");
        let south = ClinicId::from("south");

        let a = store
            .create_appointment(&north, NewAppointment::booked(details("Ana")))
            .await?;
        store
            .create_appointment(&south, NewAppointment::booked(details("Bruno")))
            .await?;
        let c = store
            .create_appointment(&north, NewAppointment::walk_in(details("Carla"), 1_000))
            .await?;

        let listed = store.list_appointments(&north).await?;
        assert_eq!(listed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![a.id, c.id]);
        assert_eq!(listed[1].details.patient_name, "Carla");
        assert_eq!(listed[1].status, AppointmentStatus::CheckedIn);
        assert_eq!(listed[1].check_in_time, Some(1_000));
        Ok(())
    }

    #[tokio::test]
    async fn test_patch_writes_only_present_fields() -> QueueResult<()> {
        let (_dir, store) = temp_store().await;
        let clinic = ClinicId::from("c1");
        let created = store
            .create_appointment(
                &clinic,
                NewAppointment::walk_in(details("Ana"), 500).with_payment(Some(15_000)),
            )
            .await?;

        store
            .update_appointment(created.id, AppointmentPatch::queue_order(3))
            .await?;

        let loaded = store.appointment(created.id).await?.unwrap();
        assert_eq!(loaded.queue_order, Some(3));
        assert_eq!(loaded.status, AppointmentStatus::CheckedIn);
        assert_eq!(loaded.check_in_time, Some(500));
        assert_eq!(loaded.payment_cents, Some(15_000));
        assert_eq!(loaded.details.patient_name, "Ana");
        assert!(loaded.updated_at > created.updated_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_unknown_id() -> QueueResult<()> {
        let (_dir, store) = temp_store().await;
        let missing = Uuid::new_v4();
        let result = store
            .update_appointment(missing, AppointmentPatch::status(AppointmentStatus::Completed))
            .await;
        assert!(matches!(result, Err(QueueError::NotFound(id)) if id == missing));
        Ok(())
    }

    #[tokio::test]
    async fn test_writes_are_broadcast() -> QueueResult<()> {
        let (_dir, store) = temp_store().await;
        let clinic = ClinicId::from("c1");
        let mut events = store.subscribe();

        let created = store
            .create_appointment(&clinic, NewAppointment::booked(details("Ana")))
            .await?;
        store.delete_appointment(created.id).await?;

        for _ in 0..2 {
            let event = events.recv().await.unwrap();
            assert_eq!(event.collection, Collection::Appointments);
            assert_eq!(event.clinic_id, clinic);
            assert_eq!(event.id, Some(created.id));
        }
        assert!(store.appointment(created.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_settings_default_and_upsert() -> QueueResult<()> {
        let (_dir, store) = temp_store().await;
        let clinic = ClinicId::from("c1");

        assert_eq!(store.settings(&clinic).await?, ClinicSettings::default());

        let resting = ClinicSettings {
            doctor: RoomAvailability::Resting,
            booking_paused: true,
            ..Default::default()
        };
        store.save_settings(&clinic, resting).await?;
        assert_eq!(store.settings(&clinic).await?, resting);

        store.save_settings(&clinic, ClinicSettings::default()).await?;
        assert_eq!(store.settings(&clinic).await?, ClinicSettings::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_calling_pointer_per_room() -> QueueResult<()> {
        let (_dir, store) = temp_store().await;
        let clinic = ClinicId::from("c1");
        let id = Uuid::new_v4();

        assert_eq!(store.calling(&clinic, RoomKind::Exam).await?, None);
        store.set_calling(&clinic, RoomKind::Exam, Some(id)).await?;
        assert_eq!(store.calling(&clinic, RoomKind::Exam).await?, Some(id));
        assert_eq!(store.calling(&clinic, RoomKind::Assistant).await?, None);

        store.set_calling(&clinic, RoomKind::Exam, None).await?;
        assert_eq!(store.calling(&clinic, RoomKind::Exam).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_server_timestamp_is_monotonic() {
        let (_dir, store) = temp_store().await;
        // Relógio "atrasado": o último carimbo fica muito à frente do agora
        store.last_stamp.store(i64::MAX / 2, Ordering::SeqCst);

        let first = store.server_timestamp();
        let second = store.server_timestamp();
        assert_eq!(first, i64::MAX / 2 + 1);
        assert_eq!(second, first + 1);
    }
}
