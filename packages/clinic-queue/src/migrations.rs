//! Sistema de migrações para banco de dados
//!
//! Este módulo gerencia as migrações do banco de dados SQLite

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_queue_schema.sql
    r#"
    -- Agendamentos; dados do paciente ficam criptografados em details_*
    CREATE TABLE IF NOT EXISTS appointments (
        id TEXT PRIMARY KEY NOT NULL,
        clinic_id TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('booked', 'checked-in', 'in-exam', 'in-assistant', 'completed', 'cancelled')),
        queue_order INTEGER,
        check_in_time INTEGER,
        is_sheeted BOOLEAN NOT NULL DEFAULT 0,
        source TEXT NOT NULL CHECK (source IN ('scheduled', 'walk_in')),
        payment_cents INTEGER,
        details_ciphertext BLOB NOT NULL,
        details_nonce BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    -- Disponibilidade das salas e pausa de agendamentos
    CREATE TABLE IF NOT EXISTS clinic_settings (
        clinic_id TEXT PRIMARY KEY NOT NULL,
        doctor_resting BOOLEAN NOT NULL DEFAULT 0,
        assistant_resting BOOLEAN NOT NULL DEFAULT 0,
        booking_paused BOOLEAN NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    );

    -- Ponteiro "chamando agora" por sala
    CREATE TABLE IF NOT EXISTS room_calls (
        clinic_id TEXT NOT NULL,
        room TEXT NOT NULL CHECK (room IN ('exam', 'assistant')),
        appointment_id TEXT,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (clinic_id, room)
    );

    -- Índices para otimização
    CREATE INDEX IF NOT EXISTS idx_appointments_clinic_id ON appointments (clinic_id);
    CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments (clinic_id, status);
    "#,
    // 002_moderator_shifts.sql
    r#"
    -- Turnos dos moderadores de redes sociais
    CREATE TABLE IF NOT EXISTS moderator_shifts (
        id TEXT PRIMARY KEY NOT NULL,
        clinic_id TEXT NOT NULL,
        moderator_id TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        ended_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_moderator_shifts_moderator ON moderator_shifts (clinic_id, moderator_id);
    "#,
];

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    let version: i64 = match sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            // Pode ser a primeira execução
            error!("Erro ao obter versão do banco: {}", e);
            0
        }
    };

    info!("Versão atual do banco: {}", version);

    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        if migration_version <= version {
            info!("Migração {} já aplicada", migration_version);
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        let mut transaction = pool.begin().await.with_context(|| {
            format!("Falha ao iniciar transação para migração {}", migration_version)
        })?;

        sqlx::query(migration_sql)
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Falha ao executar migração {}", migration_version))?;

        sqlx::query(&format!("PRAGMA user_version = {}", migration_version))
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Falha ao atualizar versão para {}", migration_version))?;

        transaction.commit().await.with_context(|| {
            format!("Falha ao confirmar transação para migração {}", migration_version)
        })?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}
