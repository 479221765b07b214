//! Permissões por área e sessão do usuário
//!
//! O mapa de permissões segue o formato aninhado
//! `{ area: { access: bool, actions: { action: bool } } }` com chaves fechadas.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{QueueError, QueueResult};
use crate::models::ClinicId;

/// Papel com acesso irrestrito
pub const ADMIN_ROLE: &str = "admin";

/// Áreas do painel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Appointments,
    Queue,
    Rooms,
    Accounting,
    Analytics,
    Moderators,
    Settings,
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Area::Appointments => "appointments",
            Area::Queue => "queue",
            Area::Rooms => "rooms",
            Area::Accounting => "accounting",
            Area::Analytics => "analytics",
            Area::Moderators => "moderators",
            Area::Settings => "settings",
        };
        f.write_str(name)
    }
}

/// Ações controladas dentro de cada área
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Book,
    CheckIn,
    Reorder,
    Route,
    Complete,
    Cancel,
    Call,
    Manage,
    TrackShift,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::View => "view",
            Action::Book => "book",
            Action::CheckIn => "check_in",
            Action::Reorder => "reorder",
            Action::Route => "route",
            Action::Complete => "complete",
            Action::Cancel => "cancel",
            Action::Call => "call",
            Action::Manage => "manage",
            Action::TrackShift => "track_shift",
        };
        f.write_str(name)
    }
}

/// Permissões de uma área
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaPermission {
    pub access: bool,
    #[serde(default)]
    pub actions: HashMap<Action, bool>,
}

/// Mapa de permissões do usuário
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(HashMap<Area, AreaPermission>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concede acesso à área e às ações informadas
    pub fn grant(mut self, area: Area, actions: &[Action]) -> Self {
        let entry = self.0.entry(area).or_default();
        entry.access = true;
        for action in actions {
            entry.actions.insert(*action, true);
        }
        self
    }

    /// `View` depende só do acesso à área; demais ações precisam estar marcadas
    pub fn allows(&self, area: Area, action: Action) -> bool {
        match self.0.get(&area) {
            Some(permission) if permission.access => {
                action == Action::View
                    || permission.actions.get(&action).copied().unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// Sessão autenticada
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub clinic_id: ClinicId,
    pub role: String,
    #[serde(default)]
    pub permissions: Permissions,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    pub fn can(&self, area: Area, action: Action) -> bool {
        self.is_admin() || self.permissions.allows(area, action)
    }

    pub fn require(&self, area: Area, action: Action) -> QueueResult<()> {
        if self.can(area, action) {
            Ok(())
        } else {
            Err(QueueError::PermissionDenied { area, action })
        }
    }
}

/// Provedor de identidade: transforma uma credencial em sessão
pub trait IdentityProvider: Send + Sync {
    type Error;

    fn session(&self, credential: &str) -> Result<Session, Self::Error>;
}
