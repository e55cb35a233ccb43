//! Who may do what in a team.
//!
//! A single decision table maps a caller's standing in the team and the
//! requested action to a [`Requirement`]; setting-gated cells are resolved
//! against the team's settings snapshot. Evaluation is pure and never fails:
//! anything not explicitly allowed is denied.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::TeamRole;
use crate::services::settings::{TeamSettingsSnapshot, keys};

/// Role of a user across the whole system, as asserted by the caller's
/// authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    #[default]
    User,
    Admin,
    Master,
}

impl SystemRole {
    pub fn bypasses_team_policy(&self) -> bool {
        matches!(self, SystemRole::Admin | SystemRole::Master)
    }
}

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub system_role: SystemRole,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            system_role: SystemRole::User,
        }
    }

    pub fn system_admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            system_role: SystemRole::Admin,
        }
    }

    pub fn is_system_admin(&self) -> bool {
        self.system_role.bypasses_team_policy()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    CreateInvite,
    ApproveRequest,
    RejectRequest,
    RemovePlayer,
    AssignModerator,
    ManageSettings,
    CreateJoinRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Always,
    Never,
    Setting(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decision table cell for a team role (`None` for non-members).
pub fn requirement(role: Option<TeamRole>, action: PolicyAction) -> Requirement {
    use PolicyAction::*;

    match (role, action) {
        (_, CreateJoinRequest) => Requirement::Always,
        (Some(TeamRole::Admin), _) => Requirement::Always,
        (Some(TeamRole::Moderator), CreateInvite) => {
            Requirement::Setting(keys::MODERATORS_MAY_INVITE)
        }
        (Some(TeamRole::Moderator), ApproveRequest) => {
            Requirement::Setting(keys::MODERATORS_MAY_APPROVE_REQUESTS)
        }
        (Some(TeamRole::Moderator), RejectRequest) => {
            Requirement::Setting(keys::MODERATORS_MAY_REJECT_REQUESTS)
        }
        (Some(TeamRole::Moderator), RemovePlayer) => {
            Requirement::Setting(keys::MODERATORS_MAY_REMOVE_PLAYERS)
        }
        (Some(TeamRole::User), CreateInvite) => Requirement::Setting(keys::PLAYERS_MAY_INVITE),
        _ => Requirement::Never,
    }
}

/// `team_role` must be the caller's role in an *active* membership.
pub fn evaluate(
    caller: &Caller,
    team_role: Option<TeamRole>,
    action: PolicyAction,
    settings: &TeamSettingsSnapshot,
) -> Decision {
    if caller.is_system_admin() {
        return Decision::Allow;
    }

    let allowed = match requirement(team_role, action) {
        Requirement::Always => true,
        Requirement::Never => false,
        Requirement::Setting(key) => settings.get_bool(key),
    };

    if allowed {
        Decision::Allow
    } else {
        log::debug!(
            "Denied {:?} for user {} with team role {:?}",
            action,
            caller.user_id,
            team_role
        );
        Decision::Deny
    }
}
