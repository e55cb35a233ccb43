use uuid::Uuid;

use crate::database::store::StoreTx;
use crate::error::AppError;
use crate::services::settings::{TeamSettingsSnapshot, keys};

/// `max_players` of zero or less means the team is unbounded.
pub fn has_room(active_count: i64, max_players: i64) -> bool {
    max_players <= 0 || active_count < max_players
}

/// Whether the team can take one more active member right now.
///
/// Must run inside the admitting transaction, after the team lock, so the
/// count cannot change before the member row is written.
pub async fn can_admit_one_more(
    tx: &mut dyn StoreTx,
    team_id: Uuid,
    settings: &TeamSettingsSnapshot,
) -> Result<bool, AppError> {
    let max_players = settings.get_int(keys::MAX_PLAYERS);
    if max_players <= 0 {
        return Ok(true);
    }

    let active_count = tx.count_active_members(team_id).await?;
    let admit = has_room(active_count, max_players);
    if !admit {
        log::info!(
            "Team {} is full ({} of {} active members)",
            team_id,
            active_count,
            max_players
        );
    }

    Ok(admit)
}
