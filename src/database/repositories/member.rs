use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::database::{
    models::{MemberStatus, TeamMember, TeamMemberProfile},
    types::TeamMemberProfileRow,
    utils::sql,
};

pub async fn add_team_member(
    tx: &mut Transaction<'_, Postgres>,
    member: &TeamMember,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            INSERT INTO
                team_members (
                    id,
                    team_id,
                    user_id,
                    role,
                    status,
                    joined_at,
                    updated_at
                )
            VALUES
                (?, ?, ?, ?, ?, ?, ?)
        "#))
    .bind(member.id)
    .bind(member.team_id)
    .bind(member.user_id)
    .bind(member.role)
    .bind(member.status)
    .bind(member.joined_at)
    .bind(member.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn update_team_member(
    tx: &mut Transaction<'_, Postgres>,
    member: &TeamMember,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            UPDATE
                team_members
            SET
                role = ?,
                status = ?,
                joined_at = ?,
                updated_at = ?
            WHERE
                id = ?
        "#))
    .bind(member.role)
    .bind(member.status)
    .bind(member.joined_at)
    .bind(member.updated_at)
    .bind(member.id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn get_team_member(
    tx: &mut Transaction<'_, Postgres>,
    team_id: Uuid,
    user_id: Uuid,
) -> Result<Option<TeamMember>, sqlx::Error> {
    let member = sqlx::query_as::<_, TeamMember>(&sql(r#"
            SELECT
                id,
                team_id,
                user_id,
                role,
                status,
                joined_at,
                updated_at
            FROM
                team_members
            WHERE
                team_id = ?
                AND user_id = ?
        "#))
    .bind(team_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(member)
}

pub async fn get_team_members(
    tx: &mut Transaction<'_, Postgres>,
    team_id: Uuid,
) -> Result<Vec<TeamMember>, sqlx::Error> {
    let members = sqlx::query_as::<_, TeamMember>(&sql(r#"
            SELECT
                id,
                team_id,
                user_id,
                role,
                status,
                joined_at,
                updated_at
            FROM
                team_members
            WHERE
                team_id = ?
            ORDER BY
                joined_at
        "#))
    .bind(team_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(members)
}

pub async fn count_active_members(
    tx: &mut Transaction<'_, Postgres>,
    team_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(&sql(r#"
            SELECT
                COUNT(*)
            FROM
                team_members
            WHERE
                team_id = ?
                AND status = ?
        "#))
    .bind(team_id)
    .bind(MemberStatus::Active)
    .fetch_one(&mut **tx)
    .await?;

    Ok(count)
}

pub async fn get_member_profile(
    tx: &mut Transaction<'_, Postgres>,
    member_id: Uuid,
) -> Result<Option<TeamMemberProfile>, sqlx::Error> {
    let row = sqlx::query_as::<_, TeamMemberProfileRow>(&sql(r#"
            SELECT
                member_id,
                is_fee_exempt,
                is_on_hiatus,
                hiatus_started_at,
                hiatus_ends_at,
                hiatus_count,
                last_hiatus_started_at,
                position_1,
                position_2,
                position_3,
                updated_at
            FROM
                team_member_profiles
            WHERE
                member_id = ?
        "#))
    .bind(member_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(TeamMemberProfile::from))
}

pub async fn upsert_member_profile(
    tx: &mut Transaction<'_, Postgres>,
    profile: &TeamMemberProfile,
) -> Result<(), sqlx::Error> {
    let row = TeamMemberProfileRow::from(profile);

    sqlx::query(&sql(r#"
            INSERT INTO
                team_member_profiles (
                    member_id,
                    is_fee_exempt,
                    is_on_hiatus,
                    hiatus_started_at,
                    hiatus_ends_at,
                    hiatus_count,
                    last_hiatus_started_at,
                    position_1,
                    position_2,
                    position_3,
                    updated_at
                )
            VALUES
                (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (member_id) DO UPDATE SET
                is_fee_exempt = EXCLUDED.is_fee_exempt,
                is_on_hiatus = EXCLUDED.is_on_hiatus,
                hiatus_started_at = EXCLUDED.hiatus_started_at,
                hiatus_ends_at = EXCLUDED.hiatus_ends_at,
                hiatus_count = EXCLUDED.hiatus_count,
                last_hiatus_started_at = EXCLUDED.last_hiatus_started_at,
                position_1 = EXCLUDED.position_1,
                position_2 = EXCLUDED.position_2,
                position_3 = EXCLUDED.position_3,
                updated_at = EXCLUDED.updated_at
        "#))
    .bind(row.member_id)
    .bind(row.is_fee_exempt)
    .bind(row.is_on_hiatus)
    .bind(row.hiatus_started_at)
    .bind(row.hiatus_ends_at)
    .bind(row.hiatus_count)
    .bind(row.last_hiatus_started_at)
    .bind(row.position_1)
    .bind(row.position_2)
    .bind(row.position_3)
    .bind(row.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
