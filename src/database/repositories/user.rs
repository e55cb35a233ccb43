use sqlx::PgPool;
use uuid::Uuid;

use crate::database::utils::sql;

pub async fn user_exists(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let exists: bool = sqlx::query_scalar(&sql(r#"
            SELECT
                EXISTS (
                    SELECT
                        1
                    FROM
                        users
                    WHERE
                        id = ?
                )
        "#))
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

pub async fn get_user_name(pool: &PgPool, user_id: Uuid) -> Result<Option<String>, sqlx::Error> {
    let name: Option<String> = sqlx::query_scalar(&sql(r#"
            SELECT
                name
            FROM
                users
            WHERE
                id = ?
        "#))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(name)
}
