use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// Append an admin action to the audit trail. Target ids are weak
/// references: the row has no foreign keys and outlives its targets.
pub async fn log_admin_action(
    pool: &DbPool,
    admin_id: Uuid,
    action_type: &str,
    target_user_id: Option<Uuid>,
    target_store_id: Option<Uuid>,
    description: Option<&str>,
) -> AppResult<()> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO admin_actions (id, admin_id, action_type, target_user_id, target_store_id, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(admin_id)
    .bind(action_type)
    .bind(target_user_id)
    .bind(target_store_id)
    .bind(description)
    .execute(pool)
    .await?;

    Ok(())
}
