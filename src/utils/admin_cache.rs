use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::model::admin::{Admin, AdminRow, SELECT_ADMIN};

/// Admin records keyed by id, read by the auth middleware on every request.
/// Entries are dropped on every admin write so deactivation takes effect at once.
pub static ADMIN_CACHE: Lazy<Cache<u64, Admin>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(60))
        .build()
});

pub async fn get(admin_id: u64) -> Option<Admin> {
    ADMIN_CACHE.get(&admin_id).await
}

pub async fn put(admin: Admin) {
    ADMIN_CACHE.insert(admin.id, admin).await;
}

pub async fn invalidate(admin_id: u64) {
    ADMIN_CACHE.invalidate(&admin_id).await;
}

/// Cache first, then the admins table. Found records are cached.
pub async fn load_admin(pool: &MySqlPool, admin_id: u64) -> Result<Option<Admin>, sqlx::Error> {
    if let Some(admin) = get(admin_id).await {
        return Ok(Some(admin));
    }

    let row = sqlx::query_as::<_, AdminRow>(&format!("{SELECT_ADMIN} WHERE id = ?"))
        .bind(admin_id)
        .fetch_optional(pool)
        .await?;

    let Some(admin) = row.map(AdminRow::into_admin) else {
        return Ok(None);
    };
    put(admin.clone()).await;
    Ok(Some(admin))
}
