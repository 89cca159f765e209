use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;

/// Expected capacity and false-positive rate.
const FILTER_CAPACITY: usize = 10_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Admin usernames and emails already in use. A miss means "definitely free";
/// a hit still needs the database to confirm.
static IDENTITY_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

#[inline]
fn normalize(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Check if a username or email might be taken (false positives possible).
/// A poisoned lock answers "maybe" so callers fall through to the database.
pub fn might_exist(identity: &str) -> bool {
    let identity = normalize(identity);
    IDENTITY_FILTER
        .read()
        .map(|filter| filter.contains(&identity))
        .unwrap_or(true)
}

pub fn insert(identity: &str) {
    let identity = normalize(identity);
    if let Ok(mut filter) = IDENTITY_FILTER.write() {
        filter.add(&identity);
    }
}

pub fn remove(identity: &str) {
    let identity = normalize(identity);
    if let Ok(mut filter) = IDENTITY_FILTER.write() {
        filter.remove(&identity);
    }
}

/// Warm up the filter from the admins table using streaming + batching
pub async fn warmup_identity_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream =
        sqlx::query_as::<_, (String, String)>("SELECT username, email FROM admins").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size * 2);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (username, email) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(normalize(&username));
        batch.push(normalize(&email));
        total += 1;

        if batch.len() >= batch_size * 2 {
            insert_batch(&batch)?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch)?;
    }

    tracing::info!(admins = total, "Identity filter warmup complete");
    Ok(())
}

fn insert_batch(identities: &[String]) -> Result<()> {
    let mut filter = IDENTITY_FILTER
        .write()
        .map_err(|_| anyhow!("identity filter poisoned"))?;

    for identity in identities {
        filter.add(identity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_identity_is_reported_case_insensitively() {
        insert("Registrar@College.EDU");
        assert!(might_exist("registrar@college.edu"));
        assert!(might_exist("  REGISTRAR@college.edu "));
    }

    #[test]
    fn removed_identity_is_no_longer_reported() {
        insert("temp-clerk");
        remove("temp-clerk");
        assert!(!might_exist("temp-clerk"));
    }
}
