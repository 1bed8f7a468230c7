//! Expired-Entry Sweep Task
//!
//! Periodically asks the active driver to delete entries whose TTL has
//! passed. Opt-in through `SWEEP_INTERVAL`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;

/// Spawns the sweep loop. Abort the returned handle to stop it.
///
/// Each tick calls [`CacheManager::purge_expired`]; drivers with native
/// expiry report zero. A configuration error is logged and the loop keeps
/// running so a later `set_config` can recover.
pub fn spawn_sweep_task(cache: Arc<CacheManager>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Starting expired-entry sweep task");

        loop {
            tokio::time::sleep(interval).await;

            match cache.purge_expired().await {
                Ok(0) => debug!("Sweep: no expired entries found"),
                Ok(removed) => info!(removed, "Sweep: removed expired entries"),
                Err(e) => warn!(error = %e, "Sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serial_test::serial;

    fn manager() -> Arc<CacheManager> {
        CacheManager::enable();
        Arc::new(CacheManager::new(CacheConfig::default()))
    }

    async fn stored_entries(cache: &CacheManager) -> usize {
        cache.info().await.unwrap().entries.unwrap_or_default()
    }

    #[tokio::test]
    #[serial]
    async fn test_sweep_removes_expired_entries() {
        let cache = manager();
        cache
            .write("expire_soon", "value", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(stored_entries(&cache).await, 1);

        let handle = spawn_sweep_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(stored_entries(&cache).await, 0);
        handle.abort();
    }

    #[tokio::test]
    #[serial]
    async fn test_sweep_preserves_live_entries() {
        let cache = manager();
        cache
            .write("long_lived", "value", Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        let handle = spawn_sweep_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(
            cache.read::<String>("long_lived").await.unwrap().as_deref(),
            Some("value")
        );
        handle.abort();
    }

    #[tokio::test]
    #[serial]
    async fn test_sweep_survives_config_errors() {
        CacheManager::enable();
        let cache = Arc::new(CacheManager::new(CacheConfig {
            handler: "missing".into(),
            ..CacheConfig::default()
        }));

        let handle = spawn_sweep_task(cache, 1);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!handle.is_finished());

        handle.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
    }
}
