//! Daily 03:00 sweep: drop active-thread registry entries past their TTL.

use covenant_core::Config;
use covenant_store::Store;
use covenant_threads::gc_expired;
use tracing::info;

use crate::error::Result;

pub fn run_thread_gc(store: &dyn Store, config: &Config) -> Result<()> {
    let removed = gc_expired(store, config.thread_ttl_days)?;
    if removed > 0 {
        info!(removed, "active thread registry entries expired");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use covenant_store::FileTreeStore;
    use covenant_threads::set_active_thread;

    use super::*;

    #[test]
    fn sweeps_expired_entries_using_the_configured_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path().to_path_buf(), 3, 0.01);
        set_active_thread(&store, "headcount", "root_1").unwrap();

        let config = Config::default();
        run_thread_gc(&store, &config).unwrap();

        assert!(covenant_threads::get_active_thread(&store, "headcount", config.thread_ttl_days)
            .unwrap()
            .is_some());
    }
}
