//! Configuration injected into the cache-control facade.

/// Engine settings the cache-control core must honor.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Whether the engine keeps per-cube member caches.
    ///
    /// Structural member edits through this subsystem only maintain the
    /// shared member-navigation cache; while per-cube member caches are
    /// enabled the two would diverge, so [`execute`] rejects every edit
    /// command.
    ///
    /// [`execute`]: crate::CacheControl::execute
    pub cube_member_cache_enabled: bool,
}
