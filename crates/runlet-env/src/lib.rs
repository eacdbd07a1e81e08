//! Discovery of Conda-style environment managers and construction of the
//! restricted environment child processes run under.
//!
//! Discovery never fails: a host without the manager yields an empty
//! [`CondaLayout`], and only plans that actually need the manager turn
//! that absence into an error.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod layout;
pub mod restricted;
pub mod search;

pub use layout::CondaLayout;
pub use restricted::{
    build_restricted_env, parent_env_snapshot, ResolvedEnv, ENV_WHITELIST, POSIX_ENV_WHITELIST,
};
pub use search::{find_manager_exe, manager_names, which};

use runlet_core::Platform;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Environment variable naming an explicit manager executable.
pub const MANAGER_EXE_ENV: &str = "CONDA_EXE";

/// Knobs that steer discovery away from its defaults.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOverrides {
    /// Use this executable instead of probing `PATH`.
    pub explicit_exe: Option<PathBuf>,
}

impl DiscoveryOverrides {
    /// Pick up overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let explicit_exe = std::env::var(MANAGER_EXE_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self { explicit_exe }
    }
}

/// Lazily discovers and caches the manager layout.
///
/// Discovery touches the filesystem and `PATH`, so the result is cached
/// after the first call; [`CondaResolver::refresh`] re-probes on demand.
pub struct CondaResolver {
    platform: Platform,
    overrides: DiscoveryOverrides,
    cache: RwLock<Option<Arc<CondaLayout>>>,
}

impl CondaResolver {
    /// Resolver for `platform` with overrides taken from the environment.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self::with_overrides(platform, DiscoveryOverrides::from_env())
    }

    /// Resolver with explicit overrides, bypassing the environment.
    #[must_use]
    pub fn with_overrides(platform: Platform, overrides: DiscoveryOverrides) -> Self {
        Self {
            platform,
            overrides,
            cache: RwLock::new(None),
        }
    }

    /// The platform this resolver probes for.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The cached layout, discovering it on first use.
    pub fn resolve(&self) -> Arc<CondaLayout> {
        if let Some(layout) = self.cache.read().expect("layout cache poisoned").as_ref() {
            return Arc::clone(layout);
        }
        self.refresh()
    }

    /// Drop the cache and probe again.
    pub fn refresh(&self) -> Arc<CondaLayout> {
        let layout = Arc::new(self.discover());
        *self.cache.write().expect("layout cache poisoned") = Some(Arc::clone(&layout));
        layout
    }

    /// Restricted environment for a child, built from the cached layout
    /// and the current process environment.
    #[must_use]
    pub fn restricted_env(&self) -> ResolvedEnv {
        let layout = self.resolve();
        build_restricted_env(&layout, self.platform, &parent_env_snapshot())
    }

    fn discover(&self) -> CondaLayout {
        match find_manager_exe(self.platform, self.overrides.explicit_exe.as_deref()) {
            Some(exe) => {
                let layout = CondaLayout::infer_from_exe(&exe, self.platform);
                debug!(
                    exe = %exe.display(),
                    root = ?layout.root,
                    "environment manager discovered"
                );
                layout
            }
            None => {
                debug!("no environment manager found");
                CondaLayout::empty()
            }
        }
    }
}

impl std::fmt::Debug for CondaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CondaResolver")
            .field("platform", &self.platform)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
