//! Configuration of the migration orchestrator.

use crate::migration::{LogReporter, ProgressReporter};
use crate::version::Version;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Settings shared by every operation of a [`crate::Svip`] instance.
///
/// # Examples
///
/// ```rust
/// use svip::svip_config::SvipConfig;
///
/// let config: SvipConfig<u32> = SvipConfig::new();
/// assert_eq!(config.initial_version(), &0);
/// ```
#[derive(Clone)]
pub struct SvipConfig<V: Version> {
    initial_version: V,
    reporter: Arc<dyn ProgressReporter<V>>,
}

impl<V: Version> SvipConfig<V> {
    /// Creates a configuration with `V::default()` as initial version and progress
    /// routed to the `log` facade.
    pub fn new() -> Self {
        SvipConfig {
            initial_version: V::default(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Version assumed for a store whose backend holds no version marker yet.
    pub fn initial_version(&self) -> &V {
        &self.initial_version
    }

    pub fn set_initial_version(&mut self, version: V) {
        self.initial_version = version;
    }

    /// Reporter used by verbose migrations unless one is passed explicitly.
    pub fn reporter(&self) -> Arc<dyn ProgressReporter<V>> {
        self.reporter.clone()
    }

    pub fn set_reporter(&mut self, reporter: Arc<dyn ProgressReporter<V>>) {
        self.reporter = reporter;
    }
}

impl<V: Version> Default for SvipConfig<V> {
    fn default() -> Self {
        SvipConfig::new()
    }
}

impl<V: Version> Debug for SvipConfig<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvipConfig")
            .field("initial_version", &self.initial_version)
            .finish_non_exhaustive()
    }
}
