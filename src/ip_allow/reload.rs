//! Publishing and hot-reloading ACL tables.
//!
//! The controller owns the single published [`AclTable`]. Lookups load it
//! through an [`ArcSwap`] without locking. A reload builds a complete new
//! table off to the side and swaps it in with one atomic store, so a reader
//! only ever sees a finished table. The previous table is retired: the
//! controller keeps its reference for a grace delay, and readers that still
//! hold a handle keep it alive for as long as they need it.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, Guard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use super::error::{IpAllowError, IpAllowResult};
use super::method::MethodRegistry;
use super::table::{AclTable, BuildReport, DEFAULT_MODULE_NAME};

/// Default time a retired table is held before the controller lets go of it.
pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_secs(60);

/// Where the rules text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A rules file, read in full on every build.
    File(PathBuf),
    /// Rules held in memory.
    Text {
        /// Name used in diagnostics.
        name: String,
        /// Rules text.
        text: String,
    },
}

impl ConfigSource {
    /// Rules read from `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Rules given as text.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Text { name, .. } => name.clone(),
        }
    }

    /// Read the whole rules text.
    ///
    /// # Errors
    ///
    /// Returns [`IpAllowError::ReadFailed`] if the file cannot be read.
    pub fn read(&self) -> IpAllowResult<String> {
        match self {
            Self::File(path) => {
                std::fs::read_to_string(path).map_err(|source| IpAllowError::ReadFailed {
                    path: path.clone(),
                    source,
                })
            },
            Self::Text { text, .. } => Ok(text.clone()),
        }
    }
}

/// Settings for an [`IpAllowController`].
#[derive(Clone)]
pub struct ControllerOptions {
    /// Method registry; the process-wide one when `None`.
    pub registry: Option<Arc<MethodRegistry>>,
    /// Receiver of build diagnostics.
    pub sink: Arc<dyn DiagnosticSink>,
    /// Module name used in diagnostics.
    pub module_name: String,
    /// How long a replaced table is held before the controller drops it.
    pub grace_delay: Duration,
}

impl std::fmt::Debug for ControllerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerOptions")
            .field("registry", &self.registry)
            .field("module_name", &self.module_name)
            .field("grace_delay", &self.grace_delay)
            .finish_non_exhaustive()
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            registry: None,
            sink: Arc::new(TracingSink),
            module_name: DEFAULT_MODULE_NAME.to_string(),
            grace_delay: DEFAULT_GRACE_DELAY,
        }
    }
}

impl ControllerOptions {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `registry` instead of the process-wide registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<MethodRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Send diagnostics to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Set the module name.
    #[must_use]
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Set the grace delay.
    #[must_use]
    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }
}

/// Whether a replacement table is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// One published table serves lookups.
    Active,
    /// A replacement is being built; lookups still use the published table.
    Swapping,
}

/// Result of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Generation of the newly published table.
    pub generation: u64,
    /// Address ranges in the new table.
    pub entries: usize,
    /// Counters from building the new table.
    pub report: BuildReport,
}

/// Owns the published ACL table and replaces it on reload.
pub struct IpAllowController {
    current: ArcSwap<AclTable>,
    source: ConfigSource,
    registry: Arc<MethodRegistry>,
    sink: Arc<dyn DiagnosticSink>,
    module_name: String,
    grace_delay: Duration,
    generation: AtomicU64,
    in_flight: AtomicUsize,
    retired: Arc<AtomicU64>,
}

impl std::fmt::Debug for IpAllowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpAllowController")
            .field("source", &self.source)
            .field("module_name", &self.module_name)
            .field("grace_delay", &self.grace_delay)
            .field("generation", &self.generation())
            .field("entries", &self.load().len())
            .finish_non_exhaustive()
    }
}

impl IpAllowController {
    /// Build the first table and publish it.
    ///
    /// The process must not serve traffic if this fails.
    ///
    /// # Errors
    ///
    /// Returns [`IpAllowError::NotInitialized`] if no registry was given and
    /// none is installed, or [`IpAllowError::ReadFailed`] if the rules
    /// cannot be read.
    pub fn initialize(source: ConfigSource, options: ControllerOptions) -> IpAllowResult<Self> {
        let registry = match options.registry {
            Some(registry) => registry,
            None => MethodRegistry::global()?,
        };

        let controller = Self {
            current: ArcSwap::from_pointee(AclTable::empty(Arc::clone(&registry))),
            source,
            registry,
            sink: options.sink,
            module_name: options.module_name,
            grace_delay: options.grace_delay,
            generation: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            retired: Arc::new(AtomicU64::new(0)),
        };

        let table = controller.build()?;
        let entries = table.len();
        controller.current.store(Arc::new(table));
        controller.generation.store(1, Ordering::Release);

        info!(
            source = %controller.source.name(),
            entries,
            "{} table loaded",
            controller.module_name
        );
        Ok(controller)
    }

    /// The published table.
    ///
    /// The handle stays valid after later reloads; drop it when the lookup
    /// is done so the old table can be freed.
    #[must_use]
    pub fn current(&self) -> Arc<AclTable> {
        self.current.load_full()
    }

    /// Short-lived access to the published table for a single lookup.
    #[must_use]
    pub fn load(&self) -> Guard<Arc<AclTable>> {
        self.current.load()
    }

    /// Check `addr` and the method named `method` against the published table.
    #[must_use]
    pub fn is_allowed(&self, addr: IpAddr, method: &str) -> bool {
        self.load().is_allowed_method(addr, method)
    }

    /// Dump of the published table.
    #[must_use]
    pub fn describe(&self) -> String {
        self.load().describe()
    }

    /// Rebuild from the source and publish the result.
    ///
    /// On failure the published table stays in place and the problem is
    /// reported to the diagnostic sink.
    ///
    /// # Errors
    ///
    /// Returns the build error; it is never fatal.
    pub fn reload(&self) -> IpAllowResult<ReloadOutcome> {
        debug!(source = %self.source.name(), "{} updated, reloading", self.module_name);

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let built = self.build();
        let result = built.map(|table| self.publish(table));
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        if let Err(err) = &result {
            warn!(
                source = %self.source.name(),
                error = %err,
                "{} reload failed, keeping current table",
                self.module_name
            );
            self.sink.report(Diagnostic::error(
                None,
                format!(
                    "{} failed to reload {}: {err}. Keeping the current table",
                    self.module_name,
                    self.source.name()
                ),
            ));
        }
        result
    }

    /// Run [`reload`](Self::reload) on the blocking thread pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_reload(self: &Arc<Self>) -> JoinHandle<IpAllowResult<ReloadOutcome>> {
        let controller = Arc::clone(self);
        tokio::task::spawn_blocking(move || controller.reload())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        if self.in_flight.load(Ordering::Acquire) > 0 {
            ControllerState::Swapping
        } else {
            ControllerState::Active
        }
    }

    /// Number of tables published so far, including the first one.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of replaced tables the controller has let go of.
    #[must_use]
    pub fn retired_tables(&self) -> u64 {
        self.retired.load(Ordering::Acquire)
    }

    /// Where rules are read from.
    #[must_use]
    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Registry used for every table of this controller.
    #[must_use]
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Grace delay applied to replaced tables.
    #[must_use]
    pub fn grace_delay(&self) -> Duration {
        self.grace_delay
    }

    fn build(&self) -> IpAllowResult<AclTable> {
        let text = self.source.read()?;
        Ok(AclTable::builder(Arc::clone(&self.registry))
            .module_name(self.module_name.clone())
            .source(self.source.name())
            .sink(Arc::clone(&self.sink))
            .build(&text))
    }

    fn publish(&self, table: AclTable) -> ReloadOutcome {
        let entries = table.len();
        let report = table.report();
        let old = self.current.swap(Arc::new(table));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        info!(
            source = %self.source.name(),
            generation,
            entries,
            rejected = report.rejected,
            "{} table reloaded",
            self.module_name
        );
        self.retire(old);

        ReloadOutcome {
            generation,
            entries,
            report,
        }
    }

    fn retire(&self, old: Arc<AclTable>) {
        let retired = Arc::clone(&self.retired);
        let delay = self.grace_delay;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !delay.is_zero() => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    debug!(readers = Arc::strong_count(&old) - 1, "Deleting old table");
                    drop(old);
                    retired.fetch_add(1, Ordering::AcqRel);
                });
            },
            _ => {
                debug!(readers = Arc::strong_count(&old) - 1, "Deleting old table");
                drop(old);
                retired.fetch_add(1, Ordering::AcqRel);
            },
        }
    }
}
