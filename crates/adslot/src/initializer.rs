//! Process-wide, exactly-once initialization of the ad network.
//!
//! The first caller to claim the flag runs the bootstrap; everybody else returns
//! immediately. The completion callback fires once, when the bootstrap reports back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings forwarded to the bootstrap routine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Devices that should receive test creatives.
    pub test_device_ids: Vec<String>,
}

/// Initialization state of one network adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterStatus {
    pub name: String,
    pub description: String,
    pub latency: Duration,
}

/// What the bootstrap reports on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub adapters: Vec<AdapterStatus>,
}

/// The real setup routine of an ad network.
pub trait SourceBootstrap: Send + Sync {
    /// Start initialization and call [`InitCompletion::complete`] when done,
    /// from any thread.
    fn initialize(&self, config: &InitConfig, completion: InitCompletion);
}

/// What a call to [`AdSourceInitializer::initialize`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// This call claimed the flag and started the bootstrap.
    Started,
    /// Another caller started it; completion has not been reported yet.
    InProgress,
    /// Initialization already finished.
    AlreadyInitialized,
}

type CompleteFn = Box<dyn FnOnce(&InitReport) + Send + 'static>;

/// One-shot completion handle given to the bootstrap.
#[must_use = "the bootstrap must call complete() or initialization never finishes"]
pub struct InitCompletion {
    completed: Arc<AtomicBool>,
    on_complete: Option<CompleteFn>,
}

impl InitCompletion {
    pub fn complete(mut self, report: InitReport) {
        for adapter in &report.adapters {
            tracing::debug!(
                adapter = %adapter.name,
                description = %adapter.description,
                latency_ms = adapter.latency.as_millis() as u64,
                "Ad adapter status"
            );
        }
        self.completed.store(true, Ordering::Release);
        tracing::info!(adapters = report.adapters.len(), "Ad source initialized");

        if let Some(f) = self.on_complete.take() {
            f(&report);
        }
    }
}

impl Drop for InitCompletion {
    fn drop(&mut self) {
        if self.on_complete.is_some() {
            tracing::error!(
                "InitCompletion dropped without complete() - ad source never finished initializing"
            );
        }
    }
}

/// Exactly-once gate around a [`SourceBootstrap`].
#[derive(Debug, Default)]
pub struct AdSourceInitializer {
    claimed: AtomicBool,
    completed: Arc<AtomicBool>,
}

impl AdSourceInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance.
    pub fn global() -> Arc<AdSourceInitializer> {
        static GLOBAL: OnceLock<Arc<AdSourceInitializer>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(AdSourceInitializer::new())))
    }

    /// Run the bootstrap unless some caller already did.
    ///
    /// Safe to call any number of times from any thread. `on_complete` only runs
    /// for the call that returns [`InitOutcome::Started`].
    pub fn initialize<F>(
        &self,
        bootstrap: &dyn SourceBootstrap,
        config: &InitConfig,
        on_complete: F,
    ) -> InitOutcome
    where
        F: FnOnce(&InitReport) + Send + 'static,
    {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let outcome = if self.is_initialized() {
                InitOutcome::AlreadyInitialized
            } else {
                InitOutcome::InProgress
            };
            tracing::trace!(?outcome, "Ad source initialization already claimed");
            return outcome;
        }

        tracing::info!(
            test_devices = config.test_device_ids.len(),
            "Initializing ad source"
        );
        bootstrap.initialize(
            config,
            InitCompletion {
                completed: Arc::clone(&self.completed),
                on_complete: Some(Box::new(on_complete)),
            },
        );
        InitOutcome::Started
    }

    /// Whether the bootstrap has reported completion.
    pub fn is_initialized(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether some caller has started initialization.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}
