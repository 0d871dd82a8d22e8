//! The collaborator bundle shared by engine components.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use confetti_core::{
    BirthdayStore, Clock, Directory, EngineConfig, HolidayError, HolidaySet, Messaging, Notifier,
    PoemGenerator, Severity,
};

/// Read a holiday file.
pub async fn load_holidays(path: &Path) -> Result<HolidaySet, HolidayError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| HolidayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    HolidaySet::from_json(&json)
}

/// Injected collaborators and configuration.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<EngineConfig>,
    pub store: Arc<dyn BirthdayStore>,
    pub directory: Arc<dyn Directory>,
    pub messaging: Arc<dyn Messaging>,
    pub poet: Arc<dyn PoemGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub holidays: Arc<RwLock<HolidaySet>>,
    holiday_file: Option<PathBuf>,
}

impl Services {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<dyn BirthdayStore>,
        directory: Arc<dyn Directory>,
        messaging: Arc<dyn Messaging>,
        poet: Arc<dyn PoemGenerator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            directory,
            messaging,
            poet,
            notifier,
            clock,
            holidays: Arc::new(RwLock::new(HolidaySet::new())),
            holiday_file: None,
        }
    }

    pub fn with_holidays(mut self, holidays: HolidaySet) -> Self {
        self.holidays = Arc::new(RwLock::new(holidays));
        self
    }

    /// Reload holidays from `path` on every [`Services::refresh_holidays`].
    pub fn with_holiday_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.holiday_file = Some(path.into());
        self
    }

    /// Re-read the holiday file, keeping the current set if it cannot be read.
    pub async fn refresh_holidays(&self) {
        let Some(path) = &self.holiday_file else {
            return;
        };
        match load_holidays(path).await {
            Ok(set) => {
                debug!(path = %path.display(), count = set.len(), "holidays loaded");
                *self.holidays.write().await = set;
            }
            Err(e) => {
                warn!(error = %e, "failed to refresh holidays, keeping previous set");
                self.notifier
                    .notify(
                        Severity::Warning,
                        &format!("Could not reload holidays, keeping the previous list: {}", e),
                    )
                    .await;
            }
        }
    }

    /// A copy of the current holiday set.
    pub async fn holidays(&self) -> HolidaySet {
        self.holidays.read().await.clone()
    }
}
