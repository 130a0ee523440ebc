pub mod db;
pub mod errors;
pub mod identity;
pub mod progress;
pub mod scoring;
pub mod settings;
pub mod timestamps;
pub mod tracking;
pub mod utils;

use anyhow::Result;
use db::Database;
use identity::IdentityResolver;
use progress::ProgressRecorder;
use scoring::ScoreAccumulator;
use settings::TrackerSettings;
use tracking::SessionTracker;

pub use errors::{CommandError, ErrorKind, TrackingError};

/// Who is calling: the linking-session token the client presented, if any.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub session_token: Option<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

/// Shared services behind every command. Cloning the services is cheap;
/// they all talk to the same database worker.
pub struct AppState {
    pub db: Database,
    pub tracker: SessionTracker,
    pub scores: ScoreAccumulator,
    pub identity: IdentityResolver,
    pub progress: ProgressRecorder,
    pub settings: TrackerSettings,
}

impl AppState {
    /// Opens (and migrates) the database named in `settings` and wires up
    /// the services.
    pub fn open(settings: TrackerSettings) -> Result<Self> {
        let database = Database::new(settings.db_path.clone(), settings.store_timeout())?;

        Ok(Self {
            tracker: SessionTracker::new(database.clone(), settings.engagement),
            scores: ScoreAccumulator::new(database.clone()),
            identity: IdentityResolver::new(database.clone(), settings.auth_session_lifetime()),
            progress: ProgressRecorder::new(database.clone()),
            db: database,
            settings,
        })
    }

    /// Stops the database worker. Commands issued afterwards fail as
    /// unavailable.
    pub fn shutdown(&self) {
        self.db.shutdown();
    }
}

/// Loads settings from `settings_path` plus the environment, installs the
/// logger and opens the service state.
pub fn start(settings_path: Option<&std::path::Path>) -> Result<AppState> {
    let settings = TrackerSettings::load(settings_path)?;
    utils::logging::init(&settings.log_level);

    let state = AppState::open(settings)?;
    log::info!(
        "Engagement tracker ready (database {})",
        state.db.path().display()
    );
    Ok(state)
}
