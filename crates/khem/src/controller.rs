//! Identity controller.
//!
//! Mediates between a presentation layer's text input and the persistent
//! store. One controller lives for one screen session:
//!
//! ```text
//! Initializing --initialize()--> Ready --submit()--> Saving --> Ready
//!                                  ^  \
//!                                  |   on_change()
//!                                  +--/
//! ```
//!
//! Load failures fall back to an empty buffer and are only logged. Save
//! results are returned as a [`SaveOutcome`] and, when a notification
//! channel is attached, reported as a [`Notification`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, trace, warn};

use crate::identity::{Identity, ValidationError, USERNAME_KEY};
use crate::store::{KeyValueStore, StoreError};

/// Message shown when a save is rejected for an empty name.
pub const VALIDATION_FAILED_MESSAGE: &str = "Please enter a valid username.";

/// Message shown when the store rejects a save.
pub const SAVE_FAILED_MESSAGE: &str = "Could not save username. Please try again.";

/// Lifecycle phase of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The stored name has not been loaded yet.
    Initializing,
    /// Accepting edits and saves.
    Ready,
    /// A write is in flight.
    Saving,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Saving => write!(f, "saving"),
        }
    }
}

/// User-facing notification raised by a save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The buffer was empty or whitespace only.
    ValidationFailed,
    /// The name was written to the store.
    SaveSucceeded(Identity),
    /// The store rejected the write.
    SaveFailed,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed => f.write_str(VALIDATION_FAILED_MESSAGE),
            Self::SaveSucceeded(identity) => write!(f, "Username saved: {identity}"),
            Self::SaveFailed => f.write_str(SAVE_FAILED_MESSAGE),
        }
    }
}

/// Result of a [`IdentityController::submit`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The trimmed name was persisted.
    Saved(Identity),
    /// The buffer failed validation; the store was not contacted.
    Invalid(ValidationError),
    /// The store write failed; the buffer is unchanged.
    Failed(StoreError),
    /// The controller was not ready (still loading, or a save is in flight).
    Ignored,
}

impl SaveOutcome {
    /// The notification this outcome raises, if any.
    #[must_use]
    pub fn notification(&self) -> Option<Notification> {
        match self {
            Self::Saved(identity) => Some(Notification::SaveSucceeded(identity.clone())),
            Self::Invalid(_) => Some(Notification::ValidationFailed),
            Self::Failed(_) => Some(Notification::SaveFailed),
            Self::Ignored => None,
        }
    }

    /// Whether the name reached the store.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

#[derive(Debug)]
struct Session {
    phase: Phase,
    buffer: String,
    load_issued: bool,
    load_error: Option<StoreError>,
}

impl Session {
    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            trace!(from = %self.phase, to = %phase, "Identity phase changed");
            self.phase = phase;
        }
    }
}

type SharedSession = Arc<Mutex<Session>>;

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates load-on-start, the edit buffer, and validated saves.
#[derive(Debug)]
pub struct IdentityController {
    store: Arc<dyn KeyValueStore>,
    session: SharedSession,
    notifications: Option<UnboundedSender<Notification>>,
}

impl IdentityController {
    /// Create a controller in the [`Phase::Initializing`] phase.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            session: Arc::new(Mutex::new(Session {
                phase: Phase::Initializing,
                buffer: String::new(),
                load_issued: false,
                load_error: None,
            })),
            notifications: None,
        }
    }

    /// Send notifications to `tx` as they are raised.
    #[must_use]
    pub fn with_notifications(mut self, tx: UnboundedSender<Notification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    /// Load the stored name and move to [`Phase::Ready`].
    ///
    /// Issues exactly one store read per controller; later calls return
    /// immediately. A read failure is logged and leaves the buffer as it was.
    pub async fn initialize(&self) {
        {
            let mut session = self.session();
            if session.load_issued {
                debug!("Identity already loaded, skipping");
                return;
            }
            session.load_issued = true;
        }

        let result = self.store.get(USERNAME_KEY).await;

        let mut session = self.session();
        match result {
            Ok(Some(name)) => {
                debug!("Loaded stored username");
                session.buffer = name;
            }
            Ok(None) => debug!("No stored username"),
            Err(err) => {
                error!("Error loading username: {}", err);
                session.load_error = Some(err);
            }
        }
        session.enter(Phase::Ready);
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.session().phase
    }

    /// Current edit buffer contents.
    #[must_use]
    pub fn buffer(&self) -> String {
        self.session().buffer.clone()
    }

    /// The error that made loading fail, if it did.
    #[must_use]
    pub fn load_error(&self) -> Option<StoreError> {
        self.session().load_error.clone()
    }

    /// Replace the edit buffer. Never touches the store.
    pub fn on_change(&self, value: impl Into<String>) {
        self.session().buffer = value.into();
    }

    /// Validate the buffer and persist it.
    ///
    /// At most one write is in flight per controller: a call made while a
    /// save is pending, or before [`initialize`](Self::initialize) has
    /// finished, returns [`SaveOutcome::Ignored`].
    ///
    /// The write runs as its own tokio task, so it must be called from
    /// within a runtime. Dropping the returned future does not cancel the
    /// write: the controller stays in [`Phase::Saving`] until the store
    /// answers, and the notification is still sent.
    pub async fn submit(&self) -> SaveOutcome {
        let (identity, submitted) = {
            let mut session = self.session();
            if session.phase != Phase::Ready {
                debug!("Ignoring save while {}", session.phase);
                return SaveOutcome::Ignored;
            }
            let parsed = Identity::parse(&session.buffer);
            match parsed {
                Ok(identity) => {
                    session.enter(Phase::Saving);
                    (identity, session.buffer.clone())
                }
                Err(err) => {
                    drop(session);
                    debug!("Rejected username: {}", err);
                    let outcome = SaveOutcome::Invalid(err);
                    notify(self.notifications.as_ref(), &outcome);
                    return outcome;
                }
            }
        };

        let write = tokio::spawn(complete_save(
            Arc::clone(&self.store),
            Arc::clone(&self.session),
            self.notifications.clone(),
            identity,
            submitted,
        ));
        match write.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Save task failed: {}", err);
                let outcome =
                    SaveOutcome::Failed(StoreError::write(USERNAME_KEY, err.to_string()));
                notify(self.notifications.as_ref(), &outcome);
                outcome
            }
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }
}

/// Write `identity` and settle the session, independent of the caller.
async fn complete_save(
    store: Arc<dyn KeyValueStore>,
    session: SharedSession,
    notifications: Option<UnboundedSender<Notification>>,
    identity: Identity,
    submitted: String,
) -> SaveOutcome {
    let guard = SavingGuard { session: &session };
    let result = store.set(USERNAME_KEY, identity.as_str()).await;

    let outcome = {
        let mut session = lock(&session);
        session.enter(Phase::Ready);
        match result {
            Ok(()) => {
                // Keep edits made while the write was in flight
                if session.buffer == submitted {
                    session.buffer = identity.as_str().to_string();
                }
                info!("Username saved: {}", identity);
                SaveOutcome::Saved(identity)
            }
            Err(err) => {
                error!("Error saving username: {}", err);
                SaveOutcome::Failed(err)
            }
        }
    };
    drop(guard);

    notify(notifications.as_ref(), &outcome);
    outcome
}

fn notify(tx: Option<&UnboundedSender<Notification>>, outcome: &SaveOutcome) {
    if let (Some(tx), Some(notification)) = (tx, outcome.notification()) {
        if tx.send(notification).is_err() {
            warn!("Notification receiver dropped");
        }
    }
}

/// Returns the session to `Ready` if the store panics mid-write.
struct SavingGuard<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        let mut session = lock(self.session);
        if session.phase == Phase::Saving {
            warn!("Save abandoned before completion");
            session.enter(Phase::Ready);
        }
    }
}
