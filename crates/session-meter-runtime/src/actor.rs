//! The session actor.
//!
//! One tokio task owns one [`SessionEngine`]. Callers talk to it through a
//! cloneable [`SessionHandle`]:
//!
//! - commands go over an `mpsc` channel, each with a `oneshot` reply
//! - the latest [`SessionSnapshot`] is published on a `watch` channel
//! - [`SessionEvent`]s fan out on a `broadcast` channel
//!
//! The tick timer is only polled while the session is active, so a paused
//! session cannot accrue and there is never more than one timer. After a
//! session ends the actor keeps it visible for a grace period, then clears
//! it. The account and the session summary are written to the store when a
//! session ends; the account is also written after payment-method changes.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use session_meter_core::{
    Clock, LanguageAddition, LanguageRemoval, PricingCatalog, SessionEngine, SessionEvent,
    SessionId, SessionRequest, SessionSnapshot, SessionStatus, SessionSummary, UsageAccount,
    UsageLedger, UserId,
};
use session_meter_store::UsageStore;

use crate::config::MeterConfig;
use crate::error::{Result, RuntimeError};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Start {
        request: SessionRequest,
        reply: Reply<SessionId>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<SessionSummary>,
    },
    AddLanguage {
        code: String,
        reply: Reply<LanguageAddition>,
    },
    RemoveLanguage {
        code: String,
        reply: Reply<LanguageRemoval>,
    },
    SetParticipants {
        count: u32,
        reply: Reply<f64>,
    },
    SetAllowLanguageRequests {
        allow: bool,
        reply: Reply<()>,
    },
    SetAllowParticipantOverage {
        allow: bool,
        reply: Reply<()>,
    },
    AttachPaymentMethod {
        reply: Reply<()>,
    },
    DetachPaymentMethod {
        reply: Reply<()>,
    },
    CloseBillingPeriod {
        reply: Reply<i64>,
    },
    Account {
        reply: Reply<UsageAccount>,
    },
    History {
        limit: usize,
        reply: Reply<Vec<SessionSummary>>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cloneable handle to a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Option<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start { .. } => "Start",
            Self::Pause { .. } => "Pause",
            Self::Resume { .. } => "Resume",
            Self::Stop { .. } => "Stop",
            Self::AddLanguage { .. } => "AddLanguage",
            Self::RemoveLanguage { .. } => "RemoveLanguage",
            Self::SetParticipants { .. } => "SetParticipants",
            Self::SetAllowLanguageRequests { .. } => "SetAllowLanguageRequests",
            Self::SetAllowParticipantOverage { .. } => "SetAllowParticipantOverage",
            Self::AttachPaymentMethod { .. } => "AttachPaymentMethod",
            Self::DetachPaymentMethod { .. } => "DetachPaymentMethod",
            Self::CloseBillingPeriod { .. } => "CloseBillingPeriod",
            Self::Account { .. } => "Account",
            Self::History { .. } => "History",
            Self::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| RuntimeError::ActorClosed)?;
        rx.await.map_err(|_| RuntimeError::ActorClosed)?
    }

    /// Start a session.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Meter` if the engine refuses the start, or
    /// `RuntimeError::ActorClosed` if the actor is gone.
    pub async fn start(&self, request: SessionRequest) -> Result<SessionId> {
        self.request(|reply| Command::Start { request, reply }).await
    }

    /// Pause the active session.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::start`].
    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Resume the paused session.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::start`].
    pub async fn resume(&self) -> Result<()> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Stop the session and return its summary.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::start`].
    pub async fn stop(&self) -> Result<SessionSummary> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Add a caption language.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::start`].
    pub async fn add_language(&self, code: impl Into<String>) -> Result<LanguageAddition> {
        let code = code.into();
        self.request(|reply| Command::AddLanguage { code, reply })
            .await
    }

    /// Remove a caption language.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::start`].
    pub async fn remove_language(&self, code: impl Into<String>) -> Result<LanguageRemoval> {
        let code = code.into();
        self.request(|reply| Command::RemoveLanguage { code, reply })
            .await
    }

    /// Report a new participant count. Returns the resulting multiplier.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::start`].
    pub async fn set_participant_count(&self, count: u32) -> Result<f64> {
        self.request(|reply| Command::SetParticipants { count, reply })
            .await
    }

    /// Allow or refuse participant language requests.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::start`].
    pub async fn set_allow_language_requests(&self, allow: bool) -> Result<()> {
        self.request(|reply| Command::SetAllowLanguageRequests { allow, reply })
            .await
    }

    /// Allow or refuse billing above the participant threshold.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::start`].
    pub async fn set_allow_participant_overage(&self, allow: bool) -> Result<()> {
        self.request(|reply| Command::SetAllowParticipantOverage { allow, reply })
            .await
    }

    /// Put a payment method on file and persist the account.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Meter` while a session is live, or
    /// `RuntimeError::Store` if the account cannot be saved.
    pub async fn attach_payment_method(&self) -> Result<()> {
        self.request(|reply| Command::AttachPaymentMethod { reply })
            .await
    }

    /// Remove the payment method and persist the account.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Meter` while a session is live, or
    /// `RuntimeError::Store` if the account cannot be saved.
    pub async fn detach_payment_method(&self) -> Result<()> {
        self.request(|reply| Command::DetachPaymentMethod { reply })
            .await
    }

    /// Close the billing period, returning the billed cents.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Store` if the account cannot be saved.
    pub async fn close_billing_period(&self) -> Result<i64> {
        self.request(|reply| Command::CloseBillingPeriod { reply })
            .await
    }

    /// Current state of the usage account.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::ActorClosed` if the actor is gone.
    pub async fn account(&self) -> Result<UsageAccount> {
        self.request(|reply| Command::Account { reply }).await
    }

    /// Archived sessions of this user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Store` if the archive cannot be read.
    pub async fn history(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        self.request(|reply| Command::History { limit, reply })
            .await
    }

    /// Stop any live session, persist and end the actor.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::ActorClosed` if the actor is already gone.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Latest published snapshot. `None` when no session is shown.
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<SessionSnapshot>> {
        self.snapshots.clone()
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Owns the engine and runs the command/tick loop.
pub struct SessionActor {
    engine: SessionEngine,
    store: Arc<dyn UsageStore>,
    user_id: UserId,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Option<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
    ticker: Interval,
    grace: std::time::Duration,
    clear_at: Option<Instant>,
}

impl SessionActor {
    /// Load the user's account and spawn the actor task.
    ///
    /// A new account is created (and saved) if the store has none.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Store` if the account cannot be loaded or
    /// saved.
    pub fn spawn(
        config: &MeterConfig,
        catalog: Arc<PricingCatalog>,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
        user_id: UserId,
    ) -> Result<(SessionHandle, JoinHandle<()>)> {
        let limits = catalog.free_tier_limits();
        let today = clock.today();
        let ledger = match store.get_account(&user_id)? {
            Some(account) => {
                tracing::debug!(user_id = %user_id, mode = account.mode.as_str(), "account loaded");
                UsageLedger::load(account, limits, today)
            }
            None => {
                tracing::info!(user_id = %user_id, "creating usage account");
                let ledger = UsageLedger::open(user_id.clone(), limits, today);
                store.put_account(ledger.account())?;
                ledger
            }
        };

        let engine =
            SessionEngine::with_options(catalog, ledger, clock, config.engine_options());

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        let period = config.tick_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let actor = Self {
            engine,
            store,
            user_id,
            commands: command_rx,
            snapshots: snapshot_tx,
            events: event_tx.clone(),
            ticker,
            grace: config.ended_grace(),
            clear_at: None,
        };

        let handle = SessionHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            events: event_tx,
        };

        Ok((handle, tokio::spawn(actor.run())))
    }

    async fn run(mut self) {
        tracing::debug!(user_id = %self.user_id, "session actor started");

        loop {
            let ticking = self.engine.status() == SessionStatus::Active;
            let clear_at = self.clear_at;

            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown();
                        break;
                    };
                    if let Command::Shutdown { reply } = command {
                        self.shutdown();
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    self.handle(command);
                }
                _ = self.ticker.tick(), if ticking => {
                    self.on_tick();
                }
                () = tokio::time::sleep_until(clear_at.unwrap_or_else(Instant::now)), if clear_at.is_some() => {
                    self.clear_at = None;
                    if self.engine.clear_ended() {
                        tracing::debug!(user_id = %self.user_id, "ended session cleared");
                        self.publish();
                    }
                }
            }
        }

        tracing::debug!(user_id = %self.user_id, "session actor stopped");
    }

    fn handle(&mut self, command: Command) {
        tracing::trace!(?command, "command received");
        match command {
            Command::Start { request, reply } => {
                let result = self.engine.start(request).map_err(RuntimeError::from);
                if result.is_ok() {
                    self.clear_at = None;
                    self.ticker.reset();
                }
                self.after_change();
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let result = self.engine.pause().map_err(RuntimeError::from);
                self.after_change();
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.engine.resume().map_err(RuntimeError::from);
                if result.is_ok() {
                    self.ticker.reset();
                }
                self.after_change();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let result = self.engine.stop().map_err(RuntimeError::from);
                self.after_change();
                let _ = reply.send(result);
            }
            Command::AddLanguage { code, reply } => {
                let result = self.engine.add_language(&code).map_err(RuntimeError::from);
                self.after_change();
                let _ = reply.send(result);
            }
            Command::RemoveLanguage { code, reply } => {
                let result = self.engine.remove_language(&code).map_err(RuntimeError::from);
                self.after_change();
                let _ = reply.send(result);
            }
            Command::SetParticipants { count, reply } => {
                let result = self.engine.set_participant_count(count).map_err(RuntimeError::from);
                self.after_change();
                let _ = reply.send(result);
            }
            Command::SetAllowLanguageRequests { allow, reply } => {
                let result = self
                    .engine
                    .set_allow_language_requests(allow)
                    .map_err(RuntimeError::from);
                self.after_change();
                let _ = reply.send(result);
            }
            Command::SetAllowParticipantOverage { allow, reply } => {
                let result = self
                    .engine
                    .set_allow_participant_overage(allow)
                    .map_err(RuntimeError::from);
                self.after_change();
                let _ = reply.send(result);
            }
            Command::AttachPaymentMethod { reply } => {
                let result = self
                    .engine
                    .attach_payment_method()
                    .map_err(RuntimeError::from)
                    .and_then(|()| self.save_account());
                let _ = reply.send(result);
            }
            Command::DetachPaymentMethod { reply } => {
                let result = self
                    .engine
                    .detach_payment_method()
                    .map_err(RuntimeError::from)
                    .and_then(|()| self.save_account());
                let _ = reply.send(result);
            }
            Command::CloseBillingPeriod { reply } => {
                let billed = self.engine.close_billing_period();
                let _ = reply.send(self.save_account().map(|()| billed));
            }
            Command::Account { reply } => {
                self.engine.refresh_day();
                let _ = reply.send(Ok(self.engine.usage().account().clone()));
            }
            Command::History { limit, reply } => {
                let result = self
                    .store
                    .list_sessions(&self.user_id, limit, 0)
                    .map_err(RuntimeError::from);
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                // Handled by the run loop.
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn on_tick(&mut self) {
        match self.engine.tick() {
            Ok(outcome) => {
                if outcome.ended.is_some() {
                    tracing::info!(user_id = %self.user_id, "session ended by free-tier limit");
                }
            }
            Err(e) => tracing::warn!(user_id = %self.user_id, error = %e, "tick failed"),
        }
        self.after_change();
    }

    /// Publish the snapshot and forward events; persist on session end.
    fn after_change(&mut self) {
        for event in self.engine.drain_events() {
            if let SessionEvent::Ended { summary, .. } = &event {
                self.persist_ended(summary);
                self.clear_at = Some(Instant::now() + self.grace);
            }
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.engine.snapshot());
    }

    fn persist_ended(&self, summary: &SessionSummary) {
        if let Err(e) = self.store.put_session(summary) {
            tracing::error!(session_id = %summary.session_id, error = %e, "failed to archive session");
        }
        if let Err(e) = self.save_account() {
            tracing::error!(user_id = %self.user_id, error = %e, "failed to save account");
        }
    }

    fn save_account(&self) -> Result<()> {
        self.store.put_account(self.engine.usage().account())?;
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.engine.status().is_live() {
            tracing::info!(user_id = %self.user_id, "stopping live session on shutdown");
            if let Err(e) = self.engine.stop() {
                tracing::warn!(user_id = %self.user_id, error = %e, "stop on shutdown failed");
            }
            self.after_change();
        }
    }
}
