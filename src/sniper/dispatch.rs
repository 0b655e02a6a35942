use crate::error::AppError;
use crate::gateway::events::GuildEvent;
use crate::sniper::engine::ClaimEngine;
use crate::sniper::ledger::Ledger;
use crate::sniper::tracker::{AliasTracker, ObservationKind};
use crate::util::display_code;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Routes guild events from every session into the shared tracker and
/// launches claim attempts for actionable transitions.
pub struct Dispatcher {
    tracker: Arc<AliasTracker>,
    ledger: Arc<Ledger>,
    engine: Arc<ClaimEngine>,
    ignored: HashSet<String>,
    exhausted: Arc<Notify>,
}

impl Dispatcher {
    /// Events for guilds in `ignored` never trigger a claim.
    pub fn new(
        tracker: Arc<AliasTracker>,
        engine: Arc<ClaimEngine>,
        ignored: HashSet<String>,
        exhausted: Arc<Notify>,
    ) -> Self {
        Self {
            tracker,
            ledger: engine.ledger().clone(),
            engine,
            ignored,
            exhausted,
        }
    }

    pub fn tracker(&self) -> &Arc<AliasTracker> {
        &self.tracker
    }

    /// Handle one event seen with `credential`. Returns the spawned claim
    /// task when the event triggered one.
    pub fn handle(&self, event: GuildEvent, credential: &str) -> Option<JoinHandle<()>> {
        match event {
            GuildEvent::Ready { user, guilds } => {
                tracing::info!("Logged in as {user} with {} guilds.", guilds.len());
                for guild in guilds {
                    self.tracker
                        .observe(&guild.id, &guild.vanity_code, ObservationKind::Snapshot);
                }
                None
            }
            GuildEvent::Created(guild) => {
                if !guild.vanity_code.is_empty() {
                    tracing::info!(
                        "Queued {} for sniping. (Vanity: {})",
                        guild.name,
                        guild.vanity_code
                    );
                }
                self.tracker
                    .observe(&guild.id, &guild.vanity_code, ObservationKind::Snapshot);
                None
            }
            GuildEvent::Updated { unavailable: true, .. } => None,
            GuildEvent::Updated { guild, .. } => {
                if self.ignored.contains(&guild.id) {
                    return None;
                }

                let target = self.tracker.observe_gated(
                    &guild.id,
                    &guild.vanity_code,
                    ObservationKind::Update,
                    |_| self.destination_available("vanity change"),
                )?;

                tracing::info!(
                    "Vanity URL changed: {} -> {}",
                    target,
                    display_code(&guild.vanity_code)
                );
                Some(self.spawn_claim(target, credential))
            }
            GuildEvent::Deleted { unavailable: true, .. } => None,
            GuildEvent::Deleted { guild_id, .. } => {
                if self.ignored.contains(&guild_id) {
                    return None;
                }

                let target = self.tracker.observe_gated(
                    &guild_id,
                    "",
                    ObservationKind::Delete,
                    |_| self.destination_available("guild deletion"),
                )?;

                tracing::info!("Guild {guild_id} was deleted. The vanity may be free: {target}");
                Some(self.spawn_claim(target, credential))
            }
        }
    }

    /// Cooldown gate consulted before a transition is committed.
    fn destination_available(&self, trigger: &str) -> bool {
        let slot = match self.ledger.current_destination() {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!("Ignoring {trigger}: {e}");
                return false;
            }
        };

        match self.ledger.cooldown_remaining(&slot.guild_id) {
            Some(remaining) => {
                tracing::warn!(
                    "Guild {} is on timeout for {:.2}s. Ignoring {trigger}.",
                    slot.guild_id,
                    remaining.as_secs_f64()
                );
                false
            }
            None => true,
        }
    }

    fn spawn_claim(&self, code: String, credential: &str) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let exhausted = self.exhausted.clone();
        let credential = credential.to_string();

        tokio::spawn(async move {
            match engine.attempt_claim(&code, &credential).await {
                Ok(outcome) => tracing::debug!("Claim for {code} finished: {outcome:?}"),
                Err(AppError::DestinationsExhausted) => exhausted.notify_one(),
                Err(e) => tracing::error!("Claim for {code} failed: {e}"),
            }
        })
    }
}
