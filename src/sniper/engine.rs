use crate::discord_api::{ClaimReply, VanityApi};
use crate::error::AppError;
use crate::sniper::ledger::{Ledger, Settlement};
use crate::webhook::NotificationSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct ClaimSettings {
    /// Extra requests allowed after a rate limit
    pub max_retries: u32,
    /// How long a destination rests after receiving a code. Zero disables it.
    pub cooldown: Duration,
}

/// How a single claim attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Succeeded {
        destination: String,
        elapsed: Duration,
        settlement: Settlement,
    },
    /// Still rate limited once the retries ran out
    RateLimited { retry_after: f64 },
    Rejected { status: u16, reason: String },
    TransportFailure { reason: String },
    SkippedOnCooldown {
        destination: String,
        remaining: Duration,
    },
    Unexpected { status: u16 },
}

/// Issues claims against the current destination and settles the ledger.
///
/// Claim requests go through a single lane so two attempts never race for
/// the same cursor slot. The lane is released while sleeping off a rate limit.
pub struct ClaimEngine {
    api: Arc<dyn VanityApi>,
    ledger: Arc<Ledger>,
    sink: Arc<dyn NotificationSink>,
    settings: ClaimSettings,
    lane: Mutex<()>,
}

impl ClaimEngine {
    pub fn new(
        api: Arc<dyn VanityApi>,
        ledger: Arc<Ledger>,
        sink: Arc<dyn NotificationSink>,
        settings: ClaimSettings,
    ) -> Self {
        Self {
            api,
            ledger,
            sink,
            settings,
            lane: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Try to move `code` onto the current destination using `credential`.
    ///
    /// Per-attempt failures are logged and returned as a [`ClaimOutcome`].
    /// The only error is [`AppError::DestinationsExhausted`], raised once a
    /// success used up the last destination with rotation disabled.
    pub async fn attempt_claim(&self, code: &str, credential: &str) -> Result<ClaimOutcome, AppError> {
        let mut retries: u32 = 0;

        loop {
            let lane = self.lane.lock().await;
            let slot = self.ledger.current_destination()?;

            if let Some(remaining) = self.ledger.cooldown_remaining(&slot.guild_id) {
                tracing::warn!(
                    "Guild {} is on cooldown for {:.2}s. Skipping claim for vanity: {code}",
                    slot.guild_id,
                    remaining.as_secs_f64()
                );
                return Ok(ClaimOutcome::SkippedOnCooldown {
                    destination: slot.guild_id,
                    remaining,
                });
            }

            if retries == 0 {
                tracing::info!("Attempting to claim vanity: {code} (Guild: {})", slot.guild_id);
            }

            let started = Instant::now();
            let reply = self.api.claim_vanity(&slot.guild_id, code, credential).await;
            let elapsed = started.elapsed();
            let secs = elapsed.as_secs_f64();

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(
                        "Claim request for vanity {code} to guild {} failed: {e} (Time: {secs:.2}s)",
                        slot.guild_id
                    );
                    return Ok(ClaimOutcome::TransportFailure {
                        reason: e.to_string(),
                    });
                }
            };

            match reply {
                ClaimReply::Claimed { .. } => {
                    let settled = self.ledger.settle_success(&slot, self.settings.cooldown);
                    drop(lane);

                    let message = format!(
                        "Successfully sniped vanity: {code} to guild {} ({secs:.2}s)",
                        slot.guild_id
                    );
                    tracing::info!("{message}");
                    self.sink.notify(message);

                    let settlement = match settled {
                        Ok(settlement) => settlement,
                        Err(e) => {
                            tracing::warn!(
                                "Ran out of guilds to use. Rotation is turned off, so the process will now exit."
                            );
                            return Err(e);
                        }
                    };

                    match settlement {
                        Settlement::Wrapped => tracing::warn!(
                            "Used up all available guilds. Rotation is turned on, reusing them in order."
                        ),
                        Settlement::Stale => tracing::debug!(
                            "Cursor had already moved past guild {}",
                            slot.guild_id
                        ),
                        Settlement::Advanced => {}
                    }

                    return Ok(ClaimOutcome::Succeeded {
                        destination: slot.guild_id,
                        elapsed,
                        settlement,
                    });
                }
                ClaimReply::RateLimited {
                    retry_after,
                    message,
                } => {
                    drop(lane);
                    let wait = Duration::try_from_secs_f64(retry_after).unwrap_or(Duration::ZERO);
                    tracing::warn!(
                        "Rate limited for {:.2}s while claiming vanity: {code} (Guild: {}, Time: {secs:.2}s) {message}",
                        wait.as_secs_f64(),
                        slot.guild_id
                    );

                    if retries >= self.settings.max_retries {
                        tracing::warn!(
                            "Failed claiming {code} after {} attempts.",
                            retries + 1
                        );
                        return Ok(ClaimOutcome::RateLimited { retry_after });
                    }

                    tokio::time::sleep(wait).await;
                    retries += 1;
                    tracing::info!("Retrying claim for vanity: {code} (Retry: #{retries})");
                }
                ClaimReply::Rejected { status, reason } => {
                    tracing::warn!(
                        "Failed to claim vanity: {code} (Guild: {}, Status: {status}, Reason: {reason}, Time: {secs:.2}s)",
                        slot.guild_id
                    );
                    return Ok(ClaimOutcome::Rejected { status, reason });
                }
                ClaimReply::Unexpected { status, body } => {
                    tracing::warn!(
                        "Got unknown response code claiming {code} to guild {}. (Status: {status}, Body: {body}, Time: {secs:.2}s)",
                        slot.guild_id
                    );
                    return Ok(ClaimOutcome::Unexpected { status });
                }
            }
        }
    }
}
