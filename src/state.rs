use crate::config::Config;
use crate::discord_api::DiscordClient;
use crate::error::AppError;
use crate::gateway::GatewayConfig;
use crate::sniper::{AliasTracker, ClaimEngine, ClaimSettings, Dispatcher, Ledger};
use crate::webhook::WebhookNotifier;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Notify;

/// Process-wide state shared by every session
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub gateway: Arc<GatewayConfig>,
    pub notifier: Arc<WebhookNotifier>,
    /// Fires once the last destination is used and rotation is off
    pub exhausted: Arc<Notify>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let destinations = config.destinations();
        let ignored: HashSet<String> = if config.ignore_configured_guilds {
            destinations.iter().cloned().collect()
        } else {
            HashSet::new()
        };

        let ledger = Arc::new(Ledger::new(destinations, config.rotate_guilds)?);
        let api = Arc::new(DiscordClient::new(
            config.api_base.clone(),
            config.api_version.clone(),
            config.properties.user_agent.clone(),
        ));
        let notifier = Arc::new(WebhookNotifier::new(config.webhook_url().map(String::from)));
        if !notifier.is_enabled() {
            tracing::debug!("No webhook configured, claim notifications are disabled");
        }

        let engine = Arc::new(ClaimEngine::new(
            api,
            ledger,
            notifier.clone(),
            ClaimSettings {
                max_retries: config.retries,
                cooldown: config.cooldown(),
            },
        ));

        let exhausted = Arc::new(Notify::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(AliasTracker::new()),
            engine,
            ignored,
            exhausted.clone(),
        ));

        let gateway = Arc::new(GatewayConfig {
            url: config.gateway_url.clone(),
            api_version: config.api_version.clone(),
            properties: config.properties.identify(),
        });

        Ok(Self {
            dispatcher,
            gateway,
            notifier,
            exhausted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> Config {
        let config: Config = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        config
    }

    #[tokio::test]
    async fn builds_from_minimal_config() {
        let state = AppState::from_config(&config(r#"{"tokens": ["t"], "guilds": ["1", "2"]}"#)).unwrap();
        assert_eq!(state.gateway.api_version, "9");
        assert!(state.dispatcher.tracker().is_empty());
    }

    #[tokio::test]
    async fn ignored_guilds_follow_destinations() {
        let state = AppState::from_config(&config(
            r#"{"tokens": ["t"], "guilds": ["1"], "ignoreConfiguredGuilds": true}"#,
        ))
        .unwrap();

        let ready = crate::gateway::GuildEvent::Ready {
            user: "u".into(),
            guilds: vec![crate::gateway::GuildSnapshot {
                id: "1".into(),
                name: "Mine".into(),
                vanity_code: "mine".into(),
            }],
        };
        state.dispatcher.handle(ready, "t");

        let update = crate::gateway::GuildEvent::Updated {
            guild: crate::gateway::GuildSnapshot {
                id: "1".into(),
                name: "Mine".into(),
                vanity_code: String::new(),
            },
            unavailable: false,
        };
        assert!(state.dispatcher.handle(update, "t").is_none());
    }
}
