use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_RECONNECT: u8 = 7;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;

/// GUILDS | DIRECT_MESSAGES
pub const INTENTS: u64 = (1 << 0) | (1 << 12);

/// Guild lifecycle event delivered by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuildEvent {
    Ready {
        user: String,
        guilds: Vec<GuildSnapshot>,
    },
    Created(GuildSnapshot),
    Updated {
        guild: GuildSnapshot,
        unavailable: bool,
    },
    Deleted {
        guild_id: String,
        unavailable: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSnapshot {
    pub id: String,
    pub name: String,
    /// Empty when the guild has no vanity code
    pub vanity_code: String,
}

/// Raw gateway frame
#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct RawReady {
    user: RawUser,
    #[serde(default)]
    guilds: Vec<RawGuild>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGuildProperties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    vanity_url_code: Option<String>,
}

/// Guild object as sent by the gateway. Newer payloads nest the editable
/// fields under `properties`.
#[derive(Debug, Deserialize)]
struct RawGuild {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    vanity_url_code: Option<String>,
    #[serde(default)]
    unavailable: bool,
    #[serde(default)]
    properties: Option<RawGuildProperties>,
}

impl RawGuild {
    fn into_snapshot(self) -> GuildSnapshot {
        let properties = self.properties.unwrap_or_default();
        GuildSnapshot {
            id: self.id,
            name: self.name.or(properties.name).unwrap_or_default(),
            vanity_code: self
                .vanity_url_code
                .or(properties.vanity_url_code)
                .unwrap_or_default(),
        }
    }
}

pub fn identify_payload(token: &str, properties: &IdentifyProperties) -> Value {
    serde_json::json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "properties": properties,
            "intents": INTENTS,
            "compress": false,
        }
    })
}

pub fn heartbeat_payload(sequence: Option<u64>) -> Value {
    serde_json::json!({ "op": OP_HEARTBEAT, "d": sequence })
}

/// Turn a dispatch frame into a [`GuildEvent`]. Dispatch types that carry no
/// guild lifecycle information come back as `None`.
///
/// Guilds in an outage arrive as `{"id", "unavailable": true}` stubs with no
/// vanity data. They are dropped from READY, and an unavailable GUILD_CREATE
/// decodes to `None`, so a stub never overwrites a known code.
pub fn decode_dispatch(kind: &str, data: Value) -> Result<Option<GuildEvent>, serde_json::Error> {
    let event = match kind {
        "READY" => {
            let ready: RawReady = serde_json::from_value(data)?;
            GuildEvent::Ready {
                user: ready.user.username,
                guilds: ready
                    .guilds
                    .into_iter()
                    .filter(|guild| !guild.unavailable)
                    .map(RawGuild::into_snapshot)
                    .collect(),
            }
        }
        "GUILD_CREATE" => {
            let guild: RawGuild = serde_json::from_value(data)?;
            if guild.unavailable {
                return Ok(None);
            }
            GuildEvent::Created(guild.into_snapshot())
        }
        "GUILD_UPDATE" => {
            let guild: RawGuild = serde_json::from_value(data)?;
            let unavailable = guild.unavailable;
            GuildEvent::Updated {
                guild: guild.into_snapshot(),
                unavailable,
            }
        }
        "GUILD_DELETE" => {
            let guild: RawGuild = serde_json::from_value(data)?;
            GuildEvent::Deleted {
                guild_id: guild.id,
                unavailable: guild.unavailable,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}
