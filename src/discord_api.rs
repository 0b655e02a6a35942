use crate::error::AppError;
use futures_util::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;

/// Interpreted reply to a vanity claim request
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimReply {
    Claimed { code: String, uses: u64 },
    /// `retry_after` is fractional seconds as sent by the server
    RateLimited { retry_after: f64, message: String },
    Rejected { status: u16, reason: String },
    Unexpected { status: u16, body: String },
}

/// Anything that can issue an authenticated vanity claim
pub trait VanityApi: Send + Sync {
    fn claim_vanity<'a>(
        &'a self,
        guild_id: &'a str,
        code: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<ClaimReply, AppError>>;
}

#[derive(Debug, Default, Deserialize)]
struct VanityCode {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    uses: u64,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    #[serde(default)]
    message: Option<String>,
}

/// REST client for the guild vanity endpoint
pub struct DiscordClient {
    base_url: String,
    api_version: String,
    user_agent: String,
    http: Client,
}

impl DiscordClient {
    pub fn new(base_url: String, api_version: String, user_agent: String) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version,
            user_agent,
            http,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v{}{}", self.base_url, self.api_version, path)
    }

    /// PATCH the destination's vanity code. Only network and body-decoding
    /// failures come back as `Err`; every HTTP status maps to a [`ClaimReply`].
    pub async fn claim(&self, guild_id: &str, code: &str, token: &str) -> Result<ClaimReply, AppError> {
        let resp = self
            .http
            .patch(self.api_url(&format!("/guilds/{guild_id}/vanity-url")))
            .header(AUTHORIZATION, token)
            .header(USER_AGENT, &self.user_agent)
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;

        interpret_claim_response(status, &body)
    }
}

impl VanityApi for DiscordClient {
    fn claim_vanity<'a>(
        &'a self,
        guild_id: &'a str,
        code: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<ClaimReply, AppError>> {
        Box::pin(self.claim(guild_id, code, token))
    }
}

/// Map a claim response status and body onto a [`ClaimReply`].
///
/// A 429 without a readable `retry_after` is an error since there is no way
/// to tell how long to wait.
pub fn interpret_claim_response(status: u16, body: &str) -> Result<ClaimReply, AppError> {
    match status {
        200..=299 => {
            let claimed: VanityCode = if body.trim().is_empty() {
                VanityCode::default()
            } else {
                serde_json::from_str(body).unwrap_or_else(|e| {
                    tracing::warn!("Failed to decode claim response body: {e}");
                    VanityCode::default()
                })
            };
            Ok(ClaimReply::Claimed {
                code: claimed.code.unwrap_or_default(),
                uses: claimed.uses,
            })
        }
        429 => {
            let limited: RateLimitBody = serde_json::from_str(body)?;
            Ok(ClaimReply::RateLimited {
                retry_after: limited.retry_after,
                message: limited.message,
            })
        }
        400..=499 => {
            let reason = serde_json::from_str::<FailureBody>(body)
                .ok()
                .and_then(|f| f.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| truncate(body.trim(), 200));
            Ok(ClaimReply::Rejected { status, reason })
        }
        _ => Ok(ClaimReply::Unexpected {
            status,
            body: truncate(body, 200),
        }),
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
