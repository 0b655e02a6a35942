use crate::discord_api::{ClaimReply, VanityApi};
use crate::error::AppError;
use crate::webhook::NotificationSink;
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

pub fn rate_limited(retry_after: f64) -> Result<ClaimReply, AppError> {
    Ok(ClaimReply::RateLimited {
        retry_after,
        message: "You are being rate limited.".into(),
    })
}

/// Replays canned replies in order and records every call
pub struct ScriptedApi {
    replies: Mutex<VecDeque<Result<ClaimReply, AppError>>>,
    calls: Mutex<Vec<(String, String, String, Instant)>>,
}

impl ScriptedApi {
    pub fn new(replies: Vec<Result<ClaimReply, AppError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (guild, code, token) per request
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(guild, code, token, _)| (guild.clone(), code.clone(), token.clone()))
            .collect()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|c| c.3).collect()
    }
}

impl VanityApi for ScriptedApi {
    fn claim_vanity<'a>(
        &'a self,
        guild_id: &'a str,
        code: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<ClaimReply, AppError>> {
        self.calls.lock().unwrap().push((
            guild_id.to_string(),
            code.to_string(),
            token.to_string(),
            Instant::now(),
        ));
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ClaimReply::Unexpected {
                status: 500,
                body: "script exhausted".into(),
            })
        });
        Box::pin(async move { reply })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }
}
