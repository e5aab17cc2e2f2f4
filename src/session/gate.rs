//! Session validation against the account service

use crate::config::SessionConfig;
use crate::error::{CrosbyError, CrosbyResult};
use crate::session::identity::{IdentityFile, User};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Checked once per invocation, before any cache work
#[async_trait]
pub trait SessionGate: Send + Sync {
    /// Ok when the user may proceed. Registers unknown users on the fly.
    async fn validate(&self) -> CrosbyResult<()>;
}

/// Gate used when validation is turned off
pub struct DisabledGate;

#[async_trait]
impl SessionGate for DisabledGate {
    async fn validate(&self) -> CrosbyResult<()> {
        debug!("Session validation disabled");
        Ok(())
    }
}

/// Status field of a session reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Found,
    Created,
    Expired,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Reply of `GET /session/<id>` and `POST /session`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionReply {
    pub status: SessionStatus,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub error: String,
}

/// Decide what a reply means for this run.
///
/// Returns the user record to persist when the service sent a fresh copy.
pub fn interpret(reply: SessionReply, signup_url: &str) -> CrosbyResult<Option<User>> {
    match reply.status {
        SessionStatus::Found => Ok(Some(reply.user)),
        SessionStatus::Created => Ok(None),
        SessionStatus::Expired => Err(CrosbyError::SessionExpired {
            signup_url: signup_url.to_string(),
            account: reply.user.id,
        }),
        SessionStatus::Failed => Err(CrosbyError::Session(reply.error)),
        SessionStatus::Unknown => Err(CrosbyError::Session(
            "unexpected reply from session service".to_string(),
        )),
    }
}

/// Gate backed by the HTTP session service
pub struct HttpSessionGate {
    agent: ureq::Agent,
    api_url: String,
    signup_url: String,
    identity: IdentityFile,
}

impl HttpSessionGate {
    pub fn new(config: &SessionConfig, identity: IdentityFile) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            signup_url: config.signup_url.clone(),
            identity,
        }
    }

    /// Register this machine's user with the name and email git knows about
    async fn register(&self) -> CrosbyResult<User> {
        let name = git_config("user.name").await;
        let email = git_config("user.email").await;
        info!("Registering new user {:?} <{}>", name, email);

        let url = format!("{}/session", self.api_url);
        let agent = self.agent.clone();
        let reply: SessionReply = request(move || {
            agent
                .post(&url)
                .send_form([("name", name.as_str()), ("email", email.as_str())])
        })
        .await?;

        if reply.status == SessionStatus::Failed {
            return Err(CrosbyError::Session(reply.error));
        }

        self.identity.save(&reply.user).await?;
        Ok(reply.user)
    }

    async fn fetch(&self, user: &User) -> CrosbyResult<SessionReply> {
        let url = format!("{}/session/{}", self.api_url, user.id);
        let agent = self.agent.clone();
        request(move || agent.get(&url).call()).await
    }
}

#[async_trait]
impl SessionGate for HttpSessionGate {
    async fn validate(&self) -> CrosbyResult<()> {
        let user = match self.identity.load().await? {
            Some(user) => user,
            None => self.register().await?,
        };

        let reply = self.fetch(&user).await?;
        if let Some(fresh) = interpret(reply, &self.signup_url)? {
            let identity = self.identity.clone();
            tokio::spawn(async move {
                if let Err(e) = identity.save(&fresh).await {
                    debug!("Failed to refresh {}: {}", identity.path().display(), e);
                }
            });
        }
        Ok(())
    }
}

/// Run a blocking request on the blocking pool and decode the JSON reply
async fn request<F>(send: F) -> CrosbyResult<SessionReply>
where
    F: FnOnce() -> Result<ureq::http::Response<ureq::Body>, ureq::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut response = send().map_err(|e| CrosbyError::connectivity(e))?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| CrosbyError::connectivity(e))?;
        serde_json::from_str(&body).map_err(|e| CrosbyError::Session(e.to_string()))
    })
    .await
    .map_err(|e| CrosbyError::Internal(format!("session worker failed: {}", e)))?
}

/// `git config <key>`, empty when git or the key is unavailable
async fn git_config(key: &str) -> String {
    match Command::new("git").args(["config", key]).output().await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => String::new(),
    }
}

/// `ENV=development` skips validation
fn development_mode() -> bool {
    std::env::var("ENV").map(|v| v == "development").unwrap_or(false)
}

/// Whether runs with this configuration talk to the session service
pub fn gate_enabled(config: &SessionConfig) -> bool {
    config.enabled && !development_mode()
}

/// Pick the gate for this configuration
pub fn create_gate(config: &SessionConfig) -> Box<dyn SessionGate> {
    if !gate_enabled(config) {
        return Box::new(DisabledGate);
    }
    Box::new(HttpSessionGate::new(config, IdentityFile::new()))
}
