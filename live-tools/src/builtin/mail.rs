//! Outbound mail plugin.

use std::sync::Arc;
use std::time::Duration;
use std::{env, fmt};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use live_primitives::{Declarations, FunctionDeclaration, ParameterSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::http_client::{HyperClient, build_https_client, post_json, sanitize_endpoint};
use crate::plugin::{Arguments, PluginError, PluginResult, ToolPlugin};

/// Operation name advertised to the model.
pub const OPERATION: &str = "send_email";

/// Environment variable holding the sender address.
pub const MAIL_SENDER_ENV: &str = "MAIL_SENDER";
/// Environment variable holding the sender's app password.
pub const MAIL_APP_PASSWORD_ENV: &str = "MAIL_APP_PASSWORD";
/// Environment variable holding the mail relay endpoint.
pub const MAIL_RELAY_URL_ENV: &str = "MAIL_RELAY_URL";

const SERVICE: &str = "mail relay";

/// Configuration for the mail plugin.
#[derive(Clone)]
pub struct MailConfig {
    sender: Option<String>,
    password: Option<String>,
    relay_url: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("sender", &self.sender)
            .field("password_set", &self.password.is_some())
            .field("relay_url", &self.relay_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MailConfig {
    /// Creates an empty configuration; sends fail until credentials are set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sender: None,
            password: None,
            relay_url: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Loads credentials and the relay endpoint from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::new();
        cfg.sender = non_empty_env(MAIL_SENDER_ENV);
        cfg.password = non_empty_env(MAIL_APP_PASSWORD_ENV);
        cfg.relay_url = non_empty_env(MAIL_RELAY_URL_ENV);
        cfg
    }

    /// Supplies the sender credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        sender: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.sender = Some(sender.into());
        self.password = Some(password.into());
        self
    }

    /// Overrides the relay endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Configuration`] if the URL is not an absolute
    /// http(s) URL.
    pub fn with_relay_url(mut self, url: impl AsRef<str>) -> PluginResult<Self> {
        self.relay_url = Some(sanitize_endpoint(url.as_ref(), SERVICE)?);
        Ok(self)
    }

    /// Sets the relay request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn credentials(&self) -> PluginResult<MailCredentials> {
        match (&self.sender, &self.password) {
            (Some(sender), Some(password)) => Ok(MailCredentials {
                sender: sender.clone(),
                password: password.clone(),
            }),
            _ => Err(PluginError::configuration(format!(
                "mail credentials are missing; set {MAIL_SENDER_ENV} and {MAIL_APP_PASSWORD_ENV}"
            ))),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Sender identity used to authenticate with the transport.
#[derive(Clone)]
pub struct MailCredentials {
    /// Sender address.
    pub sender: String,
    /// App password or token for the sender.
    pub password: String,
}

impl fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailCredentials")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

/// Message handed to a [`MailTransport`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Transport acknowledgement for a sent message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailReceipt {
    /// Identifier assigned by the transport, if it reports one.
    pub message_id: Option<String>,
}

/// Delivers messages on behalf of the mail plugin.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Sends `mail` authenticated as `credentials`.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the transport is misconfigured or the
    /// delivery fails.
    async fn send(
        &self,
        credentials: &MailCredentials,
        mail: &OutgoingMail,
    ) -> PluginResult<MailReceipt>;
}

/// Transport that hands messages to an HTTP mail relay.
pub struct HttpMailTransport {
    client: HyperClient,
    relay_url: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for HttpMailTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMailTransport")
            .field("relay_url", &self.relay_url)
            .finish_non_exhaustive()
    }
}

impl HttpMailTransport {
    /// Creates a transport for the relay named in `config`.
    #[must_use]
    pub fn new(config: &MailConfig) -> Self {
        Self {
            client: build_https_client(),
            relay_url: config.relay_url.clone(),
            timeout: config.timeout,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RelayReceipt {
    #[serde(default, alias = "messageId", alias = "message_id")]
    id: Option<String>,
}

fn parse_receipt(bytes: &[u8]) -> RelayReceipt {
    serde_json::from_slice(bytes).unwrap_or_else(|err| {
        debug!(error = %err, body_len = bytes.len(), "mail relay receipt not understood");
        RelayReceipt::default()
    })
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(
        &self,
        credentials: &MailCredentials,
        mail: &OutgoingMail,
    ) -> PluginResult<MailReceipt> {
        let relay = self.relay_url.as_deref().ok_or_else(|| {
            PluginError::configuration(format!("mail relay is missing; set {MAIL_RELAY_URL_ENV}"))
        })?;

        let token = STANDARD.encode(format!("{}:{}", credentials.sender, credentials.password));
        let authorization = format!("Basic {token}");
        let bytes = post_json(
            &self.client,
            relay,
            Some(authorization.as_str()),
            mail,
            self.timeout,
            SERVICE,
        )
        .await?;

        Ok(MailReceipt {
            message_id: parse_receipt(&bytes).id,
        })
    }
}

/// Plugin answering `send_email` calls.
pub struct MailPlugin {
    config: MailConfig,
    transport: Arc<dyn MailTransport>,
}

impl fmt::Debug for MailPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailPlugin")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MailPlugin {
    /// Creates the plugin using the HTTP relay transport.
    #[must_use]
    pub fn new(config: MailConfig) -> Self {
        let transport = Arc::new(HttpMailTransport::new(&config));
        Self { config, transport }
    }

    /// Creates the plugin with a custom transport.
    #[must_use]
    pub fn with_transport(config: MailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl ToolPlugin for MailPlugin {
    fn describe(&self) -> PluginResult<Declarations> {
        let declaration = FunctionDeclaration::builder(OPERATION)
            .description("Send an email to a recipient with a subject and plain-text body.")
            .parameters(
                ParameterSchema::object()
                    .required_property(
                        "to",
                        json!({ "type": "string", "description": "Recipient email address" }),
                    )
                    .required_property(
                        "subject",
                        json!({ "type": "string", "description": "Subject line" }),
                    )
                    .required_property(
                        "body",
                        json!({ "type": "string", "description": "Plain-text message body" }),
                    ),
            )
            .build()
            .map_err(|err| PluginError::describe(err.to_string()))?;
        Ok(declaration.into())
    }

    async fn execute(&self, args: Arguments) -> PluginResult<Value> {
        let to = args.require_str("to")?.trim();
        if !to.contains('@') {
            return Err(PluginError::invalid_argument(
                "to",
                format!("`{to}` is not an email address"),
            ));
        }
        let subject = args.require_str("subject")?;
        let body = args.require_str("body")?;

        let credentials = self.config.credentials()?;
        let mail = OutgoingMail {
            from: credentials.sender.clone(),
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        };

        let receipt = self.transport.send(&credentials, &mail).await?;
        info!(to = %mail.to, message_id = ?receipt.message_id, "email sent");

        Ok(json!({
            "status": "sent",
            "to": mail.to,
            "subject": mail.subject,
            "message_id": receipt.message_id,
        }))
    }
}
