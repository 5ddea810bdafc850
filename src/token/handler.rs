//! Response Handler
//!
//! Turns the outcome of a token exchange into credential updates, a node
//! status, and a dispatch decision for the host.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ErrorPayload, OAuth2Error, OAuth2Result};
use crate::telemetry::{Logger, TokenLogContext};
use crate::token::CredentialStore;
use crate::types::{
    expire_time_from, ErrorHandling, NodeConfig, ProviderResponse, TokenResponse,
    DEFAULT_EXPIRES_IN,
};

/// Message field for response headers.
pub const HEADERS_FIELD: &str = "headers";

/// Node output port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Primary,
    Secondary,
}

/// What the host should do with the message of a trigger.
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    /// Send on an output.
    Send { output: Output, message: Value },
    /// Report through the host's node error channel.
    Escalate { message: Value, error: ErrorPayload },
    /// Produce no output.
    Drop,
}

impl Dispatch {
    /// Message carried by the dispatch, if any.
    pub fn message(&self) -> Option<&Value> {
        match self {
            Self::Send { message, .. } | Self::Escalate { message, .. } => Some(message),
            Self::Drop => None,
        }
    }
}

/// Status indicator color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFill {
    Green,
    Yellow,
    Red,
}

/// Node status indicator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    pub fill: StatusFill,
    pub text: String,
}

impl NodeStatus {
    pub fn new(fill: StatusFill, text: impl Into<String>) -> Self {
        Self {
            fill,
            text: text.into(),
        }
    }
}

/// Host callback for the node status indicator.
#[cfg_attr(test, mockall::automock)]
pub trait StatusReporter: Send + Sync {
    /// Show a status.
    fn set_status(&self, status: NodeStatus);

    /// Return to idle.
    fn clear_status(&self);
}

/// Status reporter for hosts without an indicator.
pub struct NoOpStatusReporter;

impl StatusReporter for NoOpStatusReporter {
    fn set_status(&self, _status: NodeStatus) {}
    fn clear_status(&self) {}
}

/// Applies exchange outcomes for one node.
pub struct ResponseHandler {
    config: Arc<NodeConfig>,
    store: Arc<dyn CredentialStore>,
    status: Arc<dyn StatusReporter>,
    logger: Arc<dyn Logger>,
}

impl ResponseHandler {
    /// Create new handler.
    pub fn new(
        config: Arc<NodeConfig>,
        store: Arc<dyn CredentialStore>,
        status: Arc<dyn StatusReporter>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            config,
            store,
            status,
            logger,
        }
    }

    /// Persist the token and attach the response to the message.
    ///
    /// A refresh token already on record survives a response without one.
    pub async fn handle_success(
        &self,
        node_id: &str,
        response: &ProviderResponse,
        message: Value,
    ) -> OAuth2Result<Dispatch> {
        let context = TokenLogContext::new()
            .node_id(node_id)
            .operation("handle_success");

        let lifetime = self.store_token(node_id, response).await?;

        let mut fields = into_object(message);
        fields.insert(self.config.container.clone(), response.body.clone());
        if self.config.include_response_headers {
            let headers = response
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            fields.insert(HEADERS_FIELD.to_string(), Value::Object(headers));
        }

        let status = if response.status == 200 {
            NodeStatus::new(StatusFill::Green, format!("HTTP {}, ok", response.status))
        } else {
            NodeStatus::new(StatusFill::Yellow, format!("HTTP {}, nok", response.status))
        };
        self.show(status);

        self.logger.info(
            &format!("Token stored, expires in {}s", lifetime),
            &context,
        );

        Ok(Dispatch::Send {
            output: Output::Primary,
            message: Value::Object(fields),
        })
    }

    /// Read-modify-write the credential record with a fresh token.
    ///
    /// Returns the lifetime applied, in seconds.
    pub async fn store_token(&self, node_id: &str, response: &ProviderResponse) -> OAuth2Result<u64> {
        let token = response.token();
        let lifetime = token
            .as_ref()
            .map_or(DEFAULT_EXPIRES_IN, TokenResponse::lifetime_secs);

        let mut credentials = self.store.get(node_id).await?.unwrap_or_default();
        match token.as_ref().and_then(|t| t.access_token.as_ref()) {
            Some(access_token) if !access_token.is_empty() => {
                credentials.access_token = Some(access_token.clone());
            }
            _ => self.logger.warn(
                "Token endpoint response carries no access_token",
                &TokenLogContext::new().node_id(node_id).operation("store_token"),
            ),
        }
        if let Some(refresh_token) = token
            .as_ref()
            .and_then(|t| t.refresh_token.as_ref())
            .filter(|t| !t.is_empty())
        {
            credentials.refresh_token = Some(refresh_token.clone());
        }
        credentials.expire_time = Some(expire_time_from(Utc::now().timestamp(), lifetime));
        credentials.oauth2_response = Some(response.body.clone());
        self.store.put(node_id, credentials).await?;

        Ok(lifetime)
    }

    /// Show and log a failure without producing a message.
    pub fn report_failure(&self, node_id: &str, error: &OAuth2Error) -> ErrorPayload {
        let context = TokenLogContext::new()
            .node_id(node_id)
            .operation("handle_failure")
            .extra("error_code", error.error_code());

        let payload = error.to_payload();
        self.show(NodeStatus::new(StatusFill::Red, payload.status_text()));
        self.logger.error(&payload.status_text(), &context);
        payload
    }

    /// Attach the error to the message and route it per the error policy.
    ///
    /// Never touches stored credentials.
    pub fn handle_failure(&self, node_id: &str, error: &OAuth2Error, message: Value) -> Dispatch {
        let payload = self.report_failure(node_id, error);
        let mut fields = into_object(message);
        fields.insert(self.config.error_field().to_string(), payload.to_value());
        let message = Value::Object(fields);

        match self.config.error_handling {
            ErrorHandling::Inline => Dispatch::Send {
                output: Output::Primary,
                message,
            },
            ErrorHandling::OtherOutput => Dispatch::Send {
                output: Output::Secondary,
                message,
            },
            ErrorHandling::AllInOne | ErrorHandling::Throw => Dispatch::Escalate {
                message,
                error: payload,
            },
        }
    }

    /// Show a status and schedule its reset.
    pub fn show(&self, status: NodeStatus) {
        self.status.set_status(status);
        schedule_reset(self.status.clone(), self.config.status_reset_after);
    }
}

/// Clear the status after `delay`. A zero delay keeps the status.
fn schedule_reset(status: Arc<dyn StatusReporter>, delay: Duration) {
    if delay.is_zero() {
        return;
    }
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            status.clear_status();
        });
    }
}

/// Message as an object. Non-object messages end up under `payload`.
pub(crate) fn into_object(message: Value) -> Map<String, Value> {
    match message {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    }
}
