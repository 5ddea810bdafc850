//! OAuth2 Node
//!
//! Host-facing entry points combining the options builder, proxy resolver,
//! executor and response handler.

use serde_json::Value;
use std::sync::Arc;

use crate::builders::build_options;
use crate::core::{
    resolve_proxy, FlightGuards, HttpTransport, ReqwestHttpTransport, TokenRequestExecutor,
};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::telemetry::{Logger, NoOpLogger, NoOpMetrics, TokenLogContext, TokenMetrics};
use crate::token::handler::into_object;
use crate::token::{
    CredentialStore, Dispatch, NoOpStatusReporter, Output, ResponseHandler, StatusReporter,
    TokenLifecycle,
};
use crate::types::{
    EnvironmentSnapshot, NodeConfig, ProviderResponse, RequestOverride, TokenSummary,
    OVERRIDE_FIELD,
};

/// Field the lifecycle node emits its token summary under.
pub const PAYLOAD_FIELD: &str = "payload";

/// Collaborators a node receives from its host.
#[derive(Clone)]
pub struct NodeServices {
    pub store: Arc<dyn CredentialStore>,
    pub transport: Arc<dyn HttpTransport>,
    pub status: Arc<dyn StatusReporter>,
    pub logger: Arc<dyn Logger>,
    pub metrics: Arc<dyn TokenMetrics>,
    /// Exchange guards, shared by nodes that share a credential store.
    pub guards: FlightGuards,
    pub env: EnvironmentSnapshot,
}

impl NodeServices {
    /// Create services over a store and transport, with silent telemetry.
    pub fn new(store: Arc<dyn CredentialStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store,
            transport,
            status: Arc::new(NoOpStatusReporter),
            logger: Arc::new(NoOpLogger),
            metrics: Arc::new(NoOpMetrics),
            guards: FlightGuards::new(),
            env: EnvironmentSnapshot::new(),
        }
    }

    /// Services over the reqwest transport.
    pub fn with_reqwest(store: Arc<dyn CredentialStore>) -> OAuth2Result<Self> {
        Ok(Self::new(store, Arc::new(ReqwestHttpTransport::new()?)))
    }

    pub fn with_status(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn TokenMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_guards(mut self, guards: FlightGuards) -> Self {
        self.guards = guards;
        self
    }

    pub fn with_environment(mut self, env: EnvironmentSnapshot) -> Self {
        self.env = env;
        self
    }
}

/// A configured token node.
pub struct OAuth2Node {
    config: Arc<NodeConfig>,
    services: NodeServices,
    executor: Arc<TokenRequestExecutor>,
    handler: Arc<ResponseHandler>,
}

impl OAuth2Node {
    /// Create new node.
    pub fn new(config: NodeConfig, services: NodeServices) -> Self {
        let config = Arc::new(config);
        let executor = Arc::new(TokenRequestExecutor::new(
            services.transport.clone(),
            services.logger.clone(),
            services.metrics.clone(),
        ));
        let handler = Arc::new(ResponseHandler::new(
            config.clone(),
            services.store.clone(),
            services.status.clone(),
            services.logger.clone(),
        ));
        Self {
            config,
            services,
            executor,
            handler,
        }
    }

    /// Get the node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Handle one inbound message.
    ///
    /// Strips the `oauth2Request` override, runs one exchange and shapes the
    /// outbound message. Every failure is routed through the error policy.
    pub async fn on_input(&self, message: Value) -> Dispatch {
        let node_id = self.config.id.as_str();
        let mut fields = into_object(message);
        let raw_override = fields.remove(OVERRIDE_FIELD).filter(|v| !v.is_null());
        let message = Value::Object(fields);

        let request = match raw_override
            .map(|v| RequestOverride::parse(v, self.config.grant_type))
            .transpose()
        {
            Ok(request) => request,
            Err(e) => {
                return self
                    .handler
                    .handle_failure(node_id, &OAuth2Error::from(e), message)
            }
        };

        let _guard = self.services.guards.acquire(node_id).await;
        let outcome = match self.exchange(request.as_ref()).await {
            Ok(response) => {
                self.handler
                    .handle_success(node_id, &response, message.clone())
                    .await
            }
            Err(e) => Err(e),
        };

        outcome.unwrap_or_else(|e| self.handler.handle_failure(node_id, &e, message))
    }

    async fn exchange(&self, request: Option<&RequestOverride>) -> OAuth2Result<ProviderResponse> {
        let node_id = self.config.id.as_str();
        let credentials = self.services.store.get(node_id).await?;
        let mut descriptor = build_options(&self.config, request, credentials.as_ref())?;
        descriptor.proxy = resolve_proxy(
            &self.config,
            &self.services.env,
            self.services.logger.as_ref(),
        );

        self.services.logger.debug(
            "Token request built",
            &TokenLogContext::new()
                .node_id(node_id)
                .operation("on_input")
                .grant_type(descriptor.grant_type.as_str()),
        );
        self.executor.execute(node_id, &descriptor).await
    }

    /// Lifecycle-driven variant of this node.
    pub fn lifecycle(&self) -> LifecycleNode {
        let proxy = resolve_proxy(
            &self.config,
            &self.services.env,
            self.services.logger.as_ref(),
        );
        let lifecycle = TokenLifecycle::new(
            self.config.clone(),
            self.services.store.clone(),
            self.executor.clone(),
            self.handler.clone(),
            self.services.metrics.clone(),
            self.services.logger.clone(),
        )
        .with_proxy(proxy);
        LifecycleNode {
            node_id: self.config.id.clone(),
            lifecycle,
            handler: self.handler.clone(),
        }
    }
}

/// Node emitting the current token of a [`TokenLifecycle`] on every trigger.
pub struct LifecycleNode {
    node_id: String,
    lifecycle: TokenLifecycle,
    handler: Arc<ResponseHandler>,
}

impl LifecycleNode {
    /// Underlying state machine.
    pub fn lifecycle(&self) -> &TokenLifecycle {
        &self.lifecycle
    }

    /// Exchange the code delivered by a consent.
    pub async fn obtain(&self, code: &str) -> OAuth2Result<TokenSummary> {
        self.lifecycle.obtain(code).await.map_err(|e| {
            self.report(&e);
            e
        })
    }

    /// Emit the current token under `payload`.
    ///
    /// Without a usable token the trigger produces no output.
    pub async fn on_input(&self, message: Value) -> Dispatch {
        match self.lifecycle.trigger().await {
            Ok(summary) => Dispatch::Send {
                output: Output::Primary,
                message: with_payload(message, &summary),
            },
            Err(e) => {
                self.report(&e);
                Dispatch::Drop
            }
        }
    }

    fn report(&self, error: &OAuth2Error) {
        self.handler.report_failure(&self.node_id, error);
    }
}

fn with_payload(message: Value, summary: &TokenSummary) -> Value {
    let mut fields = into_object(message);
    fields.insert(
        PAYLOAD_FIELD.to_string(),
        serde_json::to_value(summary).unwrap_or(Value::Null),
    );
    Value::Object(fields)
}
