//! Operator command surface
//!
//! Maps pull/push control requests onto the [`RelayManager`] and exposes the
//! registry statistics snapshot. HTTP routing and authentication stay with the
//! embedding server: it deserializes [`ControlParams`] from the query string
//! and writes [`ControlResponse::status`] plus the JSON body back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::StreamRegistry;
use crate::relay::{RelayManager, RelayOperation};

/// Query parameters of a pull/push request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlParams {
    /// `"stop"` stops the session, anything else starts it
    #[serde(default)]
    pub oper: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub channel_key: String,
    /// Remote URL
    #[serde(default)]
    pub url: String,
}

impl ControlParams {
    fn is_complete(&self) -> bool {
        !self.app.is_empty() && !self.channel_key.is_empty() && !self.url.is_empty()
    }
}

/// Status code plus JSON payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResponse {
    pub status: u16,
    pub data: Value,
}

impl ControlResponse {
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            status: 200,
            data: data.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            data: Value::String(message.into()),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            data: Value::String(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Response body
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Control plane over the relay manager and the registry
pub struct ControlPlane {
    relays: Arc<RelayManager>,
    registry: Arc<StreamRegistry>,
}

impl ControlPlane {
    pub fn new(relays: Arc<RelayManager>, registry: Arc<StreamRegistry>) -> Self {
        Self { relays, registry }
    }

    /// `/control/pull?oper=start&app=live&channel_key=...&url=rtmp://...`
    pub async fn handle_pull(&self, params: &ControlParams) -> ControlResponse {
        self.handle(RelayOperation::Pull, params).await
    }

    /// `/control/push?oper=start&app=live&channel_key=...&url=rtmp://...`
    pub async fn handle_push(&self, params: &ControlParams) -> ControlResponse {
        self.handle(RelayOperation::Push, params).await
    }

    async fn handle(&self, operation: RelayOperation, params: &ControlParams) -> ControlResponse {
        tracing::debug!(
            operation = %operation,
            oper = %params.oper,
            app = %params.app,
            channel_key = %params.channel_key,
            url = %params.url,
            "Control request"
        );

        if !params.is_complete() {
            return ControlResponse::bad_request(format!(
                "control {operation} parameter error, please check them."
            ));
        }

        if params.oper == "stop" {
            match self
                .relays
                .stop(operation, &params.app, &params.channel_key)
                .await
            {
                Ok(()) => ControlResponse::ok(format!("{operation} url stop {} ok", params.url)),
                Err(err) => ControlResponse::bad_request(err.to_string()),
            }
        } else {
            match self
                .relays
                .start(operation, &params.app, &params.channel_key, &params.url)
                .await
            {
                Ok(()) => ControlResponse::ok(format!("{operation} url start {} ok", params.url)),
                Err(err) => ControlResponse::bad_request(format!("{operation} error={err}")),
            }
        }
    }

    /// `/stat/livestat`: publishers and players with traffic counters
    pub async fn live_stats(&self) -> ControlResponse {
        let stats = self.registry.live_stats().await;
        match serde_json::to_value(&stats) {
            Ok(data) => ControlResponse::ok(data),
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode live statistics");
                ControlResponse::internal_error("Get rtmp stream information error")
            }
        }
    }

    /// Relay session listing
    pub fn sessions(&self) -> ControlResponse {
        match serde_json::to_value(self.relays.sessions()) {
            Ok(data) => ControlResponse::ok(data),
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode relay sessions");
                ControlResponse::internal_error("Get relay session information error")
            }
        }
    }
}
