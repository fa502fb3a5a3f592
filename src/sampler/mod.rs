//! Location stream adapters.
//!
//! A [`GeoSampler`] pushes [`SamplerMessage`]s into the channel it is given
//! until its [`SamplerSubscription`] is stopped. Faults travel on the same
//! channel and never end a subscription.

pub mod manual;
pub mod simulated;

pub use manual::ManualSampler;
pub use simulated::{SimulatedSampler, SimulatedSamplerConfig};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::geo::GeoSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SamplingFaultKind {
    PermissionDenied,
    SignalLost,
    Timeout,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SamplingFault {
    pub kind: SamplingFaultKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl SamplingFault {
    pub fn new(kind: SamplingFaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SamplerMessage {
    Sample(GeoSample),
    Fault(SamplingFault),
}

pub type SampleSink = mpsc::UnboundedSender<SamplerMessage>;

pub trait GeoSampler: Send + Sync {
    fn start(&self, sink: SampleSink) -> Result<SamplerSubscription>;
}

/// Live subscription to a sampler. Stopping is synchronous and idempotent;
/// dropping the subscription stops it too.
pub struct SamplerSubscription {
    cancel_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl SamplerSubscription {
    pub fn new(cancel_token: CancellationToken, handle: Option<JoinHandle<()>>) -> Self {
        Self {
            cancel_token: Some(cancel_token),
            handle,
        }
    }

    pub fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SamplerSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_is_idempotent() {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move { task_token.cancelled().await });
        let mut subscription = SamplerSubscription::new(token.clone(), Some(handle));

        assert!(!token.is_cancelled());
        subscription.stop();
        subscription.stop();
        assert!(token.is_cancelled());
    }
}
