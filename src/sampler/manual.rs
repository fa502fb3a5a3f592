use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::{GeoSampler, SampleSink, SamplerMessage, SamplerSubscription};

/// Sampler fed from outside: the platform location callback (or the host's
/// `sample` command) calls [`ManualSampler::push`]. Every live subscription
/// receives every message.
#[derive(Clone, Default)]
pub struct ManualSampler {
    subscribers: Arc<Mutex<Vec<(SampleSink, CancellationToken)>>>,
}

impl ManualSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many subscriptions received the message.
    pub fn push(&self, message: SamplerMessage) -> usize {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|(sink, token)| !token.is_cancelled() && !sink.is_closed());
        subscribers
            .iter()
            .filter(|(sink, _)| sink.send(message.clone()).is_ok())
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        let subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers
            .iter()
            .filter(|(sink, token)| !token.is_cancelled() && !sink.is_closed())
            .count()
    }
}

impl GeoSampler for ManualSampler {
    fn start(&self, sink: SampleSink) -> Result<SamplerSubscription> {
        let token = CancellationToken::new();
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push((sink, token.clone()));
        Ok(SamplerSubscription::new(token, None))
    }
}
