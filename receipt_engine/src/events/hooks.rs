use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventChannel, EventEmitter, FraudAlertEvent, Hook, OrderConfirmedEvent, VerdictEvent};

/// The emitters the verification API publishes through. Cloned into the API; empty vectors
/// mean nobody is listening and publishing is a no-op.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub verdict: Vec<EventEmitter<VerdictEvent>>,
    pub order_confirmed: Vec<EventEmitter<OrderConfirmedEvent>>,
    pub fraud_alert: Vec<EventEmitter<FraudAlertEvent>>,
}

/// The hooks a host registers at startup. Each installed hook becomes one event channel.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_verdict: Option<Hook<VerdictEvent>>,
    pub on_order_confirmed: Option<Hook<OrderConfirmedEvent>>,
    pub on_fraud_alert: Option<Hook<FraudAlertEvent>>,
}

impl EventHooks {
    pub fn on_verdict<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(VerdictEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_verdict = Some(Arc::new(f));
        self
    }

    pub fn on_order_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderConfirmedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_fraud_alert<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(FraudAlertEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_fraud_alert = Some(Arc::new(f));
        self
    }
}

pub struct EventHandlers {
    pub verdict: Option<EventChannel<VerdictEvent>>,
    pub order_confirmed: Option<EventChannel<OrderConfirmedEvent>>,
    pub fraud_alert: Option<EventChannel<FraudAlertEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            verdict: hooks.on_verdict.map(|f| EventChannel::new(buffer_size, f)),
            order_confirmed: hooks.on_order_confirmed.map(|f| EventChannel::new(buffer_size, f)),
            fraud_alert: hooks.on_fraud_alert.map(|f| EventChannel::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(channel) = &self.verdict {
            result.verdict.push(channel.subscribe());
        }
        if let Some(channel) = &self.order_confirmed {
            result.order_confirmed.push(channel.subscribe());
        }
        if let Some(channel) = &self.fraud_alert {
            result.fraud_alert.push(channel.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(channel) = self.verdict {
            tokio::spawn(channel.run());
        }
        if let Some(channel) = self.order_confirmed {
            tokio::spawn(channel.run());
        }
        if let Some(channel) = self.fraud_alert {
            tokio::spawn(channel.run());
        }
    }
}
