//! Stateless pub-sub plumbing for engine events.
//!
//! Subscribers register an async hook; the channel fans every published event out to it on its
//! own task, so a slow notification hook never blocks verdict processing. Hooks receive only
//! the event value, never engine state.

use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Hook<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventChannel<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    hook: Hook<E>,
}

impl<E: Send + Sync + 'static> EventChannel<E> {
    pub fn new(buffer_size: usize, hook: Hook<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { receiver, sender, hook }
    }

    pub fn subscribe(&self) -> EventEmitter<E> {
        EventEmitter::new(self.sender.clone())
    }

    /// Dispatches events until the last emitter is dropped, then drains the in-flight hook
    /// invocations before returning.
    pub async fn run(mut self) {
        debug!("📬️ Event channel started");
        // Drop our own sender so closing is driven purely by the emitters.
        drop(self.sender);
        let mut jobs = JoinSet::new();
        while let Some(event) = self.receiver.recv().await {
            trace!("📬️ Dispatching event");
            let hook = Arc::clone(&self.hook);
            jobs.spawn(async move { (hook)(event).await });
            // Reap finished hooks as we go so the set does not grow unboundedly.
            while jobs.try_join_next().is_some() {}
        }
        while let Some(res) = jobs.join_next().await {
            if let Err(e) = res {
                warn!("📬️ Event hook panicked: {e}");
            }
        }
        debug!("📬️ Event channel has shut down");
    }
}

#[derive(Clone)]
pub struct EventEmitter<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventEmitter<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn emit(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to emit event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn every_emitted_event_reaches_the_hook() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let sum = total.clone();
        let hook = Arc::new(move |v: u64| {
            let sum = sum.clone();
            Box::pin(async move {
                sum.fetch_add(v, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let channel = EventChannel::new(2, hook);
        let emitter_1 = channel.subscribe();
        let emitter_2 = channel.subscribe();
        tokio::spawn(async move {
            for i in 0..5u64 {
                emitter_1.emit(i * 2 + 1).await;
            }
        });
        tokio::spawn(async move {
            for i in 0..5u64 {
                emitter_2.emit(i * 2).await;
            }
        });
        channel.run().await;
        assert_eq!(total.load(Ordering::SeqCst), 45);
    }
}
