//! Async event loop around a [`XferManager`].
//!
//! The manager itself is synchronous. The driver owns it on one task, feeds
//! it inbound messages and local calls from a channel, and runs the periodic
//! tick at the configured interval.

use crate::manager::XferManager;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use xfer_transport::{Inbound, MessageSystem};

/// Local call run against the manager on the driver task.
pub type ManagerCall<M> = Box<dyn FnOnce(&mut XferManager<M>) + Send>;

/// Work for the driver.
pub enum DriverInput<M: MessageSystem> {
    /// Message delivered by the outer system
    Inbound(Inbound),
    /// Local call (request, abort, introspection)
    Call(ManagerCall<M>),
}

impl<M: MessageSystem> DriverInput<M> {
    /// Wrap a closure as a call.
    pub fn call<F>(f: F) -> Self
    where
        F: FnOnce(&mut XferManager<M>) + Send + 'static,
    {
        Self::Call(Box::new(f))
    }
}

/// Runs a manager until its input channel closes.
pub struct XferDriver<M: MessageSystem> {
    manager: XferManager<M>,
}

impl<M: MessageSystem> XferDriver<M> {
    /// Wrap `manager`.
    #[must_use]
    pub fn new(manager: XferManager<M>) -> Self {
        Self { manager }
    }

    /// Process inputs and ticks until every sender of `rx` is dropped,
    /// then hand the manager back.
    pub async fn run(mut self, mut rx: mpsc::Receiver<DriverInput<M>>) -> XferManager<M> {
        let period = self.manager.config().tick_interval();
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Xfer driver started, tick every {:?}", period);

        loop {
            tokio::select! {
                input = rx.recv() => {
                    match input {
                        Some(DriverInput::Inbound(inbound)) => self.manager.dispatch(inbound),
                        Some(DriverInput::Call(call)) => call(&mut self.manager),
                        None => break,
                    }
                }

                _ = tick.tick() => {
                    self.manager.retransmit_unacked_packets();
                }
            }
        }

        self.manager.log_host_status();
        tracing::info!("Xfer driver stopped");
        self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Completion;
    use crate::config::XferConfig;
    use std::net::SocketAddr;
    use xfer_files::LocationKind;
    use xfer_transport::{CircuitInfo, RecordingMessageSystem, XferMessage};

    #[tokio::test]
    async fn test_driver_runs_calls_and_returns_manager() {
        let peer = SocketAddr::from(([10, 0, 0, 9], 13000));
        let mut transport = RecordingMessageSystem::new();
        transport.add_circuit(peer, CircuitInfo::untrusted());
        let mut config = XferConfig::default();
        config.tick_interval_ms = 5;
        let manager = XferManager::new(transport, config).unwrap();

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(XferDriver::new(manager).run(rx));

        let (done, mut done_rx) = Completion::channel();
        tx.send(DriverInput::call(move |m: &mut XferManager<RecordingMessageSystem>| {
            let id = m.request_memory("driven_1.tmp", LocationKind::Cache, peer, false, Some(done), false);
            m.abort_request_by_id(id, crate::error::ErrorCode::Other(-1));
        }))
        .await
        .unwrap();

        let outcome = done_rx.recv().await.unwrap();
        assert!(!outcome.is_ok());

        drop(tx);
        let mut manager = handle.await.unwrap();
        assert!(manager.receive_list().is_empty());
        let sent = manager.transport_mut().drain_messages();
        assert!(matches!(sent[0].1, XferMessage::Request(_)));
    }
}
