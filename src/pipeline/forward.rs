use tokio::{sync::mpsc, task::JoinHandle};

use crate::outbound::{Outbound, SendKind};

/// Hands recognized reports from the (synchronous) receive path to the send
/// board. A single task drains the queue, so forwards keep arrival order and a
/// slow or failing write never stalls the receive loop.
pub struct AutoForwarder {
    outbound: Outbound,
    queue: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl AutoForwarder {
    /// Must be called from within a tokio runtime.
    pub fn spawn(outbound: Outbound) -> Self {
        let (queue, mut pending) = mpsc::unbounded_channel::<String>();
        let worker = outbound.clone();
        let task = tokio::spawn(async move {
            while let Some(text) = pending.recv().await {
                if let Err(err) = worker.send(&text, SendKind::AutoForward).await {
                    log::warn!("Auto-forward of {text} failed: {err}");
                }
            }
        });

        Self {
            outbound,
            queue,
            task,
        }
    }

    /// Label of the board reports are forwarded to.
    pub fn board(&self) -> &str {
        self.outbound.session().label()
    }

    pub fn is_available(&self) -> bool {
        self.outbound.is_available()
    }

    pub fn forward(&self, text: &str) {
        if self.queue.send(text.to_string()).is_err() {
            log::error!("Auto-forward worker is gone, dropping {text}");
        }
    }
}

impl Drop for AutoForwarder {
    fn drop(&mut self) {
        self.task.abort();
    }
}
