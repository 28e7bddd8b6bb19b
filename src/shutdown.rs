use {
    async_channel::{Receiver, Sender},
    log::{info, warn},
    std::{future::Future, io},
    tokio::signal::{self, unix::SignalKind},
};

/// Fires the shutdown latch. Dropping the trigger fires it as well.
pub struct Trigger {
    tx: Sender<()>,
}

/// Observes the shutdown latch. Cheap to clone; every clone sees the same latch.
#[derive(Clone)]
pub struct Shutdown {
    rx: Receiver<()>,
}

pub fn channel() -> (Trigger, Shutdown) {
    let (tx, rx) = async_channel::bounded(1);
    (Trigger { tx }, Shutdown { rx })
}

impl Trigger {
    pub fn fire(&self) {
        self.tx.close();
    }
}

impl Shutdown {
    /// Resolves once shutdown has been requested.
    pub async fn wait(&self) {
        // Nothing is ever sent; recv only returns once the channel is closed.
        let _ = self.rx.recv().await;
    }

    pub fn is_requested(&self) -> bool {
        self.rx.is_closed()
    }
}

/// Waits for SIGINT or SIGTERM, then fires `trigger`.
pub async fn on_signal(trigger: Trigger) {
    let mut terminate = match signal::unix::signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            None
        }
    };

    tokio::select! {
        _ = interrupted(signal::ctrl_c()) => {}
        _ = async {
            match terminate.as_mut() {
                Some(stream) => { stream.recv().await; }
                None => std::future::pending::<()>().await,
            }
        } => {}
    }

    info!("terminating...");
    trigger.fire();
}

/// Resolves on SIGINT. A handler that failed to install never resolves.
async fn interrupted(ctrl_c: impl Future<Output = io::Result<()>>) {
    if let Err(e) = ctrl_c.await {
        warn!("Failed to install SIGINT handler: {}", e);
        std::future::pending::<()>().await;
    }
}
