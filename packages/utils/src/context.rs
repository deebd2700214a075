use std::{
    future::Future,
    sync::{atomic::AtomicBool, Arc},
};

use tokio::runtime::{Handle, Runtime};
use tracing::instrument;

#[derive(Clone)]
pub struct AppContext {
    pub rt: AnyRuntime,
    killed: Arc<AtomicBool>,
    kill_sender: tokio::sync::broadcast::Sender<()>,
    // just to make sure we don't send in the case of "no receivers" accidentally
    _kill_receiver: Arc<tokio::sync::broadcast::Receiver<()>>,
}

#[derive(Clone)]
pub enum AnyRuntime {
    Tokio(Arc<Runtime>),
    TokioHandle(Handle),
}

impl AnyRuntime {
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        match self {
            AnyRuntime::Tokio(rt) => rt.block_on(fut),
            AnyRuntime::TokioHandle(handle) => handle.block_on(fut),
        }
    }
}

impl AppContext {
    pub fn new() -> std::io::Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        Ok(Self::new_with_runtime(AnyRuntime::Tokio(Arc::new(rt))))
    }

    pub fn new_with_runtime(rt: AnyRuntime) -> Self {
        let (kill_sender, kill_receiver) = tokio::sync::broadcast::channel(1);

        Self {
            rt,
            kill_sender,
            _kill_receiver: Arc::new(kill_receiver),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The kill system is a way to signal to all running tasks that they should stop
    /// it can be used to gracefully shutdown the system in async code
    /// without relying on its parent to drop it
    #[instrument(skip(self), fields(subsys = "AppContext"))]
    pub fn get_kill_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.kill_sender.subscribe()
    }

    /// Resolves once `kill` has been called, including if that happened before this was polled.
    /// Suitable as a cancellation signal for long-running reads.
    pub fn kill_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.get_kill_receiver();
        let killed = self.killed.clone();

        async move {
            if killed.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            // a closed or lagged channel also means the kill was sent
            let _ = receiver.recv().await;
        }
    }

    /// This is typically only called from main or tests - it will kill the system gracefully
    #[instrument(skip(self), fields(subsys = "AppContext"))]
    pub fn kill(&self) {
        self.killed.store(true, std::sync::atomic::Ordering::SeqCst);
        // send only fails with no receivers, and we always hold one
        let _ = self.kill_sender.send(());
    }

    pub fn killed(&self) -> bool {
        self.killed.load(std::sync::atomic::Ordering::SeqCst)
    }
}
