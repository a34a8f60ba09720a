
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use portable_atomic::AtomicUsize;
use tokio::sync::{mpsc, Mutex};
use waitgroup::WaitGroup;

use crate::error::{Error, Result};

/// Operation is a function
pub struct Operation(
    pub Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = bool> + Send + 'static>>) + Send + Sync>,
    pub &'static str,
);

impl Operation {
    pub(crate) fn new(
        op: impl FnMut() -> Pin<Box<dyn Future<Output = bool> + Send + 'static>> + Send + Sync + 'static,
        description: &'static str,
    ) -> Self {
        Self(Box::new(op), description)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Operation")
            .field(&"_")
            .field(&self.1)
            .finish()
    }
}

pub type OnEmptyHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// Operations is a task executor. Operations run one at a time in the order
/// they were enqueued; an operation may enqueue further operations, which
/// run after it.
#[derive(Default)]
pub(crate) struct Operations {
    length: Arc<AtomicUsize>,
    ops_tx: Option<Arc<mpsc::UnboundedSender<Operation>>>,
    close_tx: Option<mpsc::Sender<()>>,
    on_empty_handler: Arc<ArcSwapOption<Mutex<OnEmptyHdlrFn>>>,
}

impl Operations {
    pub(crate) fn new() -> Self {
        let length = Arc::new(AtomicUsize::new(0));
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::channel(1);
        let on_empty_handler: Arc<ArcSwapOption<Mutex<OnEmptyHdlrFn>>> =
            Arc::new(ArcSwapOption::empty());
        let l = Arc::clone(&length);
        let ops_tx = Arc::new(ops_tx);
        let ops_tx2 = Arc::clone(&ops_tx);
        let on_empty = Arc::clone(&on_empty_handler);
        tokio::spawn(async move {
            Operations::start(l, ops_tx, ops_rx, close_rx, on_empty).await;
        });

        Operations {
            length,
            ops_tx: Some(ops_tx2),
            close_tx: Some(close_tx),
            on_empty_handler,
        }
    }

    /// on_empty sets a handler run every time the last queued operation
    /// finished and nothing else is waiting.
    pub(crate) fn on_empty(&self, f: OnEmptyHdlrFn) {
        self.on_empty_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// enqueue adds a new action to be executed. If there are no actions scheduled,
    /// the execution will start immediately in a new task.
    pub(crate) async fn enqueue(&self, op: Operation) -> Result<()> {
        if let Some(ops_tx) = &self.ops_tx {
            return Operations::enqueue_inner(op, ops_tx, &self.length);
        }

        Err(Error::ErrConnectionClosed)
    }

    fn enqueue_inner(
        op: Operation,
        ops_tx: &Arc<mpsc::UnboundedSender<Operation>>,
        length: &Arc<AtomicUsize>,
    ) -> Result<()> {
        length.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = ops_tx.send(op) {
            length.fetch_sub(1, Ordering::SeqCst);
            log::debug!("operation {} rejected, chain is closed", (err.0).1);
            return Err(Error::ErrConnectionClosed);
        }

        Ok(())
    }

    /// is_empty checks if there are tasks in the queue. The running task
    /// counts until it finished.
    pub(crate) fn is_empty(&self) -> bool {
        self.length.load(Ordering::SeqCst) == 0
    }

    /// Done blocks until all currently enqueued operations are finished executing.
    /// For more complex synchronization, use Enqueue directly.
    pub(crate) async fn done(&self) {
        let wg = WaitGroup::new();
        let mut w = Some(wg.worker());
        let _ = self
            .enqueue(Operation::new(
                move || {
                    let _d = w.take();
                    Box::pin(async { false })
                },
                "Operation::done",
            ))
            .await;
        wg.wait().await;
    }

    pub(crate) async fn start(
        length: Arc<AtomicUsize>,
        ops_tx: Arc<mpsc::UnboundedSender<Operation>>,
        mut ops_rx: mpsc::UnboundedReceiver<Operation>,
        mut close_rx: mpsc::Receiver<()>,
        on_empty_handler: Arc<ArcSwapOption<Mutex<OnEmptyHdlrFn>>>,
    ) {
        loop {
            tokio::select! {
                biased;

                result = ops_rx.recv() => {
                    let mut f = match result {
                        Some(f) => f,
                        None => break,
                    };
                    let requeue = f.0().await;
                    if requeue {
                        let _ = Operations::enqueue_inner(f, &ops_tx, &length);
                    }
                    if length.fetch_sub(1, Ordering::SeqCst) == 1 {
                        if let Some(handler) = &*on_empty_handler.load() {
                            let mut f = handler.lock().await;
                            f().await;
                        }
                    }
                }
                _ = close_rx.recv() => {
                    break;
                }
            }
        }

        // Whatever is still queued runs to completion. Operations check the
        // closed flag of their owner and fail fast.
        ops_rx.close();
        while let Some(mut f) = ops_rx.recv().await {
            log::trace!("draining {} after close", f.1);
            let _ = f.0().await;
            length.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// close stops accepting operations once the queue drained.
    pub(crate) fn close(&self) {
        if let Some(close_tx) = &self.close_tx {
            // A runner that already stopped has nothing left to drain.
            let _ = close_tx.try_send(());
        }
    }
}
