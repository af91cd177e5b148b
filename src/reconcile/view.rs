//! Live views: a [`Collection`] driven by one consumer task.
//!
//! The task subscribes first, then starts the bulk fetch, so nothing emitted
//! during cold start is lost. It is the only code that mutates the
//! collection; readers get [`Snapshot`]s over a `watch` channel.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::collection::{Applied, Collection, CollectionState, ConflictPolicy, Snapshot};
use super::entity::{Entity, Scope};
use super::event::ChangeEvent;
use crate::store::{ChangeReceiver, Record, StoreResult, Table, TelemetryStore};
use crate::telemetry::day_window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Reload,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("View was disposed")]
    Disposed,

    #[error("View not ready after {0:?}")]
    Timeout(Duration),
}

/// Handle to a running live view. Dropping it cancels the view.
pub struct LiveView<T: Entity> {
    scope: Scope,
    snapshots: watch::Receiver<Snapshot<T>>,
    control: mpsc::Sender<Control>,
    task: JoinHandle<()>,
}

impl<T: Entity> LiveView<T> {
    /// Start a view over `T::TABLE` limited to `scope`.
    ///
    /// Views with a day anchor fetch that UTC day's window; others fetch the
    /// whole (filtered) table.
    pub fn spawn(store: Arc<dyn TelemetryStore>, scope: Scope, policy: ConflictPolicy) -> Self {
        let collection = Collection::new(scope.clone(), policy);
        let (tx, snapshots) = watch::channel(collection.snapshot(false));
        let (control, control_rx) = mpsc::channel(4);

        let task = tokio::spawn(run(store, collection, tx, control_rx));

        Self {
            scope,
            snapshots,
            control,
            task,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T> {
        self.snapshots.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshots.clone()
    }

    /// Wait until the bulk fetch has landed or failed.
    ///
    /// # Errors
    ///
    /// `FetchFailed` when the view ended up `Failed`, `Disposed` when the view
    /// task is gone.
    pub async fn ready(&self) -> Result<Snapshot<T>, ViewError> {
        wait_ready(self.snapshots.clone()).await
    }

    /// [`ready`](Self::ready) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// As `ready`, plus `Timeout`.
    pub async fn ready_within(&self, timeout: Duration) -> Result<Snapshot<T>, ViewError> {
        tokio::time::timeout(timeout, self.ready())
            .await
            .map_err(|_| ViewError::Timeout(timeout))?
    }

    /// Caller-triggered retry: refetch, and resubscribe if the stream closed.
    pub fn reload(&self) {
        if self.control.try_send(Control::Reload).is_err() {
            tracing::debug!(table = %T::TABLE, "Reload already queued");
        }
    }

    /// Stop the view and wait for its task to finish.
    ///
    /// No snapshot is published after this returns.
    pub async fn dispose(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        tracing::debug!(table = %T::TABLE, scope = ?self.scope, "Live view disposed");
    }
}

/// Wait on a snapshot receiver until its view is `Ready` or `Failed`.
///
/// # Errors
///
/// See [`LiveView::ready`].
pub async fn wait_ready<T: Entity>(
    mut rx: watch::Receiver<Snapshot<T>>,
) -> Result<Snapshot<T>, ViewError> {
    let snapshot = rx
        .wait_for(|s| matches!(s.state, CollectionState::Ready | CollectionState::Failed))
        .await
        .map_err(|_| ViewError::Disposed)?
        .clone();

    match snapshot.state {
        CollectionState::Failed => Err(ViewError::FetchFailed(
            snapshot.error.unwrap_or_else(|| "unknown error".to_string()),
        )),
        _ => Ok(snapshot),
    }
}

impl<T: Entity> Drop for LiveView<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn start_fetch(
    store: Arc<dyn TelemetryStore>,
    scope: &Scope,
    table: Table,
) -> BoxFuture<'static, StoreResult<Vec<Record>>> {
    let filter = scope.filter_for(table);
    let window = scope.anchor.map(day_window);
    async move {
        match window {
            Some(window) => {
                store
                    .fetch_range(table, window.start, window.end, filter.as_ref())
                    .await
            }
            None => store.fetch_all(table, filter.as_ref()).await,
        }
    }
    .boxed()
}

async fn next_change(events: &mut Option<ChangeReceiver>) -> Option<ChangeEvent<Record>> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn open_stream<T: Entity>(store: &Arc<dyn TelemetryStore>, scope: &Scope) -> Option<ChangeReceiver> {
    match store.subscribe(T::TABLE, scope.filter_for(T::TABLE)).await {
        Ok(rx) => Some(rx),
        Err(e) => {
            tracing::warn!(table = %T::TABLE, error = %e, "Subscription failed, view will not receive live updates");
            None
        }
    }
}

async fn run<T: Entity>(
    store: Arc<dyn TelemetryStore>,
    mut collection: Collection<T>,
    tx: watch::Sender<Snapshot<T>>,
    mut control: mpsc::Receiver<Control>,
) {
    let table = T::TABLE;
    let scope = collection.scope().clone();

    collection.begin_loading();
    let mut events = open_stream::<T>(&store, &scope).await;
    tx.send_replace(collection.snapshot(events.is_some()));

    tracing::info!(%table, ?scope, live = events.is_some(), "Live view loading");

    let mut fetch = start_fetch(Arc::clone(&store), &scope, table);
    let mut fetching = true;

    loop {
        tokio::select! {
            result = &mut fetch, if fetching => {
                fetching = false;
                match result {
                    Ok(records) => {
                        let rows: Vec<T> = records.into_iter().filter_map(T::from_record).collect();
                        let fetched = rows.len();
                        let replayed = collection.complete_load(rows);
                        tracing::info!(
                            %table,
                            fetched,
                            replayed,
                            held = collection.items().len(),
                            "Live view ready"
                        );
                    }
                    Err(e) => {
                        tracing::error!(%table, error = %e, "Bulk fetch failed");
                        collection.fail(e.to_string());
                    }
                }
                tx.send_replace(collection.snapshot(events.is_some()));
            }

            change = next_change(&mut events) => {
                let Some(change) = change else {
                    tracing::warn!(%table, "Change stream closed");
                    events = None;
                    tx.send_replace(collection.snapshot(false));
                    continue;
                };
                let Some(change) = change.try_map(T::from_record) else {
                    tracing::warn!(%table, "Dropping change event for a different table");
                    continue;
                };
                let outcome = collection.handle(change);
                match outcome {
                    Applied::Ignored(reason) => {
                        tracing::trace!(%table, ?reason, "Change event ignored");
                    }
                    Applied::Buffered => {
                        tracing::debug!(%table, pending = collection.pending_len(), "Change event buffered while loading");
                    }
                    applied => {
                        tracing::trace!(%table, ?applied, "Change event applied");
                        tx.send_replace(collection.snapshot(true));
                    }
                }
            }

            command = control.recv() => {
                let Some(Control::Reload) = command else {
                    break;
                };
                if events.is_none() {
                    events = open_stream::<T>(&store, &scope).await;
                }
                if collection.begin_loading() {
                    tracing::info!(%table, ?scope, "Live view reloading");
                    fetch = start_fetch(Arc::clone(&store), &scope, table);
                    fetching = true;
                }
                tx.send_replace(collection.snapshot(events.is_some()));
            }
        }
    }

    tracing::debug!(%table, "Live view task finished");
}
