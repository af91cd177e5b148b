//! In-memory authoritative collection for one table view.
//!
//! Lifecycle: `Uninitialized -> Loading -> Ready`, or `Loading -> Failed`
//! until the caller reloads. Change events that arrive while the bulk fetch
//! is outstanding are queued and replayed in arrival order once it lands.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use utoipa::ToSchema;

use super::entity::{Entity, Scope};
use super::event::{ChangeEvent, EventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CollectionState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

/// How concurrent updates to the same id are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// The last event applied wins.
    #[default]
    LastApplied,
    /// Updates whose revision is older than the held row are dropped.
    RejectStale,
}

/// Outcome of handing one event to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Buffered,
    Inserted,
    Replaced,
    Removed,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Row is outside the view's sensor or day.
    OutOfScope,
    /// Delete for an id the collection does not hold.
    Absent,
    /// Event carried no usable row.
    MissingPayload,
    /// Revision older than the held row.
    Stale,
    /// Collection failed and is waiting for a reload.
    NotLoaded,
}

/// Immutable view of a collection at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub state: CollectionState,
    pub items: Arc<Vec<T>>,
    pub error: Option<String>,
    /// Whether a change stream is currently feeding the collection.
    pub live: bool,
    /// Incremented on every state or content change.
    pub revision: u64,
}

impl<T> Snapshot<T> {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == CollectionState::Ready
    }
}

#[derive(Debug)]
pub struct Collection<T: Entity> {
    state: CollectionState,
    items: Arc<Vec<T>>,
    pending: VecDeque<ChangeEvent<T>>,
    scope: Scope,
    policy: ConflictPolicy,
    error: Option<String>,
    revision: u64,
}

impl<T: Entity> Collection<T> {
    #[must_use]
    pub fn new(scope: Scope, policy: ConflictPolicy) -> Self {
        Self {
            state: CollectionState::Uninitialized,
            items: Arc::new(Vec::new()),
            pending: VecDeque::new(),
            scope,
            policy,
            error: None,
            revision: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> CollectionState {
        self.state
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn snapshot(&self, live: bool) -> Snapshot<T> {
        Snapshot {
            state: self.state,
            items: Arc::clone(&self.items),
            error: self.error.clone(),
            live,
            revision: self.revision,
        }
    }

    /// Enter `Loading` for a (re)fetch. Returns `false` if already loading.
    pub fn begin_loading(&mut self) -> bool {
        if self.state == CollectionState::Loading {
            return false;
        }
        self.state = CollectionState::Loading;
        self.error = None;
        self.revision += 1;
        true
    }

    /// Install the bulk-fetch result and replay queued events.
    ///
    /// Returns the number of replayed events.
    pub fn complete_load(&mut self, rows: Vec<T>) -> usize {
        let mut rows: Vec<T> = rows
            .into_iter()
            .map(T::normalize)
            .filter(|row| row.in_scope(&self.scope))
            .collect();
        rows.sort_by_key(|row| row.sort_key());

        self.items = Arc::new(rows);
        self.state = CollectionState::Ready;
        self.error = None;
        self.revision += 1;

        let queued = std::mem::take(&mut self.pending);
        let replayed = queued.len();
        for event in queued {
            self.apply(event);
        }
        replayed
    }

    /// Record a fetch failure. Queued events are discarded.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = CollectionState::Failed;
        self.error = Some(error.into());
        self.pending.clear();
        self.revision += 1;
    }

    /// Apply or queue one event depending on the lifecycle state.
    pub fn handle(&mut self, event: ChangeEvent<T>) -> Applied {
        match self.state {
            CollectionState::Uninitialized | CollectionState::Loading => {
                self.pending.push_back(event);
                Applied::Buffered
            }
            CollectionState::Ready => self.apply(event),
            CollectionState::Failed => Applied::Ignored(IgnoreReason::NotLoaded),
        }
    }

    fn apply(&mut self, event: ChangeEvent<T>) -> Applied {
        let outcome = match event.event_type {
            EventType::Insert | EventType::Update => match event.new {
                Some(row) => self.upsert(row.normalize()),
                None => Applied::Ignored(IgnoreReason::MissingPayload),
            },
            EventType::Delete => {
                let id = event.old.as_ref().or(event.new.as_ref()).map(|row| row.id().to_owned());
                match id {
                    Some(id) => self.remove(&id),
                    None => Applied::Ignored(IgnoreReason::MissingPayload),
                }
            }
        };
        if !matches!(outcome, Applied::Ignored(_)) {
            self.revision += 1;
        }
        outcome
    }

    fn upsert(&mut self, row: T) -> Applied {
        let position = self.items.iter().position(|item| item.id() == row.id());

        // A held row corrected to another day or sensor leaves the view.
        if !row.in_scope(&self.scope) {
            return match position {
                Some(index) => {
                    Arc::make_mut(&mut self.items).remove(index);
                    Applied::Removed
                }
                None => Applied::Ignored(IgnoreReason::OutOfScope),
            };
        }

        let Some(index) = position else {
            let items = Arc::make_mut(&mut self.items);
            let key = row.sort_key();
            let at = items.partition_point(|item| item.sort_key() <= key);
            items.insert(at, row);
            return Applied::Inserted;
        };

        if self.policy == ConflictPolicy::RejectStale
            && let (Some(held), Some(incoming)) = (self.items[index].revision(), row.revision())
            && incoming < held
        {
            return Applied::Ignored(IgnoreReason::Stale);
        }

        let items = Arc::make_mut(&mut self.items);
        if items[index].sort_key() == row.sort_key() {
            items[index] = row;
        } else {
            items.remove(index);
            let key = row.sort_key();
            let at = items.partition_point(|item| item.sort_key() <= key);
            items.insert(at, row);
        }
        Applied::Replaced
    }

    fn remove(&mut self, id: &str) -> Applied {
        match self.items.iter().position(|item| item.id() == id) {
            Some(index) => {
                Arc::make_mut(&mut self.items).remove(index);
                Applied::Removed
            }
            None => Applied::Ignored(IgnoreReason::Absent),
        }
    }
}
