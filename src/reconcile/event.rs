use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

/// One out-of-band change to a table row.
///
/// `new` is set for inserts and updates, `old` for updates and deletes when
/// the store provides it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<T> {
    pub event_type: EventType,
    pub new: Option<T>,
    pub old: Option<T>,
}

impl<T> ChangeEvent<T> {
    pub fn insert(new: T) -> Self {
        Self {
            event_type: EventType::Insert,
            new: Some(new),
            old: None,
        }
    }

    pub fn update(new: T, old: Option<T>) -> Self {
        Self {
            event_type: EventType::Update,
            new: Some(new),
            old,
        }
    }

    pub fn delete(old: T) -> Self {
        Self {
            event_type: EventType::Delete,
            new: None,
            old: Some(old),
        }
    }

    /// Convert both sides, dropping the event if a present side fails to
    /// convert.
    pub fn try_map<U>(self, mut f: impl FnMut(T) -> Option<U>) -> Option<ChangeEvent<U>> {
        let new = match self.new {
            Some(value) => Some(f(value)?),
            None => None,
        };
        let old = match self.old {
            Some(value) => Some(f(value)?),
            None => None,
        };
        Some(ChangeEvent {
            event_type: self.event_type,
            new,
            old,
        })
    }
}
