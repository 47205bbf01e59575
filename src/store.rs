use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};

const CHANNEL_CAPACITY: usize = 256;

/// Full value of a path at a point in time, stamped with the store's
/// monotonically increasing revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub seq: u64,
    /// None when nothing exists at the path.
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transport or backend failure; the operation may be retried.
    Unavailable(String),
    /// The path is not addressable: empty, or nested deeper than `top/child`.
    InvalidPath(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
            StoreError::InvalidPath(p) => write!(f, "invalid store path: {p:?}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Path-addressable document store, the scheduler's only collaborator.
///
/// Paths are `top` or `top/child`. Any write under a top-level document
/// notifies that document's subscribers with the document's full new value.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot read of the full value at `path`.
    async fn read(&self, path: &str) -> Result<Snapshot, StoreError>;

    /// Current value plus a stream of full-value pushes on every change.
    /// Only top-level paths are subscribable; detach by dropping the receiver.
    async fn subscribe(
        &self,
        path: &str,
    ) -> Result<(Snapshot, broadcast::Receiver<Snapshot>), StoreError>;

    /// Replace the value at `path`.
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Merge fields into the object at `path`, creating it if absent.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Remove the value at `path`. Removing an absent value succeeds.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Docs {
    values: HashMap<String, Value>,
    revision: u64,
}

/// In-process reference implementation of `RemoteStore`.
///
/// One global revision stamps every push, so subscribers across paths can
/// order snapshots. Notification happens under the document lock: a snapshot's
/// seq and value always correspond.
pub struct MemoryStore {
    docs: Mutex<Docs>,
    channels: DashMap<String, broadcast::Sender<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(Docs::default()),
            channels: DashMap::new(),
        }
    }

    fn split(path: &str) -> Result<(&str, Option<&str>), StoreError> {
        match path.split_once('/') {
            None if !path.is_empty() => Ok((path, None)),
            Some((top, child)) if !top.is_empty() && !child.is_empty() && !child.contains('/') => {
                Ok((top, Some(child)))
            }
            _ => Err(StoreError::InvalidPath(path.to_string())),
        }
    }

    fn value_at(values: &HashMap<String, Value>, top: &str, child: Option<&str>) -> Option<Value> {
        let doc = values.get(top)?;
        match child {
            None => Some(doc.clone()),
            Some(c) => doc.as_object()?.get(c).cloned(),
        }
    }

    /// Get the top-level document as an object, replacing a non-object value.
    fn object_at<'a>(values: &'a mut HashMap<String, Value>, top: &str) -> &'a mut Map<String, Value> {
        let doc = values.entry(top.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if !doc.is_object() {
            *doc = Value::Object(Map::new());
        }
        match doc {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    /// Apply a change to the document map and push the top-level value to
    /// subscribers. Send is a no-op if nobody is listening.
    async fn mutate(&self, top: &str, apply: impl FnOnce(&mut HashMap<String, Value>)) {
        let mut docs = self.docs.lock().await;
        apply(&mut docs.values);
        docs.revision += 1;
        let snapshot = Snapshot {
            seq: docs.revision,
            value: docs.values.get(top).cloned(),
        };
        if let Some(sender) = self.channels.get(top) {
            let _ = sender.send(snapshot);
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Snapshot, StoreError> {
        let (top, child) = Self::split(path)?;
        let docs = self.docs.lock().await;
        Ok(Snapshot {
            seq: docs.revision,
            value: Self::value_at(&docs.values, top, child),
        })
    }

    async fn subscribe(
        &self,
        path: &str,
    ) -> Result<(Snapshot, broadcast::Receiver<Snapshot>), StoreError> {
        let (top, child) = Self::split(path)?;
        if child.is_some() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        // Hold the document lock so no push lands between the initial
        // snapshot and the receiver's creation.
        let docs = self.docs.lock().await;
        let rx = self
            .channels
            .entry(top.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        let snapshot = Snapshot {
            seq: docs.revision,
            value: docs.values.get(top).cloned(),
        };
        Ok((snapshot, rx))
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let (top, child) = Self::split(path)?;
        self.mutate(top, |values| match child {
            None => {
                values.insert(top.to_string(), value);
            }
            Some(c) => {
                Self::object_at(values, top).insert(c.to_string(), value);
            }
        })
        .await;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let (top, child) = Self::split(path)?;
        self.mutate(top, |values| {
            let target = match child {
                None => Self::object_at(values, top),
                Some(c) => {
                    let entry = Self::object_at(values, top)
                        .entry(c.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !entry.is_object() {
                        *entry = Value::Object(Map::new());
                    }
                    match entry {
                        Value::Object(map) => map,
                        _ => unreachable!(),
                    }
                }
            };
            target.extend(fields);
        })
        .await;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let (top, child) = Self::split(path)?;
        self.mutate(top, |values| match child {
            None => {
                values.remove(top);
            }
            Some(c) => {
                if let Some(obj) = values.get_mut(top).and_then(Value::as_object_mut) {
                    obj.remove(c);
                }
            }
        })
        .await;
        Ok(())
    }
}
