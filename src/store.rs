//! Document store collaborator.
//!
//! The services only talk to the store through [`DocumentStore`]: advisory
//! filtered queries, point reads, optimistic transactions, plain writes and
//! change subscriptions. [`inmem::InMemStore`] is the bundled implementation.
//!
//! Implementations must detect read-write conflicts on every document a
//! transaction reads, including documents read as absent. Consolidation
//! relies on this: creating an issue also writes a claim document for its
//! consolidation key (see [`crate::config::HostelConfig::claims_path`]) in the
//! same commit, and that claim is what makes concurrent creators conflict.
//! The claims collection is therefore part of the stored data, not a cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

pub type Fields = Map<String, Value>;

/// Retry budget used when a store does not choose its own.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const SERVER_TIMESTAMP_SENTINEL: &str = "__serverTimestamp";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found")] NotFound,
    #[error("conflicting concurrent commit")] Conflict,
    #[error("transaction aborted after {attempts} attempts")] Aborted { attempts: u32 },
    #[error("store unavailable: {0}")] Unavailable(String),
    #[error("malformed document: {0}")] Malformed(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    /// Deserialize the document body, exposing the document id as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let mut data = self.data.clone();
        data.insert("id".into(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

/// Top-level field predicate used by queries and subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq { field: field.into(), value: value.into() }
    }

    pub fn any_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In { field: field.into(), values: values.into_iter().map(Into::into).collect() }
    }

    pub fn matches(&self, data: &Fields) -> bool {
        match self {
            Filter::Eq { field, value } => data.get(field).unwrap_or(&Value::Null) == value,
            Filter::In { field, values } => {
                let actual = data.get(field).unwrap_or(&Value::Null);
                values.iter().any(|v| v == actual)
            }
        }
    }
}

/// Placeholder the store swaps for its own clock when the write is applied.
pub fn server_timestamp() -> Value {
    json!({ SERVER_TIMESTAMP_SENTINEL: true })
}

/// Field map of a JSON object literal; anything else yields an empty map.
pub fn to_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get(SERVER_TIMESTAMP_SENTINEL) == Some(&Value::Bool(true)))
}

pub type Listener = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// Live query handle. Delivery stops on [`Subscription::cancel`] or drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn cancel(mut self) {
        if let Some(f) = self.cancel.take() { f(); }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.cancel.take() { f(); }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}

/// Read/write handle of one transaction attempt. Writes are staged and only
/// become visible on a successful `commit`.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, collection: &str, id: &str) -> StoreResult<Option<Document>>;
    fn set(&mut self, collection: &str, id: &str, data: Fields);
    fn update(&mut self, collection: &str, id: &str, fields: Fields);
    /// Fails with [`StoreError::Conflict`] when any document read by this
    /// transaction changed since it was read.
    async fn commit(&mut self) -> StoreResult<()>;
}

/// Work run inside [`run_transaction`]; may be executed several times.
#[async_trait]
pub trait TransactionBody: Send + Sync {
    type Output: Send;
    async fn run(&self, tx: &mut dyn Transaction) -> StoreResult<Self::Output>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn max_attempts(&self) -> u32 { DEFAULT_MAX_ATTEMPTS }
    fn new_document_id(&self) -> String { uuid::Uuid::new_v4().simple().to_string() }

    async fn query(&self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<Document>>;
    async fn get_by_id(&self, collection: &str, id: &str) -> StoreResult<Document>;
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
    async fn set_document(&self, collection: &str, id: &str, data: Fields) -> StoreResult<()>;
    async fn update_document(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;
    async fn subscribe(&self, collection: &str, filters: Vec<Filter>, listener: Listener) -> StoreResult<Subscription>;
}

/// Run `body` in a fresh transaction, re-running it whenever the commit
/// conflicts with a concurrent one, up to the store's retry budget.
pub async fn run_transaction<B>(store: &dyn DocumentStore, body: &B) -> StoreResult<B::Output>
where
    B: TransactionBody + ?Sized,
{
    let attempts = store.max_attempts().max(1);
    for attempt in 1..=attempts {
        let mut tx = store.begin().await?;
        let outcome = match body.run(&mut *tx).await {
            Ok(out) => tx.commit().await.map(|()| out),
            Err(e) => Err(e),
        };
        match outcome {
            Err(StoreError::Conflict) => {
                metrics::increment_counter!("hostel_store_transaction_conflicts_total");
                debug!(attempt, "transaction conflict; retrying");
            }
            other => return other,
        }
    }
    warn!(attempts, "transaction retry budget exhausted");
    Err(StoreError::Aborted { attempts })
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::collections::hash_map::Entry;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Mutex, PoisonError};

    use chrono::{DateTime, SecondsFormat, Utc};
    use dashmap::DashMap;
    use tokio::sync::RwLock;

    #[derive(Clone)]
    struct Stored {
        version: u64,
        data: Fields,
    }

    #[derive(Default)]
    struct State {
        collections: HashMap<String, BTreeMap<String, Stored>>,
        clock: u64, // bumped on every applied write; doubles as document version
    }

    enum Write {
        Set { collection: String, id: String, data: Fields },
        Update { collection: String, id: String, fields: Fields },
    }

    impl Write {
        fn target(&self) -> (&str, &str) {
            match self {
                Write::Set { collection, id, .. } | Write::Update { collection, id, .. } => (collection.as_str(), id.as_str()),
            }
        }
    }

    impl State {
        fn get(&self, collection: &str, id: &str) -> Option<&Stored> {
            self.collections.get(collection)?.get(id)
        }

        fn version_of(&self, collection: &str, id: &str) -> u64 {
            self.get(collection, id).map(|s| s.version).unwrap_or(0)
        }

        fn snapshot(&self, collection: &str, filters: &[Filter]) -> Vec<Document> {
            let Some(docs) = self.collections.get(collection) else { return Vec::new() };
            docs.iter()
                .filter(|(_, s)| filters.iter().all(|f| f.matches(&s.data)))
                .map(|(id, s)| Document { id: id.clone(), data: s.data.clone() })
                .collect()
        }

        // Updates must target a document that exists or is created earlier in the same batch.
        fn validate(&self, writes: &[Write]) -> StoreResult<()> {
            let mut created: HashSet<(&str, &str)> = HashSet::new();
            for w in writes {
                match w {
                    Write::Set { .. } => { created.insert(w.target()); }
                    Write::Update { collection, id, .. } => {
                        if self.get(collection, id).is_none() && !created.contains(&w.target()) {
                            return Err(StoreError::NotFound);
                        }
                    }
                }
            }
            Ok(())
        }

        fn apply(&mut self, write: Write, now: DateTime<Utc>) {
            self.clock += 1;
            let version = self.clock;
            match write {
                Write::Set { collection, id, mut data } => {
                    resolve_timestamps(&mut data, now);
                    self.collections.entry(collection).or_default().insert(id, Stored { version, data });
                }
                Write::Update { collection, id, mut fields } => {
                    resolve_timestamps(&mut fields, now);
                    if let Some(stored) = self.collections.get_mut(&collection).and_then(|c| c.get_mut(&id)) {
                        stored.data.extend(fields);
                        stored.version = version;
                    }
                }
            }
        }
    }

    fn resolve_timestamps(fields: &mut Fields, now: DateTime<Utc>) {
        for value in fields.values_mut() {
            if is_server_timestamp(value) {
                *value = Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true));
            } else if let Value::Object(nested) = value {
                resolve_timestamps(nested, now);
            }
        }
    }

    struct Watcher {
        collection: String,
        filters: Vec<Filter>,
        listener: Listener,
        delivered: Mutex<u64>, // clock of the newest snapshot handed to the listener
    }

    impl Watcher {
        // Snapshots are computed in commit order but delivered outside the state
        // lock, so one taken at an older clock may arrive late; it is dropped.
        fn deliver(&self, clock: u64, docs: Vec<Document>) {
            let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
            if clock < *delivered {
                return;
            }
            *delivered = clock;
            (self.listener)(docs);
        }
    }

    struct Inner {
        state: RwLock<State>,
        watchers: Arc<DashMap<u64, Arc<Watcher>>>,
        next_watcher: AtomicU64,
        offline: AtomicBool,
    }

    /// Process-local document store with optimistic transactions.
    #[derive(Clone)]
    pub struct InMemStore {
        inner: Arc<Inner>,
        max_attempts: u32,
    }

    impl Default for InMemStore {
        fn default() -> Self { Self::new() }
    }

    impl InMemStore {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Inner {
                    state: RwLock::new(State::default()),
                    watchers: Arc::new(DashMap::new()),
                    next_watcher: AtomicU64::new(1),
                    offline: AtomicBool::new(false),
                }),
                max_attempts: DEFAULT_MAX_ATTEMPTS,
            }
        }

        pub fn with_max_attempts(mut self, attempts: u32) -> Self {
            self.max_attempts = attempts.max(1);
            self
        }

        /// Simulate a connectivity loss: every call fails with `Unavailable` until reset.
        pub fn set_offline(&self, offline: bool) {
            self.inner.offline.store(offline, Ordering::SeqCst);
        }

        fn ensure_online(&self) -> StoreResult<()> {
            if self.inner.offline.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("in-memory store is offline".into()));
            }
            Ok(())
        }

        async fn commit_writes(&self, reads: HashMap<(String, String), u64>, writes: Vec<Write>) -> StoreResult<()> {
            self.ensure_online()?;
            let mut state = self.inner.state.write().await;
            for ((collection, id), seen) in &reads {
                if state.version_of(collection, id) != *seen {
                    return Err(StoreError::Conflict);
                }
            }
            if writes.is_empty() {
                return Ok(());
            }
            state.validate(&writes)?;
            let now = Utc::now();
            let touched: HashSet<String> = writes.iter().map(|w| w.target().0.to_string()).collect();
            for w in writes {
                state.apply(w, now);
            }
            let state = state.downgrade();
            let clock = state.clock;
            let deliveries = self.pending_deliveries(&state, &touched);
            drop(state);
            for (watcher, docs) in deliveries {
                watcher.deliver(clock, docs);
            }
            Ok(())
        }

        fn pending_deliveries(&self, state: &State, touched: &HashSet<String>) -> Vec<(Arc<Watcher>, Vec<Document>)> {
            let watchers: Vec<Arc<Watcher>> = self.inner.watchers.iter().map(|w| w.value().clone()).collect();
            watchers
                .into_iter()
                .filter(|w| touched.contains(&w.collection))
                .map(|w| {
                    let docs = state.snapshot(&w.collection, &w.filters);
                    (w, docs)
                })
                .collect()
        }
    }

    struct InMemTransaction {
        store: InMemStore,
        reads: HashMap<(String, String), u64>,
        writes: Vec<Write>,
    }

    #[async_trait]
    impl Transaction for InMemTransaction {
        async fn get(&mut self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
            self.store.ensure_online()?;
            let state = self.store.inner.state.read().await;
            let found = state.get(collection, id);
            let version = found.map(|s| s.version).unwrap_or(0);
            match self.reads.entry((collection.to_string(), id.to_string())) {
                // a second read of the same document must see what the first one saw
                Entry::Occupied(e) if *e.get() != version => return Err(StoreError::Conflict),
                Entry::Occupied(_) => {}
                Entry::Vacant(e) => { e.insert(version); }
            }
            Ok(found.map(|s| Document { id: id.to_string(), data: s.data.clone() }))
        }

        fn set(&mut self, collection: &str, id: &str, data: Fields) {
            self.writes.push(Write::Set { collection: collection.into(), id: id.into(), data });
        }

        fn update(&mut self, collection: &str, id: &str, fields: Fields) {
            self.writes.push(Write::Update { collection: collection.into(), id: id.into(), fields });
        }

        async fn commit(&mut self) -> StoreResult<()> {
            let reads = std::mem::take(&mut self.reads);
            let writes = std::mem::take(&mut self.writes);
            self.store.commit_writes(reads, writes).await
        }
    }

    #[async_trait]
    impl DocumentStore for InMemStore {
        fn max_attempts(&self) -> u32 { self.max_attempts }

        async fn query(&self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<Document>> {
            self.ensure_online()?;
            let state = self.inner.state.read().await;
            Ok(state.snapshot(collection, filters))
        }

        async fn get_by_id(&self, collection: &str, id: &str) -> StoreResult<Document> {
            self.ensure_online()?;
            let state = self.inner.state.read().await;
            state
                .get(collection, id)
                .map(|s| Document { id: id.to_string(), data: s.data.clone() })
                .ok_or(StoreError::NotFound)
        }

        async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
            self.ensure_online()?;
            Ok(Box::new(InMemTransaction { store: self.clone(), reads: HashMap::new(), writes: Vec::new() }))
        }

        async fn set_document(&self, collection: &str, id: &str, data: Fields) -> StoreResult<()> {
            let write = Write::Set { collection: collection.into(), id: id.into(), data };
            self.commit_writes(HashMap::new(), vec![write]).await
        }

        async fn update_document(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
            let write = Write::Update { collection: collection.into(), id: id.into(), fields };
            self.commit_writes(HashMap::new(), vec![write]).await
        }

        async fn subscribe(&self, collection: &str, filters: Vec<Filter>, listener: Listener) -> StoreResult<Subscription> {
            self.ensure_online()?;
            let id = self.inner.next_watcher.fetch_add(1, Ordering::Relaxed);
            let watcher = Arc::new(Watcher {
                collection: collection.to_string(),
                filters,
                listener,
                delivered: Mutex::new(0),
            });
            let (clock, initial) = {
                let state = self.inner.state.read().await;
                // register under the read lock so no commit slips between snapshot and registration
                self.inner.watchers.insert(id, watcher.clone());
                (state.clock, state.snapshot(collection, &watcher.filters))
            };
            watcher.deliver(clock, initial);
            let watchers = self.inner.watchers.clone();
            Ok(Subscription::new(move || {
                watchers.remove(&id);
            }))
        }
    }

}
