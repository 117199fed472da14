//! The keyed cache itself: entry table plus loader dispatch.

use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::anyhow;
use parking_lot::Mutex;

use crate::{
    error::{LoadFailure, ReadError},
    loader::Loader,
    slot::{Outcome, Slot},
};

/// Observable state of one cache entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryState {
    Pending,
    Resolved,
    Failed,
}

enum Entry<V> {
    Pending(Arc<Slot<V>>),
    Resolved(Arc<V>),
    Failed(LoadFailure),
}

impl<V> Entry<V> {
    /// Pending -> Resolved/Failed once the worker has stored an outcome.
    fn settle_if_ready(&mut self) {
        let outcome = match self {
            Entry::Pending(slot) => slot.outcome(),
            _ => None,
        };
        if let Some(outcome) = outcome {
            *self = match outcome {
                Ok(value) => Entry::Resolved(value),
                Err(failure) => Entry::Failed(failure),
            };
        }
    }

    fn read(&self) -> Result<Arc<V>, ReadError> {
        match self {
            Entry::Pending(slot) => Err(ReadError::Suspended(slot.suspension())),
            Entry::Resolved(value) => Ok(Arc::clone(value)),
            Entry::Failed(failure) => Err(ReadError::Failed(failure.clone())),
        }
    }

    fn state(&self) -> EntryState {
        match self {
            Entry::Pending(_) => EntryState::Pending,
            Entry::Resolved(_) => EntryState::Resolved,
            Entry::Failed(_) => EntryState::Failed,
        }
    }
}

/// Memoizes one loader outcome per key for the lifetime of the cache.
///
/// Entries go `absent -> Pending -> Resolved | Failed` and never leave a
/// terminal state. The loader runs on its own thread per key; its result is
/// only folded into the table by the next [`read`](Self::read) of that key,
/// so the table is mutated exclusively by callers of the cache.
pub struct ResourceCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    loader: Arc<dyn Loader<K, V>>,
    loads_started: AtomicUsize,
}

impl<K, V> ResourceCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(loader: impl Loader<K, V>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            loader: Arc::new(loader),
            loads_started: AtomicUsize::new(0),
        }
    }

    /// Returns the value for `key`, starting its load on first request.
    ///
    /// While the load is in flight this returns [`ReadError::Suspended`]
    /// without blocking. A failed load yields the same [`LoadFailure`] on
    /// every call; the loader is never invoked twice for one key.
    pub fn read(&self, key: &K) -> Result<Arc<V>, ReadError> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.settle_if_ready();
            return entry.read();
        }

        let entry = self.launch(key);
        let result = entry.read();
        entries.insert(key.clone(), entry);
        result
    }

    /// Starts loading `key` if nothing has requested it yet.
    pub fn preload(&self, key: &K) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            let entry = self.launch(key);
            entries.insert(key.clone(), entry);
        }
    }

    /// Reads `key`, awaiting the load if it is still in flight.
    pub async fn get_or_load(&self, key: &K) -> Result<Arc<V>, LoadFailure> {
        loop {
            match self.read(key) {
                Ok(value) => return Ok(value),
                Err(ReadError::Failed(failure)) => return Err(failure),
                Err(ReadError::Suspended(suspension)) => suspension.await,
            }
        }
    }

    /// Reads `key`, blocking the calling thread while it loads.
    pub fn load_blocking(&self, key: &K) -> Result<Arc<V>, LoadFailure> {
        loop {
            match self.read(key) {
                Ok(value) => return Ok(value),
                Err(ReadError::Failed(failure)) => return Err(failure),
                Err(ReadError::Suspended(suspension)) => suspension.wait(),
            }
        }
    }

    /// State of `key` without triggering a load. `None` if never requested.
    pub fn state(&self, key: &K) -> Option<EntryState> {
        let mut entries = self.entries.lock();
        entries.get_mut(key).map(|entry| {
            entry.settle_if_ready();
            entry.state()
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of launch attempts so far, one per distinct key. Counts a
    /// launch even when its worker thread could not be spawned.
    pub fn loads_started(&self) -> usize {
        self.loads_started.load(Ordering::Relaxed)
    }

    // Caller holds the entry lock, which is what keeps launches unique per key.
    fn launch(&self, key: &K) -> Entry<V> {
        let label = format!("{key:?}");
        let slot = Arc::new(Slot::new(label.clone()));
        self.loads_started.fetch_add(1, Ordering::Relaxed);
        log::debug!("Loading {label}");

        let loader = Arc::clone(&self.loader);
        let worker_slot = Arc::clone(&slot);
        let worker_key = key.clone();
        let worker_label = label.clone();
        let spawned = thread::Builder::new()
            .name(format!("load {label}"))
            .spawn(move || {
                let started = Instant::now();
                let outcome = run_loader(loader.as_ref(), &worker_key, worker_label.clone());
                match &outcome {
                    Ok(_) => log::info!("Loaded {worker_label} in {:?}", started.elapsed()),
                    Err(failure) => log::error!("{failure}"),
                }
                worker_slot.settle(outcome);
            });

        match spawned {
            Ok(_) => Entry::Pending(slot),
            Err(err) => spawn_failed(label, err),
        }
    }
}

fn spawn_failed<V>(label: String, err: io::Error) -> Entry<V> {
    let failure = LoadFailure::new(
        label,
        anyhow::Error::new(err).context("failed to spawn loader thread"),
    );
    log::error!("{failure}");
    Entry::Failed(failure)
}

fn run_loader<K: 'static, V: 'static>(
    loader: &dyn Loader<K, V>,
    key: &K,
    label: String,
) -> Outcome<V> {
    match panic::catch_unwind(AssertUnwindSafe(|| loader.load(key))) {
        Ok(Ok(value)) => Ok(Arc::new(value)),
        Ok(Err(err)) => Err(LoadFailure::new(label, err)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(LoadFailure::new(label, anyhow!("loader panicked: {message}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{
        Barrier,
        mpsc::{self, Receiver, Sender},
    };

    type Gate = Mutex<HashMap<String, Receiver<anyhow::Result<String>>>>;

    /// Loader whose per-key results are fed by the test through channels.
    struct GatedLoader {
        gates: Arc<Gate>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    struct Harness {
        cache: ResourceCache<String, String>,
        senders: HashMap<String, Sender<anyhow::Result<String>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new(keys: &[&str]) -> Self {
            let mut gates = HashMap::new();
            let mut senders = HashMap::new();
            for key in keys {
                let (tx, rx) = mpsc::channel();
                gates.insert(key.to_string(), rx);
                senders.insert(key.to_string(), tx);
            }
            let calls = Arc::new(Mutex::new(Vec::new()));
            let loader = GatedLoader {
                gates: Arc::new(Mutex::new(gates)),
                calls: Arc::clone(&calls),
            };
            Self {
                cache: ResourceCache::new(loader),
                senders,
                calls,
            }
        }

        fn complete(&self, key: &str, result: anyhow::Result<String>) {
            self.senders[key].send(result).unwrap();
        }

        fn calls_for(&self, key: &str) -> usize {
            self.calls.lock().iter().filter(|k| *k == key).count()
        }
    }

    impl Loader<String, String> for GatedLoader {
        fn load(&self, key: &String) -> anyhow::Result<String> {
            self.calls.lock().push(key.clone());
            let rx = self
                .gates
                .lock()
                .remove(key)
                .ok_or_else(|| anyhow!("no gate for {key}"))?;
            rx.recv()?
        }
    }

    fn settled_read(
        cache: &ResourceCache<String, String>,
        key: &str,
    ) -> Result<Arc<String>, ReadError> {
        match cache.read(&key.to_string()) {
            Err(ReadError::Suspended(suspension)) => {
                suspension.wait();
                cache.read(&key.to_string())
            }
            other => other,
        }
    }

    #[test]
    fn pending_read_suspends_then_returns_value() {
        let h = Harness::new(&["model-A"]);
        let key = "model-A".to_string();

        let suspension = match h.cache.read(&key) {
            Err(ReadError::Suspended(s)) => s,
            other => panic!("expected suspension, got {other:?}"),
        };
        assert!(h.cache.read(&key).unwrap_err().is_suspended());
        assert_eq!(h.cache.state(&key), Some(EntryState::Pending));

        h.complete("model-A", Ok("V".to_string()));
        pollster::block_on(suspension);

        assert_eq!(*h.cache.read(&key).unwrap(), "V");
        assert_eq!(h.cache.state(&key), Some(EntryState::Resolved));
        assert_eq!(h.calls_for("model-A"), 1);
    }

    #[test]
    fn concurrent_reads_invoke_loader_once() {
        let h = Harness::new(&["k"]);
        let key = "k".to_string();
        let readers = 8;
        let barrier = Barrier::new(readers);

        thread::scope(|scope| {
            for _ in 0..readers {
                scope.spawn(|| {
                    barrier.wait();
                    for _ in 0..50 {
                        let _ = h.cache.read(&key);
                    }
                });
            }
        });

        h.complete("k", Ok("done".to_string()));
        assert_eq!(*h.cache.load_blocking(&key).unwrap(), "done");
        assert_eq!(h.calls_for("k"), 1);
        assert_eq!(h.cache.loads_started(), 1);
        assert_eq!(h.cache.len(), 1);
    }

    #[test]
    fn resolved_reads_return_the_same_value() {
        let h = Harness::new(&["k"]);
        h.complete("k", Ok("value".to_string()));
        let first = settled_read(&h.cache, "k").unwrap();
        for _ in 0..10 {
            let again = h.cache.read(&"k".to_string()).unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(h.calls_for("k"), 1);
    }

    #[test]
    fn failure_is_memoized_without_retry() {
        let h = Harness::new(&["bad"]);
        h.complete("bad", Err(anyhow!("mtl not found")));

        let first = match settled_read(&h.cache, "bad") {
            Err(ReadError::Failed(failure)) => failure,
            other => panic!("expected failure, got {other:?}"),
        };
        assert!(first.to_string().contains("mtl not found"));

        for _ in 0..5 {
            match h.cache.read(&"bad".to_string()) {
                Err(ReadError::Failed(again)) => assert!(first.same_cause(&again)),
                other => panic!("expected failure, got {other:?}"),
            }
        }
        assert!(h.cache.load_blocking(&"bad".to_string()).unwrap_err().same_cause(&first));
        assert_eq!(h.cache.state(&"bad".to_string()), Some(EntryState::Failed));
        assert_eq!(h.calls_for("bad"), 1);
    }

    #[test]
    fn keys_settle_independently() {
        let h = Harness::new(&["model-A", "model-B"]);
        let a = "model-A".to_string();
        let b = "model-B".to_string();

        assert!(h.cache.read(&a).unwrap_err().is_suspended());
        let b_suspension = match h.cache.read(&b) {
            Err(ReadError::Suspended(s)) => s,
            other => panic!("expected suspension, got {other:?}"),
        };

        h.complete("model-B", Err(anyhow!("geometry missing")));
        b_suspension.wait();
        assert_eq!(h.cache.state(&b), Some(EntryState::Failed));
        assert_eq!(h.cache.state(&a), Some(EntryState::Pending));

        h.complete("model-A", Ok("A".to_string()));
        assert_eq!(*h.cache.load_blocking(&a).unwrap(), "A");
        assert!(matches!(h.cache.read(&b), Err(ReadError::Failed(_))));
    }

    #[test]
    fn preload_starts_once_and_read_joins_it() {
        let h = Harness::new(&["k"]);
        let key = "k".to_string();
        assert_eq!(h.cache.state(&key), None);

        h.cache.preload(&key);
        h.cache.preload(&key);
        assert_eq!(h.cache.loads_started(), 1);

        h.complete("k", Ok("v".to_string()));
        let value = pollster::block_on(h.cache.get_or_load(&key)).unwrap();
        assert_eq!(*value, "v");
        assert_eq!(h.calls_for("k"), 1);
    }

    #[test]
    fn state_does_not_launch() {
        let cache: ResourceCache<u32, u32> =
            ResourceCache::new(|k: &u32| -> anyhow::Result<u32> { Ok(*k * 2) });
        assert_eq!(cache.state(&3), None);
        assert!(cache.is_empty());
        assert_eq!(cache.loads_started(), 0);
        assert_eq!(*cache.load_blocking(&3).unwrap(), 6);
        assert!(!cache.is_empty());
    }

    #[test]
    fn many_threads_share_one_load_per_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: ResourceCache<String, String> =
            ResourceCache::new(move |key: &String| -> anyhow::Result<String> {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(std::time::Duration::from_millis(50));
                if key == "bad" {
                    anyhow::bail!("broken geometry");
                }
                Ok(key.to_uppercase())
            });

        let threads = 16;
        let barrier = Barrier::new(threads);
        let (values, failures): (Vec<_>, Vec<_>) = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|i| {
                    let cache = &cache;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        let key = (if i % 2 == 0 { "good" } else { "bad" }).to_string();
                        barrier.wait();
                        cache.load_blocking(&key)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .partition(|r| r.is_ok())
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(values.len(), threads / 2);
        assert_eq!(failures.len(), threads / 2);

        let values: Vec<Arc<String>> = values.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(*values[0], "GOOD");
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));

        let failures: Vec<LoadFailure> = failures.into_iter().map(|r| r.unwrap_err()).collect();
        assert!(failures.iter().all(|f| f.same_cause(&failures[0])));
    }

    #[test]
    fn spawn_failure_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: ResourceCache<u32, u32> =
            ResourceCache::new(move |k: &u32| -> anyhow::Result<u32> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(*k)
            });
        let err = io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached");
        cache.entries.lock().insert(5, spawn_failed("5".to_string(), err));

        let first = match cache.read(&5) {
            Err(ReadError::Failed(failure)) => failure,
            other => panic!("expected failure, got {other:?}"),
        };
        assert!(format!("{first}").contains("failed to spawn loader thread"));
        assert!(cache.load_blocking(&5).unwrap_err().same_cause(&first));
        cache.preload(&5);
        assert_eq!(cache.state(&5), Some(EntryState::Failed));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn loader_panic_becomes_failure() {
        let cache: ResourceCache<u32, u32> =
            ResourceCache::new(|_: &u32| -> anyhow::Result<u32> { panic!("corrupt asset") });
        let failure = cache.load_blocking(&1).unwrap_err();
        assert!(failure.to_string().contains("corrupt asset"));
        assert!(cache.load_blocking(&1).unwrap_err().same_cause(&failure));
    }
}
