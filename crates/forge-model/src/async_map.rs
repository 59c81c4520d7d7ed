// SPDX-License-Identifier: Apache-2.0

//! The async demand-driven evaluator (spec §4.3, C3): a map parameterised
//! by a key type `K`, a value type `V` and a *producer* that computes `V`
//! for a given `K`, invoked at most once per key, running on a fixed-size
//! worker pool.
//!
//! Producers never block the calling worker on unrelated work; the only
//! cooperative yield point is [`ProduceCtx::subcall`], which hands a list
//! of dependency keys and a continuation to the map and returns
//! immediately. Cycle detection walks the per-path chain of keys currently
//! being produced along the current dependency path (spec: "chains are
//! per-path, not global").

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Observes key lifecycle for progress reporting (C10). Kept decoupled
/// from `forge-progress` via this trait so the evaluator has no upward
/// dependency; `forge-progress::TaskTracker` implements it.
pub trait ProgressHook<K>: Send + Sync {
    fn on_start(&self, key: &K);
    fn on_finish(&self, key: &K);
}

struct NullHook;
impl<K> ProgressHook<K> for NullHook {
    fn on_start(&self, _key: &K) {}
    fn on_finish(&self, _key: &K) {}
}

type Waiter<V, E> = Box<dyn FnOnce(Result<V, E>) + Send>;

enum Entry<V, E> {
    Pending(Vec<Waiter<V, E>>),
    Ready(V),
    Failed(E),
}

struct Inner<K, V, E> {
    pool: rayon::ThreadPool,
    producer: Box<dyn Fn(ProduceCtx<K, V, E>) + Send + Sync>,
    cycle_error: Box<dyn Fn(&[K]) -> E + Send + Sync>,
    hook: Arc<dyn ProgressHook<K>>,
    entries: Mutex<HashMap<K, Entry<V, E>>>,
}

impl<K, V, E> Inner<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn demand<F>(inner: &Arc<Self>, key: K, chain: Vec<K>, on_ready: F)
    where
        F: FnOnce(Result<V, E>) + Send + 'static,
    {
        if let Some(pos) = chain.iter().position(|k| k == &key) {
            let cycle_chain: Vec<K> = chain[pos..]
                .iter()
                .cloned()
                .chain(std::iter::once(key.clone()))
                .collect();
            let err = (inner.cycle_error)(&cycle_chain);
            tracing::error!(chain = ?cycle_chain, "cycle detected in async map");
            Self::fail_chain(inner, &cycle_chain, err.clone());
            on_ready(Err(err));
            return;
        }

        let mut entries = inner.entries.lock().expect("async map mutex poisoned");
        match entries.get_mut(&key) {
            Some(Entry::Ready(v)) => {
                let v = v.clone();
                drop(entries);
                on_ready(Ok(v));
            }
            Some(Entry::Failed(e)) => {
                let e = e.clone();
                drop(entries);
                on_ready(Err(e));
            }
            Some(Entry::Pending(waiters)) => {
                waiters.push(Box::new(on_ready));
            }
            None => {
                entries.insert(key.clone(), Entry::Pending(vec![Box::new(on_ready)]));
                drop(entries);
                Self::spawn_produce(inner, key, chain);
            }
        }
    }

    fn spawn_produce(inner: &Arc<Self>, key: K, mut chain: Vec<K>) {
        chain.push(key.clone());
        let inner_cloned = Arc::clone(inner);
        inner.hook.on_start(&key);
        inner.pool.spawn(move || {
            let ctx = ProduceCtx {
                inner: Arc::clone(&inner_cloned),
                key: key.clone(),
                chain,
            };
            (inner_cloned.producer)(ctx);
        });
    }

    fn fail_chain(inner: &Arc<Self>, chain: &[K], err: E) {
        for key in chain {
            Self::resolve(inner, key.clone(), Err(err.clone()));
        }
    }

    fn resolve(inner: &Arc<Self>, key: K, result: Result<V, E>) {
        let waiters = {
            let mut entries = inner.entries.lock().expect("async map mutex poisoned");
            match entries.get(&key) {
                Some(Entry::Pending(_)) => {
                    let waiters = match entries.remove(&key) {
                        Some(Entry::Pending(w)) => w,
                        _ => unreachable!(),
                    };
                    let new_entry = match &result {
                        Ok(v) => Entry::Ready(v.clone()),
                        Err(e) => Entry::Failed(e.clone()),
                    };
                    entries.insert(key.clone(), new_entry);
                    waiters
                }
                // Already resolved: first resolution wins, later ones are
                // ignored (producers are contracted to run at most once,
                // but a dependency-failure fan-in can race a late success).
                _ => return,
            }
        };
        inner.hook.on_finish(&key);
        for waiter in waiters {
            let result = result.clone();
            inner.pool.spawn(move || waiter(result));
        }
    }
}

/// Handed to a producer invocation: the means by which it reports its
/// result, suspends on dependencies, and logs non-fatal warnings.
pub struct ProduceCtx<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
    key: K,
    chain: Vec<K>,
}

impl<K, V, E> ProduceCtx<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Equivalent of the spec's `setter(value)`: resolves this key and
    /// reschedules every waiter as a new task.
    pub fn set(&self, value: V) {
        Inner::resolve(&self.inner, self.key.clone(), Ok(value));
    }

    /// Equivalent of the spec's `logger(msg, fatal=true)`.
    pub fn fail(&self, error: E) {
        Inner::resolve(&self.inner, self.key.clone(), Err(error));
    }

    /// Equivalent of the spec's `logger(msg, fatal=false)`: a pure warning,
    /// does not change this key's state.
    pub fn warn(&self, message: impl std::fmt::Display) {
        tracing::warn!(key = ?self.key, "{}", message);
    }

    /// Equivalent of the spec's `subcaller(keys, continuation, logger)`.
    /// Schedules a lookup for every key in `keys`; `continuation` runs,
    /// exactly once, with every value in the same order as `keys`, only
    /// after all of them are ready. If any dependency fails, `continuation`
    /// never runs and this key fails instead (the "parent's logger is
    /// invoked with fatal" rule) — the first failure observed wins.
    pub fn subcall<F>(&self, keys: Vec<K>, continuation: F)
    where
        F: FnOnce(ProduceCtx<K, V, E>, Vec<V>) + Send + 'static,
    {
        let n = keys.len();
        if n == 0 {
            let ctx = ProduceCtx {
                inner: Arc::clone(&self.inner),
                key: self.key.clone(),
                chain: self.chain.clone(),
            };
            continuation(ctx, Vec::new());
            return;
        }

        let results: Arc<Mutex<Vec<Option<V>>>> = Arc::new(Mutex::new((0..n).map(|_| None).collect()));
        let remaining = Arc::new(AtomicUsize::new(n));
        let failed = Arc::new(AtomicBool::new(false));
        let continuation = Arc::new(Mutex::new(Some(continuation)));

        for (idx, dep_key) in keys.into_iter().enumerate() {
            let results = Arc::clone(&results);
            let remaining = Arc::clone(&remaining);
            let failed = Arc::clone(&failed);
            let continuation = Arc::clone(&continuation);
            let inner = Arc::clone(&self.inner);
            let parent_key = self.key.clone();
            let parent_chain = self.chain.clone();
            let chain_for_demand = self.chain.clone();

            Inner::demand(&self.inner, dep_key, chain_for_demand, move |res| {
                match res {
                    Ok(v) => {
                        results.lock().expect("async map mutex poisoned")[idx] = Some(v);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1
                            && !failed.load(Ordering::Acquire)
                        {
                            if let Some(cont) =
                                continuation.lock().expect("async map mutex poisoned").take()
                            {
                                let all: Vec<V> = results
                                    .lock()
                                    .expect("async map mutex poisoned")
                                    .iter_mut()
                                    .map(|slot| slot.take().expect("every slot filled before firing"))
                                    .collect();
                                let ctx = ProduceCtx {
                                    inner: Arc::clone(&inner),
                                    key: parent_key.clone(),
                                    chain: parent_chain.clone(),
                                };
                                inner.pool.spawn(move || cont(ctx, all));
                            }
                        }
                    }
                    Err(e) => {
                        if !failed.swap(true, Ordering::AcqRel) {
                            Inner::resolve(&inner, parent_key.clone(), Err(e));
                        }
                        remaining.fetch_sub(1, Ordering::AcqRel);
                    }
                }
            });
        }
    }
}

/// The evaluator itself: construct once with a producer function, then
/// demand keys via [`AsyncMap::run`].
pub struct AsyncMap<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> AsyncMap<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(
        jobs: usize,
        producer: impl Fn(ProduceCtx<K, V, E>) + Send + Sync + 'static,
        cycle_error: impl Fn(&[K]) -> E + Send + Sync + 'static,
    ) -> anyhow::Result<Self> {
        Self::with_hook(jobs, producer, cycle_error, Arc::new(NullHook))
    }

    pub fn with_hook(
        jobs: usize,
        producer: impl Fn(ProduceCtx<K, V, E>) + Send + Sync + 'static,
        cycle_error: impl Fn(&[K]) -> E + Send + Sync + 'static,
        hook: Arc<dyn ProgressHook<K>>,
    ) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("forge-async-map-{i}"))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                producer: Box::new(producer),
                cycle_error: Box::new(cycle_error),
                hook,
                entries: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Blocks the calling thread until every key in `keys` is resolved
    /// (ready or failed), in the order requested.
    pub fn run(&self, keys: Vec<K>) -> Vec<Result<V, E>> {
        let n = keys.len();
        if n == 0 {
            return Vec::new();
        }
        let results: Arc<Mutex<Vec<Option<Result<V, E>>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));
        let remaining = Arc::new(AtomicUsize::new(n));
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        for (idx, key) in keys.into_iter().enumerate() {
            let results = Arc::clone(&results);
            let remaining = Arc::clone(&remaining);
            let tx = tx.clone();
            Inner::demand(&self.inner, key, Vec::new(), move |res| {
                results.lock().expect("async map mutex poisoned")[idx] = Some(res);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let _ = tx.send(());
                }
            });
        }
        drop(tx);
        let _ = rx.recv();

        let mut results = results.lock().expect("async map mutex poisoned");
        results
            .iter_mut()
            .map(|slot| slot.take().expect("every slot filled before run() returns"))
            .collect()
    }

    /// Looks up a single key without demanding its production (returns
    /// `None` if it has never been requested or is still pending).
    pub fn peek(&self, key: &K) -> Option<Result<V, E>> {
        let entries = self.inner.entries.lock().expect("async map mutex poisoned");
        match entries.get(key) {
            Some(Entry::Ready(v)) => Some(Ok(v.clone())),
            Some(Entry::Failed(e)) => Some(Err(e.clone())),
            _ => None,
        }
    }
}
