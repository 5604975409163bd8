use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::config::FilterConfig;
use crate::counting::CountingBloomFilter;
use crate::error::{FilterError, Result};
use crate::traits::CountingOps;

/// Monotonic nanoseconds since the first use in this process.
fn now_nanos() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// A cache sketch: records writes to elements whose cached copies may
/// still be live downstream.
///
/// Reads report the TTL they were cached with ([`report_read`]); writes
/// to a still-cached element are added to an internal counting filter and
/// scheduled for removal when the read's freshness window ends
/// ([`report_write`]). A client that finds an element in the sketch knows
/// its cached copy may be stale.
///
/// A dedicated worker thread applies the scheduled decrements; dropping
/// the filter stops the worker and discards pending expirations.
///
/// [`report_read`]: ExpiringBloomFilter::report_read
/// [`report_write`]: ExpiringBloomFilter::report_write
pub struct ExpiringBloomFilter<T>
where
    T: ToString + Eq + Hash + Clone + Send + 'static,
{
    filter: Arc<CountingBloomFilter>,
    shared: Arc<Shared<T>>,
    worker: Option<JoinHandle<()>>,
}

struct Shared<T> {
    state: Mutex<ExpiryState<T>>,
    cond: Condvar,
    shutdown: AtomicBool,
}

struct ExpiryState<T> {
    /// Element -> absolute expiry of the freshest cached read.
    expirations: HashMap<T, u64>,
    /// Writes awaiting their expiry-triggered decrement.
    queue: BinaryHeap<Reverse<ExpiringItem<T>>>,
}

struct ExpiringItem<T> {
    expires_at: u64,
    element: T,
}

impl<T> PartialEq for ExpiringItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.expires_at == other.expires_at
    }
}

impl<T> Eq for ExpiringItem<T> {}

impl<T> PartialOrd for ExpiringItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ExpiringItem<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.expires_at.cmp(&other.expires_at)
    }
}

impl<T> ExpiringBloomFilter<T>
where
    T: ToString + Eq + Hash + Clone + Send + 'static,
{
    pub fn new(config: FilterConfig) -> Result<Self> {
        let filter = Arc::new(CountingBloomFilter::new(config)?);
        let shared = Arc::new(Shared {
            state: Mutex::new(ExpiryState {
                expirations: HashMap::new(),
                queue: BinaryHeap::new(),
            }),
            cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker_filter = Arc::clone(&filter);
        let worker_shared = Arc::clone(&shared);
        let worker =
            std::thread::spawn(move || worker_loop(worker_filter, worker_shared));

        Ok(Self {
            filter,
            shared,
            worker: Some(worker),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ExpiryState<T>>> {
        self.shared
            .state
            .lock()
            .map_err(|e| FilterError::Lock(e.to_string()))
    }

    /// Records that `element` was read into a downstream cache with the
    /// given TTL. The stored expiry never decreases: repeated reads only
    /// extend the freshness window.
    pub fn report_read(&self, element: T, ttl: Duration) -> Result<()> {
        let expires_at = now_nanos().saturating_add(ttl.as_nanos() as u64);
        let mut state = self.lock()?;
        let entry = state.expirations.entry(element).or_insert(expires_at);
        *entry = (*entry).max(expires_at);
        Ok(())
    }

    /// Whether a cached copy of `element` may still be live.
    pub fn is_cached(&self, element: &T) -> Result<bool> {
        let state = self.lock()?;
        Ok(matches!(state.expirations.get(element), Some(&ts) if ts > now_nanos()))
    }

    /// Reports a write. If the element is still cached somewhere, it is
    /// added to the sketch and one decrement is scheduled for the expiry
    /// recorded at this moment; a later [`report_read`] extending the TTL
    /// does not reschedule it. Returns whether the write was recorded.
    ///
    /// [`report_read`]: ExpiringBloomFilter::report_read
    pub fn report_write(&self, element: &T) -> Result<bool> {
        let mut state = self.lock()?;
        let expires_at = match state.expirations.get(element) {
            Some(&ts) if ts > now_nanos() => ts,
            _ => return Ok(false),
        };

        let bytes = self.filter.config().to_bytes(element);
        self.filter.add(&bytes)?;
        state.queue.push(Reverse(ExpiringItem {
            expires_at,
            element: element.clone(),
        }));
        self.shared.cond.notify_one();
        Ok(true)
    }

    /// Whether `element` was recently written while cached.
    pub fn contains(&self, element: &T) -> Result<bool> {
        let bytes = self.filter.config().to_bytes(element);
        self.filter.contains(&bytes)
    }

    /// The underlying counting filter.
    pub fn filter(&self) -> &CountingBloomFilter {
        &self.filter
    }

    /// Number of writes still awaiting their expiry decrement.
    pub fn pending_expirations(&self) -> Result<usize> {
        Ok(self.lock()?.queue.len())
    }
}

fn worker_loop<T>(filter: Arc<CountingBloomFilter>, shared: Arc<Shared<T>>)
where
    T: ToString + Eq + Hash + Clone + Send + 'static,
{
    debug!("expiry worker started");
    let Ok(mut state) = shared.state.lock() else {
        return;
    };
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let now = now_nanos();
        let head_expiry = state.queue.peek().map(|Reverse(item)| item.expires_at);
        match head_expiry {
            None => {
                let Ok(guard) = shared.cond.wait(state) else {
                    return;
                };
                state = guard;
            }
            Some(expires_at) if expires_at <= now => {
                let Some(Reverse(item)) = state.queue.pop() else {
                    continue;
                };
                // Drop stale index entries so the map does not grow with
                // elements that were never read again.
                if state
                    .expirations
                    .get(&item.element)
                    .is_some_and(|&ts| ts <= now)
                {
                    state.expirations.remove(&item.element);
                }
                drop(state);

                let bytes = filter.config().to_bytes(&item.element);
                if let Err(err) = filter.remove_and_estimate_count(&bytes) {
                    error!(error = %err, "expiry decrement failed");
                }

                let Ok(guard) = shared.state.lock() else {
                    return;
                };
                state = guard;
            }
            Some(expires_at) => {
                let wait = Duration::from_nanos(expires_at - now);
                let Ok((guard, _)) = shared.cond.wait_timeout(state, wait) else {
                    return;
                };
                state = guard;
            }
        }
    }
    debug!("expiry worker stopped");
}

impl<T> Drop for ExpiringBloomFilter<T>
where
    T: ToString + Eq + Hash + Clone + Send + 'static,
{
    fn drop(&mut self) {
        // The flag is flipped under the state lock: the worker only
        // blocks on the condvar while holding that lock, so the notify
        // below cannot slip in between its shutdown check and its wait.
        let guard = self.shared.state.lock();
        self.shared.shutdown.store(true, Ordering::Release);
        drop(guard);
        self.shared.cond.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
