use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use rand::Rng;
use redis::{Client, Connection, Pipeline, Value};
use tracing::{debug, warn};

use crate::error::{FilterError, Result};

/// A bounded pool of blocking Redis connections with optional read
/// replicas.
///
/// Connections that raised a connection-level error are destroyed instead
/// of being returned, so one broken socket cannot poison the pool; all
/// other errors hand the connection back for reuse.
#[derive(Clone)]
pub struct RedisPool {
    inner: Arc<PoolInner>,
    replicas: Arc<Vec<RedisPool>>,
}

struct PoolInner {
    client: Client,
    state: Mutex<PoolState>,
    available: Condvar,
    max_connections: usize,
}

struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

impl RedisPool {
    pub fn connect(
        host: &str,
        port: u16,
        max_connections: usize,
        replicas: &[(String, u16)],
    ) -> Result<Self> {
        let mut pool = Self::single(host, port, max_connections)?;
        let replicas = replicas
            .iter()
            .map(|(host, port)| Self::single(host, *port, max_connections))
            .collect::<Result<Vec<_>>>()?;
        pool.replicas = Arc::new(replicas);
        Ok(pool)
    }

    pub fn connect_url(url: &str, max_connections: usize) -> Result<Self> {
        let client = Client::open(url)?;
        Ok(Self::from_client(client, max_connections))
    }

    fn single(host: &str, port: u16, max_connections: usize) -> Result<Self> {
        let client = Client::open(format!("redis://{host}:{port}/"))?;
        Ok(Self::from_client(client, max_connections))
    }

    fn from_client(client: Client, max_connections: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                client,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    open: 0,
                }),
                available: Condvar::new(),
                max_connections: max_connections.max(1),
            }),
            replicas: Arc::new(Vec::new()),
        }
    }

    /// The pool to use for read-only operations: a randomly chosen read
    /// replica when any are configured, this pool otherwise.
    pub fn allowing_replicas(&self) -> &RedisPool {
        if self.replicas.is_empty() {
            return self;
        }
        let index = rand::thread_rng().gen_range(0..self.replicas.len());
        &self.replicas[index]
    }

    /// Runs `f` on a pooled connection. Blocks while the pool is
    /// exhausted.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut conn = self.acquire()?;
        match f(&mut conn) {
            Ok(value) => {
                self.release(conn);
                Ok(value)
            }
            Err(err) => {
                if is_connection_error(&err) {
                    warn!(error = %err, "discarding broken redis connection");
                    self.discard();
                } else {
                    self.release(conn);
                }
                Err(err.into())
            }
        }
    }

    /// Runs the staged commands inside WATCH / MULTI / EXEC, retrying
    /// with backoff until the transaction commits. Returns the EXEC
    /// results of the non-ignored commands.
    pub fn transaction(
        &self,
        watch: &[&str],
        stage: impl Fn(&mut Pipeline),
    ) -> Result<Vec<Value>> {
        self.with_connection(|conn| {
            let mut attempt = 0u32;
            loop {
                if !watch.is_empty() {
                    redis::cmd("WATCH").arg(watch).query::<()>(conn)?;
                }
                let mut pipe = redis::pipe();
                pipe.atomic();
                stage(&mut pipe);
                match pipe.query::<Option<Vec<Value>>>(conn)? {
                    Some(values) => return Ok(values),
                    None => {
                        attempt += 1;
                        debug!(attempt, "redis transaction aborted, retrying");
                        backoff(attempt);
                    }
                }
            }
        })
    }

    /// Runs the staged commands in a single MULTI / EXEC so every read
    /// observes one coherent snapshot.
    pub fn snapshot(&self, stage: impl Fn(&mut Pipeline)) -> Result<Vec<Value>> {
        self.transaction(&[], stage)
    }

    fn acquire(&self) -> Result<Connection> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|e| FilterError::Lock(e.to_string()))?;
        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(conn);
            }
            if state.open < self.inner.max_connections {
                state.open += 1;
                drop(state);
                return match self.inner.client.get_connection() {
                    Ok(conn) => Ok(conn),
                    Err(err) => {
                        self.discard();
                        Err(err.into())
                    }
                };
            }
            state = self
                .inner
                .available
                .wait(state)
                .map_err(|e| FilterError::Lock(e.to_string()))?;
        }
    }

    fn release(&self, conn: Connection) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.idle.push(conn);
        }
        self.inner.available.notify_one();
    }

    fn discard(&self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.open = state.open.saturating_sub(1);
        }
        self.inner.available.notify_one();
    }
}

fn is_connection_error(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}

/// Capped exponential backoff with jitter for optimistic-transaction
/// retries under contention.
pub(crate) fn backoff(attempt: u32) {
    let base = Duration::from_micros(100) * 2u32.pow(attempt.min(6));
    let jitter = rand::thread_rng().gen_range(Duration::ZERO..base);
    std::thread::sleep(base + jitter);
}
