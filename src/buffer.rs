//! Process-wide buffer manager and container identity mapper
//!
//! Parallel kernels need one sparse accumulator per thread plus offset
//! scratch, and none of that may be allocated per call. The
//! [`BufferManager`] owns a process-wide pool that only ever grows:
//! containers reserve room at construction time, kernels lease scratch
//! structures for the duration of one primitive and return them on exit.
//! Callers must not retain leased buffers across primitive invocations.
//!
//! The same module hosts the identity mapper: every container receives a
//! process-unique id at construction, stable until destruction, that
//! kernels use to detect operand aliasing.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use log::debug;

use crate::config::SystemParameters;
use crate::coordinates::Coordinates;
use crate::error::{Error, Result};

/// Round `bytes` up to a multiple of the cache line size so per-thread
/// regions never share a line.
fn pad(bytes: usize, cache_line: usize) -> usize {
    bytes.div_ceil(cache_line) * cache_line
}

/// Bytes needed by one thread-local SPA over a domain of `len` indices
/// with values of `value_bytes` each: bit-array, stack, value buffer.
fn spa_bytes(len: usize, value_bytes: usize, cache_line: usize) -> usize {
    let words = len.div_ceil(64);
    pad(words * 8, cache_line) + pad(len * 8, cache_line) + pad(len * value_bytes, cache_line)
}

#[derive(Default)]
struct Pool {
    /// Total bytes the pool has committed to; grows by doubling.
    capacity: usize,
    /// Largest capacity ever reached.
    high_water: usize,
    /// Recycled sparse accumulators.
    spas: Vec<Coordinates>,
    /// Recycled offset scratch arrays.
    offsets: Vec<Vec<usize>>,
}

/// The process-wide, grow-only scratch pool.
pub struct BufferManager {
    pool: Mutex<Pool>,
    params: SystemParameters,
}

impl BufferManager {
    fn new() -> Self {
        Self {
            pool: Mutex::new(Pool::default()),
            params: SystemParameters::default(),
        }
    }

    /// The system parameters the manager sizes thread teams with.
    pub fn params(&self) -> &SystemParameters {
        &self.params
    }

    /// Grow the pool so that at least `bytes` are committed. Never
    /// shrinks; grows by doubling to amortise repeated reservations.
    pub fn reserve(&self, bytes: usize) -> Result<()> {
        let mut pool = self.pool.lock().map_err(|_| Error::Panic)?;
        if pool.capacity < bytes {
            let mut cap = pool.capacity.max(1);
            while cap < bytes {
                cap *= 2;
            }
            pool.capacity = cap;
            pool.high_water = pool.high_water.max(cap);
            debug!("buffer pool grown to {} bytes", cap);
        }
        Ok(())
    }

    /// Reserve room for the scratch a primitive over an `m x n` container
    /// with `value_bytes`-sized values will want: a column-offset scratch
    /// plus one SPA per additional thread of a full team.
    pub fn reserve_for_container(&self, m: usize, n: usize, value_bytes: usize) -> Result<()> {
        let cache_line = self.params.cache_line_size;
        let team = self.params.n_threads.max(1);
        let spa_len = m.max(n);
        let wanted = pad((n + 1) * 8, cache_line)
            + team.saturating_sub(1) * spa_bytes(spa_len, value_bytes, cache_line);
        self.reserve(wanted)
    }

    /// The largest thread count the current pool can equip with SPAs
    /// over a domain of `spa_len` indices, after reserving an offset
    /// scratch of `offset_len` entries.
    ///
    /// Thread 0 always uses the SPA owned by the output container, so a
    /// team of `T` threads only needs `T - 1` pooled SPAs.
    pub fn max_threads(&self, spa_len: usize, value_bytes: usize, offset_len: usize) -> usize {
        let cache_line = self.params.cache_line_size;
        let per_spa = spa_bytes(spa_len, value_bytes, cache_line).max(1);
        let capacity = match self.pool.lock() {
            Ok(pool) => pool.capacity,
            Err(_) => return 1,
        };
        let available = capacity.saturating_sub(pad(offset_len * 8, cache_line));
        let extra = available / per_spa;
        (1 + extra).min(self.params.n_threads.max(1))
    }

    /// Lease a sparse accumulator over `0..n` from the pool.
    pub fn lease_spa(&self, n: usize) -> Result<Coordinates> {
        let mut pool = self.pool.lock().map_err(|_| Error::Panic)?;
        let mut spa = match pool.spas.pop() {
            Some(spa) => spa,
            None => Coordinates::new(n),
        };
        drop(pool);
        spa.resize_domain(n);
        spa.clear();
        Ok(spa)
    }

    /// Return a leased sparse accumulator to the pool.
    pub fn return_spa(&self, spa: Coordinates) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.spas.push(spa);
        }
    }

    /// Lease an offset scratch array of `len` zeroed entries.
    pub fn lease_offsets(&self, len: usize) -> Result<Vec<usize>> {
        let mut pool = self.pool.lock().map_err(|_| Error::Panic)?;
        let mut buf = pool.offsets.pop().unwrap_or_default();
        drop(pool);
        buf.clear();
        buf.resize(len, 0);
        Ok(buf)
    }

    /// Return a leased offset scratch array to the pool.
    pub fn return_offsets(&self, buf: Vec<usize>) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.offsets.push(buf);
        }
    }

    /// The currently committed pool capacity, in bytes.
    pub fn capacity(&self) -> usize {
        self.pool.lock().map(|p| p.capacity).unwrap_or(0)
    }

    /// The largest capacity the pool ever reached, in bytes.
    pub fn high_water(&self) -> usize {
        self.pool.lock().map(|p| p.high_water).unwrap_or(0)
    }

    /// Drop all pooled structures. Capacity accounting restarts from
    /// zero; the high-water mark is kept.
    fn teardown(&self) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.spas.clear();
            pool.offsets.clear();
            pool.capacity = 0;
        }
    }
}

struct IdMapper {
    next: u64,
    live: HashSet<u64>,
}

static CONTEXT: OnceLock<BufferManager> = OnceLock::new();
static IDS: OnceLock<Mutex<IdMapper>> = OnceLock::new();

/// The process-wide buffer manager, created on first use.
pub fn manager() -> &'static BufferManager {
    CONTEXT.get_or_init(BufferManager::new)
}

fn ids() -> &'static Mutex<IdMapper> {
    IDS.get_or_init(|| {
        Mutex::new(IdMapper {
            next: 0,
            live: HashSet::new(),
        })
    })
}

/// Draw a fresh container identity, unique among all live containers.
pub(crate) fn next_container_id() -> u64 {
    let mut mapper = match ids().lock() {
        Ok(mapper) => mapper,
        Err(poisoned) => poisoned.into_inner(),
    };
    let id = mapper.next;
    mapper.next += 1;
    mapper.live.insert(id);
    id
}

/// Return a container identity on destruction.
pub(crate) fn release_container_id(id: u64) {
    let mut mapper = match ids().lock() {
        Ok(mapper) => mapper,
        Err(poisoned) => poisoned.into_inner(),
    };
    mapper.live.remove(&id);
}

/// The number of currently live container identities.
pub fn live_containers() -> usize {
    match ids().lock() {
        Ok(mapper) => mapper.live.len(),
        Err(poisoned) => poisoned.into_inner().live.len(),
    }
}

/// Initialise the library context: the buffer pool and identity mapper.
///
/// Calling any primitive initialises the context lazily, so this is only
/// needed when the caller wants the reservation cost paid up front.
pub fn init() -> Result<()> {
    let _ = manager();
    let _ = ids();
    Ok(())
}

/// Release the buffer pool. Live containers keep working; their next
/// parallel primitive re-grows the pool.
pub fn finalize() -> Result<()> {
    if let Some(manager) = CONTEXT.get() {
        manager.teardown();
    }
    Ok(())
}
