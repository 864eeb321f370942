//! The ways of driving the same workload
//!
//! Each approach runs `num_sessions` independent chains of
//! `dispatches_per_session` dependent dispatches on a fresh pool: a chain
//! issues its next dispatch only after the previous one completed.

use crate::config::BenchConfig;
use crate::workload::Workload;

use handoff::{
    callback, dispatch, session, Blocking, Completion, ExecutorExt, PoolConfig, Suspend,
    ThreadPool, Workers,
};
use std::error::Error;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

pub type BenchResult<T> = Result<T, Box<dyn Error>>;

/// Outcome of one approach
#[derive(Debug, Clone)]
pub struct RunReport {
    pub name: &'static str,
    pub dispatches: u64,
    pub failures: u64,
    pub elapsed: Duration,
    pub waits: u64,
}

impl RunReport {
    pub fn per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.dispatches as f64 / secs) as u64
        } else {
            0
        }
    }
}

pub trait Approach {
    fn name(&self) -> &'static str;
    fn go(&self, config: &BenchConfig) -> BenchResult<RunReport>;
}

/// Everything an approach sets up before the clock starts.
struct Bench {
    pool: Arc<ThreadPool>,
    workers: Workers,
    workload: Arc<Workload>,
}

impl Bench {
    fn start(config: &BenchConfig) -> BenchResult<Self> {
        // Every chain can have one task queued, plus a session's first poll.
        let capacity = (config.num_sessions * 2)
            .next_power_of_two()
            .max(PoolConfig::new().queue_capacity);
        let pool_config = PoolConfig::from_env()
            .num_workers(config.num_threads)
            .queue_capacity(capacity);
        pool_config.log();

        let pool = ThreadPool::new(pool_config)?;
        let workers = pool.start()?;
        Ok(Self {
            pool,
            workers,
            workload: Arc::new(Workload::new(config)),
        })
    }

    fn finish(
        self,
        name: &'static str,
        config: &BenchConfig,
        started: Instant,
        failures: u64,
    ) -> RunReport {
        let elapsed = started.elapsed();
        self.pool.stop();
        self.workers.join();

        let stats = self.pool.stats();
        tracing::debug!(
            approach = name,
            completed = stats.completed,
            rejected = stats.rejected,
            panicked = stats.panicked,
            parked = stats.parked,
            chars = self.workload.chars(),
            "pool drained"
        );

        RunReport {
            name,
            dispatches: config.total_dispatches(),
            failures,
            elapsed,
            waits: self.workload.waits(),
        }
    }
}

fn seed(session: usize, step: usize) -> u64 {
    ((session as u64) << 32) ^ step as u64
}

// ============================================================================
// Blocking driver threads
// ============================================================================

/// One OS thread per driver, parked on every dispatch.
pub struct BlockingApproach;

impl Approach for BlockingApproach {
    fn name(&self) -> &'static str {
        "blocking"
    }

    fn go(&self, config: &BenchConfig) -> BenchResult<RunReport> {
        let bench = Bench::start(config)?;
        let started = Instant::now();

        let drivers: Vec<_> = (0..config.num_threads)
            .map(|driver| {
                let pool = Arc::clone(&bench.pool);
                let workload = Arc::clone(&bench.workload);
                let config = config.clone();
                thread::Builder::new()
                    .name(format!("bench-driver-{}", driver))
                    .spawn(move || {
                        let mut failures = 0u64;
                        for s in (driver..config.num_sessions).step_by(config.num_threads) {
                            for step in 0..config.dispatches_per_session {
                                let workload = Arc::clone(&workload);
                                let task = move || workload.run_once(seed(s, step));
                                let done = pool.dispatch(task, Blocking);
                                if done.is_err() {
                                    failures += 1;
                                }
                            }
                        }
                        failures
                    })
            })
            .collect::<Result<_, _>>()?;

        let mut failures = 0;
        for driver in drivers {
            failures += driver.join().map_err(|_| "driver thread panicked")?;
        }

        Ok(bench.finish(self.name(), config, started, failures))
    }
}

// ============================================================================
// Callback state machines
// ============================================================================

/// Sessions written as explicit state machines, advanced from callbacks.
pub struct CallbackApproach;

struct Chain {
    pool: Arc<ThreadPool>,
    workload: Arc<Workload>,
    session: usize,
    step: usize,
    steps: usize,
    failures: u64,
    done: mpsc::Sender<u64>,
}

impl Chain {
    fn advance(mut self) {
        if self.step == self.steps {
            let _ = self.done.send(self.failures);
            return;
        }

        let workload = Arc::clone(&self.workload);
        let seed = seed(self.session, self.step);
        let pool = Arc::clone(&self.pool);
        self.step += 1;

        dispatch(
            &*pool,
            move || workload.run_once(seed),
            callback(move |completion: Completion| {
                let mut chain = self;
                if completion.is_err() {
                    chain.failures += 1;
                }
                chain.advance();
            }),
        );
    }
}

impl Approach for CallbackApproach {
    fn name(&self) -> &'static str {
        "callbacks"
    }

    fn go(&self, config: &BenchConfig) -> BenchResult<RunReport> {
        let bench = Bench::start(config)?;
        let (done_tx, done_rx) = mpsc::channel();
        let started = Instant::now();

        for session in 0..config.num_sessions {
            Chain {
                pool: Arc::clone(&bench.pool),
                workload: Arc::clone(&bench.workload),
                session,
                step: 0,
                steps: config.dispatches_per_session,
                failures: 0,
                done: done_tx.clone(),
            }
            .advance();
        }
        drop(done_tx);

        let failures = done_rx.iter().take(config.num_sessions).sum();
        Ok(bench.finish(self.name(), config, started, failures))
    }
}

// ============================================================================
// Async sessions
// ============================================================================

/// Sessions written as `async` blocks, suspended on every dispatch.
///
/// Eager sessions submit before suspending; lazy ones suspend first and
/// submit from the first poll.
pub struct SessionApproach {
    pub lazy: bool,
}

impl Approach for SessionApproach {
    fn name(&self) -> &'static str {
        if self.lazy {
            "sessions-lazy"
        } else {
            "sessions"
        }
    }

    fn go(&self, config: &BenchConfig) -> BenchResult<RunReport> {
        let bench = Bench::start(config)?;
        let steps = config.dispatches_per_session;
        let lazy = self.lazy;
        let started = Instant::now();

        let mut failures = 0u64;
        let mut handles = Vec::with_capacity(config.num_sessions);
        for s in 0..config.num_sessions {
            let pool = Arc::clone(&bench.pool);
            let workload = Arc::clone(&bench.workload);
            let spawned = session::spawn(&*bench.pool, async move {
                let mut failures = 0u64;
                for step in 0..steps {
                    let workload = Arc::clone(&workload);
                    let task = move || workload.run_once(seed(s, step));
                    let done = if lazy {
                        pool.dispatch_lazy(task).await
                    } else {
                        pool.dispatch(task, Suspend).await
                    };
                    if done.is_err() {
                        failures += 1;
                    }
                }
                failures
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(rejected) => {
                    tracing::warn!(session = s, reason = %rejected.reason, "session not started");
                    failures += steps as u64;
                }
            }
        }

        for handle in handles {
            let session = handle.id();
            failures += handle.join().unwrap_or_else(|error| {
                tracing::warn!(session, %error, "session failed");
                steps as u64
            });
        }

        Ok(bench.finish(self.name(), config, started, failures))
    }
}

pub fn all() -> Vec<Box<dyn Approach>> {
    vec![
        Box::new(BlockingApproach),
        Box::new(CallbackApproach),
        Box::new(SessionApproach { lazy: false }),
        Box::new(SessionApproach { lazy: true }),
    ]
}
