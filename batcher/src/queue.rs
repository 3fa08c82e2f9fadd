/*!
Deferred execution of work.

A [`DispatchQueue`] runs jobs after a delay on some other thread. Each scheduled job is paired with a [`Scheduled`] handle that can cancel it before it runs.
*/

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    fmt, io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{self, AtomicBool},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

/**
A unit of work submitted to a [`DispatchQueue`].
*/
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/**
A queue that runs jobs after a delay.

Implementations must run jobs off the calling thread, and must not run a job whose [`Scheduled`] handle has been cancelled.
*/
pub trait DispatchQueue {
    /**
    Run `job` once `delay` has elapsed.
    */
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled;
}

impl<'a, T: DispatchQueue + ?Sized> DispatchQueue for &'a T {
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled {
        (**self).schedule(delay, job)
    }
}

impl<T: DispatchQueue + ?Sized> DispatchQueue for Box<T> {
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled {
        (**self).schedule(delay, job)
    }
}

impl<T: DispatchQueue + ?Sized> DispatchQueue for Arc<T> {
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled {
        (**self).schedule(delay, job)
    }
}

/**
A handle to a job submitted to a [`DispatchQueue`].
*/
#[derive(Clone, Default)]
pub struct Scheduled(Arc<AtomicBool>);

impl Scheduled {
    pub fn new() -> Self {
        Scheduled(Arc::new(AtomicBool::new(false)))
    }

    /**
    Prevent the job from running if it hasn't started yet.
    */
    pub fn cancel(&self) {
        self.0.store(true, atomic::Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(atomic::Ordering::Acquire)
    }
}

impl fmt::Debug for Scheduled {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scheduled")
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

/**
A [`DispatchQueue`] backed by a single dedicated thread.

Jobs run one at a time in order of their deadline, with ties broken by submission order. The thread exits once the queue is dropped; jobs still pending at that point never run.
*/
pub struct ThreadQueue {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

struct State {
    jobs: BinaryHeap<Pending>,
    next_seq: u64,
    is_open: bool,
}

struct Pending {
    deadline: Instant,
    seq: u64,
    scheduled: Scheduled,
    job: Job,
}

// `BinaryHeap` is a max-heap, so the ordering is reversed
// to pop the earliest deadline first
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl Shared {
    fn lock(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn run(&self) {
        let mut state = self.lock();

        loop {
            if !state.is_open {
                return;
            }

            let now = Instant::now();

            let next = match state.jobs.peek() {
                Some(pending) if pending.deadline <= now => Next::Run,
                Some(pending) => Next::Wait(pending.deadline - now),
                None => Next::Idle,
            };

            state = match next {
                Next::Run => {
                    let Some(pending) = state.jobs.pop() else {
                        continue;
                    };

                    drop(state);

                    if !pending.scheduled.is_cancelled()
                        && panic::catch_unwind(AssertUnwindSafe(pending.job)).is_err()
                    {
                        emit::warn!(rt: emit::runtime::internal(), "scheduled job panicked");
                    }

                    self.lock()
                }
                Next::Wait(timeout) => {
                    self.wake
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(|err| err.into_inner())
                        .0
                }
                Next::Idle => self.wake.wait(state).unwrap_or_else(|err| err.into_inner()),
            };
        }
    }
}

enum Next {
    Run,
    Wait(Duration),
    Idle,
}

impl ThreadQueue {
    /**
    Spawn the background thread for a new queue.
    */
    pub fn spawn() -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                jobs: BinaryHeap::new(),
                next_seq: 0,
                is_open: true,
            }),
            wake: Condvar::new(),
        });

        thread::Builder::new().name(String::from("satchel-queue")).spawn({
            let shared = shared.clone();

            move || shared.run()
        })?;

        Ok(ThreadQueue { shared })
    }
}

impl DispatchQueue for ThreadQueue {
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled {
        let scheduled = Scheduled::new();

        let mut state = self.shared.lock();

        let seq = state.next_seq;
        state.next_seq += 1;

        state.jobs.push(Pending {
            deadline: Instant::now() + delay,
            seq,
            scheduled: scheduled.clone(),
            job,
        });

        drop(state);
        self.shared.wake.notify_all();

        scheduled
    }
}

impl Drop for ThreadQueue {
    fn drop(&mut self) {
        self.shared.lock().is_open = false;
        self.shared.wake.notify_all();
    }
}
