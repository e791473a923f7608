// crates/recode-media/src/queue.rs
//
// TranscodeQueue: bounded-concurrency FIFO over prepared jobs. A fixed pool
// of worker threads (pool size = the concurrency cap, so the cap holds
// structurally) waits on a condvar, pops the oldest Prepared job, runs it to
// a terminal state, and hands the slot to the next one. Failed jobs stay
// Failed until an explicit `retry`; cancellation flips the job's flag and the
// worker winds down cooperatively.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use uuid::Uuid;

use recode_core::{JobConfig, JobEvent, JobId, JobState};

use crate::cancel::CancelFlag;
use crate::runner;

/// Result-channel capacity; a stalled listener coalesces progress events but
/// never blocks a worker on terminal events for long.
const EVENT_CHANNEL_CAPACITY: usize = 512;

type Exec = Box<dyn Fn(JobId, &JobConfig, &CancelFlag, &Sender<JobEvent>) -> JobState + Send + Sync>;

struct JobEntry {
    config: JobConfig,
    state:  JobState,
    cancel: CancelFlag,
}

struct QueueState {
    jobs:     HashMap<JobId, JobEntry>,
    fifo:     VecDeque<JobId>,
    running:  usize,
    shutdown: bool,
}

struct Inner {
    state:  Mutex<QueueState>,
    cv:     Condvar,
    events: Sender<JobEvent>,
    exec:   Exec,
}

pub struct TranscodeQueue {
    inner:   Arc<Inner>,
    cap:     usize,
    workers: Vec<JoinHandle<()>>,
}

impl TranscodeQueue {
    /// Spawn a queue with at most `cap` jobs transcoding at once. Returns the
    /// queue handle and the event stream every job reports into.
    pub fn new(cap: usize) -> (Self, Receiver<JobEvent>) {
        Self::with_exec(
            cap,
            Box::new(|id, config, cancel, events| runner::run_job(id, config, cancel, events)),
        )
    }

    /// Worker body is injectable so scheduling behaviour is testable without
    /// media files.
    fn with_exec(cap: usize, exec: Exec) -> (Self, Receiver<JobEvent>) {
        let cap = cap.max(1);
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState {
                jobs:     HashMap::new(),
                fifo:     VecDeque::new(),
                running:  0,
                shutdown: false,
            }),
            cv: Condvar::new(),
            events: tx,
            exec,
        });

        let workers = (0..cap)
            .map(|i| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("recode-worker-{i}"))
                    .spawn(move || worker_loop(&inner))
                    .expect("spawn transcode worker")
            })
            .collect();

        (Self { inner, cap, workers }, rx)
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append a job in the Prepared state; a free worker picks it up FIFO.
    pub fn enqueue(&self, config: JobConfig) -> JobId {
        let id = Uuid::new_v4();
        {
            let mut st = self.inner.state.lock().unwrap();
            st.jobs.insert(id, JobEntry {
                config,
                state:  JobState::Prepared,
                cancel: CancelFlag::new(),
            });
            st.fifo.push_back(id);
        }
        self.inner.cv.notify_one();
        id
    }

    /// Cancel a job: a Prepared job is retired directly, a Running job gets
    /// its flag set and winds down at the next suspension point. Terminal
    /// jobs are left alone.
    pub fn cancel(&self, id: JobId) {
        let mut guard = self.inner.state.lock().unwrap();
        let st = &mut *guard;
        let Some(entry) = st.jobs.get_mut(&id) else { return };
        match entry.state {
            JobState::Prepared => {
                entry.state = JobState::Cancelled;
                st.fifo.retain(|queued| *queued != id);
                let _ = self.inner.events.try_send(JobEvent::Cancelled { job_id: id });
            }
            JobState::Running => entry.cancel.set(),
            _ => {}
        }
    }

    /// The only backward transition: Failed → Prepared, re-queued at the back.
    pub fn retry(&self, id: JobId) -> bool {
        let requeued = {
            let mut guard = self.inner.state.lock().unwrap();
            let st = &mut *guard;
            match st.jobs.get_mut(&id) {
                Some(entry) if matches!(entry.state, JobState::Failed(_)) => {
                    entry.state  = JobState::Prepared;
                    entry.cancel = CancelFlag::new();
                    st.fifo.push_back(id);
                    true
                }
                _ => false,
            }
        };
        if requeued {
            self.inner.cv.notify_one();
        }
        requeued
    }

    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.inner.state.lock().unwrap().jobs.get(&id).map(|e| e.state.clone())
    }

    /// Number of jobs currently transcoding; never exceeds `cap`.
    pub fn running(&self) -> usize {
        self.inner.state.lock().unwrap().running
    }
}

impl Drop for TranscodeQueue {
    fn drop(&mut self) {
        {
            let mut st = self.inner.state.lock().unwrap();
            st.shutdown = true;
            // Ask running jobs to wind down so the join below is bounded.
            for entry in st.jobs.values() {
                if entry.state == JobState::Running {
                    entry.cancel.set();
                }
            }
        }
        self.inner.cv.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: &Inner) {
    loop {
        let (id, config, cancel) = {
            let mut st = inner.state.lock().unwrap();
            loop {
                if st.shutdown {
                    return;
                }
                if let Some(claimed) = claim_next(&mut st) {
                    st.running += 1;
                    break claimed;
                }
                st = inner.cv.wait(st).unwrap();
            }
        };

        let terminal = (inner.exec)(id, &config, &cancel, &inner.events);

        {
            let mut st = inner.state.lock().unwrap();
            st.running -= 1;
            if let Some(entry) = st.jobs.get_mut(&id) {
                entry.state = terminal;
            }
        }
        inner.cv.notify_all();
    }
}

/// Pop the oldest queued job that is still Prepared and mark it Running
/// (entries cancelled while waiting are skipped and dropped from the queue).
fn claim_next(st: &mut QueueState) -> Option<(JobId, JobConfig, CancelFlag)> {
    while let Some(id) = st.fifo.pop_front() {
        if let Some(entry) = st.jobs.get_mut(&id) {
            if entry.state == JobState::Prepared {
                entry.state = JobState::Running;
                return Some((id, entry.config.clone(), entry.cancel.clone()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use recode_core::Container;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn dummy_config() -> JobConfig {
        JobConfig {
            input:          PathBuf::from("in.mov"),
            container:      Container::Flac,
            video:          None,
            audio:          None,
            decode_threads: 0,
            encode_threads: 0,
            output:         PathBuf::from("out.flac"),
        }
    }

    fn wait_terminal(queue: &TranscodeQueue, id: JobId) -> JobState {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let state = queue.state(id).expect("job exists");
            if state.is_terminal() {
                return state;
            }
            assert!(Instant::now() < deadline, "job {id} never finished");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn cap_bounds_concurrent_jobs() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (live2, peak2) = (Arc::clone(&live), Arc::clone(&peak));

        let (queue, _events) = TranscodeQueue::with_exec(
            2,
            Box::new(move |_, _, _, _| {
                let now = live2.fetch_add(1, Ordering::SeqCst) + 1;
                peak2.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(30));
                live2.fetch_sub(1, Ordering::SeqCst);
                JobState::Succeeded
            }),
        );

        let ids: Vec<_> = (0..5).map(|_| queue.enqueue(dummy_config())).collect();
        for id in ids {
            assert_eq!(wait_terminal(&queue, id), JobState::Succeeded);
        }
        assert!(peak.load(Ordering::SeqCst) <= 2, "cap exceeded: {}", peak.load(Ordering::SeqCst));
    }

    #[test]
    fn jobs_start_in_fifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order2 = Arc::clone(&order);

        let (queue, _events) = TranscodeQueue::with_exec(
            1,
            Box::new(move |id, _, _, _| {
                order2.lock().unwrap().push(id);
                JobState::Succeeded
            }),
        );

        let ids: Vec<_> = (0..4).map(|_| queue.enqueue(dummy_config())).collect();
        for id in &ids {
            wait_terminal(&queue, *id);
        }
        assert_eq!(*order.lock().unwrap(), ids);
    }

    #[test]
    fn retry_requeues_only_failed_jobs() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = Arc::clone(&attempts);

        let (queue, _events) = TranscodeQueue::with_exec(
            1,
            Box::new(move |_, _, _, _| {
                if attempts2.fetch_add(1, Ordering::SeqCst) == 0 {
                    JobState::Failed(recode_core::JobError::new(
                        recode_core::ErrorKind::Decoder,
                        "simulated",
                    ))
                } else {
                    JobState::Succeeded
                }
            }),
        );

        let id = queue.enqueue(dummy_config());
        assert!(matches!(wait_terminal(&queue, id), JobState::Failed(_)));

        assert!(queue.retry(id));
        assert_eq!(wait_terminal(&queue, id), JobState::Succeeded);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        // Succeeded is terminal for good — no second retry.
        assert!(!queue.retry(id));
    }

    #[test]
    fn cancel_prepared_job_never_runs() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);

        let (queue, _events) = TranscodeQueue::with_exec(
            1,
            Box::new(move |_, _, cancel, _| {
                ran2.fetch_add(1, Ordering::SeqCst);
                // Block until cancelled so the second job stays queued.
                while !cancel.is_set() {
                    thread::sleep(Duration::from_millis(2));
                }
                JobState::Cancelled
            }),
        );

        let first  = queue.enqueue(dummy_config());
        let second = queue.enqueue(dummy_config());

        // Wait until the first job occupies the only slot.
        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.running() == 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }

        queue.cancel(second);
        assert_eq!(queue.state(second), Some(JobState::Cancelled));

        queue.cancel(first);
        assert_eq!(wait_terminal(&queue, first), JobState::Cancelled);
        assert_eq!(ran.load(Ordering::SeqCst), 1, "cancelled queued job must not run");
    }
}
