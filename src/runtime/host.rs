//! In-order host command queue
//!
//! A single worker thread drains a channel of bound launches. Submission
//! never waits for execution; [`CommandQueue::finish`] blocks on a condition
//! variable until the pending count drops to zero.

use super::{Allocator, CommandQueue, GpuTarget, HostAllocator, Kernel, Launch, LaunchRecord};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

#[derive(Default)]
struct QueueState {
    pending: usize,
    /// First failure since the last `finish`
    error: Option<Error>,
}

struct Shared {
    state: Mutex<QueueState>,
    drained: Condvar,
}

/// Reference command queue executing kernels on the host
pub struct HostQueue {
    target: GpuTarget,
    allocator: HostAllocator,
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Launch>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    log: Mutex<Vec<LaunchRecord>>,
}

impl HostQueue {
    /// Queue for `target` with an unbounded allocator
    pub fn new(target: GpuTarget) -> Self {
        Self::with_allocator(target, HostAllocator::new())
    }

    /// Queue for `target` drawing scratch memory from `allocator`
    pub fn with_allocator(target: GpuTarget, allocator: HostAllocator) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            drained: Condvar::new(),
        });
        let (sender, receiver) = mpsc::channel::<Launch>();

        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            while let Ok(launch) = receiver.recv() {
                let kernel = launch.kernel();
                let outcome = launch.execute();
                let mut state = worker_shared.state.lock();
                state.pending -= 1;
                if let Err(e) = outcome {
                    log::error!("kernel {kernel} failed: {e}");
                    state.error.get_or_insert(e);
                }
                if state.pending == 0 {
                    worker_shared.drained.notify_all();
                }
            }
        });

        Self {
            target,
            allocator,
            shared,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Every launch submitted so far, in submission order
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.log.lock().clone()
    }

    /// Number of submitted launches of the named kernel
    pub fn launch_count(&self, kernel: &str) -> usize {
        self.log.lock().iter().filter(|r| r.kernel == kernel).count()
    }

    /// Forget recorded launches
    pub fn clear_launches(&self) {
        self.log.lock().clear();
    }

    /// Host allocator backing this queue
    pub fn host_allocator(&self) -> &HostAllocator {
        &self.allocator
    }
}

impl CommandQueue for HostQueue {
    fn target(&self) -> GpuTarget {
        self.target
    }

    fn allocator(&self) -> &dyn Allocator {
        &self.allocator
    }

    fn enqueue(&self, kernel: &dyn Kernel, flush: bool) -> Result<()> {
        let launch = kernel.launch()?;

        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| Error::Device("queue has shut down".to_string()))?;

        self.shared.state.lock().pending += 1;
        if sender.send(launch).is_err() {
            self.shared.state.lock().pending -= 1;
            return Err(Error::Device("queue worker exited".to_string()));
        }

        let mut log = self.log.lock();
        let sequence = log.len() as u64;
        log::trace!("enqueue #{sequence} {} (flush={flush})", kernel.name());
        log.push(LaunchRecord {
            sequence,
            kernel: kernel.name(),
            flush,
        });
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        while state.pending > 0 {
            self.shared.drained.wait(&mut state);
        }
        match state.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for HostQueue {
    fn drop(&mut self) {
        // closing the channel ends the worker loop once it drains
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for HostQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostQueue")
            .field("target", &self.target)
            .field("submitted", &self.log.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Step {
        name: &'static str,
        order: Arc<Mutex<Vec<usize>>>,
        index: usize,
        fail: bool,
    }

    impl Kernel for Step {
        fn name(&self) -> &'static str {
            self.name
        }

        fn launch(&self) -> Result<Launch> {
            let order = self.order.clone();
            let index = self.index;
            let fail = self.fail;
            Ok(Launch::new(self.name, move || {
                std::thread::sleep(std::time::Duration::from_millis(1));
                order.lock().push(index);
                if fail {
                    Err(Error::Device("boom".to_string()))
                } else {
                    Ok(())
                }
            }))
        }
    }

    #[test]
    fn test_executes_in_submission_order() {
        let queue = HostQueue::new(GpuTarget::G71);
        let order = Arc::new(Mutex::new(Vec::new()));
        for index in 0..16 {
            let step = Step {
                name: "step",
                order: order.clone(),
                index,
                fail: false,
            };
            queue.enqueue(&step, false).unwrap();
        }
        queue.finish().unwrap();
        assert_eq!(*order.lock(), (0..16).collect::<Vec<_>>());
        assert_eq!(queue.launch_count("step"), 16);
    }

    #[test]
    fn test_finish_reports_first_error_once() {
        let queue = HostQueue::new(GpuTarget::G78);
        let order = Arc::new(Mutex::new(Vec::new()));
        let bad = Step {
            name: "bad",
            order: order.clone(),
            index: 0,
            fail: true,
        };
        queue.enqueue(&bad, true).unwrap();
        assert!(matches!(queue.finish(), Err(Error::Device(_))));
        assert!(queue.finish().is_ok());
    }

    #[test]
    fn test_enqueue_does_not_wait() {
        struct Slow(Arc<AtomicUsize>);
        impl Kernel for Slow {
            fn name(&self) -> &'static str {
                "slow"
            }
            fn launch(&self) -> Result<Launch> {
                let done = self.0.clone();
                Ok(Launch::new("slow", move || {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            }
        }

        let queue = HostQueue::new(GpuTarget::G52);
        let done = Arc::new(AtomicUsize::new(0));
        queue.enqueue(&Slow(done.clone()), false).unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 0);
        queue.finish().unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
