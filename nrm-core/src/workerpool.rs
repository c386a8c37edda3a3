// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small fixed-size worker pool for per-channel solve fan-out
//! (spec.md §4.8, §5). Hand-rolled rather than pulled from a scheduler
//! crate, in keeping with the small concurrency primitives the teacher
//! writes by hand elsewhere (`RelayRouter`, `ParticipantRegistry`).

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Self {
        let handle = thread::spawn(move || loop {
            let job = receiver.lock().unwrap().recv();
            match job {
                Ok(job) => job(),
                Err(_) => break,
            }
        });
        Worker {
            handle: Some(handle),
        }
    }
}

/// A bounded pool of `size` worker threads (default: logical CPU count,
/// per spec.md §4.8 step 3).
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size).map(|_| Worker::new(receiver.clone())).collect();
        WorkerPool {
            sender: Some(sender),
            workers,
        }
    }

    pub fn default_size() -> usize {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }

    /// Run `f` over every item concurrently, returning results in the
    /// original order (spec.md §4.8: "Results come back as a list ...
    /// keyed by original channel index").
    pub fn map_indexed<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let (tx, rx) = mpsc::channel::<(usize, R)>();
        let n = items.len();
        for (idx, item) in items.into_iter().enumerate() {
            let f = f.clone();
            let tx = tx.clone();
            self.execute(move || {
                let result = f(item);
                let _ = tx.send((idx, result));
            });
        }
        drop(tx);

        let mut slots: Vec<Option<R>> = (0..n).map(|_| None).collect();
        for _ in 0..n {
            if let Ok((idx, result)) = rx.recv() {
                slots[idx] = Some(result);
            }
        }
        slots.into_iter().map(|s| s.expect("all jobs completed")).collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
