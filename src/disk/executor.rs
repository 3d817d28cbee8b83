use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed pool of worker threads that runs callback-based cache
/// operations.
///
/// Jobs run in queue order per worker but workers drain concurrently, so
/// submission order is not completion order. Dropping the pool disconnects
/// the queue and joins the workers; jobs already queued still run first.
pub(crate) struct Executor {
  sender: Option<Sender<Job>>,
  workers: Vec<JoinHandle<()>>,
}

impl Executor {
  pub(crate) fn new(name: &str) -> Self {
    let threads = num_cpus::get().clamp(1, 4);
    let (sender, receiver) = unbounded::<Job>();

    let mut workers = Vec::with_capacity(threads);
    for i in 0..threads {
      let receiver = receiver.clone();
      let handle = thread::Builder::new()
        .name(format!("{name}-disk-{i}"))
        .spawn(move || {
          // Runs until every sender is gone and the queue is drained.
          while let Ok(job) = receiver.recv() {
            job();
          }
        })
        .expect("failed to spawn disk worker thread");
      workers.push(handle);
    }

    Self {
      sender: Some(sender),
      workers,
    }
  }

  pub(crate) fn execute(&self, job: impl FnOnce() + Send + 'static) {
    if let Some(sender) = &self.sender {
      let _ = sender.send(Box::new(job));
    }
  }
}

impl Drop for Executor {
  fn drop(&mut self) {
    // Disconnect the queue so the workers exit once it drains.
    drop(self.sender.take());
    for worker in self.workers.drain(..) {
      let _ = worker.join();
    }
  }
}
