use std::fmt;

use parking_lot::Mutex;

/// Host transitions the cache reacts to.
///
/// How these are detected is the host's business (platform notification,
/// signal handler, cgroup watcher); the cache only consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
  /// The host process is under memory pressure.
  MemoryWarning,
  /// The application moved to the background.
  DidEnterBackground,
}

impl fmt::Display for HostEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HostEvent::MemoryWarning => write!(f, "memory warning"),
      HostEvent::DidEnterBackground => write!(f, "background entry"),
    }
  }
}

/// A handler registered with an [`EventSource`].
pub type EventHandler = Box<dyn Fn(HostEvent) + Send + Sync>;

/// Delivers host notifications to registered handlers.
///
/// The builder registers the memory tier here so that low-memory and
/// backgrounding transitions can purge it. Delivery runs on whatever thread
/// the source emits from; handlers must not assume a particular one.
pub trait EventSource: Send + Sync + 'static {
  fn register(&self, handler: EventHandler);
}

/// An event source driven by explicit [`emit`](ManualEventSource::emit)
/// calls.
///
/// Suitable for hosts that receive platform notifications through their own
/// plumbing and forward them, and for tests.
#[derive(Default)]
pub struct ManualEventSource {
  handlers: Mutex<Vec<EventHandler>>,
}

impl ManualEventSource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Delivers `event` to every registered handler, on the caller's thread.
  pub fn emit(&self, event: HostEvent) {
    let handlers = self.handlers.lock();
    for handler in handlers.iter() {
      handler(event);
    }
  }
}

impl EventSource for ManualEventSource {
  fn register(&self, handler: EventHandler) {
    self.handlers.lock().push(handler);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[test]
  fn emit_reaches_every_handler() {
    let source = ManualEventSource::new();
    let seen = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
      let seen = seen.clone();
      source.register(Box::new(move |event| {
        assert_eq!(event, HostEvent::MemoryWarning);
        seen.fetch_add(1, Ordering::Relaxed);
      }));
    }

    source.emit(HostEvent::MemoryWarning);
    assert_eq!(seen.load(Ordering::Relaxed), 3);
  }

  #[test]
  fn emit_with_no_handlers_is_a_no_op() {
    let source = ManualEventSource::new();
    source.emit(HostEvent::DidEnterBackground);
  }
}
