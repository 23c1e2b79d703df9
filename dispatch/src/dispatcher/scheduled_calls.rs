use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::task::Poll;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use super::lock;

/// Identifies a call that was handed to a `ScheduledCallRegistry`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallKey(u64);

/// Keeps track of deferred calls that have not fired yet, so they can be cancelled when the
/// connection they belong to goes away.
///
/// Calls are fired by a single consumer task, one after the other in the order they were
/// scheduled, even on a multi-threaded runtime.  A call runs on the consumer until it first
/// suspends; whatever is left of it then continues on its own task, so a suspended call never
/// holds up the calls behind it.
///
/// A call removes itself from the registry right before it starts running.  Cancelling after
/// that point has no effect, which means a call that is already running (and possibly
/// suspended) is never torn down half way.
#[derive(Clone, Default)]
pub struct ScheduledCallRegistry {
    pending: Arc<Mutex<PendingCalls>>,
}

#[derive(Default)]
struct PendingCalls {
    keys: HashSet<CallKey>,
    next_key: u64,
    queue: Option<mpsc::UnboundedSender<ScheduledCall>>,
}

struct ScheduledCall {
    key: CallKey,
    due: Option<Instant>,
    call: BoxFuture<'static, ()>,
}

impl ScheduledCallRegistry {
    pub fn new() -> ScheduledCallRegistry {
        ScheduledCallRegistry::default()
    }

    /// Queues the call to fire once the delay has passed.  Returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, call: F) -> CallKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = lock(&self.pending);
        let pending = &mut *guard;
        let key = CallKey(pending.next_key);
        pending.next_key += 1;

        let due = if delay > Duration::from_secs(0) {
            Some(Instant::now() + delay)
        } else {
            None
        };

        let scheduled = ScheduledCall {
            key,
            due,
            call: call.boxed(),
        };

        let registry = Arc::downgrade(&self.pending);
        let queue = pending
            .queue
            .get_or_insert_with(|| spawn_consumer(registry));

        if queue.send(scheduled).is_ok() {
            pending.keys.insert(key);
        } else {
            trace!("Scheduled call consumer is gone, dropping call");
        }

        key
    }

    /// Cancels a single call.  Returns false if the call already fired or was cancelled.
    pub fn cancel(&self, key: CallKey) -> bool {
        lock(&self.pending).keys.remove(&key)
    }

    /// Cancels every call that has not fired yet
    pub fn cancel_all(&self) {
        let mut pending = lock(&self.pending);
        if !pending.keys.is_empty() {
            trace!("Cancelling {} scheduled calls", pending.keys.len());
        }

        pending.keys.clear();
    }

    /// Number of calls that have not fired yet
    pub fn len(&self) -> usize {
        lock(&self.pending).keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Starts the task that fires calls in the order they were queued.  The task ends once the
/// registry is dropped.
fn spawn_consumer(registry: Weak<Mutex<PendingCalls>>) -> mpsc::UnboundedSender<ScheduledCall> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<ScheduledCall>();
    tokio::spawn(async move {
        while let Some(scheduled) = receiver.recv().await {
            if let Some(due) = scheduled.due {
                tokio::time::sleep_until(due).await;
            }

            let fired = match registry.upgrade() {
                Some(registry) => {
                    let removed = lock(&registry).keys.remove(&scheduled.key);
                    removed
                }

                None => break,
            };

            // Cancelled calls are simply dropped
            if !fired {
                continue;
            }

            let mut call = scheduled.call;
            if let Poll::Pending = futures::poll!(&mut call) {
                tokio::spawn(call);
            }
        }
    });

    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_call(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn let_tasks_run() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn scheduled_call_runs_and_leaves_registry() {
        let registry = ScheduledCallRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.schedule(Duration::from_secs(0), counting_call(&counter));
        assert_eq!(registry.len(), 1, "Call should be pending before it fires");

        let_tasks_run().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1, "Call did not run");
        assert!(registry.is_empty(), "Fired call was not removed");
    }

    #[tokio::test]
    async fn cancel_all_prevents_unfired_calls() {
        let registry = ScheduledCallRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.schedule(Duration::from_secs(0), counting_call(&counter));
        registry.schedule(Duration::from_secs(0), counting_call(&counter));
        registry.cancel_all();
        registry.cancel_all();

        let_tasks_run().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0, "Cancelled call ran");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn single_call_can_be_cancelled() {
        let registry = ScheduledCallRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let cancelled = registry.schedule(Duration::from_secs(0), counting_call(&counter));
        registry.schedule(Duration::from_secs(0), counting_call(&counter));

        assert!(registry.cancel(cancelled), "Pending call could not be cancelled");
        assert!(!registry.cancel(cancelled), "Call was cancelled twice");

        let_tasks_run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelling_after_firing_has_no_effect() {
        let registry = ScheduledCallRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let key = registry.schedule(Duration::from_secs(0), counting_call(&counter));
        let_tasks_run().await;

        assert!(!registry.cancel(key));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn call_can_schedule_another_call_while_firing() {
        let registry = ScheduledCallRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_registry = registry.clone();
        let inner_call = counting_call(&counter);
        registry.schedule(Duration::from_secs(0), async move {
            inner_registry.schedule(Duration::from_secs(0), inner_call);
        });

        let_tasks_run().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_call_waits_for_its_delay() {
        let registry = ScheduledCallRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.schedule(Duration::from_secs(5), counting_call(&counter));
        let_tasks_run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0, "Call fired before its delay");

        tokio::time::sleep(Duration::from_secs(6)).await;
        let_tasks_run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Call did not fire after its delay");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn calls_fire_in_scheduling_order_on_multi_threaded_runtime() {
        let registry = ScheduledCallRegistry::new();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let (done_sender, mut done) = mpsc::unbounded_channel();

        for index in 0..500 {
            let fired = fired.clone();
            let done_sender = done_sender.clone();
            registry.schedule(Duration::from_secs(0), async move {
                lock(&fired).push(index);
                let _ = done_sender.send(());
            });
        }

        for _ in 0..500 {
            done.recv().await.unwrap();
        }

        let fired = lock(&fired).clone();
        assert_eq!(fired, (0..500).collect::<Vec<_>>(), "Calls fired out of order");
    }

    #[tokio::test]
    async fn suspended_call_does_not_hold_up_later_calls() {
        let registry = ScheduledCallRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let suspended_counter = counter.clone();
        registry.schedule(Duration::from_secs(0), async move {
            let _ = released.await;
            suspended_counter.fetch_add(10, Ordering::SeqCst);
        });
        registry.schedule(Duration::from_secs(0), counting_call(&counter));

        let_tasks_run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Later call was held up");
        assert!(registry.is_empty());

        release.send(()).unwrap();
        let_tasks_run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 11, "Suspended call never finished");
    }
}
