//! Single use channels the dispatcher resolves on behalf of callers.
//!
//! A `ResponseFuture` is resolved exactly once, either with the outcome of the operation or
//! with the reason the connection went away.  A `Notification` is a renewable subscription:
//! each time it fires it hands out the subscription for the next occurrence, so an already
//! consumed occurrence can never be observed twice.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::errors::DispatchError;

pub(crate) type ResponseSender<T> = oneshot::Sender<Result<T, DispatchError>>;

/// The eventual outcome of a dispatcher operation
#[derive(Debug)]
pub struct ResponseFuture<T> {
    state: ResponseState<T>,
}

#[derive(Debug)]
enum ResponseState<T> {
    Waiting(oneshot::Receiver<Result<T, DispatchError>>),
    Ready(Option<Result<T, DispatchError>>),
}

impl<T> ResponseFuture<T> {
    pub(crate) fn channel() -> (ResponseSender<T>, ResponseFuture<T>) {
        let (sender, receiver) = oneshot::channel();
        let future = ResponseFuture {
            state: ResponseState::Waiting(receiver),
        };

        (sender, future)
    }

    pub(crate) fn ready(result: Result<T, DispatchError>) -> ResponseFuture<T> {
        ResponseFuture {
            state: ResponseState::Ready(Some(result)),
        }
    }
}

// Nothing is ever pinned in place inside the future.
impl<T> Unpin for ResponseFuture<T> {}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T, DispatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().state {
            ResponseState::Waiting(ref mut receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::ResponseDropped)),
                Poll::Pending => Poll::Pending,
            },

            ResponseState::Ready(ref mut result) => {
                Poll::Ready(result.take().unwrap_or(Err(DispatchError::ResponseDropped)))
            }
        }
    }
}

/// A subscription to the next occurrence of a repeating notification
#[derive(Debug)]
pub struct Notification<T> {
    receiver: oneshot::Receiver<Notified<T>>,
}

/// One occurrence of a notification, along with the subscription for the occurrence after it
#[derive(Debug)]
pub struct Notified<T> {
    pub value: T,
    pub next: Notification<T>,
}

impl<T> Future for Notification<T> {
    type Output = Result<Notified<T>, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(notified)) => Poll::Ready(Ok(notified)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::NotificationClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The firing side of a `Notification`
#[derive(Debug)]
pub(crate) struct Notifier<T> {
    sender: oneshot::Sender<Notified<T>>,
}

impl<T> Notifier<T> {
    pub(crate) fn channel() -> (Notifier<T>, Notification<T>) {
        let (sender, receiver) = oneshot::channel();
        (Notifier { sender }, Notification { receiver })
    }

    /// Fires the current subscription and arms a fresh one in its place
    pub(crate) fn notify(&mut self, value: T) {
        let (sender, receiver) = oneshot::channel();
        let current = mem::replace(&mut self.sender, sender);
        let notified = Notified {
            value,
            next: Notification { receiver },
        };

        // Nobody listening is fine, the fresh subscription is what matters.
        let _ = current.send(notified);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_future_resolves_immediately() {
        let future = ResponseFuture::ready(Ok(5));
        assert_eq!(future.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn dropped_sender_resolves_as_dropped_response() {
        let (sender, future) = ResponseFuture::<u32>::channel();
        drop(sender);

        match future.await {
            Err(DispatchError::ResponseDropped) => (),
            x => panic!("Expected a dropped response, got {:?}", x),
        }
    }

    #[tokio::test]
    async fn notification_hands_out_fresh_subscription_each_time() {
        let (mut notifier, first) = Notifier::channel();
        notifier.notify(1);
        notifier.notify(2);

        let notified = first.await.unwrap();
        assert_eq!(notified.value, 1);

        let notified = notified.next.await.unwrap();
        assert_eq!(notified.value, 2);
    }

    #[tokio::test]
    async fn dropped_notifier_closes_subscription() {
        let (notifier, subscription) = Notifier::<u32>::channel();
        drop(notifier);

        match subscription.await {
            Err(DispatchError::NotificationClosed) => (),
            x => panic!("Expected a closed notification, got {:?}", x),
        }
    }
}
