//! Listener registration and delivery for Trellis models.
//!
//! Every model keeps its observers in a [`SubscriberList`], a shareable,
//! lock-protected arena of callbacks. Registering a callback hands back a
//! [`Subscription`]; dropping that handle (or calling
//! [`Subscription::unsubscribe`]) is the only way a listener is removed.
//!
//! Delivery snapshots the registered callbacks and releases the lock before
//! invoking any of them, so a listener may subscribe, unsubscribe (including
//! removing itself), or trigger further notifications without deadlocking.
//! Listeners added while a notification is in flight are not invoked until
//! the next notification.
//!
//! # Key Types
//!
//! - [`SubscriberList<F>`] - The callback arena, generic over the callback shape
//! - [`Subscription`] - RAII handle that removes the listener when dropped
//! - [`SubscriptionId`] - Arena key for a registered listener
//!
//! # Example
//!
//! ```
//! use trellis_model::SubscriberList;
//!
//! let list: SubscriberList<dyn Fn(&i32) + Send + Sync> = SubscriberList::new();
//! let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
//!
//! let seen_clone = seen.clone();
//! let subscription = list.subscribe(Box::new(move |n| seen_clone.lock().push(*n)));
//!
//! list.notify(|listener| listener(&1));
//! subscription.unsubscribe();
//! list.notify(|listener| listener(&2));
//!
//! assert_eq!(*seen.lock(), vec![1]);
//! ```
//!
//! # Related Modules
//!
//! - [`crate::model`] - Value-changed listeners ride on a `SubscriberList`
//! - [`crate::array`] - Element-changed listeners use a second list with a wider shape

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// A unique identifier for a registered listener.
    ///
    /// Keys are handed out by [`SubscriberList::subscribe`] and travel inside
    /// the returned [`Subscription`]; they are not exposed for manual removal.
    pub struct SubscriptionId;
}

/// A shareable list of callbacks of shape `F`.
///
/// `F` is the unsized callback type, for example
/// `dyn Fn(&i32) + Send + Sync`. Cloning the list clones the handle, not the
/// callbacks; all clones observe the same registrations.
pub struct SubscriberList<F: ?Sized> {
    inner: Arc<Mutex<SlotMap<SubscriptionId, Arc<F>>>>,
}

impl<F: ?Sized> Clone for SubscriberList<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for SubscriberList<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized + Send + Sync + 'static> SubscriberList<F> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotMap::with_key())),
        }
    }

    /// Register a callback.
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, listener: Box<F>) -> Subscription {
        let id = self.inner.lock().insert(Arc::from(listener));
        let list = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.lock().remove(id);
            }
        })
    }

    /// Invoke every registered callback through `invoke`.
    ///
    /// The callback set is snapshotted up front and the lock released before
    /// the first invocation, so reentrant subscribe/unsubscribe/notify from
    /// inside a callback cannot deadlock.
    pub fn notify(&self, invoke: impl Fn(&F)) {
        let snapshot: Vec<Arc<F>> = self.inner.lock().values().cloned().collect();
        for listener in snapshot {
            invoke(&listener);
        }
    }

    /// The number of registered callbacks.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// RAII handle for a registered listener.
///
/// Dropping the handle removes the listener; [`unsubscribe`](Self::unsubscribe)
/// does the same eagerly. The handle holds only a weak reference to the list,
/// so it may safely outlive the model it observes.
///
/// The handle is deliberately type-erased: one `Subscription` type serves
/// value listeners, array listeners, and every other callback shape, which
/// lets wrapper models stash the handles for their upstream registrations in
/// a uniform slot and release them in `detach`.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the listener now instead of at drop time.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestList = SubscriberList<dyn Fn(&i32) + Send + Sync>;

    #[test]
    fn test_subscribe_and_notify() {
        let list = TestList::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let _subscription = list.subscribe(Box::new(move |value| {
            received_clone.lock().push(*value);
        }));

        list.notify(|listener| listener(&42));
        list.notify(|listener| listener(&100));

        let values = received.lock();
        assert_eq!(*values, vec![42, 100]);
    }

    #[test]
    fn test_drop_removes_listener() {
        let list = TestList::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let subscription = list.subscribe(Box::new(move |value| {
            received_clone.lock().push(*value);
        }));

        list.notify(|listener| listener(&1));
        drop(subscription);
        list.notify(|listener| listener(&2));

        let values = received.lock();
        assert_eq!(*values, vec![1]); // Only received before the drop
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let list = TestList::new();
        let count = Arc::new(Mutex::new(0));

        let count_clone = count.clone();
        let subscription = list.subscribe(Box::new(move |_| {
            *count_clone.lock() += 1;
        }));

        assert_eq!(list.len(), 1);
        subscription.unsubscribe();
        assert_eq!(list.len(), 0);

        list.notify(|listener| listener(&1));
        assert_eq!(*count.lock(), 0);
    }

    #[test]
    fn test_multiple_listeners() {
        let list = TestList::new();
        let count = Arc::new(Mutex::new(0));

        let subscriptions: Vec<_> = (0..3)
            .map(|_| {
                let count_clone = count.clone();
                list.subscribe(Box::new(move |_| {
                    *count_clone.lock() += 1;
                }))
            })
            .collect();

        assert_eq!(list.len(), 3);
        list.notify(|listener| listener(&7));
        assert_eq!(*count.lock(), 3);

        drop(subscriptions);
        assert!(list.is_empty());
    }

    #[test]
    fn test_listener_can_remove_itself_during_notify() {
        let list = TestList::new();
        let count = Arc::new(Mutex::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let count_clone = count.clone();
        let slot_clone = slot.clone();
        let subscription = list.subscribe(Box::new(move |_| {
            *count_clone.lock() += 1;
            // First delivery removes the listener.
            if let Some(subscription) = slot_clone.lock().take() {
                subscription.unsubscribe();
            }
        }));
        *slot.lock() = Some(subscription);

        list.notify(|listener| listener(&1));
        list.notify(|listener| listener(&2));

        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_subscribe_during_notify_takes_effect_next_time() {
        let list = TestList::new();
        let late_calls = Arc::new(Mutex::new(0));
        let held: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let list_clone = list.clone();
        let late_calls_clone = late_calls.clone();
        let held_clone = held.clone();
        let _subscription = list.subscribe(Box::new(move |_| {
            let late_calls_inner = late_calls_clone.clone();
            let added = list_clone.subscribe(Box::new(move |_| {
                *late_calls_inner.lock() += 1;
            }));
            held_clone.lock().push(added);
        }));

        // The listener added mid-notification is not part of the snapshot.
        list.notify(|listener| listener(&1));
        assert_eq!(*late_calls.lock(), 0);

        list.notify(|listener| listener(&2));
        assert_eq!(*late_calls.lock(), 1);
    }

    #[test]
    fn test_handle_outlives_list() {
        let list = TestList::new();
        let subscription = list.subscribe(Box::new(|_| {}));

        drop(list);
        drop(subscription); // Upgrade fails silently
    }
}
