//! Bidirectional connections between models.
//!
//! [`ModelConnection`] cross-wires two models of the same declared type so
//! that a change in either is written into the other. Propagation
//! terminates at the models' own equality gates: the write-back pass finds
//! the value already in place and fires nothing further. Attaching wires
//! the pair without aligning their current values; the first change does.
//!
//! # Example
//!
//! ```
//! use trellis_model::{init_type_registry, models, DynValue, ModelConnection};
//!
//! init_type_registry();
//! let left = models::create(1_i32);
//! let right = models::create_of::<i32>();
//!
//! let connection = ModelConnection::new();
//! connection.attach(left.clone(), right.clone());
//!
//! left.set(Some(DynValue::new(2_i32))).unwrap();
//! assert_eq!(right.get().unwrap().get::<i32>(), Some(2));
//!
//! right.set(Some(DynValue::new(5_i32))).unwrap();
//! assert_eq!(left.get().unwrap().get::<i32>(), Some(5));
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use static_assertions::assert_impl_all;

use crate::model::ValueModel;
use crate::subscription::Subscription;

/// Keeps two models of the same declared type in lockstep.
///
/// One connection manages one pair at a time; attaching again releases the
/// previous pair first. Dropping the connection (or calling
/// [`detach`](Self::detach)) releases both subscriptions.
pub struct ModelConnection {
    wires: Mutex<Option<(Subscription, Subscription)>>,
}

impl ModelConnection {
    /// An unattached connection.
    pub fn new() -> Self {
        Self {
            wires: Mutex::new(None),
        }
    }

    /// Cross-wire `a` and `b`, releasing any previously attached pair.
    ///
    /// # Panics
    ///
    /// Panics when the two models' declared types differ.
    pub fn attach(&self, a: Arc<dyn ValueModel>, b: Arc<dyn ValueModel>) {
        if a.value_type().id() != b.value_type().id() {
            panic!(
                "cannot connect models of different declared types: {} and {}",
                a.value_type().name(),
                b.value_type().name()
            );
        }
        self.detach();
        let forward = Self::wire(&a, &b);
        let backward = Self::wire(&b, &a);
        *self.wires.lock() = Some((forward, backward));
    }

    /// Release the attached pair, if any.
    pub fn detach(&self) {
        if let Some((forward, backward)) = self.wires.lock().take() {
            forward.unsubscribe();
            backward.unsubscribe();
        }
    }

    fn wire(from: &Arc<dyn ValueModel>, into: &Arc<dyn ValueModel>) -> Subscription {
        let target = Arc::downgrade(into);
        from.subscribe(Box::new(move |_, new| {
            let Some(target) = target.upgrade() else {
                return;
            };
            tracing::trace!(
                target: "trellis_model::connect",
                value_type = target.value_type().name(),
                "forwarding change to connected model"
            );
            if let Err(error) = target.set(new.cloned()) {
                tracing::warn!(
                    target: "trellis_model::connect",
                    %error,
                    "connected model rejected forwarded value"
                );
            }
        }))
    }
}

impl Default for ModelConnection {
    fn default() -> Self {
        Self::new()
    }
}

assert_impl_all!(ModelConnection: Send, Sync);
