//! The observable value cell.
//!
//! A value model is a typed, observable slot: it declares the type of value
//! it holds, answers reads with `Option<DynValue>` (`None` when no value is
//! present), accepts writes, and notifies subscribers with the old and new
//! value after every actual change. Equality gating is the load-bearing
//! rule: a notification fires if and only if the stored value changed under
//! value-equality, which is also what terminates cyclic model wirings.
//!
//! # Key Types
//!
//! - [`ValueModel`] - The object-safe trait every model implements
//! - [`ValueListener`] - Boxed callback invoked with (old, new)
//! - [`SimpleValueModel`] - Plain storage model, the leaf of most graphs
//! - [`ModelBase`] - Shared plumbing for implementing the trait
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use trellis_model::{init_type_registry, models, DynValue, ValueModel};
//!
//! init_type_registry();
//! let model = models::create(3_i32);
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_clone = seen.clone();
//! let _subscription = model.subscribe(Box::new(move |old, new| {
//!     seen_clone.lock().push((
//!         old.and_then(|v| v.get::<i32>()),
//!         new.and_then(|v| v.get::<i32>()),
//!     ));
//! }));
//!
//! model.set(Some(DynValue::new(4_i32))).unwrap();
//! model.set(Some(DynValue::new(4_i32))).unwrap(); // no change, no notification
//!
//! assert_eq!(*seen.lock(), vec![(Some(3), Some(4))]);
//! ```
//!
//! # Related Modules
//!
//! - [`crate::array`] - Array models layered over a whole-array model
//! - [`crate::convert`] - Type-converting views of a model
//! - [`crate::structured`] - Trees of models derived from struct types

use parking_lot::RwLock;
use static_assertions::assert_impl_all;

use crate::error::{ModelError, Result};
use crate::registry::TypeInfo;
use crate::subscription::{SubscriberList, Subscription};
use crate::value::DynValue;

/// Callback invoked with the (old, new) values after a change.
pub type ValueListener = Box<dyn Fn(Option<&DynValue>, Option<&DynValue>) + Send + Sync>;

/// A typed, observable value slot.
///
/// The trait is object-safe; model graphs are built from `Arc<dyn ValueModel>`
/// handles. Implementations must uphold two rules:
///
/// - `value_type()` never changes for the lifetime of the model.
/// - Listeners fire exactly once per `set` that actually changed the value,
///   and never when the written value equals the stored one.
pub trait ValueModel: Send + Sync {
    /// The declared value type. Fixed for the lifetime of the model.
    fn value_type(&self) -> &'static TypeInfo;

    /// The current value, or `None` when the model holds no value.
    fn get(&self) -> Option<DynValue>;

    /// Replace the value, notifying subscribers iff it changed.
    ///
    /// Returns a type-mismatch error when a present value is not of the
    /// declared type.
    fn set(&self, value: Option<DynValue>) -> Result<()>;

    /// Register a change listener invoked with (old, new).
    fn subscribe(&self, listener: ValueListener) -> Subscription;

    /// Release the upstream registrations this model holds, if any.
    ///
    /// Wrapper models (property, converting, element views) override this to
    /// stop observing their source; afterwards they fire nothing. For
    /// storage models it is a no-op.
    fn detach(&self) {}
}

/// Shared plumbing for [`ValueModel`] implementations.
///
/// Carries the declared type and the listener list. `fire_changed` notifies
/// unconditionally; the equality gate belongs in each concrete `set`, next
/// to the storage it guards.
pub struct ModelBase {
    value_type: &'static TypeInfo,
    listeners: SubscriberList<dyn Fn(Option<&DynValue>, Option<&DynValue>) + Send + Sync>,
}

impl ModelBase {
    /// Create a base for a model of the given declared type.
    pub fn new(value_type: &'static TypeInfo) -> Self {
        Self {
            value_type,
            listeners: SubscriberList::new(),
        }
    }

    /// The declared value type.
    pub fn value_type(&self) -> &'static TypeInfo {
        self.value_type
    }

    /// Register a change listener.
    pub fn subscribe(&self, listener: ValueListener) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Notify all listeners with (old, new). No equality check here.
    #[tracing::instrument(skip_all, target = "trellis_model::model", level = "trace")]
    pub fn fire_changed(&self, old: Option<&DynValue>, new: Option<&DynValue>) {
        tracing::trace!(
            target: "trellis_model::model",
            value_type = self.value_type.name(),
            listeners = self.listeners.len(),
            ?old,
            ?new,
            "value changed"
        );
        self.listeners.notify(|listener| listener(old, new));
    }

    /// The number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// A plain storage model.
///
/// Starts empty (`None`); `set` type-checks a present value against the
/// declared type, stores it, and fires iff the stored value changed.
pub struct SimpleValueModel {
    base: ModelBase,
    value: RwLock<Option<DynValue>>,
}

impl SimpleValueModel {
    /// Create an empty model of the given declared type.
    pub fn new(value_type: &'static TypeInfo) -> Self {
        Self {
            base: ModelBase::new(value_type),
            value: RwLock::new(None),
        }
    }
}

impl ValueModel for SimpleValueModel {
    fn value_type(&self) -> &'static TypeInfo {
        self.base.value_type()
    }

    fn get(&self) -> Option<DynValue> {
        self.value.read().clone()
    }

    fn set(&self, value: Option<DynValue>) -> Result<()> {
        if let Some(value) = &value {
            if value.type_id() != self.base.value_type().id() {
                return Err(ModelError::TypeMismatch {
                    expected: self.base.value_type().name(),
                    got: value.type_name(),
                });
            }
        }
        // Decide under the lock, fire after releasing it so listeners can
        // re-enter get/set on this model.
        let (changed, old) = {
            let mut guard = self.value.write();
            let old = guard.clone();
            let changed = old != value;
            *guard = value.clone();
            (changed, old)
        };
        if changed {
            self.base.fire_changed(old.as_ref(), value.as_ref());
        }
        Ok(())
    }

    fn subscribe(&self, listener: ValueListener) -> Subscription {
        self.base.subscribe(listener)
    }
}

assert_impl_all!(SimpleValueModel: Send, Sync);
