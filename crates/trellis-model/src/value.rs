//! Type-erased values for the model layer.
//!
//! Models carry values of many concrete types through one object-safe
//! interface. This module provides [`DynValue`], an owned, clonable,
//! comparable box around any suitable Rust value, and [`AnyValue`], the
//! object-safe trait that powers it. An absent value is represented as
//! `Option<DynValue>` with `None`; models never wrap a "null" inside a
//! [`DynValue`].
//!
//! # Key Types
//!
//! - [`DynValue`] - An owned type-erased value with `Clone`/`PartialEq`/`Debug`
//! - [`AnyValue`] - Blanket-implemented trait for every erasable type
//!
//! # Example
//!
//! ```
//! use trellis_model::DynValue;
//!
//! let value = DynValue::new(42_i32);
//! assert_eq!(value.downcast_ref::<i32>(), Some(&42));
//! assert_eq!(value.type_name(), "i32");
//!
//! // Equality is type-aware: differing concrete types never compare equal.
//! assert_ne!(value, DynValue::new(42_i64));
//! ```
//!
//! # Related Modules
//!
//! - [`crate::model`] - The [`ValueModel`](crate::ValueModel) trait moves `Option<DynValue>` in and out
//! - [`crate::registry`] - Runtime descriptions of the types stored in a `DynValue`

use std::any::{Any, TypeId};
use std::fmt;

use static_assertions::assert_impl_all;

/// Object-safe view of a value that can cross the type-erased model boundary.
///
/// This trait is blanket-implemented for every `T` that is `'static` and
/// implements `Clone`, `PartialEq`, `Debug`, `Send`, and `Sync`. User code
/// never implements it by hand; it exists so [`DynValue`] can clone, compare,
/// and print values it does not know the concrete type of.
pub trait AnyValue: Any + Send + Sync {
    /// Clone the value into a fresh boxed trait object.
    fn clone_boxed(&self) -> Box<dyn AnyValue>;

    /// Compare with another erased value.
    ///
    /// Returns `false` whenever `other` has a different concrete type.
    fn eq_erased(&self, other: &dyn AnyValue) -> bool;

    /// Format the underlying value with its `Debug` implementation.
    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    /// The value as `&dyn Any`, for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// The value as `&mut dyn Any`, for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The boxed value as `Box<dyn Any>`, for by-value downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// The [`std::any::type_name`] of the concrete type.
    fn value_type_name(&self) -> &'static str;
}

impl<T> AnyValue for T
where
    T: Any + Clone + PartialEq + fmt::Debug + Send + Sync,
{
    fn clone_boxed(&self) -> Box<dyn AnyValue> {
        Box::new(self.clone())
    }

    fn eq_erased(&self, other: &dyn AnyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// An owned, type-erased value.
///
/// `DynValue` is the currency of the model layer: every read returns one and
/// every write accepts one (inside an `Option`, where `None` means the model
/// holds no value). It behaves like the value it wraps:
///
/// - `Clone` clones the underlying value.
/// - `PartialEq` compares underlying values, and is `false` across types.
/// - `Debug` prints the underlying value.
///
/// # Example
///
/// ```
/// use trellis_model::DynValue;
///
/// let mut v = DynValue::new(String::from("hi"));
/// if let Some(s) = v.downcast_mut::<String>() {
///     s.push('!');
/// }
/// assert_eq!(v.get::<String>(), Some(String::from("hi!")));
/// ```
pub struct DynValue {
    inner: Box<dyn AnyValue>,
}

impl DynValue {
    /// Wrap a concrete value.
    pub fn new<T: AnyValue>(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    /// The [`TypeId`] of the wrapped value.
    pub fn type_id(&self) -> TypeId {
        self.inner.as_any().type_id()
    }

    /// The [`std::any::type_name`] of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.inner.value_type_name()
    }

    /// Whether the wrapped value is a `T`.
    pub fn is<T: AnyValue>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    /// Borrow the wrapped value as a `T`, or `None` on type mismatch.
    pub fn downcast_ref<T: AnyValue>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Mutably borrow the wrapped value as a `T`, or `None` on type mismatch.
    pub fn downcast_mut<T: AnyValue>(&mut self) -> Option<&mut T> {
        self.inner.as_any_mut().downcast_mut::<T>()
    }

    /// Take the wrapped value out as a `T`.
    ///
    /// On type mismatch the original `DynValue` is handed back unchanged.
    pub fn into_value<T: AnyValue>(self) -> Result<T, Self> {
        if !self.is::<T>() {
            return Err(self);
        }
        // SAFETY of unwrap: the type was checked above, the downcast succeeds.
        Ok(*self.inner.into_any().downcast::<T>().unwrap())
    }

    /// Clone the wrapped value out as a `T`, or `None` on type mismatch.
    pub fn get<T: AnyValue + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl Clone for DynValue {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_boxed(),
        }
    }
}

impl PartialEq for DynValue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq_erased(other.inner.as_ref())
    }
}

impl fmt::Debug for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt_erased(f)
    }
}

assert_impl_all!(DynValue: Send, Sync);
