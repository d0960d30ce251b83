//! Array models: whole-array values with per-element observation.
//!
//! [`ArrayValueModel`] wraps an internal whole-array model (any
//! [`ValueModel`] whose declared type is an array kind) and adds an element
//! surface on top of it: element reads and writes by index, element-changed
//! notifications carrying the index, and per-index [`ArrayElementModel`]s
//! that behave like ordinary value models bound to one slot.
//!
//! Assignments flow through the internal model, so anything else observing
//! it (a property cascade, a connection) sees element writes as ordinary
//! value changes. Element-changed notifications are produced by diffing:
//! `set` compares the new array against the old one index by index and
//! fires once per unequal pair. Indices past the end of the old array
//! report an absent old value; indices dropped by a shrinking assignment
//! fire nothing.
//!
//! # Key Types
//!
//! - [`ArrayValueModel`] - The whole-array model with the element surface
//! - [`ArrayElementModel`] - A fixed-index view over one element
//! - [`ArrayListener`] - Callback invoked with `(index, old, new)`
//!
//! # Example
//!
//! ```
//! use trellis_model::{init_type_registry, models, ArrayValueModel, DynValue};
//!
//! init_type_registry();
//! let rows = ArrayValueModel::new(models::create(vec![1_i32, 2, 3]));
//! assert_eq!(rows.array_len(), 3);
//!
//! let second = rows.element_model(1);
//! assert_eq!(second.get().unwrap().get::<i32>(), Some(2));
//!
//! rows.set_element(1, DynValue::new(9_i32)).unwrap();
//! assert_eq!(second.get().unwrap().get::<i32>(), Some(9));
//! ```
//!
//! # Related Modules
//!
//! - [`crate::registry`] - Where array kinds and their element ops live
//! - [`crate::structured`] - Builds array nodes over these models

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use static_assertions::assert_impl_all;

use crate::error::{ModelError, Result};
use crate::model::{ModelBase, ValueListener, ValueModel};
use crate::registry::{ArrayOps, TypeInfo};
use crate::subscription::{SubscriberList, Subscription};
use crate::value::DynValue;

/// Callback invoked with `(index, old element, new element)`.
///
/// The old element is `None` when the index did not exist before the
/// change.
pub type ArrayListener = Box<dyn Fn(usize, Option<&DynValue>, Option<&DynValue>) + Send + Sync>;

/// A whole-array model with an element surface.
///
/// The value surface (`get`, `set`, `subscribe`, `value_type`) delegates to
/// the internal model; `set` additionally diffs old against new and fires
/// one element-changed notification per unequal index. Element models are
/// kept in a per-index list that is resynchronized whenever the internal
/// value changes length.
pub struct ArrayValueModel {
    internal: Arc<dyn ValueModel>,
    ops: ArrayOps,
    elements: Mutex<Vec<ElementSlot>>,
    array_listeners: SubscriberList<dyn Fn(usize, Option<&DynValue>, Option<&DynValue>) + Send + Sync>,
    internal_subscription: Mutex<Option<Subscription>>,
}

impl ArrayValueModel {
    /// Wrap `internal`, which must be declared with an array kind.
    ///
    /// # Panics
    ///
    /// Panics when the internal model's declared type is not an array kind.
    pub fn new(internal: Arc<dyn ValueModel>) -> Arc<Self> {
        let info = internal.value_type();
        let ops = match info.array_ops() {
            Some(ops) => *ops,
            None => panic!(
                "array model requires an array-typed internal model, got {}",
                info.name()
            ),
        };

        let model = Arc::new(Self {
            internal: internal.clone(),
            ops,
            elements: Mutex::new(Vec::new()),
            array_listeners: SubscriberList::new(),
            internal_subscription: Mutex::new(None),
        });

        // The internal subscription only keeps the element-model list in
        // step with the value's length; element-changed notifications come
        // from the diff pass in `set` and from `set_element`.
        let weak = Arc::downgrade(&model);
        let subscription = internal.subscribe(Box::new(move |_, _| {
            if let Some(model) = weak.upgrade() {
                model.resync_elements();
            }
        }));
        *model.internal_subscription.lock() = Some(subscription);
        model.resync_elements();
        model
    }

    /// The element type of the wrapped array kind.
    pub fn element_type(&self) -> &'static TypeInfo {
        self.ops.element_type()
    }

    /// The element count, or -1 when the array value is absent.
    pub fn array_len(&self) -> isize {
        self.internal
            .get()
            .map_or(-1, |array| self.ops.length(&array) as isize)
    }

    /// Clone the element at `index`, or `None` when the array value is
    /// absent.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range for the current value.
    pub fn element(&self, index: usize) -> Option<DynValue> {
        let array = self.internal.get()?;
        let len = self.ops.length(&array);
        assert!(
            index < len,
            "element index {index} out of range for array of length {len}"
        );
        Some(self.ops.element(&array, index))
    }

    /// Overwrite the element at `index`.
    ///
    /// The write goes through the internal model, so whole-array observers
    /// see it too. Fires one element-changed notification iff the element
    /// actually changed; writing an equal value does nothing at all.
    ///
    /// # Panics
    ///
    /// Panics when the array value is absent or `index` is out of range.
    pub fn set_element(&self, index: usize, value: DynValue) -> Result<()> {
        let Some(array) = self.internal.get() else {
            panic!("cannot set element {index} of an absent array value");
        };
        let len = self.ops.length(&array);
        assert!(
            index < len,
            "element index {index} out of range for array of length {len}"
        );

        let old = self.ops.element(&array, index);
        if old == value {
            return Ok(());
        }

        let mut updated = array;
        self.ops.set_element(&mut updated, index, value.clone())?;
        self.internal.set(Some(updated))?;
        self.fire_element_changed(index, Some(&old), Some(&value));
        Ok(())
    }

    /// The model bound to the element at `index`.
    ///
    /// Models are cached per index and track length changes; an element
    /// whose type is itself an array kind comes back wrapped in a nested
    /// [`ArrayValueModel`].
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range for the current value.
    pub fn element_model(self: &Arc<Self>, index: usize) -> Arc<dyn ValueModel> {
        self.element_slot(index).as_model()
    }

    pub(crate) fn element_slot(self: &Arc<Self>, index: usize) -> ElementSlot {
        self.resync_elements();
        let elements = self.elements.lock();
        match elements.get(index) {
            Some(slot) => slot.clone(),
            None => panic!(
                "element index {index} out of range for array of length {}",
                elements.len()
            ),
        }
    }

    /// Observe element-changed notifications.
    pub fn subscribe_array(&self, listener: ArrayListener) -> Subscription {
        self.array_listeners.subscribe(listener)
    }

    fn fire_element_changed(&self, index: usize, old: Option<&DynValue>, new: Option<&DynValue>) {
        tracing::trace!(
            target: "trellis_model::array",
            index,
            listeners = self.array_listeners.len(),
            ?old,
            ?new,
            "array element changed"
        );
        self.array_listeners.notify(|listener| listener(index, old, new));
    }

    /// Grow or shrink the element-model list to the current length,
    /// detaching trailing models on shrink.
    fn resync_elements(self: &Arc<Self>) {
        let target = self
            .internal
            .get()
            .map_or(0, |array| self.ops.length(&array));
        let mut elements = self.elements.lock();
        if elements.len() != target {
            tracing::trace!(
                target: "trellis_model::array",
                from = elements.len(),
                to = target,
                "resyncing element models"
            );
        }
        while elements.len() > target {
            if let Some(slot) = elements.pop() {
                slot.detach();
            }
        }
        while elements.len() < target {
            let index = elements.len();
            elements.push(ElementSlot::new(self, index));
        }
    }
}

impl ValueModel for ArrayValueModel {
    fn value_type(&self) -> &'static TypeInfo {
        self.internal.value_type()
    }

    fn get(&self) -> Option<DynValue> {
        self.internal.get()
    }

    /// Assign the whole array, then fire one element-changed notification
    /// per index whose element differs from the old value. The old element
    /// is `None` past the end of the old array; indices present only in
    /// the old array fire nothing.
    fn set(&self, value: Option<DynValue>) -> Result<()> {
        let old = self.internal.get();
        self.internal.set(value)?;
        let new = self.internal.get();

        if let Some(new_array) = new.as_ref() {
            let old_len = old.as_ref().map_or(0, |array| self.ops.length(array));
            for index in 0..self.ops.length(new_array) {
                let new_element = self.ops.element(new_array, index);
                let old_element = match old.as_ref() {
                    Some(old_array) if index < old_len => {
                        Some(self.ops.element(old_array, index))
                    }
                    _ => None,
                };
                if old_element.as_ref() != Some(&new_element) {
                    self.fire_element_changed(index, old_element.as_ref(), Some(&new_element));
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self, listener: ValueListener) -> Subscription {
        self.internal.subscribe(listener)
    }

    fn detach(&self) {
        if let Some(subscription) = self.internal_subscription.lock().take() {
            subscription.unsubscribe();
        }
        let elements = std::mem::take(&mut *self.elements.lock());
        for slot in elements {
            slot.detach();
        }
    }
}

assert_impl_all!(ArrayValueModel: Send, Sync);

/// One cached per-index model: plain, or wrapped for array-of-array
/// elements.
#[derive(Clone)]
pub(crate) enum ElementSlot {
    Plain(Arc<ArrayElementModel>),
    Nested(Arc<ArrayValueModel>),
}

impl ElementSlot {
    fn new(parent: &Arc<ArrayValueModel>, index: usize) -> Self {
        let element = ArrayElementModel::new(parent, index);
        if parent.element_type().is_array() {
            Self::Nested(ArrayValueModel::new(element))
        } else {
            Self::Plain(element)
        }
    }

    pub(crate) fn as_model(&self) -> Arc<dyn ValueModel> {
        match self {
            Self::Plain(model) => model.clone(),
            Self::Nested(model) => model.clone(),
        }
    }

    fn detach(&self) {
        match self {
            Self::Plain(model) => model.detach(),
            Self::Nested(model) => model.detach(),
        }
    }
}

/// A fixed-index view over one element of an [`ArrayValueModel`].
///
/// Holds the parent weakly; once the parent is gone, reads answer `None`
/// and writes do nothing. While the parent lives, a stale index (beyond the
/// current length) panics on access rather than clamping.
pub struct ArrayElementModel {
    base: ModelBase,
    parent: Weak<ArrayValueModel>,
    index: usize,
    parent_subscription: Mutex<Option<Subscription>>,
}

impl ArrayElementModel {
    fn new(parent: &Arc<ArrayValueModel>, index: usize) -> Arc<Self> {
        let model = Arc::new(Self {
            base: ModelBase::new(parent.element_type()),
            parent: Arc::downgrade(parent),
            index,
            parent_subscription: Mutex::new(None),
        });

        let weak = Arc::downgrade(&model);
        let subscription = parent.subscribe_array(Box::new(move |changed, old, new| {
            if let Some(model) = weak.upgrade() {
                if changed == model.index {
                    model.base.fire_changed(old, new);
                }
            }
        }));
        *model.parent_subscription.lock() = Some(subscription);
        model
    }

    /// The index this model is bound to.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl ValueModel for ArrayElementModel {
    fn value_type(&self) -> &'static TypeInfo {
        self.base.value_type()
    }

    fn get(&self) -> Option<DynValue> {
        let parent = self.parent.upgrade()?;
        parent.element(self.index)
    }

    fn set(&self, value: Option<DynValue>) -> Result<()> {
        let Some(parent) = self.parent.upgrade() else {
            return Ok(());
        };
        let Some(value) = value else {
            // Array slots always hold a value of the element type.
            return Err(ModelError::NullNotAllowed {
                type_name: self.base.value_type().name(),
            });
        };
        parent.set_element(self.index, value)
    }

    fn subscribe(&self, listener: ValueListener) -> Subscription {
        self.base.subscribe(listener)
    }

    fn detach(&self) {
        if let Some(subscription) = self.parent_subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}

assert_impl_all!(ArrayElementModel: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimpleValueModel;
    use crate::registry::{init_type_registry, Reflect};

    fn int_rows(values: Vec<i32>) -> Arc<ArrayValueModel> {
        init_type_registry();
        let info = <Vec<i32> as Reflect>::type_info();
        let internal: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(info));
        internal.set(Some(DynValue::new(values))).unwrap();
        ArrayValueModel::new(internal)
    }

    type ElementEvent = (usize, Option<i32>, Option<i32>);

    fn capture_elements(
        model: &ArrayValueModel,
    ) -> (Arc<Mutex<Vec<ElementEvent>>>, Subscription) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let subscription = model.subscribe_array(Box::new(move |index, old, new| {
            received_clone.lock().push((
                index,
                old.and_then(|v| v.get::<i32>()),
                new.and_then(|v| v.get::<i32>()),
            ));
        }));
        (received, subscription)
    }

    #[test]
    fn test_set_fires_one_change_per_differing_index() {
        let rows = int_rows(vec![1, 2, 3]);
        let (received, _subscription) = capture_elements(&rows);

        rows.set(Some(DynValue::new(vec![1_i32, 9, 3, 4]))).unwrap();

        let events = received.lock();
        assert_eq!(*events, vec![(1, Some(2), Some(9)), (3, None, Some(4))]);
    }

    #[test]
    fn test_set_shrinking_fires_nothing_for_dropped_indices() {
        let rows = int_rows(vec![1, 2, 3]);
        let (received, _subscription) = capture_elements(&rows);

        rows.set(Some(DynValue::new(vec![1_i32, 2]))).unwrap();

        assert_eq!(received.lock().len(), 0);
        assert_eq!(rows.array_len(), 2);
    }

    #[test]
    fn test_array_len_tracks_the_value() {
        let rows = int_rows(vec![1, 2, 3]);
        assert_eq!(rows.array_len(), 3);

        rows.set(None).unwrap();
        assert_eq!(rows.array_len(), -1);
        assert_eq!(rows.element(0), None);

        rows.set(Some(DynValue::new(Vec::<i32>::new()))).unwrap();
        assert_eq!(rows.array_len(), 0);
    }

    #[test]
    fn test_element_model_reads_match_the_array() {
        let rows = int_rows(vec![10, 20, 30]);
        let second = rows.element_model(1);

        assert_eq!(second.get().unwrap().get::<i32>(), Some(20));

        rows.set(Some(DynValue::new(vec![10_i32, 25, 30]))).unwrap();
        assert_eq!(second.get().unwrap().get::<i32>(), Some(25));

        rows.set_element(1, DynValue::new(26_i32)).unwrap();
        assert_eq!(second.get().unwrap().get::<i32>(), Some(26));
        assert_eq!(
            rows.get().unwrap().get::<Vec<i32>>(),
            Some(vec![10, 26, 30])
        );
    }

    #[test]
    fn test_element_model_forwards_only_its_index() {
        let rows = int_rows(vec![1, 2, 3]);
        let first = rows.element_model(0);
        let second = rows.element_model(1);

        let first_events = Arc::new(Mutex::new(0));
        let first_events_clone = first_events.clone();
        let _first_subscription = first.subscribe(Box::new(move |_, _| {
            *first_events_clone.lock() += 1;
        }));

        let second_events = Arc::new(Mutex::new(Vec::new()));
        let second_events_clone = second_events.clone();
        let _second_subscription = second.subscribe(Box::new(move |old, new| {
            second_events_clone.lock().push((
                old.and_then(|v| v.get::<i32>()),
                new.and_then(|v| v.get::<i32>()),
            ));
        }));

        rows.set(Some(DynValue::new(vec![1_i32, 9, 3, 4]))).unwrap();

        assert_eq!(*first_events.lock(), 0);
        assert_eq!(*second_events.lock(), vec![(Some(2), Some(9))]);
    }

    #[test]
    fn test_set_element_writes_through_the_internal_model() {
        init_type_registry();
        let info = <Vec<i32> as Reflect>::type_info();
        let internal: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(info));
        internal.set(Some(DynValue::new(vec![1_i32, 2]))).unwrap();

        let whole_changes = Arc::new(Mutex::new(Vec::new()));
        let whole_changes_clone = whole_changes.clone();
        let _internal_subscription = internal.subscribe(Box::new(move |_, new| {
            whole_changes_clone
                .lock()
                .push(new.and_then(|v| v.get::<Vec<i32>>()));
        }));

        let rows = ArrayValueModel::new(internal.clone());
        let (received, _subscription) = capture_elements(&rows);

        rows.set_element(0, DynValue::new(7_i32)).unwrap();

        assert_eq!(internal.get().unwrap().get::<Vec<i32>>(), Some(vec![7, 2]));
        assert_eq!(*whole_changes.lock(), vec![Some(vec![7, 2])]);
        assert_eq!(*received.lock(), vec![(0, Some(1), Some(7))]);

        // Writing the same value again does nothing anywhere.
        rows.set_element(0, DynValue::new(7_i32)).unwrap();
        assert_eq!(whole_changes.lock().len(), 1);
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn test_set_element_rejects_wrong_element_type() {
        let rows = int_rows(vec![1, 2]);
        let err = rows
            .set_element(0, DynValue::new(String::from("seven")))
            .unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { expected: "i32", .. }));
        assert_eq!(rows.get().unwrap().get::<Vec<i32>>(), Some(vec![1, 2]));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_element_model_out_of_range_panics() {
        let rows = int_rows(vec![1, 2]);
        let _ = rows.element_model(2);
    }

    #[test]
    #[should_panic(expected = "absent array value")]
    fn test_set_element_on_absent_array_panics() {
        let rows = int_rows(vec![1]);
        rows.set(None).unwrap();
        rows.set_element(0, DynValue::new(5_i32)).unwrap();
    }

    #[test]
    #[should_panic(expected = "array-typed internal model")]
    fn test_non_array_internal_panics() {
        init_type_registry();
        let info = <i32 as Reflect>::type_info();
        let internal: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(info));
        let _ = ArrayValueModel::new(internal);
    }

    #[test]
    fn test_nested_arrays_become_nested_array_models() {
        init_type_registry();
        let info = <Vec<Vec<i32>> as Reflect>::type_info();
        let internal: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(info));
        internal
            .set(Some(DynValue::new(vec![vec![1_i32, 2], vec![3_i32]])))
            .unwrap();

        let matrix = ArrayValueModel::new(internal);
        assert!(matrix.element_type().is_array());

        let first_row = match matrix.element_slot(0) {
            ElementSlot::Nested(model) => model,
            ElementSlot::Plain(_) => panic!("array-typed element came back unwrapped"),
        };
        assert_eq!(first_row.array_len(), 2);
        assert_eq!(first_row.element(1).unwrap().get::<i32>(), Some(2));

        first_row.set_element(1, DynValue::new(20_i32)).unwrap();
        assert_eq!(
            matrix.get().unwrap().get::<Vec<Vec<i32>>>(),
            Some(vec![vec![1, 20], vec![3]])
        );
    }

    #[test]
    fn test_detach_stops_element_models() {
        let rows = int_rows(vec![1, 2, 3]);
        let second = rows.element_model(1);

        let events = Arc::new(Mutex::new(0));
        let events_clone = events.clone();
        let _subscription = second.subscribe(Box::new(move |_, _| {
            *events_clone.lock() += 1;
        }));

        rows.detach();
        rows.set(Some(DynValue::new(vec![1_i32, 9, 3]))).unwrap();

        // Only received before detach.
        assert_eq!(*events.lock(), 0);
    }

    #[test]
    fn test_element_model_outlives_a_dropped_parent() {
        let rows = int_rows(vec![1, 2]);
        let first = rows.element_model(0);
        drop(rows);

        assert_eq!(first.get(), None);
        assert!(first.set(Some(DynValue::new(9_i32))).is_ok());
    }
}
