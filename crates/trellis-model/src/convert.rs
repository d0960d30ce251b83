//! Value conversion and converting model views.
//!
//! A [`Converter`] is a pair of total functions between a source and a
//! target type; a [`ConvertingValueModel`] plugs one into a delegate model
//! to present its value in another type, both for reading and for writing.
//! The stock converters cover the common numeric cases: plain rounding
//! conversion between numeric scalars and linear remapping between numeric
//! intervals (sliders to fractions, percentages to angles).
//!
//! # Key Types
//!
//! - [`Converter`] - Erased forward/backward function pair with fixed endpoint types
//! - [`converters`] - Stock constructors: [`for_numbers`](converters::for_numbers),
//!   [`number_mapping`](converters::number_mapping)
//! - [`NumericKind`] - The closed set of numeric scalar kinds
//! - [`ConvertingValueModel`] - A delegate model seen through a converter
//!
//! # Example
//!
//! ```
//! use trellis_model::{converters, init_type_registry, models, DynValue, ValueModel};
//!
//! init_type_registry();
//!
//! let percent = models::create(50_i32);
//! let fraction = models::converting(
//!     percent.clone(),
//!     converters::number_mapping(0_i32, 100_i32, 0.0_f64, 1.0_f64),
//! );
//!
//! assert_eq!(fraction.get().unwrap().get::<f64>(), Some(0.5));
//! fraction.set(Some(DynValue::new(0.25_f64))).unwrap();
//! assert_eq!(percent.get().unwrap().get::<i32>(), Some(25));
//! ```
//!
//! # Related Modules
//!
//! - [`crate::model`] - The delegate side of a converting model
//! - [`crate::registry`] - Where the endpoint types come from

use std::any::TypeId;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use static_assertions::assert_impl_all;

use crate::error::{ModelError, Result};
use crate::model::{ModelBase, ValueListener, ValueModel};
use crate::registry::{Reflect, TypeInfo};
use crate::subscription::Subscription;
use crate::value::{AnyValue, DynValue};

/// A pair of total conversion functions between two registered types.
///
/// `forward` maps source-space values to target space, `backward` the other
/// way. Nothing requires the two functions to be true inverses; a rounding
/// conversion composed with its backward direction loses information by
/// construction. Absent values (`None`) pass through both directions
/// unchanged.
#[derive(Clone)]
pub struct Converter {
    source: &'static TypeInfo,
    target: &'static TypeInfo,
    forward: Arc<dyn Fn(&DynValue) -> DynValue + Send + Sync>,
    backward: Arc<dyn Fn(&DynValue) -> DynValue + Send + Sync>,
}

impl Converter {
    /// Build a converter from a typed function pair.
    ///
    /// Both endpoint types register themselves if needed.
    pub fn new<S, T>(
        forward: impl Fn(&S) -> T + Send + Sync + 'static,
        backward: impl Fn(&T) -> S + Send + Sync + 'static,
    ) -> Self
    where
        S: Reflect,
        T: Reflect,
    {
        Self {
            source: S::type_info(),
            target: T::type_info(),
            forward: Arc::new(move |value| DynValue::new(forward(expect_ref::<S>(value)))),
            backward: Arc::new(move |value| DynValue::new(backward(expect_ref::<T>(value)))),
        }
    }

    fn from_parts(
        source: &'static TypeInfo,
        target: &'static TypeInfo,
        forward: impl Fn(&DynValue) -> DynValue + Send + Sync + 'static,
        backward: impl Fn(&DynValue) -> DynValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            target,
            forward: Arc::new(forward),
            backward: Arc::new(backward),
        }
    }

    /// The source-space type.
    pub fn source_type(&self) -> &'static TypeInfo {
        self.source
    }

    /// The target-space type.
    pub fn target_type(&self) -> &'static TypeInfo {
        self.target
    }

    /// Convert a source-space value to target space. `None` passes through.
    pub fn forward(&self, value: Option<&DynValue>) -> Option<DynValue> {
        value.map(|value| {
            tracing::trace!(
                target: "trellis_model::convert",
                from = self.source.name(),
                to = self.target.name(),
                "converting forward"
            );
            (self.forward)(value)
        })
    }

    /// Convert a target-space value to source space. `None` passes through.
    pub fn backward(&self, value: Option<&DynValue>) -> Option<DynValue> {
        value.map(|value| {
            tracing::trace!(
                target: "trellis_model::convert",
                from = self.target.name(),
                to = self.source.name(),
                "converting backward"
            );
            (self.backward)(value)
        })
    }
}

fn expect_ref<T: AnyValue>(value: &DynValue) -> &T {
    match value.downcast_ref::<T>() {
        Some(value) => value,
        None => panic!(
            "converter applied to a value of type {} where {} was expected",
            value.type_name(),
            std::any::type_name::<T>()
        ),
    }
}

/// The closed set of numeric scalar kinds conversions operate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    I8,
    I16,
    I32,
    I64,
    ISize,
    U8,
    U16,
    U32,
    U64,
    USize,
    F32,
    F64,
}

impl NumericKind {
    /// The kind for a numeric scalar type, or `None` for anything else.
    pub fn of(id: TypeId) -> Option<Self> {
        if id == TypeId::of::<i8>() {
            Some(Self::I8)
        } else if id == TypeId::of::<i16>() {
            Some(Self::I16)
        } else if id == TypeId::of::<i32>() {
            Some(Self::I32)
        } else if id == TypeId::of::<i64>() {
            Some(Self::I64)
        } else if id == TypeId::of::<isize>() {
            Some(Self::ISize)
        } else if id == TypeId::of::<u8>() {
            Some(Self::U8)
        } else if id == TypeId::of::<u16>() {
            Some(Self::U16)
        } else if id == TypeId::of::<u32>() {
            Some(Self::U32)
        } else if id == TypeId::of::<u64>() {
            Some(Self::U64)
        } else if id == TypeId::of::<usize>() {
            Some(Self::USize)
        } else if id == TypeId::of::<f32>() {
            Some(Self::F32)
        } else if id == TypeId::of::<f64>() {
            Some(Self::F64)
        } else {
            None
        }
    }

    /// Whether values of this kind carry no fractional part.
    pub fn is_integral(self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }

    /// Widen an erased value of this kind to `f64`.
    pub fn to_f64(self, value: &DynValue) -> f64 {
        match self {
            Self::I8 => expect_num::<i8>(value) as f64,
            Self::I16 => expect_num::<i16>(value) as f64,
            Self::I32 => expect_num::<i32>(value) as f64,
            Self::I64 => expect_num::<i64>(value) as f64,
            Self::ISize => expect_num::<isize>(value) as f64,
            Self::U8 => expect_num::<u8>(value) as f64,
            Self::U16 => expect_num::<u16>(value) as f64,
            Self::U32 => expect_num::<u32>(value) as f64,
            Self::U64 => expect_num::<u64>(value) as f64,
            Self::USize => expect_num::<usize>(value) as f64,
            Self::F32 => expect_num::<f32>(value) as f64,
            Self::F64 => expect_num::<f64>(value),
        }
    }

    /// Narrow an `f64` into an erased value of this kind.
    ///
    /// Integral kinds round half-up (`floor(x + 0.5)`) with the intermediate
    /// clamped to the `i64` range and then truncated to the target width;
    /// `NaN` becomes zero. Float kinds convert directly.
    pub fn from_f64(self, value: f64) -> DynValue {
        let rounded = round_half_up(value);
        match self {
            Self::I8 => DynValue::new(rounded as i8),
            Self::I16 => DynValue::new(rounded as i16),
            Self::I32 => DynValue::new(rounded as i32),
            Self::I64 => DynValue::new(rounded),
            Self::ISize => DynValue::new(rounded as isize),
            Self::U8 => DynValue::new(rounded as u8),
            Self::U16 => DynValue::new(rounded as u16),
            Self::U32 => DynValue::new(rounded as u32),
            Self::U64 => DynValue::new(rounded as u64),
            Self::USize => DynValue::new(rounded as usize),
            Self::F32 => DynValue::new(value as f32),
            Self::F64 => DynValue::new(value),
        }
    }
}

// Casting f64 to i64 saturates at the range ends and maps NaN to zero.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn expect_num<T: AnyValue + Copy>(value: &DynValue) -> T {
    match value.downcast_ref::<T>() {
        Some(value) => *value,
        None => panic!(
            "numeric value holds {} where {} was expected",
            value.type_name(),
            std::any::type_name::<T>()
        ),
    }
}

/// Stock converter constructors.
pub mod converters {
    use super::*;

    /// Rounding-aware conversion between two registered numeric scalars.
    ///
    /// Both directions widen through `f64` and narrow per
    /// [`NumericKind::from_f64`]. Panics when either endpoint is not a
    /// numeric scalar.
    pub fn for_numbers(source: &'static TypeInfo, target: &'static TypeInfo) -> Converter {
        let source_kind = numeric_kind_of(source);
        let target_kind = numeric_kind_of(target);
        Converter::from_parts(
            source,
            target,
            move |value| target_kind.from_f64(source_kind.to_f64(value)),
            move |value| source_kind.from_f64(target_kind.to_f64(value)),
        )
    }

    /// Linear remapping between two numeric intervals.
    ///
    /// Forward maps `[min_source, max_source]` onto `[min_target, max_target]`
    /// by relative position; backward is the same mapping with the intervals
    /// swapped. The bounds fix the endpoint types, which must be numeric
    /// scalars (panics otherwise). Values outside the interval extrapolate
    /// linearly.
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_model::{converters, init_type_registry, DynValue};
    ///
    /// init_type_registry();
    /// let converter = converters::number_mapping(0_i32, 100_i32, 0.0_f64, 1.0_f64);
    ///
    /// let half = converter.forward(Some(&DynValue::new(50_i32))).unwrap();
    /// assert_eq!(half.get::<f64>(), Some(0.5));
    /// ```
    pub fn number_mapping<S, T>(
        min_source: S,
        max_source: S,
        min_target: T,
        max_target: T,
    ) -> Converter
    where
        S: Reflect,
        T: Reflect,
    {
        let source = S::type_info();
        let target = T::type_info();
        let source_kind = numeric_kind_of(source);
        let target_kind = numeric_kind_of(target);

        let min_s = source_kind.to_f64(&DynValue::new(min_source));
        let max_s = source_kind.to_f64(&DynValue::new(max_source));
        let min_t = target_kind.to_f64(&DynValue::new(min_target));
        let max_t = target_kind.to_f64(&DynValue::new(max_target));

        Converter::from_parts(
            source,
            target,
            move |value| {
                target_kind.from_f64(remap(source_kind.to_f64(value), min_s, max_s, min_t, max_t))
            },
            move |value| {
                source_kind.from_f64(remap(target_kind.to_f64(value), min_t, max_t, min_s, max_s))
            },
        )
    }

    fn numeric_kind_of(info: &'static TypeInfo) -> NumericKind {
        match NumericKind::of(info.id()) {
            Some(kind) => kind,
            None => panic!("{} is not a numeric scalar type", info.name()),
        }
    }

    fn remap(value: f64, from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> f64 {
        let alpha = (value - from_min) / (from_max - from_min);
        to_min + (to_max - to_min) * alpha
    }
}

/// A delegate model seen through a [`Converter`].
///
/// The declared type is the converter's target type. Reads convert the
/// delegate's value forward, fresh on every call; writes convert backward
/// and go to the delegate. The model caches the current target-space value
/// so a delegate change only reaches this model's listeners when it is
/// visible in target space.
///
/// Built by [`models::converting`](crate::models::converting).
pub struct ConvertingValueModel {
    base: ModelBase,
    delegate: Arc<dyn ValueModel>,
    converter: Converter,
    /// Target-space value as of the last delegate notification.
    current: RwLock<Option<DynValue>>,
    delegate_subscription: Mutex<Option<Subscription>>,
}

impl ConvertingValueModel {
    /// Wrap `delegate` with `converter`.
    ///
    /// Panics when the converter's source type differs from the delegate's
    /// declared type.
    pub fn new(delegate: Arc<dyn ValueModel>, converter: Converter) -> Arc<Self> {
        if converter.source_type().id() != delegate.value_type().id() {
            panic!(
                "converter source type {} does not match delegate type {}",
                converter.source_type().name(),
                delegate.value_type().name()
            );
        }
        let model = Arc::new(Self {
            base: ModelBase::new(converter.target_type()),
            delegate: delegate.clone(),
            converter,
            current: RwLock::new(None),
            delegate_subscription: Mutex::new(None),
        });
        *model.current.write() = model.converter.forward(delegate.get().as_ref());

        let weak = Arc::downgrade(&model);
        let subscription = delegate.subscribe(Box::new(move |_, _| {
            if let Some(model) = weak.upgrade() {
                model.refresh();
            }
        }));
        *model.delegate_subscription.lock() = Some(subscription);
        model
    }

    /// The model being converted.
    pub fn delegate(&self) -> &Arc<dyn ValueModel> {
        &self.delegate
    }

    /// Recompute the target-space value and fire iff it differs from the
    /// cached one. Conversions lossy in source space but invisible in target
    /// space end here silently.
    fn refresh(&self) {
        let new = self.converter.forward(self.delegate.get().as_ref());
        let (changed, old) = {
            let mut guard = self.current.write();
            let old = guard.clone();
            let changed = old != new;
            *guard = new.clone();
            (changed, old)
        };
        if changed {
            self.base.fire_changed(old.as_ref(), new.as_ref());
        }
    }
}

impl ValueModel for ConvertingValueModel {
    fn value_type(&self) -> &'static TypeInfo {
        self.base.value_type()
    }

    fn get(&self) -> Option<DynValue> {
        self.converter.forward(self.delegate.get().as_ref())
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
        self.delegate.set(self.converter.backward(value.as_ref()))
    }

    fn subscribe(&self, listener: ValueListener) -> Subscription {
        self.base.subscribe(listener)
    }

    fn detach(&self) {
        if let Some(subscription) = self.delegate_subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}

assert_impl_all!(ConvertingValueModel: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimpleValueModel;
    use crate::registry::{init_type_registry, type_registry};

    fn setup() {
        init_type_registry();
    }

    fn info_of<T: 'static>() -> &'static TypeInfo {
        type_registry().lookup(TypeId::of::<T>()).unwrap()
    }

    fn f64_capture(
        model: &ConvertingValueModel,
    ) -> (Arc<Mutex<Vec<(Option<f64>, Option<f64>)>>>, Subscription) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let subscription = model.subscribe(Box::new(move |old, new| {
            received_clone.lock().push((
                old.and_then(|v| v.get::<f64>()),
                new.and_then(|v| v.get::<f64>()),
            ));
        }));
        (received, subscription)
    }

    #[test]
    fn test_typed_converter_roundtrip() {
        setup();
        let converter = Converter::new::<i32, String>(
            |n| n.to_string(),
            |s| s.parse().unwrap_or(0),
        );

        let forward = converter.forward(Some(&DynValue::new(5_i32))).unwrap();
        assert_eq!(forward.get::<String>(), Some(String::from("5")));

        let backward = converter.backward(Some(&DynValue::new(String::from("7")))).unwrap();
        assert_eq!(backward.get::<i32>(), Some(7));

        assert_eq!(converter.forward(None), None);
        assert_eq!(converter.backward(None), None);
    }

    #[test]
    fn test_for_numbers_rounds_half_up() {
        setup();
        let converter = converters::for_numbers(info_of::<f64>(), info_of::<i32>());

        let cases = [(2.4, 2), (2.5, 3), (2.6, 3), (-2.5, -2), (-2.6, -3), (0.0, 0)];
        for (input, expected) in cases {
            let out = converter.forward(Some(&DynValue::new(input))).unwrap();
            assert_eq!(out.get::<i32>(), Some(expected), "rounding {input}");
        }
    }

    #[test]
    fn test_for_numbers_backward_then_forward_is_identity_on_i32() {
        setup();
        let converter = converters::for_numbers(info_of::<i32>(), info_of::<f64>());

        for value in [0, 7, -7, 12345, -12345, i32::MAX, i32::MIN] {
            let wide = converter.forward(Some(&DynValue::new(value))).unwrap();
            let back = converter.backward(Some(&wide)).unwrap();
            assert_eq!(back.get::<i32>(), Some(value));
        }
    }

    #[test]
    fn test_for_numbers_saturates_at_i64_range() {
        setup();
        let converter = converters::for_numbers(info_of::<f64>(), info_of::<i64>());

        let huge = converter.forward(Some(&DynValue::new(1e300_f64))).unwrap();
        assert_eq!(huge.get::<i64>(), Some(i64::MAX));

        let tiny = converter.forward(Some(&DynValue::new(-1e300_f64))).unwrap();
        assert_eq!(tiny.get::<i64>(), Some(i64::MIN));

        let nan = converter.forward(Some(&DynValue::new(f64::NAN))).unwrap();
        assert_eq!(nan.get::<i64>(), Some(0));
    }

    #[test]
    fn test_number_mapping_forward_and_backward() {
        setup();
        let converter = converters::number_mapping(0_i32, 100_i32, 0.0_f64, 1.0_f64);

        let half = converter.forward(Some(&DynValue::new(50_i32))).unwrap();
        assert_eq!(half.get::<f64>(), Some(0.5));

        let back = converter.backward(Some(&DynValue::new(0.5_f64))).unwrap();
        assert_eq!(back.get::<i32>(), Some(50));

        // Out-of-interval values extrapolate.
        let over = converter.forward(Some(&DynValue::new(200_i32))).unwrap();
        assert_eq!(over.get::<f64>(), Some(2.0));
    }

    #[test]
    #[should_panic(expected = "is not a numeric scalar type")]
    fn test_number_mapping_rejects_non_numeric_bounds() {
        setup();
        let _ = converters::number_mapping(
            String::from("a"),
            String::from("z"),
            0.0_f64,
            1.0_f64,
        );
    }

    #[test]
    fn test_converting_model_get_and_set() {
        setup();
        let delegate = Arc::new(SimpleValueModel::new(info_of::<i32>()));
        let converting = ConvertingValueModel::new(
            delegate.clone(),
            converters::number_mapping(0_i32, 100_i32, 0.0_f64, 1.0_f64),
        );

        assert_eq!(converting.get(), None);

        delegate.set(Some(DynValue::new(50_i32))).unwrap();
        assert_eq!(converting.get().unwrap().get::<f64>(), Some(0.5));

        converting.set(Some(DynValue::new(0.25_f64))).unwrap();
        assert_eq!(delegate.get().unwrap().get::<i32>(), Some(25));
    }

    #[test]
    fn test_converting_model_fires_in_target_space() {
        setup();
        let delegate = Arc::new(SimpleValueModel::new(info_of::<i32>()));
        let converting = ConvertingValueModel::new(
            delegate.clone(),
            converters::number_mapping(0_i32, 100_i32, 0.0_f64, 1.0_f64),
        );
        let (received, _subscription) = f64_capture(&converting);

        delegate.set(Some(DynValue::new(50_i32))).unwrap();
        delegate.set(Some(DynValue::new(75_i32))).unwrap();

        let events = received.lock();
        assert_eq!(*events, vec![(None, Some(0.5)), (Some(0.5), Some(0.75))]);
    }

    #[test]
    fn test_converting_model_silent_when_target_value_unchanged() {
        setup();
        let delegate = Arc::new(SimpleValueModel::new(info_of::<f64>()));
        let converting = ConvertingValueModel::new(
            delegate.clone(),
            converters::for_numbers(info_of::<f64>(), info_of::<i32>()),
        );

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let _subscription = converting.subscribe(Box::new(move |_, new| {
            received_clone.lock().push(new.and_then(|v| v.get::<i32>()));
        }));

        delegate.set(Some(DynValue::new(2.4_f64))).unwrap();
        // Rounds to the same target value; invisible in target space.
        delegate.set(Some(DynValue::new(2.2_f64))).unwrap();
        delegate.set(Some(DynValue::new(2.6_f64))).unwrap();

        assert_eq!(*received.lock(), vec![Some(2), Some(3)]);
    }

    #[test]
    fn test_converting_model_detach_stops_notifications() {
        setup();
        let delegate = Arc::new(SimpleValueModel::new(info_of::<i32>()));
        let converting = ConvertingValueModel::new(
            delegate.clone(),
            converters::number_mapping(0_i32, 100_i32, 0.0_f64, 1.0_f64),
        );
        let (received, _subscription) = f64_capture(&converting);

        delegate.set(Some(DynValue::new(10_i32))).unwrap();
        converting.detach();
        delegate.set(Some(DynValue::new(90_i32))).unwrap();

        assert_eq!(received.lock().len(), 1);
        // Reads still convert the live delegate value.
        assert_eq!(converting.get().unwrap().get::<f64>(), Some(0.9));
    }

    #[test]
    fn test_converting_model_rejects_wrong_target_type() {
        setup();
        let delegate = Arc::new(SimpleValueModel::new(info_of::<i32>()));
        let converting = ConvertingValueModel::new(
            delegate.clone(),
            converters::number_mapping(0_i32, 100_i32, 0.0_f64, 1.0_f64),
        );

        let err = converting.set(Some(DynValue::new(5_i32))).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { expected: "f64", .. }));
        assert_eq!(delegate.get(), None);
    }

    #[test]
    #[should_panic(expected = "does not match delegate type")]
    fn test_converting_model_rejects_source_mismatch() {
        setup();
        let delegate = Arc::new(SimpleValueModel::new(info_of::<i32>()));
        let _ = ConvertingValueModel::new(
            delegate,
            converters::for_numbers(info_of::<f64>(), info_of::<i32>()),
        );
    }
}
