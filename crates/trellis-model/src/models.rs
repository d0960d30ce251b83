//! Model construction helpers.
//!
//! The functions here are the usual way to obtain models; constructing
//! [`SimpleValueModel`] and friends directly is for wiring custom
//! internals. `Reflect`-bounded entry points register their type on the
//! way in, so `models::create(3_i32)` needs nothing beyond
//! [`init_type_registry`](crate::init_type_registry).
//!
//! # Example
//!
//! ```
//! use trellis_model::{converters, init_type_registry, models, DynValue, ValueModel};
//!
//! init_type_registry();
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

use std::sync::Arc;

use crate::convert::{Converter, ConvertingValueModel};
use crate::model::{SimpleValueModel, ValueModel};
use crate::property::property_sources;
use crate::registry::{Reflect, TypeInfo};
use crate::structured::StructuredValueModel;
use crate::value::DynValue;

/// A model holding `value`, declared with `T`'s registered type.
pub fn create<T: Reflect>(value: T) -> Arc<dyn ValueModel> {
    let model = create_of::<T>();
    // The value's type is the model's declared type; the set cannot be
    // rejected.
    model.set(Some(DynValue::new(value))).unwrap();
    model
}

/// An empty model declared with `T`'s registered type.
pub fn create_of<T: Reflect>() -> Arc<dyn ValueModel> {
    Arc::new(SimpleValueModel::new(T::type_info()))
}

/// An empty model of an already-registered type.
pub fn for_type(info: &'static TypeInfo) -> Arc<dyn ValueModel> {
    Arc::new(SimpleValueModel::new(info))
}

/// A model of an already-registered type, holding `initial`.
///
/// # Panics
///
/// Panics when `initial` is not of the declared type.
pub fn create_with(info: &'static TypeInfo, initial: DynValue) -> Arc<dyn ValueModel> {
    let model = for_type(info);
    if let Err(error) = model.set(Some(initial)) {
        panic!("initial value does not fit the declared type: {error}");
    }
    model
}

/// A structured tree over `T` with root name `""` and the default
/// property source (accessor pairs, then public fields).
pub fn create_structured<T: Reflect>() -> Arc<StructuredValueModel> {
    StructuredValueModel::new(create_of::<T>(), "", property_sources::default_source())
}

/// Like [`create_structured`], discovering fields of every scope when
/// `all_properties` is set.
pub fn create_structured_with<T: Reflect>(all_properties: bool) -> Arc<StructuredValueModel> {
    let source = if all_properties {
        property_sources::for_all_properties()
    } else {
        property_sources::default_source()
    };
    StructuredValueModel::new(create_of::<T>(), "", source)
}

/// A converting wrapper over `delegate`.
///
/// # Panics
///
/// Panics when the converter's source type differs from the delegate's
/// declared type.
pub fn converting(delegate: Arc<dyn ValueModel>, converter: Converter) -> Arc<ConvertingValueModel> {
    ConvertingValueModel::new(delegate, converter)
}
