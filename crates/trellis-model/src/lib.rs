//! Reactive value models for Trellis.
//!
//! This crate provides the dynamic value layer of the Trellis toolkit:
//!
//! - **Type-Erased Values**: [`DynValue`], cloneable and comparable erased values
//! - **Type Registry**: Global registry of scalar and array kinds, accessor pairs, and fields
//! - **Value Models**: Observable cells with equality-gated change notification
//! - **Conversion**: Converters and converting wrapper models
//! - **Properties**: Descriptors, discovery policies, and property-bound models
//! - **Arrays**: Whole-array models with per-element observation
//! - **Structured Trees**: A model per discovered property, recursively
//! - **Connections**: Bidirectional lockstep wiring between models
//!
//! # Value Model Example
//!
//! ```
//! use trellis_model::{init_type_registry, models, DynValue};
//!
//! init_type_registry();
//!
//! let count = models::create(0_i32);
//! let _watch = count.subscribe(Box::new(|old, new| {
//!     println!("{old:?} -> {new:?}");
//! }));
//!
//! count.set(Some(DynValue::new(1_i32))).unwrap();
//! assert_eq!(count.get().unwrap().get::<i32>(), Some(1));
//! ```
//!
//! # Conversion Example
//!
//! ```
//! use trellis_model::{init_type_registry, models, Converter, DynValue, ValueModel};
//!
//! init_type_registry();
//!
//! let celsius = models::create(25.0_f64);
//! let fahrenheit = models::converting(
//!     celsius.clone(),
//!     Converter::new::<f64, f64>(|c| c * 9.0 / 5.0 + 32.0, |f| (f - 32.0) * 5.0 / 9.0),
//! );
//!
//! assert_eq!(fahrenheit.get().unwrap().get::<f64>(), Some(77.0));
//! fahrenheit.set(Some(DynValue::new(32.0_f64))).unwrap();
//! assert_eq!(celsius.get().unwrap().get::<f64>(), Some(0.0));
//! ```

mod array;
mod connect;
mod convert;
mod error;
pub mod logging;
mod model;
pub mod models;
pub mod property;
pub mod registry;
mod structured;
mod subscription;
mod value;

pub use array::{ArrayElementModel, ArrayListener, ArrayValueModel};
pub use connect::ModelConnection;
pub use convert::{converters, Converter, ConvertingValueModel, NumericKind};
pub use error::{ModelError, Result};
pub use model::{ModelBase, SimpleValueModel, ValueListener, ValueModel};
pub use property::{
    AccessorPropertySource, CompoundPropertySource, FieldPropertySource, FieldScope,
    PropertyDescriptor, PropertySource, PropertyValueModel, ReadFn, WriteFn,
};
pub use registry::{
    init_type_registry, type_registry, AccessorRecord, ArrayOps, FieldRecord, Reflect,
    SharedTypeRegistry, TypeInfo, TypeKind, TypeRegistry,
};
pub use structured::StructuredValueModel;
pub use subscription::{SubscriberList, Subscription, SubscriptionId};
pub use value::{AnyValue, DynValue};
