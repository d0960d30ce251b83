//! Runtime type registry for Trellis models.
//!
//! Models are dynamically typed: each model carries a `&'static` [`TypeInfo`]
//! describing the values it accepts, and the registry is where those infos
//! live. A type is either a scalar or an array kind; array kinds carry
//! [`ArrayOps`], a table of type-erased operations over the `Vec<E>` value so
//! array models can measure, read, and write elements without knowing `E`.
//!
//! The registry also stores the property declarations discovery runs over:
//! hand-registered accessor pairs (see
//! [`SharedTypeRegistry::accessors`]) and field descriptors registered by
//! `#[derive(Reflect)]`.
//!
//! # Key Types
//!
//! - [`TypeInfo`] / [`TypeKind`] - Runtime description of a registered type
//! - [`ArrayOps`] - Type-erased element operations for `Vec<E>` kinds
//! - [`TypeRegistry`] / [`SharedTypeRegistry`] - The registry and its thread-safe wrapper
//! - [`Reflect`] - Idempotent registration entry point, derivable for user types
//!
//! # Example
//!
//! ```
//! use std::any::TypeId;
//! use trellis_model::{init_type_registry, type_registry, Reflect};
//!
//! init_type_registry();
//!
//! // Built-in scalars are registered by init_type_registry().
//! assert!(type_registry().contains(TypeId::of::<i32>()));
//!
//! // Vec<E> registers as an array kind over its element type.
//! <Vec<i32> as Reflect>::ensure_registered();
//! let info = <Vec<i32> as Reflect>::type_info();
//! assert!(info.is_array());
//! ```
//!
//! # Related Modules
//!
//! - [`crate::value`] - The erased values the registry's operations act on
//! - [`crate::property`] - Descriptors and sources built over registry records
//! - [`crate::models`] - Factory functions that resolve types through the registry

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use parking_lot::{Mutex, RwLock};
use static_assertions::assert_impl_all;

use crate::error::{ModelError, Result};
use crate::property::{FieldScope, PropertyDescriptor, ReadFn, WriteFn};
use crate::value::{AnyValue, DynValue};

/// Runtime description of a registered type.
///
/// Infos are created by the registry and leaked, so every registered type has
/// exactly one `&'static TypeInfo` for the life of the process and models can
/// hold it by reference. Two infos are equal iff they describe the same
/// [`TypeId`].
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
    kind: TypeKind,
}

impl TypeInfo {
    /// The [`TypeId`] of the described type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The [`std::any::type_name`] of the described type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this type is a scalar or an array kind.
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Whether this type is an array kind.
    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array(_))
    }

    /// The array operations, or `None` for scalar kinds.
    pub fn array_ops(&self) -> Option<&ArrayOps> {
        match &self.kind {
            TypeKind::Array(ops) => Some(ops),
            TypeKind::Scalar => None,
        }
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The shape of a registered type.
#[derive(Clone, Copy)]
pub enum TypeKind {
    /// A single value with no element structure.
    Scalar,
    /// A homogeneous sequence (`Vec<E>`) with type-erased element access.
    Array(ArrayOps),
}

impl fmt::Debug for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "Scalar"),
            Self::Array(ops) => write!(f, "Array<{}>", ops.element.name()),
        }
    }
}

/// Type-erased operations over an array value.
///
/// The table is built once per registered `Vec<E>` and applied to
/// [`DynValue`]s holding that vector type. Applying an operation to a value
/// of any other type is a contract violation and panics; array models
/// guarantee the match by type-checking every write.
#[derive(Clone, Copy)]
pub struct ArrayOps {
    element: &'static TypeInfo,
    length: fn(&DynValue) -> usize,
    element_at: fn(&DynValue, usize) -> DynValue,
    write_element: fn(&mut DynValue, usize, DynValue) -> Result<()>,
    empty: fn() -> DynValue,
}

impl ArrayOps {
    fn for_vec<E: AnyValue + Clone + PartialEq + fmt::Debug>(element: &'static TypeInfo) -> Self {
        Self {
            element,
            length: |array| expect_vec::<E>(array).len(),
            element_at: |array, index| DynValue::new(expect_vec::<E>(array)[index].clone()),
            write_element: |array, index, value| {
                let value = value.into_value::<E>().map_err(|value| ModelError::TypeMismatch {
                    expected: std::any::type_name::<E>(),
                    got: value.type_name(),
                })?;
                expect_vec_mut::<E>(array)[index] = value;
                Ok(())
            },
            empty: || DynValue::new(Vec::<E>::new()),
        }
    }

    /// The element type of the array.
    pub fn element_type(&self) -> &'static TypeInfo {
        self.element
    }

    /// The number of elements in `array`.
    pub fn length(&self, array: &DynValue) -> usize {
        (self.length)(array)
    }

    /// Clone the element at `index` out of `array`.
    ///
    /// Panics when `index` is out of range.
    pub fn element(&self, array: &DynValue, index: usize) -> DynValue {
        (self.element_at)(array, index)
    }

    /// Overwrite the element at `index` in `array`.
    ///
    /// Returns a type-mismatch error when `value` is not of the element
    /// type; panics when `index` is out of range.
    pub fn set_element(&self, array: &mut DynValue, index: usize, value: DynValue) -> Result<()> {
        (self.write_element)(array, index, value)
    }

    /// A fresh array value with no elements.
    pub fn new_empty(&self) -> DynValue {
        (self.empty)()
    }
}

fn expect_vec<E: AnyValue + Clone + PartialEq + fmt::Debug>(array: &DynValue) -> &Vec<E> {
    match array.downcast_ref::<Vec<E>>() {
        Some(vec) => vec,
        None => panic!(
            "array value holds {} where {} was expected",
            array.type_name(),
            std::any::type_name::<Vec<E>>()
        ),
    }
}

fn expect_vec_mut<E: AnyValue + Clone + PartialEq + fmt::Debug>(array: &mut DynValue) -> &mut Vec<E> {
    let name = array.type_name();
    match array.downcast_mut::<Vec<E>>() {
        Some(vec) => vec,
        None => panic!(
            "array value holds {} where {} was expected",
            name,
            std::any::type_name::<Vec<E>>()
        ),
    }
}

/// A hand-registered accessor pair for one property of an owner type.
///
/// Either half may be missing; discovery skips incomplete records (see
/// [`AccessorPropertySource`](crate::property::AccessorPropertySource)).
#[derive(Clone)]
pub struct AccessorRecord {
    name: String,
    value: &'static TypeInfo,
    read: Option<ReadFn>,
    write: Option<WriteFn>,
}

impl AccessorRecord {
    /// The property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The property's value type.
    pub fn value_type(&self) -> &'static TypeInfo {
        self.value
    }

    /// Whether both the read and the write half were registered.
    pub fn is_complete(&self) -> bool {
        self.read.is_some() && self.write.is_some()
    }

    /// Build a descriptor from this record, or `None` if a half is missing.
    pub fn descriptor(&self) -> Option<PropertyDescriptor> {
        match (&self.read, &self.write) {
            (Some(read), Some(write)) => Some(PropertyDescriptor::from_parts(
                self.name.clone(),
                self.value,
                read.clone(),
                write.clone(),
            )),
            _ => None,
        }
    }
}

/// A derive-registered field descriptor together with its visibility scope.
#[derive(Clone)]
pub struct FieldRecord {
    scope: FieldScope,
    descriptor: PropertyDescriptor,
}

impl FieldRecord {
    /// The visibility scope the field was declared with.
    pub fn scope(&self) -> FieldScope {
        self.scope
    }

    /// The field's property descriptor.
    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }
}

/// The registry of types, accessor pairs, and field descriptors.
///
/// This is the single-threaded core; use [`SharedTypeRegistry`] (or the
/// global instance behind [`type_registry`]) for concurrent access.
pub struct TypeRegistry {
    types: HashMap<TypeId, &'static TypeInfo>,
    accessors: HashMap<TypeId, Vec<AccessorRecord>>,
    fields: HashMap<TypeId, Vec<FieldRecord>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
            accessors: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    /// Register `T` as a scalar kind. Idempotent.
    #[tracing::instrument(skip(self), target = "trellis_model::registry", level = "trace")]
    pub fn register_scalar<T: AnyValue>(&mut self) -> &'static TypeInfo {
        let id = TypeId::of::<T>();
        if let Some(&info) = self.types.get(&id) {
            return info;
        }
        let info: &'static TypeInfo = Box::leak(Box::new(TypeInfo {
            id,
            name: std::any::type_name::<T>(),
            kind: TypeKind::Scalar,
        }));
        self.types.insert(id, info);
        tracing::trace!(target: "trellis_model::registry", name = info.name, "registered scalar type");
        info
    }

    /// Register `Vec<E>` as an array kind. Idempotent.
    ///
    /// The element type must already be registered; `Reflect` impls register
    /// elements first, so this only panics on hand-rolled registration that
    /// skipped the element.
    #[tracing::instrument(skip(self), target = "trellis_model::registry", level = "trace")]
    pub fn register_array<E: AnyValue + Clone + PartialEq + fmt::Debug>(&mut self) -> &'static TypeInfo {
        let id = TypeId::of::<Vec<E>>();
        if let Some(&info) = self.types.get(&id) {
            return info;
        }
        let element = match self.types.get(&TypeId::of::<E>()) {
            Some(&element) => element,
            None => panic!(
                "element type {} must be registered before {}",
                std::any::type_name::<E>(),
                std::any::type_name::<Vec<E>>()
            ),
        };
        let info: &'static TypeInfo = Box::leak(Box::new(TypeInfo {
            id,
            name: std::any::type_name::<Vec<E>>(),
            kind: TypeKind::Array(ArrayOps::for_vec::<E>(element)),
        }));
        self.types.insert(id, info);
        tracing::trace!(
            target: "trellis_model::registry",
            name = info.name,
            element = element.name(),
            "registered array type"
        );
        info
    }

    /// Whether a type is registered.
    pub fn contains(&self, id: TypeId) -> bool {
        self.types.contains_key(&id)
    }

    /// Look up the info for a registered type.
    pub fn lookup(&self, id: TypeId) -> Option<&'static TypeInfo> {
        self.types.get(&id).copied()
    }

    /// Register a field descriptor for `T`.
    ///
    /// A second registration under an already-present field name is ignored,
    /// which makes concurrent `ensure_registered` races harmless.
    pub fn register_field<T: AnyValue>(&mut self, scope: FieldScope, descriptor: PropertyDescriptor) {
        let records = self.fields.entry(TypeId::of::<T>()).or_default();
        if records.iter().any(|r| r.descriptor.name() == descriptor.name()) {
            return;
        }
        tracing::trace!(
            target: "trellis_model::registry",
            owner = std::any::type_name::<T>(),
            field = descriptor.name(),
            ?scope,
            "registered field"
        );
        records.push(FieldRecord { scope, descriptor });
    }

    fn register_accessor(&mut self, owner: TypeId, owner_name: &'static str, record: AccessorRecord) {
        let records = self.accessors.entry(owner).or_default();
        if records.iter().any(|r| r.name == record.name) {
            return;
        }
        tracing::trace!(
            target: "trellis_model::registry",
            owner = owner_name,
            property = %record.name,
            complete = record.is_complete(),
            "registered accessor property"
        );
        records.push(record);
    }

    /// The accessor records registered for an owner type, in registration order.
    pub fn accessor_records(&self, owner: TypeId) -> &[AccessorRecord] {
        self.accessors.get(&owner).map_or(&[], Vec::as_slice)
    }

    /// The field records registered for an owner type, in declaration order.
    pub fn field_records(&self, owner: TypeId) -> &[FieldRecord] {
        self.fields.get(&owner).map_or(&[], Vec::as_slice)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread-safe wrapper around [`TypeRegistry`].
///
/// Provides concurrent read access with exclusive write access via `RwLock`.
///
/// # Related
///
/// - [`TypeRegistry`] - The underlying registry
/// - [`type_registry`] - Returns the global `SharedTypeRegistry`
pub struct SharedTypeRegistry {
    inner: RwLock<TypeRegistry>,
}

impl SharedTypeRegistry {
    /// Create a new shared registry with nothing registered.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TypeRegistry::new()),
        }
    }

    /// Register `T` as a scalar kind. Idempotent.
    pub fn register_scalar<T: AnyValue>(&self) -> &'static TypeInfo {
        self.inner.write().register_scalar::<T>()
    }

    /// Register `Vec<E>` as an array kind. Idempotent.
    pub fn register_array<E: AnyValue + Clone + PartialEq + fmt::Debug>(&self) -> &'static TypeInfo {
        self.inner.write().register_array::<E>()
    }

    /// Whether a type is registered.
    pub fn contains(&self, id: TypeId) -> bool {
        self.inner.read().contains(id)
    }

    /// Look up the info for a registered type.
    pub fn lookup(&self, id: TypeId) -> Option<&'static TypeInfo> {
        self.inner.read().lookup(id)
    }

    /// Register a field descriptor for `T`.
    pub fn register_field<T: AnyValue>(&self, scope: FieldScope, descriptor: PropertyDescriptor) {
        self.inner.write().register_field::<T>(scope, descriptor);
    }

    /// The accessor records for an owner type, cloned out of the registry.
    pub fn accessor_records(&self, owner: TypeId) -> Vec<AccessorRecord> {
        self.inner.read().accessor_records(owner).to_vec()
    }

    /// The field records for an owner type, cloned out of the registry.
    pub fn field_records(&self, owner: TypeId) -> Vec<FieldRecord> {
        self.inner.read().field_records(owner).to_vec()
    }

    /// Start declaring hand-registered accessor properties for `T`.
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_model::{init_type_registry, type_registry};
    ///
    /// #[derive(Clone, PartialEq, Debug)]
    /// struct Celsius {
    ///     degrees: f64,
    /// }
    ///
    /// init_type_registry();
    /// let registry = type_registry();
    /// registry.register_scalar::<Celsius>();
    ///
    /// let accessors = registry.accessors::<Celsius>();
    /// accessors
    ///     .property::<f64>("degrees")
    ///     .read(|c| c.degrees)
    ///     .write(|c, v| c.degrees = v)
    ///     .register();
    /// ```
    pub fn accessors<T: AnyValue>(&self) -> AccessorRegistration<'_, T> {
        AccessorRegistration {
            registry: self,
            _owner: PhantomData,
        }
    }
}

impl Default for SharedTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

assert_impl_all!(SharedTypeRegistry: Send, Sync);

/// Entry point for declaring accessor properties of an owner type `T`.
///
/// Created by [`SharedTypeRegistry::accessors`]; call
/// [`property`](Self::property) once per property.
pub struct AccessorRegistration<'a, T> {
    registry: &'a SharedTypeRegistry,
    _owner: PhantomData<fn() -> T>,
}

impl<'a, T: AnyValue> AccessorRegistration<'a, T> {
    /// Declare a property of value type `V` under `name`.
    ///
    /// `V` must already be registered; built-in scalars are registered by
    /// [`init_type_registry`], other types through [`Reflect`].
    pub fn property<V: AnyValue>(&self, name: impl Into<String>) -> AccessorProperty<'a, T, V> {
        let value = match self.registry.lookup(TypeId::of::<V>()) {
            Some(info) => info,
            None => panic!(
                "property type {} must be registered before accessors are declared for it",
                std::any::type_name::<V>()
            ),
        };
        AccessorProperty {
            registry: self.registry,
            name: name.into(),
            value,
            read: None,
            write: None,
            _marker: PhantomData,
        }
    }
}

/// Builder for one accessor property.
///
/// Attach the read and write halves, then call [`register`](Self::register).
/// A registered record missing either half is kept but excluded from
/// discovery, so read-only or write-only pairs are representable without
/// being usable.
pub struct AccessorProperty<'a, T, V> {
    registry: &'a SharedTypeRegistry,
    name: String,
    value: &'static TypeInfo,
    read: Option<ReadFn>,
    write: Option<WriteFn>,
    _marker: PhantomData<fn(T) -> V>,
}

impl<'a, T: AnyValue, V: AnyValue> AccessorProperty<'a, T, V> {
    /// Attach the read half.
    pub fn read(mut self, read: impl Fn(&T) -> V + Send + Sync + 'static) -> Self {
        self.read = Some(std::sync::Arc::new(move |owner: &DynValue| {
            let owner = match owner.downcast_ref::<T>() {
                Some(owner) => owner,
                None => panic!(
                    "accessor read for {} applied to a value of type {}",
                    std::any::type_name::<T>(),
                    owner.type_name()
                ),
            };
            Some(DynValue::new(read(owner)))
        }));
        self
    }

    /// Attach the write half.
    pub fn write(mut self, write: impl Fn(&mut T, V) + Send + Sync + 'static) -> Self {
        self.write = Some(std::sync::Arc::new(
            move |owner: &mut DynValue, value: Option<DynValue>| {
                let value = value.ok_or(ModelError::NullNotAllowed {
                    type_name: std::any::type_name::<V>(),
                })?;
                let value = value.into_value::<V>().map_err(|value| ModelError::TypeMismatch {
                    expected: std::any::type_name::<V>(),
                    got: value.type_name(),
                })?;
                let owner_name = owner.type_name();
                let owner = match owner.downcast_mut::<T>() {
                    Some(owner) => owner,
                    None => panic!(
                        "accessor write for {} applied to a value of type {}",
                        std::any::type_name::<T>(),
                        owner_name
                    ),
                };
                write(owner, value);
                Ok(())
            },
        ));
        self
    }

    /// Store the record in the registry.
    pub fn register(self) {
        self.registry.inner.write().register_accessor(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            AccessorRecord {
                name: self.name,
                value: self.value,
                read: self.read,
                write: self.write,
            },
        );
    }
}

/// Global type registry (lazy initialized).
static GLOBAL_REGISTRY: Mutex<Option<SharedTypeRegistry>> = Mutex::new(None);

/// Initialize the global type registry and register the built-in scalars.
///
/// Call this once before building any model; further calls are no-ops. The
/// built-in scalars are `bool`, `char`, `String`, the fixed-width integers
/// (`i8` through `i64`, `u8` through `u64`), `isize`/`usize`, and the two
/// float widths.
pub fn init_type_registry() {
    let mut guard = GLOBAL_REGISTRY.lock();
    if guard.is_none() {
        let registry = SharedTypeRegistry::new();
        register_builtins(&registry);
        *guard = Some(registry);
    }
}

/// Get a reference to the global type registry.
///
/// Panics if [`init_type_registry`] has not been called.
pub fn type_registry() -> &'static SharedTypeRegistry {
    let guard = GLOBAL_REGISTRY.lock();
    match guard.as_ref() {
        Some(registry) => {
            // SAFETY: once initialized, the registry is never replaced or
            // dropped, so a reference into the static outlives the guard.
            unsafe { &*(registry as *const SharedTypeRegistry) }
        }
        None => panic!("type registry is not initialized; call trellis_model::init_type_registry() first"),
    }
}

fn register_builtins(registry: &SharedTypeRegistry) {
    registry.register_scalar::<bool>();
    registry.register_scalar::<char>();
    registry.register_scalar::<String>();
    registry.register_scalar::<i8>();
    registry.register_scalar::<i16>();
    registry.register_scalar::<i32>();
    registry.register_scalar::<i64>();
    registry.register_scalar::<isize>();
    registry.register_scalar::<u8>();
    registry.register_scalar::<u16>();
    registry.register_scalar::<u32>();
    registry.register_scalar::<u64>();
    registry.register_scalar::<usize>();
    registry.register_scalar::<f32>();
    registry.register_scalar::<f64>();
}

/// Types that can register themselves with the global registry.
///
/// `ensure_registered` is idempotent and registers everything the type
/// transitively needs (an array kind registers its element type first, a
/// derived struct registers its field types). Built-in scalars implement this
/// by delegating to [`SharedTypeRegistry::register_scalar`]; user structs and
/// fieldless enums get an implementation from `#[derive(Reflect)]` in the
/// `trellis-macros` crate.
pub trait Reflect: AnyValue + Sized {
    /// Register this type (and its dependencies) if not yet registered.
    fn ensure_registered();

    /// The registered info for this type, registering it first if needed.
    fn type_info() -> &'static TypeInfo {
        Self::ensure_registered();
        match type_registry().lookup(TypeId::of::<Self>()) {
            Some(info) => info,
            None => panic!(
                "{} did not register itself in ensure_registered",
                std::any::type_name::<Self>()
            ),
        }
    }
}

macro_rules! impl_reflect_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn ensure_registered() {
                    type_registry().register_scalar::<$ty>();
                }
            }
        )*
    };
}

impl_reflect_scalar!(
    bool, char, String, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64,
);

impl<T: Reflect + Clone + PartialEq + fmt::Debug> Reflect for Vec<T> {
    fn ensure_registered() {
        T::ensure_registered();
        type_registry().register_array::<T>();
    }
}
