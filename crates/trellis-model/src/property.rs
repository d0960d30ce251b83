//! Property descriptors, discovery sources, and the property-bound model.
//!
//! A [`PropertyDescriptor`] names one property of an owner type and carries
//! type-erased read/write access to it. Descriptors come from two channels:
//! hand-registered accessor pairs (see
//! [`SharedTypeRegistry::accessors`](crate::registry::SharedTypeRegistry::accessors))
//! and field descriptors registered by `#[derive(Reflect)]`. A
//! [`PropertySource`] is a discovery policy over those channels;
//! [`property_sources`] provides the stock policies, including the default
//! "accessor pairs first, then public fields" composition.
//!
//! [`PropertyValueModel`] binds one descriptor to an owner model: it reads
//! the property out of the owner's current value, and writes by cloning the
//! owner value, applying the descriptor write, and pushing the result back
//! through the owner model. That write-back is the notification channel:
//! the owner change cascades back down, equality-gated at every level, so
//! the property model and its siblings each decide for themselves whether
//! their value actually changed.
//!
//! # Key Types
//!
//! - [`PropertyDescriptor`] - Name + value type + erased read/write
//! - [`PropertySource`] / [`property_sources`] - Discovery policies
//! - [`FieldScope`] - Field visibility filter for field discovery
//! - [`PropertyValueModel`] - One property of a dynamic owner, as a model
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_model::property::{property_sources, PropertySource, PropertyValueModel};
//! use trellis_model::{init_type_registry, type_registry, DynValue, SimpleValueModel, ValueModel};
//!
//! #[derive(Clone, PartialEq, Debug)]
//! struct Rect {
//!     width: f64,
//!     height: f64,
//! }
//!
//! init_type_registry();
//! let registry = type_registry();
//! let rect_info = registry.register_scalar::<Rect>();
//! registry
//!     .accessors::<Rect>()
//!     .property::<f64>("width")
//!     .read(|r| r.width)
//!     .write(|r, v| r.width = v)
//!     .register();
//!
//! let owner: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(rect_info));
//! owner.set(Some(DynValue::new(Rect { width: 3.0, height: 2.0 }))).unwrap();
//!
//! let descriptor = property_sources::for_accessors().properties_of(rect_info).remove(0);
//! let width = PropertyValueModel::new(owner.clone(), descriptor);
//!
//! assert_eq!(width.get().unwrap().get::<f64>(), Some(3.0));
//! width.set(Some(DynValue::new(5.0_f64))).unwrap();
//! assert_eq!(owner.get().unwrap().get::<Rect>().unwrap().width, 5.0);
//! ```
//!
//! # Related Modules
//!
//! - [`crate::registry`] - Where descriptors are registered and stored
//! - [`crate::structured`] - Builds one property model per discovered property

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use static_assertions::assert_impl_all;

use crate::error::Result;
use crate::model::{ModelBase, ValueListener, ValueModel};
use crate::registry::{TypeInfo, type_registry};
use crate::subscription::Subscription;
use crate::value::DynValue;

/// Erased property read: owner value in, property value out.
pub type ReadFn = Arc<dyn Fn(&DynValue) -> Option<DynValue> + Send + Sync>;

/// Erased property write: applies a new property value to an owner value.
pub type WriteFn = Arc<dyn Fn(&mut DynValue, Option<DynValue>) -> Result<()> + Send + Sync>;

/// The visibility a field was declared with, as seen by discovery.
///
/// `#[derive(Reflect)]` records one scope per field: `pub` maps to
/// [`Public`](Self::Public), any restricted visibility (`pub(crate)`,
/// `pub(super)`, `pub(in ...)`) to [`Crate`](Self::Crate), and inherited
/// visibility to [`Private`](Self::Private).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldScope {
    /// `pub` fields.
    Public,
    /// Fields with a restricted `pub(...)` visibility.
    Crate,
    /// Fields with no visibility modifier.
    Private,
}

impl FieldScope {
    /// Every scope, from widest to narrowest.
    pub const ALL: [FieldScope; 3] = [Self::Public, Self::Crate, Self::Private];
}

/// One named property of an owner type, with erased access.
#[derive(Clone)]
pub struct PropertyDescriptor {
    name: String,
    value: &'static TypeInfo,
    read: ReadFn,
    write: WriteFn,
}

impl PropertyDescriptor {
    /// Build a descriptor from closures over the erased owner value.
    ///
    /// Mostly used by generated `Reflect` impls; hand-written code usually
    /// goes through the accessor registration builder instead.
    pub fn new(
        name: impl Into<String>,
        value: &'static TypeInfo,
        read: impl Fn(&DynValue) -> Option<DynValue> + Send + Sync + 'static,
        write: impl Fn(&mut DynValue, Option<DynValue>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            read: Arc::new(read),
            write: Arc::new(write),
        }
    }

    pub(crate) fn from_parts(
        name: String,
        value: &'static TypeInfo,
        read: ReadFn,
        write: WriteFn,
    ) -> Self {
        Self { name, value, read, write }
    }

    /// The property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The property's value type.
    pub fn value_type(&self) -> &'static TypeInfo {
        self.value
    }

    /// Read the property out of an owner value.
    ///
    /// `None` means the property currently has no value (a nullable slot
    /// holding nothing).
    pub fn read(&self, owner: &DynValue) -> Option<DynValue> {
        (self.read)(owner)
    }

    /// Write a property value into an owner value.
    pub fn write(&self, owner: &mut DynValue, value: Option<DynValue>) -> Result<()> {
        (self.write)(owner, value)
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value.name())
            .finish()
    }
}

/// A discovery policy: which properties does an owner type expose?
pub trait PropertySource: Send + Sync {
    /// The property descriptors of `owner`, in discovery order.
    fn properties_of(&self, owner: &'static TypeInfo) -> Vec<PropertyDescriptor>;
}

/// Discovers hand-registered accessor pairs.
///
/// Records missing either the read or the write half are skipped.
pub struct AccessorPropertySource;

impl PropertySource for AccessorPropertySource {
    fn properties_of(&self, owner: &'static TypeInfo) -> Vec<PropertyDescriptor> {
        type_registry()
            .accessor_records(owner.id())
            .iter()
            .filter_map(|record| record.descriptor())
            .collect()
    }
}

/// Discovers derive-registered fields, filtered by [`FieldScope`].
pub struct FieldPropertySource {
    scopes: Vec<FieldScope>,
}

impl FieldPropertySource {
    /// Discover fields of every scope.
    pub fn new() -> Self {
        Self {
            scopes: FieldScope::ALL.to_vec(),
        }
    }

    /// Discover only fields whose scope is in `scopes`.
    pub fn with_scopes(scopes: impl IntoIterator<Item = FieldScope>) -> Self {
        Self {
            scopes: scopes.into_iter().collect(),
        }
    }
}

impl Default for FieldPropertySource {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertySource for FieldPropertySource {
    fn properties_of(&self, owner: &'static TypeInfo) -> Vec<PropertyDescriptor> {
        type_registry()
            .field_records(owner.id())
            .iter()
            .filter(|record| self.scopes.contains(&record.scope()))
            .map(|record| record.descriptor().clone())
            .collect()
    }
}

/// Concatenates delegate sources, keeping the first descriptor per name.
///
/// Name comparison is case-insensitive, so a later "Level" never shadows an
/// earlier "level".
pub struct CompoundPropertySource {
    delegates: Vec<Arc<dyn PropertySource>>,
}

impl CompoundPropertySource {
    /// Compose `delegates` in priority order.
    pub fn new(delegates: Vec<Arc<dyn PropertySource>>) -> Self {
        Self { delegates }
    }
}

impl PropertySource for CompoundPropertySource {
    fn properties_of(&self, owner: &'static TypeInfo) -> Vec<PropertyDescriptor> {
        let mut known: Vec<String> = Vec::new();
        let mut properties = Vec::new();
        for delegate in &self.delegates {
            for descriptor in delegate.properties_of(owner) {
                let key = descriptor.name().to_ascii_lowercase();
                if known.contains(&key) {
                    continue;
                }
                known.push(key);
                properties.push(descriptor);
            }
        }
        properties
    }
}

/// Stock discovery policies.
pub mod property_sources {
    use super::*;

    /// Only hand-registered accessor pairs.
    pub fn for_accessors() -> Arc<dyn PropertySource> {
        Arc::new(AccessorPropertySource)
    }

    /// Derive-registered fields of every scope.
    pub fn for_fields() -> Arc<dyn PropertySource> {
        Arc::new(FieldPropertySource::new())
    }

    /// Accessor pairs first, then public fields. The default policy.
    pub fn default_source() -> Arc<dyn PropertySource> {
        Arc::new(CompoundPropertySource::new(vec![
            for_accessors(),
            Arc::new(FieldPropertySource::with_scopes([FieldScope::Public])),
        ]))
    }

    /// Accessor pairs first, then fields of every scope.
    pub fn for_all_properties() -> Arc<dyn PropertySource> {
        Arc::new(CompoundPropertySource::new(vec![for_accessors(), for_fields()]))
    }
}

/// One property of a dynamic owner, as a model.
///
/// The owner is itself a model; this model caches the owner's current value
/// and re-reads the property from that cache. When the owner announces a new
/// value, the cache is swapped and this model's listeners fire iff the
/// property value differs between the old and new owner.
///
/// Writes never mutate in place: `set` clones the cached owner value,
/// applies the descriptor write, and hands the updated owner back to the
/// owner model. The resulting owner-change notification is what ultimately
/// fires this model's own listeners.
///
/// After [`detach`](ValueModel::detach), owner changes no longer arrive:
/// the model fires nothing and keeps answering reads from the frozen cache.
pub struct PropertyValueModel {
    base: ModelBase,
    owner: Arc<dyn ValueModel>,
    descriptor: PropertyDescriptor,
    /// Owner value as of the last owner notification.
    current_owner: RwLock<Option<DynValue>>,
    owner_subscription: Mutex<Option<Subscription>>,
}

impl PropertyValueModel {
    /// Bind `descriptor` to the value produced by `owner`.
    pub fn new(owner: Arc<dyn ValueModel>, descriptor: PropertyDescriptor) -> Arc<Self> {
        let model = Arc::new(Self {
            base: ModelBase::new(descriptor.value_type()),
            owner: owner.clone(),
            descriptor,
            current_owner: RwLock::new(None),
            owner_subscription: Mutex::new(None),
        });

        // Subscribe before seeding the cache so no owner change is lost in
        // between; retarget tolerates observing the same value twice.
        let weak = Arc::downgrade(&model);
        let subscription = owner.subscribe(Box::new(move |_, new| {
            if let Some(model) = weak.upgrade() {
                model.retarget(new.cloned());
            }
        }));
        *model.owner_subscription.lock() = Some(subscription);
        model.retarget(owner.get());
        model
    }

    /// The descriptor this model reads and writes through.
    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }

    /// The owner model this property belongs to.
    pub fn owner(&self) -> &Arc<dyn ValueModel> {
        &self.owner
    }

    /// Swap the cached owner value and fire iff the property value changed
    /// with it.
    fn retarget(&self, new_owner: Option<DynValue>) {
        tracing::trace!(
            target: "trellis_model::property",
            property = self.descriptor.name(),
            "owner value changed; re-targeting"
        );
        let old_owner = {
            let mut guard = self.current_owner.write();
            std::mem::replace(&mut *guard, new_owner.clone())
        };
        let old_value = self.read_property(old_owner.as_ref());
        let new_value = self.read_property(new_owner.as_ref());
        if old_value != new_value {
            self.base.fire_changed(old_value.as_ref(), new_value.as_ref());
        }
    }

    fn read_property(&self, owner: Option<&DynValue>) -> Option<DynValue> {
        owner.and_then(|owner| self.descriptor.read(owner))
    }
}

impl ValueModel for PropertyValueModel {
    fn value_type(&self) -> &'static TypeInfo {
        self.base.value_type()
    }

    fn get(&self) -> Option<DynValue> {
        let owner = self.current_owner.read().clone();
        self.read_property(owner.as_ref())
    }

    fn set(&self, value: Option<DynValue>) -> Result<()> {
        let owner = self.current_owner.read().clone();
        let Some(mut owner) = owner else {
            // No owner value to write into.
            return Ok(());
        };
        self.descriptor.write(&mut owner, value)?;
        self.owner.set(Some(owner))
    }

    fn subscribe(&self, listener: ValueListener) -> Subscription {
        self.base.subscribe(listener)
    }

    fn detach(&self) {
        if let Some(subscription) = self.owner_subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}

assert_impl_all!(PropertyValueModel: Send, Sync);
