//! Structured trees: a model per property, recursively.
//!
//! [`StructuredValueModel`] turns one root model into a tree of nodes, one
//! per discovered property. Property discovery runs exactly once per node,
//! at construction, against the node's declared type and the carried
//! [`PropertySource`]; swapping the node's value later never adds or
//! removes children. Each child is a [`PropertyValueModel`] bound to this
//! node's model, so edits anywhere in the tree cascade through the root
//! value and back down, equality-gated at every level.
//!
//! Nodes come in two kinds. A plain node has children; an array node has
//! none and exposes the array surface ([`array_len`](StructuredValueModel::array_len),
//! [`element_model`](StructuredValueModel::element_model),
//! [`set_element`](StructuredValueModel::set_element), ...) instead.
//! `element_model` wraps the per-index model in a fresh unnamed node, so an
//! element of struct type grows its own property children and an element of
//! array type becomes a nested array node. Unnamed nodes are transparent in
//! name paths: they report their parent's name and path.
//!
//! # Key Types
//!
//! - [`StructuredValueModel`] - One node of the tree
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_model::property::property_sources;
//! use trellis_model::{
//!     init_type_registry, type_registry, DynValue, SimpleValueModel, StructuredValueModel,
//!     ValueModel,
//! };
//!
//! #[derive(Clone, PartialEq, Debug)]
//! struct Person {
//!     name: String,
//!     age: i32,
//! }
//!
//! init_type_registry();
//! let registry = type_registry();
//! let info = registry.register_scalar::<Person>();
//! let accessors = registry.accessors::<Person>();
//! accessors.property::<String>("name").read(|p| p.name.clone()).write(|p, v| p.name = v).register();
//! accessors.property::<i32>("age").read(|p| p.age).write(|p, v| p.age = v).register();
//!
//! let owner: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(info));
//! let tree = StructuredValueModel::new(owner.clone(), "", property_sources::default_source());
//! owner.set(Some(DynValue::new(Person { name: "ada".into(), age: 36 }))).unwrap();
//!
//! let age = tree.child("age").unwrap();
//! assert_eq!(age.name_path(), ".age");
//! assert_eq!(age.get().unwrap().get::<i32>(), Some(36));
//! ```
//!
//! # Related Modules
//!
//! - [`crate::property`] - Descriptors and discovery policies
//! - [`crate::array`] - The element surface array nodes delegate to

use std::fmt;
use std::sync::{Arc, Weak};

use static_assertions::assert_impl_all;

use crate::array::{ArrayListener, ArrayValueModel, ElementSlot};
use crate::error::Result;
use crate::model::{ValueListener, ValueModel};
use crate::property::{PropertySource, PropertyValueModel};
use crate::registry::TypeInfo;
use crate::subscription::Subscription;
use crate::value::DynValue;

/// One node of a structured tree.
///
/// The value surface delegates to the node's internal model; the tree
/// surface navigates by name. Children exist only on plain nodes, the
/// array surface only on array nodes.
pub struct StructuredValueModel {
    internal: Arc<dyn ValueModel>,
    /// Present iff this is an array node; shares the internal model.
    array: Option<Arc<ArrayValueModel>>,
    parent: Weak<StructuredValueModel>,
    /// Local name; `None` marks a transparent element wrapper.
    name: Option<String>,
    source: Arc<dyn PropertySource>,
    children: Vec<Arc<StructuredValueModel>>,
}

impl StructuredValueModel {
    /// Build a tree root named `name` over `internal`.
    ///
    /// Children are discovered from the internal model's declared type via
    /// `source`, exactly once. The same source is carried down the tree and
    /// reused for element sub-trees.
    pub fn new(
        internal: Arc<dyn ValueModel>,
        name: impl Into<String>,
        source: Arc<dyn PropertySource>,
    ) -> Arc<Self> {
        let (model, array) = Self::shape(internal);
        let root = Self::build(model, array, Weak::new(), Some(name.into()), source);
        tracing::trace!(
            target: "trellis_model::structured",
            path = root.name_path(),
            value_type = root.internal.value_type().name(),
            children = root.children.len(),
            "built structured tree"
        );
        root
    }

    /// Wrap array-typed models so the node can serve the array surface.
    fn shape(model: Arc<dyn ValueModel>) -> (Arc<dyn ValueModel>, Option<Arc<ArrayValueModel>>) {
        if model.value_type().is_array() {
            let array = ArrayValueModel::new(model);
            (array.clone() as Arc<dyn ValueModel>, Some(array))
        } else {
            (model, None)
        }
    }

    fn build(
        internal: Arc<dyn ValueModel>,
        array: Option<Arc<ArrayValueModel>>,
        parent: Weak<StructuredValueModel>,
        name: Option<String>,
        source: Arc<dyn PropertySource>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let children = if array.is_some() {
                Vec::new()
            } else {
                Self::build_children(&internal, weak, &source)
            };
            Self {
                internal,
                array,
                parent,
                name,
                source,
                children,
            }
        })
    }

    fn build_children(
        internal: &Arc<dyn ValueModel>,
        parent: &Weak<StructuredValueModel>,
        source: &Arc<dyn PropertySource>,
    ) -> Vec<Arc<StructuredValueModel>> {
        source
            .properties_of(internal.value_type())
            .into_iter()
            .map(|descriptor| {
                let name = descriptor.name().to_string();
                let property = PropertyValueModel::new(internal.clone(), descriptor);
                let (model, array) = Self::shape(property);
                Self::build(model, array, parent.clone(), Some(name), source.clone())
            })
            .collect()
    }

    /// The parent node, or `None` at the root.
    pub fn parent(&self) -> Option<Arc<StructuredValueModel>> {
        self.parent.upgrade()
    }

    /// The node's name; an unnamed element wrapper reports its parent's
    /// name.
    pub fn name(&self) -> Option<String> {
        match &self.name {
            Some(name) => Some(name.clone()),
            None => self.parent.upgrade().and_then(|parent| parent.name()),
        }
    }

    /// The dot-separated path from the root, preserving stored casing.
    ///
    /// Unnamed element wrappers are transparent: they report their
    /// parent's path unchanged.
    pub fn name_path(&self) -> String {
        match self.parent.upgrade() {
            None => self.name.clone().unwrap_or_default(),
            Some(parent) => match &self.name {
                None => parent.name_path(),
                Some(name) => format!("{}.{}", parent.name_path(), name),
            },
        }
    }

    /// The child nodes, in discovery order. Empty on array nodes.
    pub fn children(&self) -> &[Arc<StructuredValueModel>] {
        &self.children
    }

    /// The child with the given name, compared case-insensitively.
    pub fn child(&self, name: &str) -> Option<Arc<StructuredValueModel>> {
        self.children
            .iter()
            .find(|child| {
                child
                    .name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .cloned()
    }

    /// The descendant at a dot-separated path, compared segment by segment
    /// case-insensitively.
    pub fn find(&self, path: &str) -> Option<Arc<StructuredValueModel>> {
        let mut segments = path.split('.');
        let mut current = self.child(segments.next()?)?;
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// The discovery policy carried by this tree.
    pub fn property_source(&self) -> Arc<dyn PropertySource> {
        self.source.clone()
    }

    /// Whether this node serves the array surface.
    pub fn is_array_node(&self) -> bool {
        self.array.is_some()
    }

    /// The element count of an array node, or -1 when the value is absent.
    pub fn array_len(&self) -> isize {
        self.require_array("array_len").array_len()
    }

    /// The element type of an array node.
    pub fn element_type(&self) -> &'static TypeInfo {
        self.require_array("element_type").element_type()
    }

    /// Clone the element at `index` of an array node.
    pub fn element(&self, index: usize) -> Option<DynValue> {
        self.require_array("element").element(index)
    }

    /// Overwrite the element at `index` of an array node. The write flows
    /// through the node's model, so the root value observes it.
    pub fn set_element(&self, index: usize, value: DynValue) -> Result<()> {
        self.require_array("set_element").set_element(index, value)
    }

    /// Observe element-changed notifications of an array node.
    pub fn subscribe_array(&self, listener: ArrayListener) -> Subscription {
        self.require_array("subscribe_array").subscribe_array(listener)
    }

    /// A fresh unnamed node over the element at `index` of an array node.
    ///
    /// Struct-typed elements grow property children; array-typed elements
    /// become nested array nodes. Every call builds a new wrapper.
    ///
    /// # Panics
    ///
    /// Panics on non-array nodes and when `index` is out of range.
    pub fn element_model(self: &Arc<Self>, index: usize) -> Arc<StructuredValueModel> {
        let array = self.require_array("element_model");
        let (model, nested) = match array.element_slot(index) {
            ElementSlot::Plain(element) => (element as Arc<dyn ValueModel>, None),
            ElementSlot::Nested(element) => {
                (element.clone() as Arc<dyn ValueModel>, Some(element))
            }
        };
        Self::build(
            model,
            nested,
            Arc::downgrade(self),
            None,
            self.source.clone(),
        )
    }

    fn require_array(&self, operation: &str) -> &Arc<ArrayValueModel> {
        match &self.array {
            Some(array) => array,
            None => panic!(
                "{operation} requires an array node, but '{}' holds {}",
                self.name_path(),
                self.internal.value_type().name()
            ),
        }
    }
}

impl ValueModel for StructuredValueModel {
    fn value_type(&self) -> &'static TypeInfo {
        self.internal.value_type()
    }

    fn get(&self) -> Option<DynValue> {
        self.internal.get()
    }

    fn set(&self, value: Option<DynValue>) -> Result<()> {
        self.internal.set(value)
    }

    fn subscribe(&self, listener: ValueListener) -> Subscription {
        self.internal.subscribe(listener)
    }

    fn detach(&self) {
        self.internal.detach();
        for child in &self.children {
            child.detach();
        }
    }
}

impl fmt::Debug for StructuredValueModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredValueModel")
            .field("path", &self.name_path())
            .field("value_type", &self.internal.value_type().name())
            .field("children", &self.children.len())
            .finish()
    }
}

assert_impl_all!(StructuredValueModel: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimpleValueModel;
    use crate::property::property_sources;
    use crate::registry::{init_type_registry, type_registry};
    use parking_lot::Mutex;

    #[derive(Clone, PartialEq, Debug)]
    struct Person {
        name: String,
        age: i32,
    }

    #[derive(Clone, PartialEq, Debug)]
    struct Team {
        label: String,
        scores: Vec<i32>,
    }

    #[derive(Clone, PartialEq, Debug)]
    struct Roster {
        people: Vec<Person>,
    }

    fn register_person() -> &'static TypeInfo {
        init_type_registry();
        let registry = type_registry();
        let info = registry.register_scalar::<Person>();
        let accessors = registry.accessors::<Person>();
        accessors
            .property::<String>("name")
            .read(|p: &Person| p.name.clone())
            .write(|p, v| p.name = v)
            .register();
        accessors
            .property::<i32>("age")
            .read(|p: &Person| p.age)
            .write(|p, v| p.age = v)
            .register();
        info
    }

    fn register_team() -> &'static TypeInfo {
        init_type_registry();
        let registry = type_registry();
        registry.register_array::<i32>();
        let info = registry.register_scalar::<Team>();
        let accessors = registry.accessors::<Team>();
        accessors
            .property::<String>("label")
            .read(|t: &Team| t.label.clone())
            .write(|t, v| t.label = v)
            .register();
        accessors
            .property::<Vec<i32>>("scores")
            .read(|t: &Team| t.scores.clone())
            .write(|t, v| t.scores = v)
            .register();
        info
    }

    fn register_roster() -> &'static TypeInfo {
        register_person();
        let registry = type_registry();
        registry.register_array::<Person>();
        let info = registry.register_scalar::<Roster>();
        registry
            .accessors::<Roster>()
            .property::<Vec<Person>>("people")
            .read(|r: &Roster| r.people.clone())
            .write(|r, v| r.people = v)
            .register();
        info
    }

    fn person(name: &str, age: i32) -> Person {
        Person {
            name: name.to_string(),
            age,
        }
    }

    fn person_tree() -> (Arc<dyn ValueModel>, Arc<StructuredValueModel>) {
        let owner: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(register_person()));
        let tree = StructuredValueModel::new(owner.clone(), "", property_sources::default_source());
        (owner, tree)
    }

    #[test]
    fn test_tree_has_one_child_per_property() {
        let (_owner, tree) = person_tree();

        let names: Vec<_> = tree.children().iter().filter_map(|c| c.name()).collect();
        assert_eq!(names, vec!["name", "age"]);

        let paths: Vec<_> = tree.children().iter().map(|c| c.name_path()).collect();
        assert_eq!(paths, vec![".name", ".age"]);

        assert!(tree.parent().is_none());
        let age = tree.child("age").unwrap();
        assert!(Arc::ptr_eq(&age.parent().unwrap(), &tree));
        assert_eq!(age.value_type().name(), "i32");
    }

    #[test]
    fn test_child_lookup_is_case_insensitive() {
        let (_owner, tree) = person_tree();

        let child = tree.child("AGE").unwrap();
        // The stored casing survives.
        assert_eq!(child.name(), Some("age".to_string()));
        assert!(tree.child("height").is_none());
    }

    #[test]
    fn test_find_descends_dot_paths() {
        register_person();
        let registry = type_registry();

        #[derive(Clone, PartialEq, Debug)]
        struct Company {
            boss: Person,
        }
        let info = registry.register_scalar::<Company>();
        registry
            .accessors::<Company>()
            .property::<Person>("boss")
            .read(|c: &Company| c.boss.clone())
            .write(|c, v| c.boss = v)
            .register();

        let owner: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(info));
        let tree = StructuredValueModel::new(owner.clone(), "", property_sources::default_source());

        let age = tree.find("boss.age").unwrap();
        assert_eq!(age.name_path(), ".boss.age");

        owner
            .set(Some(DynValue::new(Company {
                boss: person("ada", 36),
            })))
            .unwrap();
        assert_eq!(age.get().unwrap().get::<i32>(), Some(36));

        assert!(tree.find("boss.height").is_none());
        assert!(tree.find("").is_none());
    }

    #[test]
    fn test_children_follow_the_root_value() {
        let (owner, tree) = person_tree();
        let age = tree.child("age").unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let _subscription = age.subscribe(Box::new(move |old, new| {
            received_clone.lock().push((
                old.and_then(|v| v.get::<i32>()),
                new.and_then(|v| v.get::<i32>()),
            ));
        }));

        owner.set(Some(DynValue::new(person("ada", 36)))).unwrap();
        // Same age under a different name: the age child stays silent.
        owner.set(Some(DynValue::new(person("grace", 36)))).unwrap();
        owner.set(Some(DynValue::new(person("grace", 37)))).unwrap();

        assert_eq!(*received.lock(), vec![(None, Some(36)), (Some(36), Some(37))]);
    }

    #[test]
    fn test_child_set_writes_back_to_the_root() {
        let (owner, tree) = person_tree();
        owner.set(Some(DynValue::new(person("ada", 36)))).unwrap();

        let age = tree.child("age").unwrap();
        age.set(Some(DynValue::new(40_i32))).unwrap();

        let updated = owner.get().unwrap().get::<Person>().unwrap();
        assert_eq!(updated, person("ada", 40));
    }

    #[test]
    fn test_array_child_is_an_array_node() {
        let owner: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(register_team()));
        let tree = StructuredValueModel::new(owner.clone(), "", property_sources::default_source());
        owner
            .set(Some(DynValue::new(Team {
                label: "blue".into(),
                scores: vec![3, 7],
            })))
            .unwrap();

        let scores = tree.child("scores").unwrap();
        assert!(scores.is_array_node());
        assert!(scores.children().is_empty());
        assert!(scores.child("anything").is_none());
        assert_eq!(scores.array_len(), 2);
        assert_eq!(scores.element_type().name(), "i32");
        assert_eq!(scores.element(1).unwrap().get::<i32>(), Some(7));

        // Element writes surface on the root value.
        scores.set_element(1, DynValue::new(9_i32)).unwrap();
        let updated = owner.get().unwrap().get::<Team>().unwrap();
        assert_eq!(updated.scores, vec![3, 9]);
    }

    #[test]
    #[should_panic(expected = "requires an array node")]
    fn test_array_surface_on_plain_node_panics() {
        let (_owner, tree) = person_tree();
        let _ = tree.array_len();
    }

    #[test]
    fn test_element_nodes_are_transparent_in_paths() {
        let owner: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(register_team()));
        let tree = StructuredValueModel::new(owner.clone(), "", property_sources::default_source());
        owner
            .set(Some(DynValue::new(Team {
                label: "blue".into(),
                scores: vec![3, 7],
            })))
            .unwrap();

        let scores = tree.child("scores").unwrap();
        let first = scores.element_model(0);
        assert_eq!(first.name(), Some("scores".to_string()));
        assert_eq!(first.name_path(), ".scores");
        assert_eq!(first.get().unwrap().get::<i32>(), Some(3));
    }

    #[test]
    fn test_struct_elements_grow_property_children() {
        let owner: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(register_roster()));
        let tree = StructuredValueModel::new(owner.clone(), "", property_sources::default_source());
        owner
            .set(Some(DynValue::new(Roster {
                people: vec![person("ada", 36), person("grace", 45)],
            })))
            .unwrap();

        let people = tree.child("people").unwrap();
        assert!(people.is_array_node());

        let first = people.element_model(0);
        assert!(!first.is_array_node());
        assert_eq!(first.children().len(), 2);

        let age = first.child("age").unwrap();
        assert_eq!(age.name_path(), ".people.age");
        assert_eq!(age.get().unwrap().get::<i32>(), Some(36));

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let _subscription = age.subscribe(Box::new(move |old, new| {
            received_clone.lock().push((
                old.and_then(|v| v.get::<i32>()),
                new.and_then(|v| v.get::<i32>()),
            ));
        }));

        // An edit deep in the tree cascades up to the root value and back
        // down to the element's own children.
        age.set(Some(DynValue::new(41_i32))).unwrap();

        let updated = owner.get().unwrap().get::<Roster>().unwrap();
        assert_eq!(updated.people[0].age, 41);
        assert_eq!(updated.people[1], person("grace", 45));
        assert_eq!(*received.lock(), vec![(Some(36), Some(41))]);
    }

    #[test]
    fn test_nested_array_elements_become_array_nodes() {
        init_type_registry();
        let registry = type_registry();
        registry.register_array::<i32>();
        registry.register_array::<Vec<i32>>();

        #[derive(Clone, PartialEq, Debug)]
        struct Grid {
            cells: Vec<Vec<i32>>,
        }
        let info = registry.register_scalar::<Grid>();
        registry
            .accessors::<Grid>()
            .property::<Vec<Vec<i32>>>("cells")
            .read(|g: &Grid| g.cells.clone())
            .write(|g, v| g.cells = v)
            .register();

        let owner: Arc<dyn ValueModel> = Arc::new(SimpleValueModel::new(info));
        let tree = StructuredValueModel::new(owner.clone(), "", property_sources::default_source());
        owner
            .set(Some(DynValue::new(Grid {
                cells: vec![vec![1, 2], vec![3]],
            })))
            .unwrap();

        let cells = tree.child("cells").unwrap();
        let row = cells.element_model(0);
        assert!(row.is_array_node());
        assert_eq!(row.array_len(), 2);
        assert_eq!(row.name_path(), ".cells");

        row.set_element(0, DynValue::new(10_i32)).unwrap();
        let updated = owner.get().unwrap().get::<Grid>().unwrap();
        assert_eq!(updated.cells, vec![vec![10, 2], vec![3]]);
    }

    #[test]
    fn test_detach_releases_the_tree() {
        let (owner, tree) = person_tree();
        owner.set(Some(DynValue::new(person("ada", 36)))).unwrap();
        let age = tree.child("age").unwrap();

        let events = Arc::new(Mutex::new(0));
        let events_clone = events.clone();
        let _subscription = age.subscribe(Box::new(move |_, _| {
            *events_clone.lock() += 1;
        }));

        tree.detach();
        owner.set(Some(DynValue::new(person("ada", 50)))).unwrap();

        // Only received before detach.
        assert_eq!(*events.lock(), 0);
    }
}
