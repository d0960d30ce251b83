//! Procedural macros for the Trellis model system.
//!
//! This crate provides the [`derive@Reflect`] derive macro that registers a
//! type and its fields with the Trellis type registry, making the type usable
//! with structured value models and property-based data binding without
//! hand-written accessor code.
//!
//! # Attributes
//!
//! ## `#[reflect(skip)]`
//!
//! Excludes a field from registration. Skipped fields never appear as
//! properties and their types do not need to implement `Reflect`:
//!
//! ```ignore
//! #[derive(Clone, PartialEq, Debug, Reflect)]
//! struct Session {
//!     pub user: String,
//!     #[reflect(skip)]
//!     cache: std::time::Instant,
//! }
//! ```
//!
//! ## `#[reflect(rename = "...")]`
//!
//! Registers the field under a different property name:
//!
//! ```ignore
//! #[derive(Clone, PartialEq, Debug, Reflect)]
//! struct Account {
//!     #[reflect(rename = "displayName")]
//!     pub display_name: String,
//! }
//! ```
//!
//! # Field semantics
//!
//! - Field visibility maps to the registered scope: `pub` fields are public
//!   properties, `pub(crate)` and similar restricted visibilities are crate
//!   properties, and private fields are private properties.
//! - A field of type `Option<X>` registers as a nullable property of type
//!   `X`: reading an absent value yields no value, and writing accepts both
//!   a value and absence.
//! - Any other field type registers as a required property that rejects
//!   absent writes.
//!
//! Unit structs and enums whose variants are all fieldless derive a plain
//! scalar registration with no properties.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, Expr, ExprLit, Field, Fields, GenericArgument, Ident,
    Lit, PathArguments, Type, Visibility,
};

/// Derive macro that implements `trellis_model::Reflect` for a type.
///
/// The generated `ensure_registered` registers the type as a scalar, ensures
/// every field type is registered, and records one property per non-skipped
/// field. Registration is idempotent: if the type is already known to the
/// registry the implementation returns without touching it again.
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_derive_reflect(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed information about a single reflected field.
struct FieldInfo {
    /// The field identifier on the struct.
    name: Ident,
    /// Override for the registered property name, from `#[reflect(rename)]`.
    rename: Option<String>,
    /// The property's value type; for `Option<X>` fields this is `X`.
    inner: Type,
    /// Whether the field is an `Option` and accepts absent values.
    nullable: bool,
    /// The `FieldScope` expression derived from the field's visibility.
    scope: TokenStream2,
}

fn impl_derive_reflect(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Reflect derive does not support generic types",
        ));
    }

    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(_) => impl_struct(input, &data.fields),
            Fields::Unit => Ok(impl_marker(&input.ident)),
            Fields::Unnamed(_) => Err(syn::Error::new_spanned(
                &data.fields,
                "Reflect derive requires named fields; tuple structs are not supported",
            )),
        },
        Data::Enum(data) => {
            for variant in &data.variants {
                if !matches!(variant.fields, Fields::Unit) {
                    return Err(syn::Error::new_spanned(
                        variant,
                        "Reflect derive supports enums only when every variant is fieldless",
                    ));
                }
            }
            Ok(impl_marker(&input.ident))
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Reflect derive only supports structs and enums",
        )),
    }
}

/// Generates the registration impl for a struct with named fields.
fn impl_struct(input: &DeriveInput, fields: &Fields) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    // Collect the reflected fields, honoring skip/rename attributes
    let mut infos = Vec::new();
    for field in fields {
        if let Some(info) = parse_reflect_field(field)? {
            infos.push(info);
        }
    }

    // Generate one registration statement per reflected field
    let registrations: Vec<TokenStream2> = infos
        .iter()
        .map(|info| generate_field_registration(name, info))
        .collect();

    Ok(quote! {
        impl trellis_model::Reflect for #name {
            fn ensure_registered() {
                let registry = trellis_model::type_registry();
                if registry.contains(std::any::TypeId::of::<#name>()) {
                    return;
                }
                registry.register_scalar::<#name>();
                #(#registrations)*
            }
        }
    })
}

/// Generates a plain scalar registration with no properties.
///
/// Used for unit structs and fieldless enums.
fn impl_marker(name: &Ident) -> TokenStream2 {
    quote! {
        impl trellis_model::Reflect for #name {
            fn ensure_registered() {
                trellis_model::type_registry().register_scalar::<#name>();
            }
        }
    }
}

/// Parses a field's `#[reflect(...)]` attributes.
///
/// Returns `None` for fields marked `#[reflect(skip)]`.
fn parse_reflect_field(field: &Field) -> syn::Result<Option<FieldInfo>> {
    let mut skip = false;
    let mut rename = None;

    for attr in &field.attrs {
        if !attr.path().is_ident("reflect") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                return Ok(());
            }
            if meta.path.is_ident("rename") {
                let value = meta.value()?;
                let expr: Expr = value.parse()?;
                if let Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) = expr
                {
                    rename = Some(s.value());
                    return Ok(());
                }
                return Err(meta.error("rename expects a string literal"));
            }
            Err(meta.error("unknown reflect attribute; expected `skip` or `rename`"))
        })?;
    }

    if skip {
        return Ok(None);
    }

    // Named-fields path only, so the ident is always present
    let name = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "Reflect derive requires named fields"))?;
    let (inner, nullable) = extract_option_inner(&field.ty);
    let scope = field_scope(&field.vis);

    Ok(Some(FieldInfo {
        name,
        rename,
        inner,
        nullable,
        scope,
    }))
}

/// Extracts `X` from `Option<X>`, or returns the type unchanged.
///
/// The boolean is true when the field was an `Option` and registers as a
/// nullable property.
fn extract_option_inner(ty: &Type) -> (Type, bool) {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return (inner.clone(), true);
                    }
                }
            }
        }
    }
    (ty.clone(), false)
}

/// Maps Rust field visibility to a registered property scope.
fn field_scope(vis: &Visibility) -> TokenStream2 {
    match vis {
        Visibility::Public(_) => quote! { trellis_model::FieldScope::Public },
        Visibility::Restricted(_) => quote! { trellis_model::FieldScope::Crate },
        Visibility::Inherited => quote! { trellis_model::FieldScope::Private },
    }
}

/// Generates the registration statement for one field.
fn generate_field_registration(struct_name: &Ident, info: &FieldInfo) -> TokenStream2 {
    let field_name = &info.name;
    let inner = &info.inner;
    let scope = &info.scope;
    let property_name = info
        .rename
        .clone()
        .unwrap_or_else(|| field_name.to_string());

    let read = if info.nullable {
        quote! {
            |owner: &trellis_model::DynValue| {
                let owner = owner
                    .downcast_ref::<#struct_name>()
                    .expect("property read applied to a value of another type");
                owner.#field_name.clone().map(trellis_model::DynValue::new)
            }
        }
    } else {
        quote! {
            |owner: &trellis_model::DynValue| {
                let owner = owner
                    .downcast_ref::<#struct_name>()
                    .expect("property read applied to a value of another type");
                Some(trellis_model::DynValue::new(owner.#field_name.clone()))
            }
        }
    };

    let write = if info.nullable {
        quote! {
            |owner: &mut trellis_model::DynValue,
             value: Option<trellis_model::DynValue>| {
                let next = match value {
                    Some(value) => Some(value.into_value::<#inner>().map_err(|value| {
                        trellis_model::ModelError::TypeMismatch {
                            expected: std::any::type_name::<#inner>(),
                            got: value.type_name(),
                        }
                    })?),
                    None => None,
                };
                let owner = owner
                    .downcast_mut::<#struct_name>()
                    .expect("property write applied to a value of another type");
                owner.#field_name = next;
                Ok(())
            }
        }
    } else {
        quote! {
            |owner: &mut trellis_model::DynValue,
             value: Option<trellis_model::DynValue>| {
                let Some(value) = value else {
                    return Err(trellis_model::ModelError::NullNotAllowed {
                        type_name: std::any::type_name::<#inner>(),
                    });
                };
                let next = value.into_value::<#inner>().map_err(|value| {
                    trellis_model::ModelError::TypeMismatch {
                        expected: std::any::type_name::<#inner>(),
                        got: value.type_name(),
                    }
                })?;
                let owner = owner
                    .downcast_mut::<#struct_name>()
                    .expect("property write applied to a value of another type");
                owner.#field_name = next;
                Ok(())
            }
        }
    };

    quote! {
        <#inner as trellis_model::Reflect>::ensure_registered();
        registry.register_field::<#struct_name>(
            #scope,
            trellis_model::PropertyDescriptor::new(
                #property_name,
                <#inner as trellis_model::Reflect>::type_info(),
                #read,
                #write,
            ),
        );
    }
}
