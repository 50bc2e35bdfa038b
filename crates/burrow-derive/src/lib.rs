//! Derive macro for burrow ORM models.
//!
//! This crate provides the `#[derive(Model)]` macro, which emits the static
//! model descriptor read by the schema catalog and the index-path field
//! accessors used by the binder and the association loader.

use proc_macro::TokenStream;
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::ParseStream;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, LitStr, Type};

/// Derives `Model` and `Record` for a struct with named fields.
///
/// # Attributes
///
/// - `#[burrow("table:NAME,alias:NAME,select:NAME")]` on the struct
///   overrides the table name, the default alias and the relation SELECT
///   reads from. All are optional.
/// - `#[burrow(hooks)]` on the struct forwards before/after-scan calls to
///   the struct's `ScanHooks` impl.
///
/// # Field Attributes
///
/// - `#[burrow("name,pk,autoincrement,nullzero,notnull,unique,default:EXPR,type:SQLTYPE,soft_delete,scanonly")]`
///   configures a column. The leading token is the column name; leave it
///   empty (`",pk"`) to keep the snake_case field name.
/// - `#[burrow("rel:belongs-to|has-one|has-many,join:BASE=JOIN,polymorphic")]`
///   declares a relation. The field must be `Option<Box<T>>` for to-one
///   relations and `Vec<T>` for to-many ones.
/// - `#[burrow("m2m:BRIDGE_TABLE")]` declares a many-to-many relation.
/// - `#[burrow("embed")]` or `#[burrow("embed:PREFIX")]` flattens another
///   model's columns into this one.
/// - `#[burrow("-")]` excludes the field.
///
/// Tag contents are validated by the catalog when the table is first
/// resolved, so a malformed tag surfaces as a `SchemaError`.
///
/// # Generated Items
///
/// - `impl Model` returning the model descriptor
/// - `impl Record` with field, relation and hook accessors
#[proc_macro_derive(Model, attributes(burrow))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_model_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_model_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let struct_attrs = parse_burrow_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Model derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Model derive only supports structs",
            ));
        }
    };

    let mut infos = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let attrs = parse_burrow_attrs(&field.attrs)?;
        if attrs.hooks {
            return Err(syn::Error::new_spanned(
                field,
                "`hooks` is only valid on the struct",
            ));
        }
        let tag = attrs.tag.unwrap_or_default();
        let kind = match classify(&tag) {
            Some(kind) => kind,
            None => continue,
        };
        infos.push(FieldInfo {
            ident,
            ty: field.ty.clone(),
            tag,
            kind,
        });
    }

    let name_str = struct_name.to_string();
    let struct_tag = struct_attrs.tag.unwrap_or_default();

    let definition_calls = infos.iter().map(|info| {
        let name = info.ident.to_string();
        let tag = &info.tag;
        let ty = &info.ty;
        match info.kind {
            FieldKind::Column => quote! {
                .column(#name, #tag, <#ty as ::burrow_core::SqlType>::field_type())
            },
            FieldKind::Relation => quote! {
                .relation(
                    #name,
                    #tag,
                    <#ty as ::burrow_core::RelationValue>::target(),
                    <#ty as ::burrow_core::RelationValue>::is_many(),
                )
            },
            FieldKind::Embed => quote! {
                .embed(#name, #tag, <#ty as ::burrow_core::Model>::info())
            },
        }
    });

    let mut value_arms = Vec::new();
    let mut set_arms = Vec::new();
    let mut relation_arms = Vec::new();
    let mut relation_mut_arms = Vec::new();
    for (i, info) in infos.iter().enumerate() {
        let i = Literal::usize_unsuffixed(i);
        let ident = &info.ident;
        match info.kind {
            FieldKind::Column => {
                value_arms.push(quote! {
                    [#i] => ::burrow_core::ToValue::to_value(&self.#ident),
                });
                set_arms.push(quote! {
                    [#i] => {
                        self.#ident = ::burrow_core::FromValue::from_value(value)?;
                        Ok(())
                    }
                });
            }
            FieldKind::Relation => {
                relation_arms.push(quote! {
                    [#i] => Some(::burrow_core::RelationValue::as_relation_ref(&self.#ident)),
                });
                relation_mut_arms.push(quote! {
                    [#i] => Some(::burrow_core::RelationValue::as_relation_mut(&mut self.#ident)),
                });
            }
            FieldKind::Embed => {
                value_arms.push(quote! {
                    [#i, rest @ ..] => ::burrow_core::Record::field_value(&self.#ident, rest),
                });
                set_arms.push(quote! {
                    [#i, rest @ ..] => {
                        ::burrow_core::Record::set_field(&mut self.#ident, rest, value)
                    }
                });
                relation_arms.push(quote! {
                    [#i, rest @ ..] => ::burrow_core::Record::relation(&self.#ident, rest),
                });
                relation_mut_arms.push(quote! {
                    [#i, rest @ ..] => ::burrow_core::Record::relation_mut(&mut self.#ident, rest),
                });
            }
        }
    }

    let hooks = if struct_attrs.hooks {
        quote! {
            fn before_scan(&mut self) -> ::std::result::Result<(), ::burrow_core::HookError> {
                <Self as ::burrow_core::ScanHooks>::before_scan(self)
            }

            fn after_scan(&mut self) -> ::std::result::Result<(), ::burrow_core::HookError> {
                <Self as ::burrow_core::ScanHooks>::after_scan(self)
            }
        }
    } else {
        quote! {}
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        #[automatically_derived]
        impl #impl_generics ::burrow_core::Model for #struct_name #ty_generics #where_clause {
            fn definition() -> ::burrow_core::ModelDef {
                ::burrow_core::ModelDef::new(#name_str, #struct_tag)
                    #(#definition_calls)*
            }
        }

        #[automatically_derived]
        #[allow(unused_variables, clippy::match_single_binding)]
        impl #impl_generics ::burrow_core::Record for #struct_name #ty_generics #where_clause {
            fn model_info(&self) -> ::burrow_core::ModelInfo {
                <Self as ::burrow_core::Model>::info()
            }

            fn field_value(&self, index: &[usize]) -> ::burrow_core::Value {
                match index {
                    #(#value_arms)*
                    _ => ::burrow_core::Value::Null,
                }
            }

            fn set_field(
                &mut self,
                index: &[usize],
                value: ::burrow_core::Value,
            ) -> ::std::result::Result<(), ::burrow_core::ScanError> {
                match index {
                    #(#set_arms)*
                    _ => Err(::burrow_core::ScanError::UnknownField {
                        model: #name_str,
                        index: index.to_vec(),
                    }),
                }
            }

            fn relation(&self, index: &[usize]) -> Option<::burrow_core::RelationRef<'_>> {
                match index {
                    #(#relation_arms)*
                    _ => None,
                }
            }

            fn relation_mut(&mut self, index: &[usize]) -> Option<::burrow_core::RelationMut<'_>> {
                match index {
                    #(#relation_mut_arms)*
                    _ => None,
                }
            }

            #hooks

            fn clone_record(&self) -> ::std::boxed::Box<dyn ::burrow_core::Record> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
        }
    };

    Ok(expanded)
}

#[derive(Clone, Copy)]
enum FieldKind {
    Column,
    Relation,
    Embed,
}

struct FieldInfo {
    ident: Ident,
    ty: Type,
    tag: String,
    kind: FieldKind,
}

#[derive(Default)]
struct BurrowAttrs {
    tag: Option<String>,
    hooks: bool,
}

/// Picks the accessor shape from the tag; `None` excludes the field.
fn classify(tag: &str) -> Option<FieldKind> {
    if tag.trim() == "-" {
        return None;
    }
    let mut kind = FieldKind::Column;
    for token in tag.split(',').map(str::trim) {
        if token.starts_with("rel:") || token.starts_with("m2m:") {
            return Some(FieldKind::Relation);
        }
        if token == "embed" || token.starts_with("embed:") {
            kind = FieldKind::Embed;
        }
    }
    Some(kind)
}

fn parse_burrow_attrs(attrs: &[Attribute]) -> syn::Result<BurrowAttrs> {
    let mut result = BurrowAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("burrow") {
            continue;
        }
        attr.parse_args_with(|input: ParseStream| {
            if input.peek(LitStr) {
                let tag: LitStr = input.parse()?;
                if result.tag.is_some() {
                    return Err(syn::Error::new(tag.span(), "duplicate burrow tag"));
                }
                result.tag = Some(tag.value());
            } else {
                let ident: Ident = input.parse()?;
                if ident != "hooks" {
                    return Err(syn::Error::new(
                        ident.span(),
                        "expected a tag string or `hooks`",
                    ));
                }
                result.hooks = true;
            }
            Ok(())
        })?;
    }
    Ok(result)
}
