//! `#[derive(Snapshot)]` for plain state structs.
//!
//! Each named field becomes one snapshot entry, in declaration order, keyed by
//! the field name. Field attributes select the transfer method:
//!
//! - none: `Serializer::value` (primitive integers and `bool`)
//! - `#[snapshot(bytes)]`: `Serializer::bytes` (fixed-length `u8` buffers)
//! - `#[snapshot(array)]`: `Serializer::array` (`[T; N]` of primitives)
//! - `#[snapshot(nested)]`: `Serializer::nested` (child `Snapshot` types)
//! - `#[snapshot(skip)]`: not persisted (host-side wiring, media handles)
//! - `#[snapshot(rename = "name")]`: use a different entry name

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input, spanned::Spanned};

enum Method {
    Value,
    Bytes,
    Array,
    Nested,
    Skip,
}

struct FieldAttrs {
    method: Method,
    rename: Option<String>,
}

fn parse_field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs {
        method: Method::Value,
        rename: None,
    };
    for attr in &field.attrs {
        if !attr.path().is_ident("snapshot") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                attrs.method = Method::Skip;
            } else if meta.path.is_ident("bytes") {
                attrs.method = Method::Bytes;
            } else if meta.path.is_ident("array") {
                attrs.method = Method::Array;
            } else if meta.path.is_ident("nested") {
                attrs.method = Method::Nested;
            } else if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                attrs.rename = Some(lit.value());
            } else {
                return Err(meta.error("unknown snapshot attribute"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "Snapshot can only be derived for structs",
        ));
    };

    let mut steps = Vec::new();
    match &data.fields {
        Fields::Named(fields) => {
            for field in &fields.named {
                let attrs = parse_field_attrs(field)?;
                let Some(ident) = &field.ident else {
                    continue;
                };
                let key = attrs.rename.unwrap_or_else(|| ident.to_string());
                if key.len() > u8::MAX as usize {
                    return Err(syn::Error::new(field.span(), "snapshot name too long"));
                }
                let step = match attrs.method {
                    Method::Skip => continue,
                    Method::Value => quote! { s.value(#key, &mut self.#ident)?; },
                    Method::Bytes => quote! { s.bytes(#key, &mut self.#ident[..])?; },
                    Method::Array => quote! { s.array(#key, &mut self.#ident)?; },
                    Method::Nested => quote! { s.nested(#key, &mut self.#ident)?; },
                };
                steps.push(step);
            }
        }
        Fields::Unit => {}
        Fields::Unnamed(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Snapshot derive needs named fields",
            ));
        }
    }

    Ok(quote! {
        impl #impl_generics ::quartz_core::snapshot::Snapshot for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn transfer(
                &mut self,
                s: &mut ::quartz_core::snapshot::Serializer<'_>,
            ) -> ::core::result::Result<(), ::quartz_core::snapshot::SnapshotError> {
                #(#steps)*
                ::core::result::Result::Ok(())
            }
        }
    })
}

#[proc_macro_derive(Snapshot, attributes(snapshot))]
pub fn derive_snapshot(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
