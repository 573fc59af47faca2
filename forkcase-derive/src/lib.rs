//! Derive macros for forkcase model states.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, Index, Member};

/// Derive macro for `forkcase::Signature`.
///
/// The signature is the tuple of the struct's fields, cloned. Fields marked
/// `#[signature(skip)]` are left out. If any field is marked `#[signature]`,
/// only the marked fields are used.
///
/// # Example
///
/// ```rust,ignore
/// use forkcase::*;
///
/// #[derive(Signature)]
/// struct Session {
///     in_txn: bool,
///     isolation: &'static str,
///     #[signature(skip)]
///     rows_seen: Vec<i64>,
/// }
///
/// // Session::Value is (bool, &'static str)
/// ```
#[proc_macro_derive(Signature, attributes(signature))]
pub fn derive_signature(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match signature_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// How a field takes part in the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Default,
    Include,
    Skip,
}

fn field_mark(field: &Field) -> Result<Mark, syn::Error> {
    let mut mark = Mark::Default;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("signature")) {
        let next = match &attr.meta {
            syn::Meta::Path(_) => Mark::Include,
            syn::Meta::List(_) => {
                let mut skip = false;
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("skip") {
                        skip = true;
                        Ok(())
                    } else {
                        Err(meta.error("expected `skip`"))
                    }
                })?;
                if skip {
                    Mark::Skip
                } else {
                    Mark::Include
                }
            }
            syn::Meta::NameValue(_) => {
                return Err(syn::Error::new_spanned(
                    attr,
                    "expected `#[signature]` or `#[signature(skip)]`",
                ));
            }
        };
        if mark != Mark::Default && mark != next {
            return Err(syn::Error::new_spanned(
                attr,
                "a field cannot be both included in and skipped from the signature",
            ));
        }
        mark = next;
    }
    Ok(mark)
}

/// Generate the `Signature` implementation.
fn signature_impl(input: &DeriveInput) -> Result<TokenStream2, syn::Error> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Signature derive macro only supports structs",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Signature derive macro does not support unions",
            ));
        }
    };

    let members: Vec<(Member, &Field, Mark)> = match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .map(|field| {
                let ident = field
                    .ident
                    .clone()
                    .ok_or_else(|| syn::Error::new_spanned(field, "named field without a name"))?;
                Ok((Member::Named(ident), field, field_mark(field)?))
            })
            .collect::<Result<_, syn::Error>>()?,
        Fields::Unnamed(unnamed) => unnamed
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, field)| Ok((Member::Unnamed(Index::from(i)), field, field_mark(field)?)))
            .collect::<Result<_, syn::Error>>()?,
        Fields::Unit => Vec::new(),
    };

    let explicit = members.iter().any(|(_, _, mark)| *mark == Mark::Include);
    let selected: Vec<_> = members
        .iter()
        .filter(|(_, _, mark)| match mark {
            Mark::Include => true,
            Mark::Default => !explicit,
            Mark::Skip => false,
        })
        .collect();

    let types = selected.iter().map(|(_, field, _)| &field.ty);
    let values = selected.iter().map(|(member, _, _)| {
        quote! { ::core::clone::Clone::clone(&self.#member) }
    });
    // a one-element tuple needs its trailing comma
    let trailing = if selected.len() == 1 {
        quote! { , }
    } else {
        quote! {}
    };

    Ok(quote! {
        impl #impl_generics ::forkcase::Signature for #name #ty_generics #where_clause {
            type Value = ( #(#types),* #trailing );

            fn signature(&self) -> Self::Value {
                ( #(#values),* #trailing )
            }
        }
    })
}
