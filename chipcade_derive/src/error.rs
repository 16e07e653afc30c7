//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations, plus
//! an inherent `kind_name()` returning the variant (or type) name, which the
//! console uses to report the flat error kind next to the message.
//!
//! # Usage
//!
//! ```ignore
//! use chipcade_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MachineFault {
//!     #[error("invalid register {0}")]
//!     InvalidRegister(u16),
//!
//!     #[error("line {line}: {message}")]
//!     Syntax { line: usize, message: String },
//!
//!     #[error("unknown font")]
//!     UnknownFont,
//! }
//! ```
//!
//! Positional fields are interpolated with `{0}`, `{1}`; named fields with
//! `{name}`. Format specs such as `{0:#06x}` are kept.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (display_body, kind_body) = match &input.data {
        Data::Enum(data) => {
            let mut display_arms = Vec::with_capacity(data.variants.len());
            let mut kind_arms = Vec::with_capacity(data.variants.len());

            for variant in &data.variants {
                let ident = &variant.ident;
                let message = message_from_attrs(
                    &variant.attrs,
                    ident,
                    &format!("variant `{ident}`"),
                )?;
                let kind = ident.to_string();
                let (pattern, write) = display_arm(&variant.fields, &message, quote!(Self::#ident));
                display_arms.push(quote! { #pattern => #write, });
                kind_arms.push(quote! { Self::#ident { .. } => #kind, });
            }

            (
                quote! { match self { #(#display_arms)* } },
                quote! { match self { #(#kind_arms)* } },
            )
        }
        Data::Struct(data) => {
            let message = message_from_attrs(&input.attrs, name, &format!("type `{name}`"))?;
            let (pattern, write) = display_arm(&data.fields, &message, quote!(Self));
            let kind = name.to_string();
            (
                quote! {
                    let #pattern = self;
                    #write
                },
                quote! { #kind },
            )
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}

        impl #impl_generics #name #ty_generics #where_clause {
            /// Name of the error kind, without its payload.
            pub fn kind_name(&self) -> &'static str {
                #kind_body
            }
        }
    })
}

/// Builds the destructuring pattern and the `write!` call for one set of fields.
///
/// Only fields the message interpolates are bound.
fn display_arm(fields: &Fields, message: &str, path: TokenStream2) -> (TokenStream2, TokenStream2) {
    match fields {
        Fields::Unit => (path, quote! { write!(f, #message) }),
        Fields::Unnamed(unnamed) => {
            let message = rename_positional(message, unnamed.unnamed.len());
            let mut bindings = Vec::with_capacity(unnamed.unnamed.len());
            let mut used = Vec::new();
            for i in 0..unnamed.unnamed.len() {
                let ident = format_ident!("_{}", i);
                if mentions(&message, &ident.to_string()) {
                    bindings.push(ident.to_token_stream());
                    used.push(ident);
                } else {
                    bindings.push(quote!(_));
                }
            }
            (
                quote! { #path(#(#bindings),*) },
                quote! { write!(f, #message, #(#used = #used),*) },
            )
        }
        Fields::Named(named) => {
            let used: Vec<_> = named
                .named
                .iter()
                .filter_map(|f| f.ident.as_ref())
                .filter(|ident| mentions(message, &ident.to_string()))
                .collect();
            (
                quote! { #path { #(#used,)* .. } },
                quote! { write!(f, #message, #(#used = #used),*) },
            )
        }
    }
}

/// Reads the string literal out of the first `#[error(...)]` attribute.
fn message_from_attrs<T: ToTokens>(
    attrs: &[Attribute],
    target: &T,
    description: &str,
) -> syn::Result<String> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                target,
                format!("missing #[error(\"...\")] attribute on {description}"),
            )
        })?;

    attr.parse_args::<LitStr>()
        .map(|lit| lit.value())
        .map_err(|_| {
            syn::Error::new_spanned(
                attr,
                "expected a string literal, e.g. #[error(\"invalid register {0}\")]",
            )
        })
}

/// Whether `message` interpolates `name` as `{name}` or `{name:...}`.
fn mentions(message: &str, name: &str) -> bool {
    message.contains(&format!("{{{name}}}")) || message.contains(&format!("{{{name}:"))
}

/// Rewrites `{0}` / `{0:spec}` to `{_0}` / `{_0:spec}` so positional fields bind by name.
fn rename_positional(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{_{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{_{i}:"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_fields_are_renamed() {
        assert_eq!(rename_positional("reg {0} of {1}", 2), "reg {_0} of {_1}");
        assert_eq!(rename_positional("addr {0:#06x}", 1), "addr {_0:#06x}");
    }

    #[test]
    fn mentions_detects_named_and_formatted() {
        assert!(mentions("line {line}: {message}", "line"));
        assert!(mentions("offset {offset:#x}", "offset"));
        assert!(!mentions("offset {offsets}", "offset"));
    }
}
