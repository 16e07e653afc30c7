//! Derive macros for the chipcade crate.
//!
//! Provides `#[derive(Error)]`, which generates `Display`, `std::error::Error`
//! and a `kind_name()` accessor for flat error enums.

mod error;

use proc_macro::TokenStream;

/// Implements `Display`, `Error` and `kind_name()` from `#[error("...")]` attributes.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
