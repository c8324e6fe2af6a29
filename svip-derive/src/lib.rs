#![recursion_limit = "128"]
//! # SVIP Derive Macros
//!
//! This crate provides procedural macros for deriving SVIP traits automatically.
//!
//! ## Macros
//!
//! ### `BackendAttributes`
//!
//! Derives `svip::backend::BackendAttributes` for a backend or its configuration,
//! so that `AppStateBackend::info()` lists every declared field without hand
//! written code.
//!
//! - **Supported for**: Structs with named fields and unit structs
//! - **Field attribute**: `#[attribute(skip)]`, `#[attribute(rename = "...")]`,
//!   `#[attribute(display)]`
//!
//! # Examples
//!
//! ```rust,ignore
//! use svip_derive::BackendAttributes;
//!
//! #[derive(BackendAttributes)]
//! pub struct SqliteConfig {
//!     #[attribute(display)]
//!     path: String,
//!     #[attribute(rename = "journal")]
//!     journal_mode: JournalMode,
//!     #[attribute(skip)]
//!     password: String,
//! }
//! ```
//!
//! Fields are rendered with their `Debug` implementation, or with `Display` when
//! marked `#[attribute(display)]`.

extern crate proc_macro;
mod backend_attributes;

use crate::backend_attributes::generate_attributes_for_struct;
use proc_macro::TokenStream;
use syn::{Data, DeriveInput};

/// Derives the `BackendAttributes` trait for backend introspection.
///
/// # Attributes
///
/// - `#[attribute(skip)]` - Leaves the field out, e.g. for credentials
/// - `#[attribute(rename = "name")]` - Lists the field under another name
/// - `#[attribute(display)]` - Renders the field with `Display` instead of `Debug`
///
/// # Errors
///
/// Returns a compile error if:
/// - Applied to an enum, a union or a tuple struct
/// - A field carries an unknown `attribute` option
#[proc_macro_derive(BackendAttributes, attributes(attribute))]
pub fn derive_backend_attributes(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);

    match ast.data {
        Data::Struct(ref data) => match generate_attributes_for_struct(&ast, data) {
            Ok(token_stream) => token_stream,
            Err(e) => e.to_compile_error().into(),
        },
        Data::Enum(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive BackendAttributes for enums. Only structs are supported.",
            );
            error.to_compile_error().into()
        }
        Data::Union(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive BackendAttributes for unions. Only structs are supported.",
            );
            error.to_compile_error().into()
        }
    }
}
