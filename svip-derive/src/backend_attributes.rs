use proc_macro::TokenStream;
use quote::quote;
use syn::{DataStruct, DeriveInput, Field, Fields, LitStr, Result};

#[derive(Default)]
struct FieldOptions {
    skip: bool,
    display: bool,
    rename: Option<String>,
}

fn field_options(field: &Field) -> Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("attribute") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                options.skip = true;
                Ok(())
            } else if meta.path.is_ident("display") {
                options.display = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let name: LitStr = meta.value()?.parse()?;
                if name.value().trim().is_empty() {
                    return Err(meta.error("attribute name cannot be empty"));
                }
                options.rename = Some(name.value());
                Ok(())
            } else {
                Err(meta.error("unsupported option, expected `skip`, `display` or `rename = \"...\"`"))
            }
        })?;
    }
    Ok(options)
}

pub(crate) fn generate_attributes_for_struct(ast: &DeriveInput, data: &DataStruct) -> Result<TokenStream> {
    let fields: Vec<&Field> = match &data.fields {
        Fields::Named(fields) => fields.named.iter().collect(),
        Fields::Unit => Vec::new(),
        Fields::Unnamed(_) => {
            return Err(syn::Error::new_spanned(
                ast,
                format!(
                    "Failed to derive BackendAttributes for struct '{}': only structs with named fields are supported",
                    ast.ident
                ),
            ))
        }
    };

    let mut pushes = Vec::with_capacity(fields.len());
    for field in fields {
        let options = field_options(field)?;
        if options.skip {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let name = options.rename.unwrap_or_else(|| ident.to_string());
        let rendered = if options.display {
            quote! { ::std::string::ToString::to_string(&self.#ident) }
        } else {
            quote! { ::std::format!("{:?}", self.#ident) }
        };
        pushes.push(quote! {
            attributes.push((::std::string::String::from(#name), #rendered));
        });
    }

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let gen = quote! {
        impl #impl_generics svip::backend::BackendAttributes for #name #ty_generics #where_clause {
            fn attributes(&self) -> ::std::vec::Vec<(::std::string::String, ::std::string::String)> {
                #[allow(unused_mut)]
                let mut attributes = ::std::vec::Vec::new();
                #(#pushes)*
                attributes
            }
        }
    };

    Ok(TokenStream::from(gen))
}
