use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr, Visibility};

/// Derive macro for struct mapping targets.
///
/// Generates `luamap::Target` and `luamap::StructTarget` for a struct with
/// named fields.
///
/// - `pub` fields are settable: looked up in the source table and written
/// - other fields are left alone and start from `Default::default()`
/// - `#[lua(skip)]` makes a `pub` field non-settable
/// - `#[lua(<tag> = "alias")]` records a tag; `Mapper::with_tag_name("<tag>")`
///   looks the field up as `alias`
///
/// The struct must implement `Clone`.
///
/// # Example
///
/// ```ignore
/// #[derive(Clone, Target)]
/// pub struct Person {
///     #[lua(json = "name")]
///     pub name: String,
///
///     #[lua(json = "age")]
///     pub age: i32,
///
///     cache: Vec<u8>,
/// }
/// ```
#[proc_macro_derive(Target, attributes(lua))]
pub fn derive_target(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

struct FieldSpec {
    ident: syn::Ident,
    ty: syn::Type,
    tags: Vec<(String, String)>,
    settable: bool,
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream2, syn::Error> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Target cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Target only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Target only supports structs",
            ))
        }
    };

    let mut specs = Vec::with_capacity(fields.len());
    for field in fields {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;

        let mut tags = Vec::new();
        let mut skip = false;
        for attr in &field.attrs {
            if !attr.path().is_ident("lua") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    return Ok(());
                }
                let key = meta
                    .path
                    .get_ident()
                    .ok_or_else(|| meta.error("expected a tag name"))?
                    .to_string();
                let value: LitStr = meta.value()?.parse()?;
                tags.push((key, value.value()));
                Ok(())
            })?;
        }

        specs.push(FieldSpec {
            ident,
            ty: field.ty.clone(),
            tags,
            settable: matches!(field.vis, Visibility::Public(_)) && !skip,
        });
    }

    let zero_fields = specs.iter().map(|f| {
        let ident = &f.ident;
        let ty = &f.ty;
        if f.settable {
            quote! { #ident: <#ty as ::luamap::Target>::zero() }
        } else {
            quote! { #ident: ::core::default::Default::default() }
        }
    });

    let reset_fields = specs.iter().filter(|f| f.settable).map(|f| {
        let ident = &f.ident;
        let ty = &f.ty;
        quote! { self.#ident = <#ty as ::luamap::Target>::zero(); }
    });

    let descriptors = specs.iter().map(|f| {
        let name_str = f.ident.to_string();
        let ty = &f.ty;
        let ty_str = quote!(#ty).to_string().replace(' ', "");
        let keys = f.tags.iter().map(|(k, _)| k);
        let values = f.tags.iter().map(|(_, v)| v);
        let settable = f.settable;
        quote! {
            ::luamap::FieldDesc {
                name: #name_str,
                ty: #ty_str,
                tags: &[#((#keys, #values)),*],
                settable: #settable,
            }
        }
    });

    let field_arms = specs.iter().enumerate().filter(|(_, f)| f.settable).map(|(i, f)| {
        let ident = &f.ident;
        quote! {
            #i => ::core::option::Option::Some(&mut self.#ident as &mut dyn ::luamap::ErasedTarget)
        }
    });

    let name_str = name.to_string();

    Ok(quote! {
        impl ::luamap::Target for #name {
            fn type_desc() -> ::luamap::TypeDesc {
                ::luamap::TypeDesc::Struct(#name_str)
            }

            fn zero() -> Self {
                Self {
                    #(#zero_fields,)*
                }
            }

            fn slot(&mut self) -> ::luamap::Slot<'_> {
                ::luamap::Slot::Struct(self)
            }

            fn set_zero(&mut self) {
                #(#reset_fields)*
            }
        }

        impl ::luamap::StructTarget for #name {
            fn fields(&self) -> &'static [::luamap::FieldDesc] {
                const FIELDS: &[::luamap::FieldDesc] = &[#(#descriptors),*];
                FIELDS
            }

            fn field_mut(
                &mut self,
                index: usize,
            ) -> ::core::option::Option<&mut dyn ::luamap::ErasedTarget> {
                match index {
                    #(#field_arms,)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    })
}
