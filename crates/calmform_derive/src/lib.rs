use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derives `calmform::form::FormSchema` for a struct whose members are all
/// `Field<V, R>`.
///
/// Generates `<Name>Keys` with one `const fn` per member returning its
/// `TypedKey`; the member name is the field key.
#[proc_macro_derive(FormSchema)]
pub fn derive_form_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormSchema derive supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let schema_ident = input.ident;
    let vis = input.vis;
    let keys_ident = format_ident!("{schema_ident}Keys");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormSchema derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormSchema derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let calmform = calmform_path();
    let mut key_methods = Vec::new();
    let mut inserts = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;
        let key_name = field_ident.to_string();

        key_methods.push(quote! {
            pub const fn #field_ident(self) -> #calmform::form::TypedKey<
                <#field_ty as #calmform::form::FieldSpec>::Value,
                <#field_ty as #calmform::form::FieldSpec>::Validated,
            > {
                #calmform::form::TypedKey::new(#key_name)
            }
        });

        inserts.push(quote! {
            fields.insert(#keys_ident.#field_ident(), self.#field_ident);
        });
    }

    quote! {
        #[derive(Clone, Copy, Debug, Default)]
        #vis struct #keys_ident;

        impl #keys_ident {
            #(#key_methods)*
        }

        impl #calmform::form::FormSchema for #schema_ident {
            type Keys = #keys_ident;

            fn keys() -> Self::Keys {
                #keys_ident
            }

            fn into_fields(self) -> #calmform::form::FormFields {
                let mut fields = #calmform::form::FormFields::new();
                #(#inserts)*
                fields
            }
        }
    }
    .into()
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
