//! Proc macros for structured agent outputs.
//!
//! Provides `#[derive(OutputSchema)]`, which generates the JSON schema that
//! is handed to the model as a format hint for a structured reply.
//!
//! # Example
//!
//! ```ignore
//! /// The DM's judgement of how hard an action is
//! #[derive(OutputSchema, Deserialize)]
//! #[schema(name = "difficulty_assessment")]
//! struct DifficultyAssessment {
//!     /// Assessed difficulty level
//!     difficulty: Difficulty,
//!     /// Factors behind the assessment
//!     key_factors: Vec<String>,
//!     /// Whether to skip the roll
//!     #[schema(optional)]
//!     auto_resolve: bool,
//! }
//! ```
//!
//! Unit-only enums derive a string schema whose allowed values are the
//! snake_case variant names, matching `#[serde(rename_all = "snake_case")]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Field, Lit, Meta, Type};

/// Derive macro for structured output schemas.
///
/// # Attributes
///
/// - `#[schema(name = "...")]` - Override the schema name (defaults to snake_case type name)
/// - `#[schema(optional)]` on fields - Leave the field out of `required`
/// - `#[schema(rename = "...")]` on fields - Override the property name
#[proc_macro_derive(OutputSchema, attributes(schema))]
pub fn derive_output_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_output_schema(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_output_schema(input: DeriveInput) -> syn::Result<TokenStream2> {
    let type_name = &input.ident;
    let schema_name = get_schema_name(&input)?;
    let description = get_doc_comment(&input.attrs);

    let schema_body = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => struct_schema(named.named.iter())?,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "OutputSchema derive only supports structs with named fields",
                ))
            }
        },
        syn::Data::Enum(data) => {
            let mut values = Vec::new();
            for variant in &data.variants {
                if !matches!(variant.fields, syn::Fields::Unit) {
                    return Err(syn::Error::new_spanned(
                        variant,
                        "OutputSchema derive only supports enums with unit variants",
                    ));
                }
                values.push(to_snake_case(&variant.ident.to_string()));
            }
            quote! {
                serde_json::json!({
                    "type": "string",
                    "enum": [#(#values),*]
                })
            }
        }
        syn::Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                &input,
                "OutputSchema derive does not support unions",
            ))
        }
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #type_name #ty_generics #where_clause {
            /// Get the schema name.
            pub fn schema_name() -> &'static str {
                #schema_name
            }

            /// Get the schema description.
            pub fn schema_description() -> &'static str {
                #description
            }

            /// Generate the JSON schema for this type.
            pub fn json_schema() -> serde_json::Value {
                let mut schema = #schema_body;
                let description = Self::schema_description();
                if !description.is_empty() {
                    schema["description"] = serde_json::json!(description);
                }
                schema
            }
        }
    })
}

fn struct_schema<'a>(fields: impl Iterator<Item = &'a Field>) -> syn::Result<TokenStream2> {
    let mut property_tokens = Vec::new();
    let mut required_fields = Vec::new();

    for field in fields {
        let field_name_str = get_field_name(field)?;
        let field_desc = get_doc_comment(&field.attrs);
        let is_optional = is_field_optional(field)?;
        let field_type = &field.ty;

        let type_schema = type_to_schema(field_type)?;

        let desc_token = if field_desc.is_empty() {
            quote! {}
        } else {
            quote! { property["description"] = serde_json::json!(#field_desc); }
        };

        property_tokens.push(quote! {
            {
                let mut property = #type_schema;
                #desc_token
                properties.insert(#field_name_str.to_string(), property);
            }
        });

        if !is_optional && !is_option_type(field_type) {
            required_fields.push(field_name_str);
        }
    }

    Ok(quote! {
        {
            let mut properties = serde_json::Map::new();
            #(#property_tokens)*

            let required: Vec<&str> = vec![#(#required_fields),*];

            serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required
            })
        }
    })
}

fn get_schema_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if attr.path().is_ident("schema") {
            let meta = attr.parse_args::<Meta>()?;
            if let Meta::NameValue(nv) = meta {
                if nv.path.is_ident("name") {
                    if let syn::Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Ok(s.value());
                        }
                    }
                }
            }
        }
    }

    Ok(to_snake_case(&input.ident.to_string()))
}

fn get_field_name(field: &Field) -> syn::Result<String> {
    for attr in &field.attrs {
        if attr.path().is_ident("schema") {
            if let Ok(Meta::NameValue(nv)) = attr.parse_args::<Meta>() {
                if nv.path.is_ident("rename") {
                    if let syn::Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Ok(s.value());
                        }
                    }
                }
            }
        }
    }

    field
        .ident
        .as_ref()
        .map(|ident| ident.to_string())
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))
}

fn is_field_optional(field: &Field) -> syn::Result<bool> {
    for attr in &field.attrs {
        if attr.path().is_ident("schema") {
            if let Ok(Meta::Path(path)) = attr.parse_args::<Meta>() {
                if path.is_ident("optional") {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn get_doc_comment(attrs: &[syn::Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        docs.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

/// Generic arguments of the last path segment, e.g. `[K, V]` for `BTreeMap<K, V>`.
fn generic_types(segment: &syn::PathSegment) -> Vec<&Type> {
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .filter_map(|arg| match arg {
                syn::GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn type_to_schema(ty: &Type) -> syn::Result<TokenStream2> {
    let Type::Path(type_path) = ty else {
        return Ok(quote! { serde_json::json!({}) });
    };
    let Some(segment) = type_path.path.segments.last() else {
        return Ok(quote! { serde_json::json!({}) });
    };

    let args = generic_types(segment);

    Ok(match segment.ident.to_string().as_str() {
        "String" | "str" => quote! { serde_json::json!({"type": "string"}) },
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            quote! { serde_json::json!({"type": "integer"}) }
        }
        "f32" | "f64" => quote! { serde_json::json!({"type": "number"}) },
        "bool" => quote! { serde_json::json!({"type": "boolean"}) },
        "Value" => quote! { serde_json::json!({}) },
        "Option" | "Box" => match args.first() {
            Some(inner) => type_to_schema(inner)?,
            None => quote! { serde_json::json!({}) },
        },
        "Vec" => match args.first() {
            Some(inner) => {
                let inner_schema = type_to_schema(inner)?;
                quote! {
                    serde_json::json!({
                        "type": "array",
                        "items": #inner_schema
                    })
                }
            }
            None => quote! { serde_json::json!({"type": "array"}) },
        },
        "BTreeMap" | "HashMap" | "IndexMap" => match args.get(1) {
            Some(value) => {
                let value_schema = type_to_schema(value)?;
                quote! {
                    serde_json::json!({
                        "type": "object",
                        "additionalProperties": #value_schema
                    })
                }
            }
            None => quote! { serde_json::json!({"type": "object"}) },
        },
        // Any other named type is expected to derive OutputSchema itself.
        _ => quote! { <#ty>::json_schema() },
    })
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
