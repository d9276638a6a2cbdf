use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Error, Fields, Ident, LitStr, Result};

#[derive(Default)]
struct ModelAttrs {
    path_id: Option<LitStr>,
    path: Option<LitStr>,
}

struct RelationAttrs {
    name: LitStr,
    kind: TokenStream,
    target: LitStr,
    key: LitStr,
}

#[derive(Default)]
struct FieldAttrs {
    id: bool,
    alias: Option<LitStr>,
    required: bool,
    text_index: bool,
    path_param: Option<LitStr>,
}

fn model_attrs(attrs: &[Attribute]) -> Result<ModelAttrs> {
    let mut parsed = ModelAttrs::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("path_id") {
                parsed.path_id = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("path") {
                parsed.path = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("expected `path_id` or `path`"));
            }
            Ok(())
        })?;
    }

    Ok(parsed)
}

fn relation_kind(kind: &LitStr) -> Result<TokenStream> {
    Ok(match kind.value().as_str() {
        "belongs_to" => quote!(::docorm::model::RelationKind::BelongsTo),
        "has_one" => quote!(::docorm::model::RelationKind::HasOne),
        "has_many" => quote!(::docorm::model::RelationKind::HasMany),
        "belongs_to_many" => quote!(::docorm::model::RelationKind::BelongsToMany),
        _ => {
            return Err(Error::new_spanned(
                kind,
                "relation kind must be one of `belongs_to`, `has_one`, `has_many`, `belongs_to_many`",
            ));
        }
    })
}

fn relation_attrs(attrs: &[Attribute]) -> Result<Vec<RelationAttrs>> {
    let mut relations = Vec::new();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("relation")) {
        let (mut name, mut kind, mut target, mut key) = (None, None, None, None);
        attr.parse_nested_meta(|meta| {
            let value: LitStr = meta.value()?.parse()?;
            if meta.path.is_ident("name") {
                name = Some(value);
            } else if meta.path.is_ident("kind") {
                kind = Some(relation_kind(&value)?);
            } else if meta.path.is_ident("target") {
                target = Some(value);
            } else if meta.path.is_ident("key") {
                key = Some(value);
            } else {
                return Err(meta.error("expected `name`, `kind`, `target` or `key`"));
            }
            Ok(())
        })?;

        match (name, kind, target, key) {
            (Some(name), Some(kind), Some(target), Some(key)) => {
                relations.push(RelationAttrs { name, kind, target, key })
            }
            _ => {
                return Err(Error::new_spanned(
                    attr,
                    "relation needs `name`, `kind`, `target` and `key`",
                ));
            }
        }
    }

    Ok(relations)
}

fn field_attrs(attrs: &[Attribute], ident: &Ident) -> Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                parsed.id = true;
            } else if meta.path.is_ident("alias") {
                parsed.alias = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("required") {
                parsed.required = true;
            } else if meta.path.is_ident("text_index") {
                parsed.text_index = true;
            } else if meta.path.is_ident("path_param") {
                parsed.path_param = Some(if meta.input.peek(syn::Token![=]) {
                    meta.value()?.parse()?
                } else {
                    LitStr::new(&ident.to_string(), ident.span())
                });
            } else {
                return Err(meta.error(
                    "expected `id`, `alias`, `required`, `text_index` or `path_param`",
                ));
            }
            Ok(())
        })?;
    }

    Ok(parsed)
}

/// Rejects unbalanced or empty `{}` placeholders early so that the
/// descriptor built at runtime cannot fail on the template.
fn check_template(path: &LitStr) -> Result<()> {
    let raw = path.value();
    if raw.is_empty() || raw.starts_with('/') || raw.ends_with('/') {
        return Err(Error::new_spanned(path, "path must be a relative collection path"));
    }
    let segments: Vec<&str> = raw.split('/').collect();
    if segments.len() % 2 == 0 || segments.last().is_some_and(|last| last.starts_with('{')) {
        return Err(Error::new_spanned(path, "path must end with a collection name"));
    }
    for segment in segments {
        let opens = segment.starts_with('{');
        let closes = segment.ends_with('}');
        if segment.is_empty()
            || opens != closes
            || (opens && segment.len() < 3)
            || segment[usize::from(opens)..segment.len() - usize::from(closes)].contains(['{', '}'])
        {
            return Err(Error::new_spanned(path, format!("invalid path segment `{segment}`")));
        }
    }
    Ok(())
}

pub fn derive_model(input: TokenStream) -> TokenStream {
    match expand(input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error(),
    }
}

fn expand(input: TokenStream) -> Result<TokenStream> {
    let input: DeriveInput = syn::parse2(input)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            other => {
                return Err(Error::new_spanned(other, "Model can only be derived for structs with named fields"));
            }
        },
        _ => return Err(Error::new_spanned(ident, "Model can only be derived for structs with named fields")),
    };

    let model = model_attrs(&input.attrs)?;
    let path_id = model
        .path_id
        .ok_or_else(|| Error::new_spanned(ident, "missing #[model(path_id = \"...\")]"))?;
    let path = model
        .path
        .ok_or_else(|| Error::new_spanned(ident, "missing #[model(path = \"...\")]"))?;
    check_template(&path)?;

    let mut id_field: Option<&Ident> = None;
    let mut descriptors = Vec::new();
    let mut params = Vec::new();

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = field_attrs(&field.attrs, field_ident)?;
        let name = field_ident.to_string();
        let name = name.strip_prefix("r#").unwrap_or(&name).to_string();

        if attrs.id {
            if id_field.replace(field_ident).is_some() {
                return Err(Error::new_spanned(field_ident, "only one field may be #[model(id)]"));
            }
            continue;
        }

        let mut descriptor = quote!(::docorm::model::FieldDescriptor::new(#name));
        if let Some(alias) = &attrs.alias {
            descriptor = quote!(#descriptor.alias(#alias));
        }
        if attrs.required {
            descriptor = quote!(#descriptor.required());
        }
        if attrs.text_index {
            descriptor = quote!(#descriptor.text_indexed());
        }
        descriptors.push(quote!(.field(#descriptor)));

        if let Some(param) = &attrs.path_param {
            params.push(quote!(params.insert(#param, &self.#field_ident);));
        }
    }

    let relations = relation_attrs(&input.attrs)?.into_iter().map(|relation| {
        let RelationAttrs { name, kind, target, key } = relation;
        quote!(.relation(::docorm::model::Relation::new(#name, #kind, #target, #key)))
    });

    let id_builder = id_field.map(|field| {
        let name = field.to_string();
        quote!(.id_field(#name))
    });
    let (id_get, id_set) = match id_field {
        Some(field) => (quote!(self.#field.as_deref()), quote!(self.#field = Some(id);)),
        None => (quote!(None), quote!(let _ = id;)),
    };

    let path_params = if params.is_empty() {
        quote!()
    } else {
        quote! {
            fn path_params(&self) -> ::docorm::path::PathParams {
                let mut params = ::docorm::path::PathParams::new();
                #(#params)*
                params
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::docorm::model::Model for #ident #ty_generics #where_clause {
            fn descriptor() -> &'static ::docorm::model::ModelDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<::docorm::model::ModelDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    match ::docorm::model::ModelDescriptor::builder(#path_id, #path)
                        #id_builder
                        #(#descriptors)*
                        #(#relations)*
                        .build()
                    {
                        Ok(descriptor) => descriptor,
                        Err(error) => panic!("invalid model {}: {error}", #path_id),
                    }
                })
            }

            fn id(&self) -> Option<&str> {
                #id_get
            }

            fn set_id(&mut self, id: String) {
                #id_set
            }

            #path_params
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_descriptor_and_path_params() {
        let tokens = expand(quote! {
            #[model(path_id = "members", path = "orgs/{org_id}/members")]
            #[relation(name = "org", kind = "belongs_to", target = "orgs", key = "org_id")]
            struct Member {
                #[model(id)]
                id: Option<String>,
                #[model(path_param)]
                org_id: String,
                #[model(alias = "full_name", required, text_index)]
                name: String,
            }
        })
        .unwrap()
        .to_string();

        assert!(tokens.contains("id_field (\"id\")"));
        assert!(tokens.contains("alias (\"full_name\") . required () . text_indexed ()"));
        assert!(tokens.contains("RelationKind :: BelongsTo"));
        assert!(tokens.contains("params . insert (\"org_id\" , & self . org_id)"));
    }

    #[test]
    fn rejects_unknown_relation_kind() {
        let result = expand(quote! {
            #[model(path_id = "a", path = "as")]
            #[relation(name = "b", kind = "owns", target = "bs", key = "b_id")]
            struct A {}
        });
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_template() {
        for path in ["users/{id", "/users", "users//x", "users/{}/x", "users/u1", "orgs/{org}"] {
            let literal = LitStr::new(path, proc_macro2::Span::call_site());
            assert!(check_template(&literal).is_err(), "{path}");
        }
        assert!(check_template(&LitStr::new("orgs/{org}/members", proc_macro2::Span::call_site())).is_ok());
    }
}
