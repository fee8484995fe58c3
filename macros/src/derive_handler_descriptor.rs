use heck::ToSnakeCase;
use quote::{quote, ToTokens};
use syn::{
    custom_keyword, parenthesized,
    parse::{Parse, ParseStream},
    punctuated::Punctuated,
    spanned::Spanned,
    DeriveInput, Generics, Ident, LitStr, Token,
};

const CATEGORIES: &[(&str, &str)] = &[
    ("event", "Event"),
    ("command", "Command"),
    ("intent", "Intent"),
];

const NODE_KINDS: &[(&str, &str)] = &[
    ("reducer", "Reducer"),
    ("orchestrator", "Orchestrator"),
    ("effect", "Effect"),
    ("compute", "Compute"),
];

pub struct DeriveHandlerDescriptor {
    attrs: DeriveHandlerAttrs,
    category: Ident,
    node_kind: Ident,
    ident: Ident,
    generics: Generics,
}

impl ToTokens for DeriveHandlerDescriptor {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        let Self {
            attrs,
            category,
            node_kind,
            ident,
            generics,
        } = self;
        let handler_id = match &attrs.id {
            Some(s) => s.value(),
            None => ident.to_string().to_snake_case(),
        };
        let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

        let message_types_expanded = if attrs.message_types.is_empty() {
            quote! {}
        } else {
            let message_types = &attrs.message_types;
            quote! {
                fn message_types(&self) -> ::switchyard::handler::MessageTypes {
                    ::switchyard::handler::MessageTypes::from([#( #message_types ),*])
                }
            }
        };

        tokens.extend(quote! {
            #[automatically_derived]
            impl #impl_generics ::switchyard::handler::HandlerDescriptor for #ident #ty_generics #where_clause {
                fn handler_id(&self) -> &str {
                    #handler_id
                }

                fn category(&self) -> ::switchyard::message::MessageCategory {
                    ::switchyard::message::MessageCategory::#category
                }

                fn node_kind(&self) -> ::switchyard::handler::NodeKind {
                    ::switchyard::handler::NodeKind::#node_kind
                }

                #message_types_expanded
            }
        });
    }
}

impl Parse for DeriveHandlerDescriptor {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let input: DeriveInput = input.parse()?;
        let ident = input.ident;
        let generics = input.generics;
        let mut attrs = None;
        for attr in input.attrs {
            if attr.path().is_ident("handler") {
                if attrs.is_some() {
                    return Err(syn::Error::new(
                        attr.span(),
                        "handler attribute already specified",
                    ));
                }
                attrs = Some(attr.parse_args_with(DeriveHandlerAttrs::parse)?);
            }
        }

        let attrs = attrs.ok_or_else(|| {
            syn::Error::new(
                ident.span(),
                "missing #[handler(category = ..., node_kind = ...)] attribute",
            )
        })?;
        let category = attrs.category.clone().ok_or_else(|| {
            syn::Error::new(ident.span(), "missing `category` in handler attribute")
        })?;
        let node_kind = attrs.node_kind.clone().ok_or_else(|| {
            syn::Error::new(ident.span(), "missing `node_kind` in handler attribute")
        })?;

        Ok(DeriveHandlerDescriptor {
            attrs,
            category,
            node_kind,
            ident,
            generics,
        })
    }
}

#[derive(Default)]
struct DeriveHandlerAttrs {
    id: Option<LitStr>,
    category: Option<Ident>,
    node_kind: Option<Ident>,
    message_types: Vec<LitStr>,
}

impl Parse for DeriveHandlerAttrs {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        enum Attr {
            Id(id, LitStr),
            Category(category, Ident),
            NodeKind(node_kind, Ident),
            MessageTypes(message_types, Vec<LitStr>),
        }
        let attrs: Punctuated<Attr, Token![,]> =
            Punctuated::parse_terminated_with(input, |input| {
                let lookahead = input.lookahead1();
                if lookahead.peek(id) {
                    let key: id = input.parse()?;
                    let _: Token![=] = input.parse()?;
                    let id: LitStr = input.parse()?;
                    if id.value().trim().is_empty() {
                        return Err(syn::Error::new(
                            id.span(),
                            "handler id must be a non-empty string",
                        ));
                    }
                    Ok(Attr::Id(key, id))
                } else if lookahead.peek(category) {
                    let key: category = input.parse()?;
                    let _: Token![=] = input.parse()?;
                    let variant = parse_variant(input, "category", CATEGORIES)?;
                    Ok(Attr::Category(key, variant))
                } else if lookahead.peek(node_kind) {
                    let key: node_kind = input.parse()?;
                    let _: Token![=] = input.parse()?;
                    let variant = parse_variant(input, "node kind", NODE_KINDS)?;
                    Ok(Attr::NodeKind(key, variant))
                } else if lookahead.peek(message_types) {
                    let key: message_types = input.parse()?;
                    let content;
                    parenthesized!(content in input);
                    let types: Punctuated<LitStr, Token![,]> =
                        Punctuated::parse_terminated(&content)?;
                    if let Some(blank) = types.iter().find(|ty| ty.value().trim().is_empty()) {
                        return Err(syn::Error::new(
                            blank.span(),
                            "message type names must be non-empty strings",
                        ));
                    }
                    Ok(Attr::MessageTypes(key, types.into_iter().collect()))
                } else {
                    Err(lookahead.error())
                }
            })?;

        let mut id = None;
        let mut category = None;
        let mut node_kind = None;
        let mut message_types = None;

        for attr in attrs {
            match attr {
                Attr::Id(key, s) => {
                    if id.is_none() {
                        id = Some(s);
                    } else {
                        return Err(syn::Error::new(key.span, "id already set"));
                    }
                }
                Attr::Category(key, variant) => {
                    if category.is_none() {
                        category = Some(variant);
                    } else {
                        return Err(syn::Error::new(key.span, "category already set"));
                    }
                }
                Attr::NodeKind(key, variant) => {
                    if node_kind.is_none() {
                        node_kind = Some(variant);
                    } else {
                        return Err(syn::Error::new(key.span, "node_kind already set"));
                    }
                }
                Attr::MessageTypes(key, types) => {
                    if message_types.is_none() {
                        message_types = Some(types);
                    } else {
                        return Err(syn::Error::new(key.span, "message_types already set"));
                    }
                }
            }
        }

        Ok(DeriveHandlerAttrs {
            id,
            category,
            node_kind,
            message_types: message_types.unwrap_or_default(),
        })
    }
}

/// Parses an identifier into the matching enum variant, case insensitively.
fn parse_variant(
    input: ParseStream<'_>,
    what: &str,
    variants: &[(&str, &str)],
) -> syn::Result<Ident> {
    let value: Ident = input.parse()?;
    let name = value.to_string().to_lowercase();
    variants
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, variant)| Ident::new(variant, value.span()))
        .ok_or_else(|| {
            let expected: Vec<_> = variants.iter().map(|(key, _)| *key).collect();
            syn::Error::new(
                value.span(),
                format!(
                    "unknown {what} `{value}`, expected one of: {}",
                    expected.join(", ")
                ),
            )
        })
}

custom_keyword!(id);
custom_keyword!(category);
custom_keyword!(node_kind);
custom_keyword!(message_types);
