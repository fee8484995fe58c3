mod derive_handler_descriptor;

use derive_handler_descriptor::DeriveHandlerDescriptor;
use proc_macro::TokenStream;
use quote::ToTokens;
use syn::parse_macro_input;

/// Derive macro implementing the `HandlerDescriptor` trait from a `#[handler(...)]` attribute.
///
/// Keys:
///  - `category` (required): one of `event`, `command`, `intent`.
///  - `node_kind` (required): one of `reducer`, `orchestrator`, `effect`, `compute`.
///  - `id`: the handler id. Defaults to the type's name in snake case.
///  - `message_types("A", "B", ...)`: the accepted message types. Defaults to accepting every type.
///
/// Category and node kind names are case insensitive.
///
/// # Example
///
/// ```ignore
/// use switchyard::HandlerDescriptor;
///
/// #[derive(HandlerDescriptor)]
/// #[handler(category = event, node_kind = reducer, message_types("UserCreated", "UserRenamed"))]
/// struct UserProjection;
///
/// assert_eq!(UserProjection.handler_id(), "user_projection");
/// ```
#[proc_macro_derive(HandlerDescriptor, attributes(handler))]
pub fn derive_handler_descriptor(input: TokenStream) -> TokenStream {
    let derive = parse_macro_input!(input as DeriveHandlerDescriptor);
    TokenStream::from(derive.into_token_stream())
}
