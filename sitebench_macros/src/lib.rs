use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, LitStr, Path, parse_macro_input};

extern crate proc_macro;

/// Turns a struct holding a `client: RequestClient` field into a page variant.
///
/// The attribute argument is the page's canonical route, e.g.
/// `#[page(Route::Home)]`. The struct gets `Debug` and `Clone`, a `new(client)`
/// constructor and a `PageInfo` impl whose name is the struct name without its
/// `Page` suffix. `PageInfo`, `Route` and `RequestClient` must be in scope.
#[proc_macro_attribute]
pub fn page(attr: TokenStream, item: TokenStream) -> TokenStream {
    let route = parse_macro_input!(attr as Path);
    let ast = parse_macro_input!(item as ItemStruct);
    let ident = &ast.ident;

    let full_name = ident.to_string();
    let short_name = full_name.strip_suffix("Page").unwrap_or(&full_name);
    let name = LitStr::new(short_name, ident.span());

    let expanded = quote! {
        #[derive(std::fmt::Debug, std::clone::Clone)]
        #ast

        impl #ident {
            pub fn new(client: RequestClient) -> Self {
                Self { client }
            }
        }

        impl PageInfo for #ident {
            fn name(&self) -> &'static str {
                #name
            }

            fn route(&self) -> Route {
                #route
            }

            fn client(&self) -> &RequestClient {
                &self.client
            }
        }
    };

    TokenStream::from(expanded)
}
