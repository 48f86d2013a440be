//! `#[tokio_timeout_test]`: an async test on its own current-thread runtime
//! that fails when it runs past a deadline.
//!
//! ```ignore
//! #[test_timeout::tokio_timeout_test]
//! async fn defaults_to_sixty_seconds() {}
//!
//! #[test_timeout::tokio_timeout_test(secs = 5, start_paused)]
//! async fn paused_clock() {}
//! ```

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Attribute, Error, Ident, ItemFn, LitInt, Token, parse_macro_input};

const DEFAULT_SECS: u64 = 60;

struct Options {
    secs: u64,
    start_paused: bool,
}

enum Setting {
    Secs(LitInt),
    StartPaused,
}

impl Parse for Setting {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitInt) {
            return Ok(Setting::Secs(input.parse()?));
        }
        let key: Ident = input.parse()?;
        match key.to_string().as_str() {
            "secs" => {
                input.parse::<Token![=]>()?;
                Ok(Setting::Secs(input.parse()?))
            }
            "start_paused" => Ok(Setting::StartPaused),
            other => Err(Error::new(
                key.span(),
                format!("unknown option `{other}`, expected `secs = N` or `start_paused`"),
            )),
        }
    }
}

impl Parse for Options {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut options = Options {
            secs: DEFAULT_SECS,
            start_paused: false,
        };
        for setting in Punctuated::<Setting, Token![,]>::parse_terminated(input)? {
            match setting {
                Setting::Secs(lit) => {
                    let secs: u64 = lit.base10_parse()?;
                    if secs == 0 {
                        return Err(Error::new(lit.span(), "timeout must be greater than zero"));
                    }
                    options.secs = secs;
                }
                Setting::StartPaused => options.start_paused = true,
            }
        }
        Ok(options)
    }
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let Options { secs, start_paused } = parse_macro_input!(attr as Options);
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.take().is_none() {
        return Error::new_spanned(&sig.ident, "tokio_timeout_test expects an async fn")
            .to_compile_error()
            .into();
    }
    if !sig.inputs.is_empty() {
        return Error::new(Span::call_site(), "test functions take no arguments")
            .to_compile_error()
            .into();
    }

    let attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_test_marker(attr))
        .collect();
    let name = sig.ident.to_string();

    quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let limit = ::std::time::Duration::from_secs(#secs);
            let (done_tx, done_rx) = ::std::sync::mpsc::channel();
            ::std::thread::Builder::new()
                .name(::std::format!("{}-runtime", #name))
                .spawn(move || {
                    let outcome = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                        let runtime = ::tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .start_paused(#start_paused)
                            .build()
                            .expect("failed to build test runtime");
                        runtime.block_on(async move #block)
                    }));
                    let _ = done_tx.send(outcome);
                })
                .expect("failed to spawn test thread");
            match done_rx.recv_timeout(limit) {
                Ok(Ok(value)) => value,
                Ok(Err(payload)) => ::std::panic::resume_unwind(payload),
                Err(::std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("{} timed out after {}s", #name, #secs)
                }
                Err(::std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("{} runtime thread exited without a result", #name)
                }
            }
        }
    }
    .into()
}

/// `#[test]` and `#[tokio::test]` would register the function twice.
fn is_test_marker(attr: &Attribute) -> bool {
    let path: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect();
    matches!(
        path.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["test"] | ["tokio", "test"]
    )
}
