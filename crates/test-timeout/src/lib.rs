//! Test attributes with a hard wall-clock bound.
//!
//! `#[tokio_timeout_test]`, `#[tokio_timeout_test(10)]` and
//! `#[tokio_timeout_test(10, paused)]` run an async test on a current-thread
//! runtime; `paused` starts the tokio clock paused so timer-driven protocol
//! code runs deterministically. `#[timeout(5)]` bounds a synchronous test.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Ident, ItemFn, LitInt, Token};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

enum TimeoutArg {
    Secs(LitInt),
    Flag(Ident),
}

impl Parse for TimeoutArg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitInt) {
            input.parse().map(TimeoutArg::Secs)
        } else {
            input.parse().map(TimeoutArg::Flag)
        }
    }
}

struct TimeoutArgs {
    secs: u64,
    paused: bool,
}

impl Parse for TimeoutArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = TimeoutArgs {
            secs: DEFAULT_TIMEOUT_SECS,
            paused: false,
        };
        for arg in Punctuated::<TimeoutArg, Token![,]>::parse_terminated(input)? {
            match arg {
                TimeoutArg::Secs(lit) => {
                    args.secs = lit.base10_parse()?;
                    if args.secs == 0 {
                        return Err(syn::Error::new_spanned(lit, "timeout must be greater than zero"));
                    }
                }
                TimeoutArg::Flag(flag) if flag == "paused" => args.paused = true,
                TimeoutArg::Flag(flag) => {
                    return Err(syn::Error::new_spanned(flag, "expected a timeout in seconds or `paused`"));
                }
            }
        }
        Ok(args)
    }
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let TimeoutArgs { secs, paused } = parse_macro_input!(attr as TimeoutArgs);
    let mut test = parse_macro_input!(item as ItemFn);
    if test.sig.asyncness.take().is_none() {
        return reject(&test.sig.ident, "tokio_timeout_test can only be applied to async functions");
    }
    let start_paused = paused.then(|| quote! { .start_paused(true) });
    let block = &test.block;
    let body = quote! {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            #start_paused
            .build()
            .expect("failed to build Tokio runtime");
        runtime.block_on(async {
            tokio::time::timeout(limit, async move #block)
                .await
                .expect("test timed out");
        });
    };
    bounded_test(test, secs, body, |path| path_is(path, &["tokio", "test"]))
}

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let TimeoutArgs { secs, paused } = parse_macro_input!(attr as TimeoutArgs);
    let test = parse_macro_input!(item as ItemFn);
    if paused {
        return reject(&test.sig.ident, "`paused` needs an async test; use tokio_timeout_test");
    }
    if test.sig.asyncness.is_some() {
        return reject(&test.sig.ident, "timeout attribute expects a synchronous test function");
    }
    let block = &test.block;
    let body = quote! { #block };
    bounded_test(test, secs, body, |path| path_is(path, &["test"]))
}

fn reject(ident: &Ident, message: &str) -> TokenStream {
    syn::Error::new_spanned(ident, message).to_compile_error().into()
}

fn path_is(path: &syn::Path, expected: &[&str]) -> bool {
    path.segments.len() == expected.len()
        && path
            .segments
            .iter()
            .zip(expected)
            .all(|(segment, name)| segment.ident == name)
}

/// Wraps `body` in a `#[test]` that runs it on its own thread and fails the
/// test when no result arrives within `secs`. `limit` is in scope for `body`.
fn bounded_test(
    test: ItemFn,
    secs: u64,
    body: TokenStream2,
    replaced: impl Fn(&syn::Path) -> bool,
) -> TokenStream {
    let ItemFn { attrs, vis, sig, .. } = test;
    let attrs = attrs.into_iter().filter(|attr| !replaced(attr.path()));
    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let limit = std::time::Duration::from_secs(#secs);
            let (report, outcome) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = report.send(std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    #body
                })));
            });
            match outcome.recv_timeout(limit) {
                Ok(Ok(())) => {}
                Ok(Err(panic)) => std::panic::resume_unwind(panic),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test exceeded {} s", #secs)
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread exited without a result")
                }
            }
        }
    })
}
