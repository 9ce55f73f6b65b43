#[warn(clippy::pedantic)]
mod func_expr;
mod func_set;
mod prelude;
mod utils;

fn expand<F: FnOnce(proc_macro2::TokenStream) -> syn::Result<proc_macro2::TokenStream>>(
    fun: F,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    fun(input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Builds a `tour::update::Expr` from Rust syntax.
///
/// Identifiers (and dotted paths) name document fields, literals are values,
/// `val(x)` embeds a Rust value, `>= > <= < == !=` compare, `+ -` compute, and
/// `if c { a } else { b }` becomes `$cond`.
#[proc_macro]
pub fn expr(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    expand(func_expr::func_expr, input)
}

/// Builds a `tour::update::SetStage` from `field: expression` pairs.
#[proc_macro]
pub fn set(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    expand(func_set::func_set, input)
}
