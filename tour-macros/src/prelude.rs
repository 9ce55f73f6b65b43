pub(crate) use crate::utils::{extract, krate};
pub use proc_macro2::{Span, TokenStream};
pub use quote::quote;
pub use syn::{
    BinOp, Block, Error, Expr, Ident, LitStr, Result, Stmt, Token, UnOp,
    parse::{Parse, ParseStream},
    parse2,
    punctuated::Punctuated,
};
