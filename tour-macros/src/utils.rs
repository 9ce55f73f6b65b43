use crate::prelude::*;
use proc_macro_crate::{FoundCrate, crate_name};

macro_rules! extract {
    ($val:expr, $pat:pat, $error_message: expr) => {
        let $pat = $val else {
            return Err(Error::new_spanned($val, $error_message));
        };
    };
}

pub(crate) use extract;

/// Path to the `tour` crate. The crate itself declares `extern crate self as tour`,
/// so `::tour` resolves from inside it as well.
pub fn krate() -> TokenStream {
    match crate_name("tour") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote! { ::#ident }
        }
        Ok(FoundCrate::Itself) | Err(_) => quote! { ::tour },
    }
}
