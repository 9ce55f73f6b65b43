use crate::{func_expr, prelude::*};

struct Input {
    assignments: Punctuated<Assignment, Token![,]>,
}

impl Parse for Input {
    fn parse(input: ParseStream) -> Result<Self> {
        let assignments = Punctuated::parse_terminated(input)?;

        Ok(Self { assignments })
    }
}

struct Assignment {
    field: LitStr,
    value: Expr,
}

impl Parse for Assignment {
    fn parse(input: ParseStream) -> Result<Self> {
        let field = if input.peek(LitStr) {
            input.parse::<LitStr>()?
        } else {
            let ident = input.parse::<Ident>()?;
            LitStr::new(&ident.to_string(), ident.span())
        };
        input.parse::<Token![:]>()?;
        let value = input.parse()?;

        Ok(Self { field, value })
    }
}

pub fn func_set(input: TokenStream) -> Result<TokenStream> {
    let input = parse2::<Input>(input)?;

    build(&input)
}

fn build(input: &Input) -> Result<TokenStream> {
    let krate = krate();

    let assignments = input
        .assignments
        .iter()
        .map(|assignment| {
            let field = &assignment.field;
            let value = func_expr::build(&assignment.value)?;

            Ok(quote! { .set(#field, #value) })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(quote! {
        #krate::update::SetStage::new() #( #assignments )*
    })
}
