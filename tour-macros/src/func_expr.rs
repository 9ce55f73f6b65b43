use crate::prelude::*;

pub fn func_expr(input: TokenStream) -> Result<TokenStream> {
    let input = parse2::<Expr>(input)?;

    build(&input)
}

pub fn build(input: &Expr) -> Result<TokenStream> {
    let krate = krate();

    let output = match input {
        Expr::Path(_) | Expr::Field(_) => {
            let path = field_path(input)?;
            quote! { #krate::update::Expr::field(#path) }
        }
        Expr::Lit(lit) => {
            quote! { #krate::update::Expr::value(#lit) }
        }
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => {
            extract!(unary.expr.as_ref(), Expr::Lit(_), "only literals can be negated");
            quote! { #krate::update::Expr::value(#unary) }
        }
        Expr::Call(call) => {
            let is_val = matches!(
                call.func.as_ref(),
                Expr::Path(path) if path.path.is_ident("val")
            );

            if !is_val || call.args.len() != 1 {
                return Err(Error::new_spanned(
                    call,
                    "only `val(..)` calls are supported, to embed a Rust value",
                ));
            }

            let value = &call.args[0];
            quote! { <#krate::update::Expr as ::std::convert::From<_>>::from(#value) }
        }
        Expr::Binary(binary) => {
            let method = match binary.op {
                BinOp::Ge(_) => "gte",
                BinOp::Gt(_) => "gt",
                BinOp::Le(_) => "lte",
                BinOp::Lt(_) => "lt",
                BinOp::Eq(_) => "eq",
                BinOp::Ne(_) => "ne",
                BinOp::Add(_) => "add",
                BinOp::Sub(_) => "sub",
                _ => {
                    return Err(Error::new_spanned(
                        &binary.op,
                        "unsupported operator, expected one of >= > <= < == != + -",
                    ));
                }
            };
            let method = Ident::new(method, Span::call_site());
            let lhs = build(&binary.left)?;
            let rhs = build(&binary.right)?;

            quote! { #lhs.#method(#rhs) }
        }
        Expr::Paren(paren) => build(&paren.expr)?,
        Expr::Group(group) => build(&group.expr)?,
        Expr::Block(block) => build_block(&block.block)?,
        Expr::If(expr_if) => {
            let Some((_, otherwise)) = &expr_if.else_branch else {
                return Err(Error::new_spanned(
                    expr_if,
                    "`if` needs an `else` branch to become `$cond`",
                ));
            };

            let condition = build(&expr_if.cond)?;
            let then = build_block(&expr_if.then_branch)?;
            let otherwise = build(otherwise)?;

            quote! { #krate::update::Expr::cond(#condition, #then, #otherwise) }
        }
        other => return Err(Error::new_spanned(other, "unsupported expression")),
    };

    Ok(output)
}

fn build_block(block: &Block) -> Result<TokenStream> {
    if block.stmts.len() != 1 {
        return Err(Error::new_spanned(
            block,
            "expected a block with a single expression",
        ));
    }

    extract!(
        &block.stmts[0],
        Stmt::Expr(expr, None),
        "expected an expression without a trailing semicolon"
    );

    build(expr)
}

fn field_path(input: &Expr) -> Result<LitStr> {
    fn segments(input: &Expr, out: &mut Vec<String>) -> Result<()> {
        match input {
            Expr::Path(path) => {
                let Some(ident) = path.path.get_ident() else {
                    return Err(Error::new_spanned(path, "expected a field name"));
                };
                out.push(ident.to_string());
            }
            Expr::Field(field) => {
                segments(&field.base, out)?;
                match &field.member {
                    syn::Member::Named(ident) => out.push(ident.to_string()),
                    syn::Member::Unnamed(index) => out.push(index.index.to_string()),
                }
            }
            other => return Err(Error::new_spanned(other, "expected a field path")),
        }

        Ok(())
    }

    let mut out = vec![];
    segments(input, &mut out)?;

    Ok(LitStr::new(&out.join("."), Span::call_site()))
}
