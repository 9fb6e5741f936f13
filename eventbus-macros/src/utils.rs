use quote::ToTokens;
use std::collections::HashSet;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Attribute, Expr, Ident, LitStr, Result, Token, Type};

/// 属性参数：`flag` 或 `key = value`
pub(crate) enum AttrArg {
    Flag(Ident),
    Value(Ident, Expr),
}

impl AttrArg {
    pub(crate) fn key(&self) -> &Ident {
        match self {
            AttrArg::Flag(k) | AttrArg::Value(k, _) => k,
        }
    }
}

impl Parse for AttrArg {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;
        if input.peek(Token![=]) {
            input.parse::<Token![=]>()?;
            Ok(AttrArg::Value(key, input.parse()?))
        } else {
            Ok(AttrArg::Flag(key))
        }
    }
}

// 解析逗号分隔的参数列表，拒绝重复键
pub(crate) fn parse_args(input: ParseStream) -> Result<Vec<AttrArg>> {
    let args = Punctuated::<AttrArg, Token![,]>::parse_terminated(input)?;
    let mut seen = HashSet::new();
    for arg in args.iter() {
        if !seen.insert(arg.key().to_string()) {
            return Err(syn::Error::new(
                arg.key().span(),
                format!("duplicate key '{}' in attribute", arg.key()),
            ));
        }
    }
    Ok(args.into_iter().collect())
}

pub(crate) fn expect_flag(arg: AttrArg) -> Result<()> {
    match arg {
        AttrArg::Flag(_) => Ok(()),
        AttrArg::Value(key, value) => Err(syn::Error::new(
            value.span(),
            format!("'{key}' takes no value"),
        )),
    }
}

pub(crate) fn expect_value(arg: AttrArg) -> Result<Expr> {
    match arg {
        AttrArg::Value(_, value) => Ok(value),
        AttrArg::Flag(key) => Err(syn::Error::new(
            key.span(),
            format!("'{key}' requires a value, e.g. {key} = ..."),
        )),
    }
}

pub(crate) fn expect_lit_str(arg: AttrArg) -> Result<LitStr> {
    let key = arg.key().clone();
    match expect_value(arg)? {
        Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) => Ok(lit),
        other => Err(syn::Error::new(
            other.span(),
            format!("expected string literal for '{key}'"),
        )),
    }
}

pub(crate) fn expect_type(arg: AttrArg) -> Result<Type> {
    let value = expect_value(arg)?;
    syn::parse2(value.to_token_stream())
}

// 提取非 derive 属性与已有 derive 列表
fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<syn::Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();
    for attr in attrs.iter() {
        if attr.path().is_ident("derive") {
            if let Ok(list) =
                attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
            {
                existing.extend(list);
            }
        } else {
            retained.push(attr.clone());
        }
    }
    (retained, existing)
}

// 按末段名去重，`Debug` 与 `std::fmt::Debug` 视为同一派生
fn derive_key(p: &syn::Path) -> String {
    p.segments
        .last()
        .map(|s| s.ident.to_string())
        .unwrap_or_else(|| p.to_token_stream().to_string())
}

/// 合并默认派生与已有派生（去重，required 在前）
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let (retained, existing) = split_derives(attrs);
    let mut seen = HashSet::new();
    let merged: Vec<syn::Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();
    let derive: Attribute = syn::parse_quote!(#[derive(#(#merged),*)]);
    *attrs = std::iter::once(derive).chain(retained).collect();
}

/// 取出名为 `name` 的属性，其余保留
pub(crate) fn take_attrs(attrs: &mut Vec<Attribute>, name: &str) -> Vec<Attribute> {
    let (taken, retained): (Vec<_>, Vec<_>) =
        attrs.drain(..).partition(|a| a.path().is_ident(name));
    *attrs = retained;
    taken
}
