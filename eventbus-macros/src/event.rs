use crate::utils::{
    AttrArg, apply_derives, expect_flag, expect_lit_str, expect_type, expect_value, parse_args,
    take_attrs,
};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::spanned::Spanned;
use syn::{Expr, Item, LitStr, Member, Result, Type, parse_macro_input};

/// #[event] 宏实现
/// - 支持结构体与枚举，合并派生 `Debug`
/// - 生成 `::eventbus::event::Event` 与 `::eventbus::catalog::DeclareEvent` 实现
/// - 参数：`name = "..."`、`parent = Type`、`cancellable`、`delay_ms = N`
/// - 结构体字段可标注 `#[event(caller)]`（类型为 `CallerSlot`），作为回填槽
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    match expand_item(cfg, &mut input) {
        Ok(out) => out.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_item(cfg: EventAttrConfig, input: &mut Item) -> Result<TokenStream2> {
    let (caller, ident, generics) = match input {
        Item::Struct(st) => {
            apply_derives(&mut st.attrs, vec![syn::parse_quote!(Debug)]);
            let caller = take_caller_field(&mut st.fields)?;
            (caller, st.ident.clone(), st.generics.clone())
        }
        Item::Enum(en) => {
            apply_derives(&mut en.attrs, vec![syn::parse_quote!(Debug)]);
            (None, en.ident.clone(), en.generics.clone())
        }
        other => {
            return Err(syn::Error::new(
                other.span(),
                "#[event] can only be used on struct or enum types",
            ));
        }
    };
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let name = cfg
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let parent = cfg.parent.map(|p| quote! { .parent::<#p>() });
    let cancellable = cfg.cancellable.then(|| quote! { .cancellable() });
    let delay = cfg.delay_ms.map(|d| quote! { .delay_ms(#d) });

    let caller_slot = caller.map(|member| {
        quote! {
            fn caller_slot(&self) -> ::core::option::Option<&::eventbus::event::CallerSlot> {
                ::core::option::Option::Some(&self.#member)
            }
        }
    });

    Ok(quote! {
        #input

        impl #impl_generics ::eventbus::event::Event for #ident #ty_generics #where_clause {
            #caller_slot
        }

        impl #impl_generics ::eventbus::catalog::DeclareEvent for #ident #ty_generics #where_clause {
            fn event_def() -> ::eventbus::hierarchy::EventDef {
                ::eventbus::hierarchy::EventDef::of::<Self>(#name)
                    #parent
                    #cancellable
                    #delay
            }
        }
    })
}

// 找出唯一的 #[event(caller)] 字段并移除该属性
fn take_caller_field(fields: &mut syn::Fields) -> Result<Option<Member>> {
    let mut found: Option<Member> = None;

    for (index, field) in fields.iter_mut().enumerate() {
        for attr in take_attrs(&mut field.attrs, "event") {
            for arg in attr.parse_args_with(parse_args)? {
                if arg.key() != "caller" {
                    return Err(syn::Error::new(
                        arg.key().span(),
                        "unknown field key; expected 'caller'",
                    ));
                }
                expect_flag(arg)?;
            }

            if found.is_some() {
                return Err(syn::Error::new(
                    attr.span(),
                    "only one field can be marked #[event(caller)]",
                ));
            }
            found = Some(match &field.ident {
                Some(ident) => Member::Named(ident.clone()),
                None => Member::Unnamed(index.into()),
            });
        }
    }

    Ok(found)
}

// 解析 event 宏参数：name / parent / cancellable / delay_ms
struct EventAttrConfig {
    name: Option<LitStr>,
    parent: Option<Type>,
    cancellable: bool,
    delay_ms: Option<Expr>,
}

impl Parse for EventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self {
            name: None,
            parent: None,
            cancellable: false,
            delay_ms: None,
        };

        for arg in parse_args(input)? {
            match arg.key().to_string().as_str() {
                "name" => cfg.name = Some(expect_lit_str(arg)?),
                "parent" => cfg.parent = Some(expect_type(arg)?),
                "cancellable" => {
                    expect_flag(arg)?;
                    cfg.cancellable = true;
                }
                "delay_ms" => cfg.delay_ms = Some(expect_value(arg)?),
                _ => return Err(unknown_key(&arg)),
            }
        }

        Ok(cfg)
    }
}

fn unknown_key(arg: &AttrArg) -> syn::Error {
    syn::Error::new(
        arg.key().span(),
        "unknown key; expected 'name' | 'parent' | 'cancellable' | 'delay_ms'",
    )
}
