use crate::utils::{expect_flag, expect_lit_str, expect_value, parse_args, take_attrs};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, FnArg, ImplItem, ImplItemFn, Item, ItemImpl, LitStr, Result, ReturnType, Token, Type,
    parse_macro_input,
};

/// #[listener] 宏实现
/// - 作用于固有 impl 块，生成 `::eventbus::catalog::DeclareListener` 实现
/// - 参数：`name = "..."`、`excluded`、`default`（以 `Default` 构造实例）、`factory = path`
/// - 方法属性：
///   - `#[subscribe]` / `#[subscribe(Event)]`：带处理器标记的处理方法
///   - `#[handler]` / `#[handler(Event)]`：不带标记的处理方法（仅限定到该类型时可达）
///   - `#[marker("name")]` / `#[marker(CONST)]`：附加标记，可多次出现
///   - `#[exclude]`：排除该方法
/// - 参数形式：`Arc<dyn Event>`、`&dyn Event`、`Arc<E>`、`&E`；
///   未在属性中给出事件类型时取具体参数类型；具体类型参数只接收该类型本身（exact），
///   需要接收整棵子树时使用 `dyn Event` 参数
/// - 可见性、接收者与参数个数取自方法签名
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as ListenerAttrConfig);
    let input = parse_macro_input!(item as Item);

    let out = match input {
        Item::Impl(imp) => expand_impl(cfg, imp),
        other => Err(syn::Error::new(
            other.span(),
            "#[listener] can only be used on inherent impl blocks",
        )),
    };

    match out {
        Ok(ts) => ts.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_impl(cfg: ListenerAttrConfig, mut imp: ItemImpl) -> Result<TokenStream2> {
    if let Some((_, path, _)) = &imp.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "#[listener] expects an inherent impl block, not a trait impl",
        ));
    }
    if !imp.generics.params.is_empty() {
        return Err(syn::Error::new(
            imp.generics.span(),
            "#[listener] does not support generic listener types",
        ));
    }

    let self_ty = imp.self_ty.clone();
    let name = match cfg.name {
        Some(lit) => lit,
        None => default_name(&self_ty)?,
    };

    let mut methods = Vec::new();
    for item in imp.items.iter_mut() {
        if let ImplItem::Fn(f) = item {
            if let Some(method) = HandlerSpec::take(f)? {
                methods.push(method.to_tokens_for(f));
            }
        }
    }

    let excluded = cfg.excluded.then(|| quote! { .excluded() });
    let factory = match (cfg.default, cfg.factory) {
        (true, Some(f)) => {
            return Err(syn::Error::new(
                f.span(),
                "'default' and 'factory' are mutually exclusive",
            ));
        }
        (true, None) => Some(quote! { .with_default_factory() }),
        (false, Some(f)) => Some(quote! { .factory(#f) }),
        (false, None) => None,
    };

    Ok(quote! {
        #imp

        impl ::eventbus::catalog::DeclareListener for #self_ty {
            fn listener_def() -> ::eventbus::listener::ListenerDef<Self> {
                ::eventbus::listener::ListenerDef::<Self>::new(#name)
                    #excluded
                    #factory
                    #( #methods )*
            }
        }
    })
}

fn default_name(ty: &Type) -> Result<LitStr> {
    match ty {
        Type::Path(p) => p
            .path
            .segments
            .last()
            .map(|s| LitStr::new(&s.ident.to_string(), s.ident.span()))
            .ok_or_else(|| syn::Error::new(ty.span(), "empty type path")),
        other => Err(syn::Error::new(
            other.span(),
            "cannot derive listener name; use #[listener(name = \"...\")]",
        )),
    }
}

enum ReceiverKind {
    Ref,
    ArcSelf,
    Static,
}

impl ReceiverKind {
    // 仅接受 &self / self: &Self / self: Arc<Self>
    fn classify(r: &syn::Receiver) -> Result<Self> {
        if r.mutability.is_none() {
            match &*r.ty {
                Type::Reference(re) if re.mutability.is_none() && is_self(&re.elem) => {
                    return Ok(ReceiverKind::Ref);
                }
                Type::Path(p) if r.reference.is_none() && is_arc_of_self(p) => {
                    return Ok(ReceiverKind::ArcSelf);
                }
                _ => {}
            }
        }
        Err(syn::Error::new(
            r.span(),
            "handler receiver must be &self or self: Arc<Self>",
        ))
    }
}

fn is_self(ty: &Type) -> bool {
    matches!(ty, Type::Path(p) if p.qself.is_none() && p.path.is_ident("Self"))
}

fn is_arc_of_self(p: &syn::TypePath) -> bool {
    p.path
        .segments
        .last()
        .filter(|s| s.ident == "Arc")
        .and_then(|s| match &s.arguments {
            syn::PathArguments::AngleBracketed(args) if args.args.len() == 1 => args.args.first(),
            _ => None,
        })
        .is_some_and(|arg| matches!(arg, syn::GenericArgument::Type(t) if is_self(t)))
}

// 处理方法的参数形式
enum ParamKind {
    ArcDyn,
    RefDyn,
    ArcConcrete(Type),
    RefConcrete(Type),
}

impl ParamKind {
    fn classify(ty: &Type) -> Result<Self> {
        match ty {
            Type::Reference(r) => Ok(match &*r.elem {
                Type::TraitObject(_) => ParamKind::RefDyn,
                elem => ParamKind::RefConcrete(elem.clone()),
            }),
            Type::Path(p) => {
                let inner = p
                    .path
                    .segments
                    .last()
                    .filter(|s| s.ident == "Arc")
                    .and_then(|s| match &s.arguments {
                        syn::PathArguments::AngleBracketed(args) => args.args.first(),
                        _ => None,
                    });
                match inner {
                    Some(syn::GenericArgument::Type(Type::TraitObject(_))) => {
                        Ok(ParamKind::ArcDyn)
                    }
                    Some(syn::GenericArgument::Type(elem)) => {
                        Ok(ParamKind::ArcConcrete(elem.clone()))
                    }
                    _ => Err(Self::unsupported(ty)),
                }
            }
            _ => Err(Self::unsupported(ty)),
        }
    }

    fn concrete(&self) -> Option<&Type> {
        match self {
            ParamKind::ArcConcrete(t) | ParamKind::RefConcrete(t) => Some(t),
            ParamKind::ArcDyn | ParamKind::RefDyn => None,
        }
    }

    fn unsupported(ty: &Type) -> syn::Error {
        syn::Error::new(
            ty.span(),
            "handler parameter must be Arc<dyn Event>, &dyn Event, Arc<E> or &E",
        )
    }
}

struct HandlerSpec {
    handled: Type,
    subscribe: bool,
    markers: Vec<Expr>,
    excluded: bool,
    private: bool,
    receiver: ReceiverKind,
    arity: usize,
    param: Option<ParamKind>,
}

impl HandlerSpec {
    // 解析并移除方法上的处理器属性；没有任何处理器属性时返回 None
    fn take(f: &mut ImplItemFn) -> Result<Option<Self>> {
        let subscribe = take_attrs(&mut f.attrs, "subscribe");
        let handler = take_attrs(&mut f.attrs, "handler");
        let marker = take_attrs(&mut f.attrs, "marker");
        let exclude = take_attrs(&mut f.attrs, "exclude");

        if subscribe.is_empty() && handler.is_empty() && marker.is_empty() && exclude.is_empty() {
            return Ok(None);
        }

        let mut declared: Option<Type> = None;
        for attr in subscribe.iter().chain(handler.iter()) {
            if let syn::Meta::List(_) = &attr.meta {
                let ty: Type = attr.parse_args()?;
                if let Some(prev) = &declared {
                    if prev.to_token_stream().to_string() != ty.to_token_stream().to_string() {
                        return Err(syn::Error::new(
                            ty.span(),
                            "conflicting event types for the same handler",
                        ));
                    }
                }
                declared = Some(ty);
            }
        }

        let mut markers = Vec::new();
        for attr in &marker {
            let list = attr.parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)?;
            markers.extend(list);
        }

        for attr in &exclude {
            attr.meta.require_path_only()?;
        }

        let receiver = match f.sig.receiver() {
            None => ReceiverKind::Static,
            Some(r) => ReceiverKind::classify(r)?,
        };

        let params: Vec<&syn::PatType> = f
            .sig
            .inputs
            .iter()
            .filter_map(|arg| match arg {
                FnArg::Typed(pt) => Some(pt),
                FnArg::Receiver(_) => None,
            })
            .collect();
        let param = match params.as_slice() {
            [only] => Some(ParamKind::classify(&only.ty)?),
            _ => None,
        };

        let handled = match (declared, param.as_ref().and_then(ParamKind::concrete)) {
            (Some(ty), _) => ty,
            (None, Some(ty)) => ty.clone(),
            (None, None) => {
                return Err(syn::Error::new(
                    f.sig.ident.span(),
                    "cannot infer the handled event type; use #[subscribe(EventType)] or #[handler(EventType)]",
                ));
            }
        };

        Ok(Some(Self {
            handled,
            subscribe: !subscribe.is_empty(),
            markers,
            excluded: !exclude.is_empty(),
            private: matches!(f.vis, syn::Visibility::Inherited),
            receiver,
            arity: params.len(),
            param,
        }))
    }

    fn to_tokens_for(&self, f: &ImplItemFn) -> TokenStream2 {
        let handled = &self.handled;
        let name = LitStr::new(&f.sig.ident.to_string(), f.sig.ident.span());

        let subscribe = self.subscribe.then(|| quote! { .subscribe() });
        let markers = self.markers.iter().map(|m| match m {
            Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) => quote! { .marker(::eventbus::listener::Marker::new(#lit)) },
            other => quote! { .marker(#other) },
        });
        let excluded = self.excluded.then(|| quote! { .excluded() });
        let exact = self
            .param
            .as_ref()
            .and_then(ParamKind::concrete)
            .map(|_| quote! { .exact() });
        let visibility = self
            .private
            .then(|| quote! { .visibility(::eventbus::listener::Visibility::Private) });
        let receiver = matches!(self.receiver, ReceiverKind::Static)
            .then(|| quote! { .receiver(::eventbus::listener::Receiver::Static) });
        let arity = (self.arity != 1).then(|| {
            let n = self.arity;
            quote! { .arity(#n) }
        });

        let invoker = self.invoker(f, &name);

        quote! {
            .method::<#handled, _, _>(
                ::eventbus::listener::MethodDef::new(#name)
                    #subscribe
                    #( #markers )*
                    #excluded
                    #exact
                    #visibility
                    #receiver
                    #arity,
                #invoker,
            )
        }
    }

    fn invoker(&self, f: &ImplItemFn, name: &LitStr) -> TokenStream2 {
        let anyhow = quote! { ::eventbus::__private::anyhow };

        let param = match (&self.receiver, &self.param) {
            (ReceiverKind::Ref | ReceiverKind::ArcSelf, Some(param)) => param,
            _ => {
                // 不可调用的方法：解析阶段即被过滤，调用器不会被执行
                return quote! {
                    |_this: ::std::sync::Arc<Self>,
                     _event: ::std::sync::Arc<dyn ::eventbus::event::Event>| {
                        ::std::future::ready(::core::result::Result::Err::<(), #anyhow::Error>(
                            #anyhow::anyhow!("handler {} is not callable", #name),
                        ))
                    }
                };
            }
        };

        let bind = match param {
            ParamKind::ArcDyn => quote! { let arg = event; },
            ParamKind::RefDyn => quote! { let arg: &dyn ::eventbus::event::Event = &*event; },
            ParamKind::ArcConcrete(ty) => quote! {
                let arg = ::eventbus::event::downcast_event::<#ty>(event).ok_or_else(|| {
                    #anyhow::anyhow!("event is not a {}", ::core::any::type_name::<#ty>())
                })?;
            },
            ParamKind::RefConcrete(ty) => quote! {
                let arg = event.downcast_ref::<#ty>().ok_or_else(|| {
                    #anyhow::anyhow!("event is not a {}", ::core::any::type_name::<#ty>())
                })?;
            },
        };

        let ident = &f.sig.ident;
        let call = match f.sig.asyncness {
            Some(_) => quote! { this.#ident(arg).await },
            None => quote! { this.#ident(arg) },
        };
        let call = match f.sig.output {
            ReturnType::Default => quote! { #call; },
            ReturnType::Type(..) => quote! { #call?; },
        };

        quote! {
            |this: ::std::sync::Arc<Self>, event: ::std::sync::Arc<dyn ::eventbus::event::Event>| {
                async move {
                    #bind
                    #call
                    ::core::result::Result::Ok::<(), #anyhow::Error>(())
                }
            }
        }
    }
}

// 解析 listener 宏参数：name / excluded / default / factory
struct ListenerAttrConfig {
    name: Option<LitStr>,
    excluded: bool,
    default: bool,
    factory: Option<Expr>,
}

impl Parse for ListenerAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self {
            name: None,
            excluded: false,
            default: false,
            factory: None,
        };

        for arg in parse_args(input)? {
            match arg.key().to_string().as_str() {
                "name" => cfg.name = Some(expect_lit_str(arg)?),
                "excluded" => {
                    expect_flag(arg)?;
                    cfg.excluded = true;
                }
                "default" => {
                    expect_flag(arg)?;
                    cfg.default = true;
                }
                "factory" => cfg.factory = Some(expect_value(arg)?),
                _ => {
                    return Err(syn::Error::new(
                        arg.key().span(),
                        "unknown key; expected 'name' | 'excluded' | 'default' | 'factory'",
                    ));
                }
            }
        }

        Ok(cfg)
    }
}
