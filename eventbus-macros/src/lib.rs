use proc_macro::TokenStream;

mod event;
mod listener;
mod utils;

/// 事件类型宏
/// - 为结构体/枚举实现 `::eventbus::event::Event` 与 `::eventbus::catalog::DeclareEvent`
/// - 支持参数：`#[event(name = "...", parent = Base, cancellable, delay_ms = 100)]`
/// - 结构体中类型为 `CallerSlot` 的字段可标注 `#[event(caller)]`，分发结束后由总线回填
#[proc_macro_attribute]
pub fn event(attr: TokenStream, item: TokenStream) -> TokenStream {
    event::expand(attr, item)
}

/// 监听器宏
/// - 标注在监听器类型的固有 impl 块上，收集 `#[subscribe]` / `#[handler]` /
///   `#[marker]` / `#[exclude]` 方法，生成 `::eventbus::catalog::DeclareListener`
/// - 支持参数：`#[listener(name = "...", excluded, default, factory = path)]`
#[proc_macro_attribute]
pub fn listener(attr: TokenStream, item: TokenStream) -> TokenStream {
    listener::expand(attr, item)
}
