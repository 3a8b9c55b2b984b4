//! 异步调用的终态回调。

use flare_core::ScopeInstance;

use crate::{error::ClientError, message::ClientResponse};

/// 异步提交的终态回调。
///
/// 每次提交恰好触发 `completed` 或 `failed` 之一，且只触发一次；两者都按值消费回调。
/// `completed` 运行在响应侧执行器上，`scope` 即本次请求的作用域实例，可读取请求侧阶段写入的绑定。
pub trait ResponseCallback: Send + 'static {
    fn completed(self: Box<Self>, response: ClientResponse, scope: &ScopeInstance);

    fn failed(self: Box<Self>, error: ClientError);
}

/// 闭包形式的回调，由 [`callback_fn`] 构造。
pub struct FnCallback<C, F> {
    completed: C,
    failed: F,
}

pub fn callback_fn<C, F>(completed: C, failed: F) -> FnCallback<C, F>
where
    C: FnOnce(ClientResponse, &ScopeInstance) + Send + 'static,
    F: FnOnce(ClientError) + Send + 'static,
{
    FnCallback { completed, failed }
}

impl<C, F> ResponseCallback for FnCallback<C, F>
where
    C: FnOnce(ClientResponse, &ScopeInstance) + Send + 'static,
    F: FnOnce(ClientError) + Send + 'static,
{
    fn completed(self: Box<Self>, response: ClientResponse, scope: &ScopeInstance) {
        (self.completed)(response, scope)
    }

    fn failed(self: Box<Self>, error: ClientError) {
        (self.failed)(error)
    }
}
