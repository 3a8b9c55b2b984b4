//! 请求链与响应链上的内置阶段。
//!
//! - [`RequestProcessingInitializationStage`] 总是请求链的第一环，把“当前请求”与“当前配置”绑定到作用域实例；
//! - [`RequestFilterStage`] / [`ResponseFilterStage`] 各包装一个过滤器，过滤器的 Abort 转为链的 `Abort` 分支，
//!   过滤器错误转为 [`StageError`]，原始 [`ClientError`](crate::ClientError) 保留为原因。

use std::{ops::Deref, sync::Arc};

use flare_core::{ScopeInstance, StageError, Step, Transform};

use crate::{
    config::ClientConfig,
    filter::{ClientRequestFilter, ClientResponseFilter, RequestContext, ResponseContext},
    message::{ClientRequest, ClientResponse, RequestHead},
};

/// 作用域中的“当前请求”绑定。
///
/// 初始化阶段写入初始快照，连接器派发前运行时以最终请求覆盖，
/// 因此响应侧看到的是实际发出的请求。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentRequest(RequestHead);

impl CurrentRequest {
    pub fn new(head: RequestHead) -> Self {
        Self(head)
    }

    pub fn head(&self) -> &RequestHead {
        &self.0
    }
}

impl Deref for CurrentRequest {
    type Target = RequestHead;

    fn deref(&self) -> &RequestHead {
        &self.0
    }
}

/// 读取作用域中的当前请求。
pub fn current_request(scope: &ScopeInstance) -> Option<Arc<CurrentRequest>> {
    scope.get::<CurrentRequest>()
}

/// 读取作用域中的当前配置。
pub fn current_configuration(scope: &ScopeInstance) -> Option<Arc<ClientConfig>> {
    scope.get::<ClientConfig>()
}

/// 请求链第一环：建立作用域绑定后原样放行请求。
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestProcessingInitializationStage;

impl Transform<ClientRequest, ClientResponse> for RequestProcessingInitializationStage {
    fn transform(
        &self,
        scope: &ScopeInstance,
        request: ClientRequest,
    ) -> Result<Step<ClientRequest, ClientResponse>, StageError> {
        scope.bind(CurrentRequest::new(request.head()));
        scope.bind_arc(request.configuration_arc());
        tracing::trace!(scope.id = %scope.id(), method = %request.method(), uri = %request.uri(), "request scope initialised");
        Ok(Step::Next(request))
    }
}

/// 包装单个请求过滤器的阶段。
pub struct RequestFilterStage {
    filter: Arc<dyn ClientRequestFilter>,
}

impl RequestFilterStage {
    pub fn new(filter: Arc<dyn ClientRequestFilter>) -> Self {
        Self { filter }
    }
}

impl Transform<ClientRequest, ClientResponse> for RequestFilterStage {
    fn transform(
        &self,
        _scope: &ScopeInstance,
        request: ClientRequest,
    ) -> Result<Step<ClientRequest, ClientResponse>, StageError> {
        let mut context = RequestContext::new(request);
        self.filter.filter(&mut context).map_err(StageError::failed)?;
        match context.into_parts() {
            (_, Some(substitute)) => Ok(Step::Abort(substitute)),
            (request, None) => Ok(Step::Next(request)),
        }
    }
}

/// 包装单个响应过滤器的阶段。
pub struct ResponseFilterStage {
    filter: Arc<dyn ClientResponseFilter>,
}

impl ResponseFilterStage {
    pub fn new(filter: Arc<dyn ClientResponseFilter>) -> Self {
        Self { filter }
    }
}

impl Transform<ClientResponse, ClientResponse> for ResponseFilterStage {
    fn transform(
        &self,
        scope: &ScopeInstance,
        response: ClientResponse,
    ) -> Result<Step<ClientResponse, ClientResponse>, StageError> {
        let mut context = ResponseContext::new(current_request(scope), response);
        self.filter.filter(&mut context).map_err(StageError::failed)?;
        Ok(Step::Next(context.into_response()))
    }
}
