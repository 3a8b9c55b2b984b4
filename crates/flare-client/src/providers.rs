//! 过滤器注册表：按名称与优先级装配请求链与响应链。
//!
//! # 教案级说明
//!
//! ## 意图 (Why)
//! - 链构建器本身不做优先级重排；排序在这里一次性决定，链上的顺序即最终执行顺序。
//!
//! ## 解析逻辑 (How)
//! - 每次注册记录 `(priority, 注册序号)`，按该二元组升序排列：优先级数值小者先执行，同优先级保持注册顺序；
//! - 请求链固定以 [`RequestProcessingInitializationStage`] 开头，其后为各请求过滤器；
//! - 响应链仅由响应过滤器组成，没有过滤器时得到恒等链。
//!
//! ## 契约 (What)
//! - 名称在同一方向（请求/响应）内唯一，重复注册返回 [`ClientError::InvalidArgument`]；
//! - 注册表可以克隆，构建出的链与注册表此后的修改无关。

use std::{borrow::Cow, fmt, sync::Arc};

use flare_core::{ChainBuilder, StageRef};

use crate::{
    error::ClientError,
    filter::{ClientRequestFilter, ClientResponseFilter},
    message::{ClientRequest, ClientResponse},
    stages::{RequestFilterStage, RequestProcessingInitializationStage, ResponseFilterStage},
};

/// 常用优先级，数值越小越先执行。
pub mod priorities {
    pub const AUTHENTICATION: i32 = 1000;
    pub const AUTHORIZATION: i32 = 2000;
    pub const HEADER_DECORATOR: i32 = 3000;
    pub const ENTITY_CODER: i32 = 4000;
    pub const USER: i32 = 5000;
}

struct Registration<F: ?Sized> {
    name: Cow<'static, str>,
    priority: i32,
    sequence: usize,
    filter: Arc<F>,
}

impl<F: ?Sized> Clone for Registration<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            priority: self.priority,
            sequence: self.sequence,
            filter: Arc::clone(&self.filter),
        }
    }
}

/// 过滤器注册表。
#[derive(Clone, Default)]
pub struct Providers {
    request: Vec<Registration<dyn ClientRequestFilter>>,
    response: Vec<Registration<dyn ClientResponseFilter>>,
    sequence: usize,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_request_filter(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        priority: i32,
        filter: impl ClientRequestFilter,
    ) -> Result<&mut Self, ClientError> {
        let name = name.into();
        if self.request.iter().any(|existing| existing.name == name) {
            return Err(duplicate(name));
        }
        let sequence = self.next_sequence();
        self.request.push(Registration {
            name,
            priority,
            sequence,
            filter: Arc::new(filter),
        });
        Ok(self)
    }

    pub fn register_response_filter(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        priority: i32,
        filter: impl ClientResponseFilter,
    ) -> Result<&mut Self, ClientError> {
        let name = name.into();
        if self.response.iter().any(|existing| existing.name == name) {
            return Err(duplicate(name));
        }
        let sequence = self.next_sequence();
        self.response.push(Registration {
            name,
            priority,
            sequence,
            filter: Arc::new(filter),
        });
        Ok(self)
    }

    /// 请求过滤器名称，按执行顺序排列。
    pub fn request_filter_names(&self) -> Vec<&str> {
        sorted(&self.request)
            .into_iter()
            .map(|registration| registration.name.as_ref())
            .collect()
    }

    /// 响应过滤器名称，按执行顺序排列。
    pub fn response_filter_names(&self) -> Vec<&str> {
        sorted(&self.response)
            .into_iter()
            .map(|registration| registration.name.as_ref())
            .collect()
    }

    /// 装配请求链：初始化阶段在前，请求过滤器随后。
    pub fn request_chain(&self) -> StageRef<ClientRequest, ClientResponse> {
        let mut builder = ChainBuilder::<ClientRequest, ClientResponse>::new().stage(
            "request-processing-initialization",
            RequestProcessingInitializationStage,
        );
        for registration in sorted(&self.request) {
            builder = builder.stage(
                registration.name.clone(),
                RequestFilterStage::new(Arc::clone(&registration.filter)),
            );
        }
        builder.build()
    }

    /// 装配响应链；没有响应过滤器时为恒等链。
    pub fn response_chain(&self) -> StageRef<ClientResponse, ClientResponse> {
        let mut builder = ChainBuilder::<ClientResponse, ClientResponse>::new();
        for registration in sorted(&self.response) {
            builder = builder.stage(
                registration.name.clone(),
                ResponseFilterStage::new(Arc::clone(&registration.filter)),
            );
        }
        builder.build()
    }

    fn next_sequence(&mut self) -> usize {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }
}

fn sorted<F: ?Sized>(registrations: &[Registration<F>]) -> Vec<&Registration<F>> {
    let mut ordered: Vec<_> = registrations.iter().collect();
    ordered.sort_by_key(|registration| (registration.priority, registration.sequence));
    ordered
}

fn duplicate(name: Cow<'static, str>) -> ClientError {
    ClientError::invalid_argument("name", format!("a filter named `{name}` is already registered"))
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers")
            .field("request", &self.request_filter_names())
            .field("response", &self.response_filter_names())
            .finish()
    }
}
