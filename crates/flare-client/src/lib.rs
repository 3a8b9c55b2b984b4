#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "flare-client: 客户端请求/响应处理流水线。"]
#![doc = ""]
#![doc = "== 调用路径 =="]
#![doc = "调用方构建请求 → 运行时在作用域实例内执行请求链 → 连接器交换（同步直接调用 / 异步回调）"]
#![doc = "→ 在同一作用域实例内执行响应链 → 释放作用域 → 结果或失败交还调用方。"]
#![doc = ""]
#![doc = "== 模块地图 =="]
#![doc = "- `message`：请求/响应载荷、头部、实体与属性；"]
#![doc = "- `connector`：传输连接器 SPI 与一次性异步回调；"]
#![doc = "- `filter` / `providers` / `stages`：过滤器契约、按优先级装配的注册表与内置阶段；"]
#![doc = "- `runtime` / `executors` / `callback`：流水线运行时、执行器选择与终态回调；"]
#![doc = "- `client` / `target` / `invocation`：客户端生命周期与调用构建外观；"]
#![doc = "- `config` / `logging`：TOML 配置与 `tracing` 初始化；`test_stubs`：内存连接器测试桩。"]

pub mod callback;
pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod executors;
pub mod filter;
pub mod invocation;
pub mod logging;
pub mod message;
pub mod providers;
pub mod runtime;
pub mod stages;
pub mod target;
pub mod test_stubs;

pub use callback::{ResponseCallback, callback_fn};
pub use client::{Client, ClientBuilder};
pub use config::{AsyncSettings, ClientConfig};
pub use connector::{Connector, ConnectorCallback, ConnectorRef};
pub use error::{ClientError, ConfigError, ConnectorError};
pub use executors::{AsyncExecutors, RequestingExecutor, RespondingExecutor};
pub use filter::{
    ClientRequestFilter, ClientResponseFilter, RequestContext, ResponseContext, request_filter_fn,
    response_filter_fn,
};
pub use invocation::{Invocation, InvocationBuilder};
pub use message::{
    Attributes, ClientRequest, ClientResponse, Entity, Headers, Method, PropertyValue, RequestHead,
    StatusCode,
};
pub use providers::{Providers, priorities};
pub use runtime::{ResponseFuture, Runtime};
pub use stages::{CurrentRequest, current_configuration, current_request};
pub use target::Target;
