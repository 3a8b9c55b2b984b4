//! 客户端外观与生命周期。
//!
//! # 教案式导航
//! - **构建（How）**：[`ClientBuilder`] 汇集配置、连接器、过滤器与执行器，装配出不可变的 [`Runtime`]；
//!   构建时向生命周期注册两个监听器：先注册“停止默认执行器池”，再注册“关闭运行时连接器”。
//!   监听器按后注册先通知的顺序执行，因此关闭时连接器先于执行器池停止。
//! - **关闭（What）**：`close()` 幂等，仅首个调用者执行释放；此后 `target`、`add_listener`、`configuration`
//!   以及任何提交都立即返回 [`ClientError::Closed`]，状态不可逆。

use std::{fmt, sync::Arc};

use flare_core::{LifecycleListener, LifecycleRegistry, RequestScope};

use crate::{
    config::ClientConfig,
    connector::{Connector, ConnectorRef},
    error::ClientError,
    executors::AsyncExecutors,
    filter::{ClientRequestFilter, ClientResponseFilter},
    providers::Providers,
    runtime::Runtime,
    target::Target,
};

/// 生命周期错误中使用的实例名。
const INSTANCE: &str = "Client";

/// 客户端句柄。克隆共享同一个客户端实例。
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Arc<ClientConfig>,
    runtime: Runtime,
    lifecycle: LifecycleRegistry,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// 关闭客户端；重复调用为空操作。
    pub fn close(&self) {
        if self.inner.lifecycle.close() {
            tracing::info!(connector = %self.inner.runtime.connector().name(), "client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    /// 注册关闭监听器；关闭后注册返回 [`ClientError::Closed`]。
    pub fn add_listener(&self, listener: impl LifecycleListener) -> Result<(), ClientError> {
        self.inner.lifecycle.add_listener(listener)?;
        Ok(())
    }

    pub fn configuration(&self) -> Result<Arc<ClientConfig>, ClientError> {
        self.ensure_open()?;
        Ok(Arc::clone(&self.inner.config))
    }

    /// 以 URI 创建调用目标。
    ///
    /// URI 为空、全为空白或含空白字符时返回 [`ClientError::InvalidArgument`]。
    pub fn target(&self, uri: impl Into<String>) -> Result<Target, ClientError> {
        self.ensure_open()?;
        let uri = uri.into();
        validate_uri(&uri)?;
        Ok(Target::new(self.clone(), uri))
    }

    pub(crate) fn ensure_open(&self) -> Result<(), ClientError> {
        self.inner.lifecycle.ensure_open()?;
        Ok(())
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub(crate) fn config_arc(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.inner.config)
    }
}

fn validate_uri(uri: &str) -> Result<(), ClientError> {
    if uri.trim().is_empty() {
        return Err(ClientError::invalid_argument(
            "uri",
            "URI of the newly created target must not be empty",
        ));
    }
    if uri.chars().any(char::is_whitespace) {
        return Err(ClientError::invalid_argument(
            "uri",
            format!("URI `{uri}` must not contain whitespace"),
        ));
    }
    Ok(())
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("runtime", &self.inner.runtime)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 客户端构建器。
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<ConnectorRef>,
    providers: Providers,
    executors: Option<AsyncExecutors>,
    scope: Option<RequestScope>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connector(self, connector: impl Connector) -> Self {
        self.shared_connector(Arc::new(connector))
    }

    pub fn shared_connector(mut self, connector: ConnectorRef) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    pub fn request_filter(
        mut self,
        name: &'static str,
        priority: i32,
        filter: impl ClientRequestFilter,
    ) -> Result<Self, ClientError> {
        self.providers.register_request_filter(name, priority, filter)?;
        Ok(self)
    }

    pub fn response_filter(
        mut self,
        name: &'static str,
        priority: i32,
        filter: impl ClientResponseFilter,
    ) -> Result<Self, ClientError> {
        self.providers.register_response_filter(name, priority, filter)?;
        Ok(self)
    }

    /// 使用调用方提供的执行器；这些执行器的生命周期由调用方管理，客户端关闭时不会停止它们。
    pub fn executors(mut self, executors: AsyncExecutors) -> Self {
        self.executors = Some(executors);
        self
    }

    pub fn request_scope(mut self, scope: RequestScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        self.config.validate()?;
        let connector = self.connector.ok_or_else(|| {
            ClientError::invalid_argument("connector", "a connector is required to build a client")
        })?;

        let lifecycle = LifecycleRegistry::new(INSTANCE);
        let executors = match self.executors {
            Some(executors) => executors,
            None => {
                let owned = AsyncExecutors::from_settings(&self.config.async_settings)?;
                let pools = owned.clone();
                lifecycle.add_listener(move || pools.shutdown())?;
                owned
            }
        };

        let runtime = Runtime::from_providers(
            connector,
            &self.providers,
            self.scope.unwrap_or_default(),
            executors,
        );
        let closing = runtime.clone();
        lifecycle.add_listener(move || closing.close())?;

        tracing::info!(
            connector = %runtime.connector().name(),
            request_filters = self.providers.request_filter_names().len(),
            response_filters = self.providers.response_filter_names().len(),
            "client built"
        );
        Ok(Client {
            inner: Arc::new(ClientInner {
                config: Arc::new(self.config),
                runtime,
                lifecycle,
            }),
        })
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("connector", &self.connector.as_ref().map(|connector| connector.name()))
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}
