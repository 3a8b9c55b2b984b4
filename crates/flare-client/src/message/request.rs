use std::sync::Arc;

use crate::config::ClientConfig;

use super::{Attributes, Entity, Headers, Method, PropertyValue};

/// 出站请求载荷。
///
/// 发送前可变；一次调用期间由流水线独占，不会在并发调用之间共享。
/// 属性查找先看请求自身，再回落到创建请求时的客户端配置。
#[derive(Debug)]
pub struct ClientRequest {
    method: Method,
    uri: String,
    headers: Headers,
    entity: Entity,
    attributes: Attributes,
    config: Arc<ClientConfig>,
}

impl ClientRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self::with_config(method, uri, Arc::new(ClientConfig::default()))
    }

    pub fn with_config(method: Method, uri: impl Into<String>, config: Arc<ClientConfig>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            entity: Entity::Empty,
            attributes: Attributes::new(),
            config,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn set_entity(&mut self, entity: impl Into<Entity>) {
        self.entity = entity.into();
    }

    pub fn take_entity(&mut self) -> Entity {
        std::mem::take(&mut self.entity)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// 请求属性优先，其次为客户端配置中的同名属性。
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.attributes
            .property(name)
            .or_else(|| self.config.property(name))
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.attributes.set_property(name, value);
    }

    pub fn configuration(&self) -> &ClientConfig {
        &self.config
    }

    pub fn configuration_arc(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    /// 不含实体与属性的只读快照，作为“当前请求”绑定到作用域。
    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
        }
    }
}

/// 请求行与头部的快照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub uri: String,
    pub headers: Headers,
}
