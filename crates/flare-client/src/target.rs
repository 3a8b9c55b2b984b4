use std::fmt;

use crate::{client::Client, error::ClientError, invocation::InvocationBuilder};

/// 调用目标：客户端句柄加上一个 URI。
///
/// 派生操作（`path`、`query_param`）返回新目标，原目标不变；每个操作都先检查客户端是否已关闭。
#[derive(Clone)]
pub struct Target {
    client: Client,
    uri: String,
}

impl Target {
    pub(crate) fn new(client: Client, uri: String) -> Self {
        Self { client, uri }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// 追加路径段，自动处理两侧的 `/`。
    pub fn path(&self, segment: &str) -> Result<Target, ClientError> {
        self.client.ensure_open()?;
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            return Ok(self.clone());
        }
        let (base, query) = split_query(&self.uri);
        let mut uri = base.trim_end_matches('/').to_owned();
        uri.push('/');
        uri.push_str(segment);
        if let Some(query) = query {
            uri.push('?');
            uri.push_str(query);
        }
        Ok(Target::new(self.client.clone(), uri))
    }

    /// 追加查询参数。
    pub fn query_param(&self, name: &str, value: impl fmt::Display) -> Result<Target, ClientError> {
        self.client.ensure_open()?;
        if name.is_empty() {
            return Err(ClientError::invalid_argument(
                "name",
                "query parameter name must not be empty",
            ));
        }
        let separator = if self.uri.contains('?') { '&' } else { '?' };
        let uri = format!("{}{separator}{name}={value}", self.uri);
        Ok(Target::new(self.client.clone(), uri))
    }

    /// 开始构建针对本目标的调用。
    pub fn request(&self) -> Result<InvocationBuilder, ClientError> {
        self.client.ensure_open()?;
        Ok(InvocationBuilder::new(self.client.clone(), self.uri.clone()))
    }
}

fn split_query(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (uri, None),
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target").field("uri", &self.uri).finish()
    }
}
