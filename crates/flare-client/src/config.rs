//! 客户端配置。
//!
//! # 教案式导航
//! - **来源（Where）**：TOML 文本或文件，经 `serde` 反序列化；缺省字段取默认值，未知字段直接报错，
//!   避免拼写错误被静默忽略。
//! - **结构（What）**：
//!   ```toml
//!   [async]
//!   requesting_threads = 4
//!   responding_threads = 2
//!   thread_name_prefix = "flare-client"
//!
//!   [properties]
//!   "flare.follow_redirects" = true
//!   ```
//! - **校验（How）**：加载后立即执行 [`ClientConfig::validate`]，线程数为零或前缀为空均视为非法。

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;

use crate::{error::ConfigError, message::PropertyValue};

/// 异步执行器池的尺寸与命名。
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AsyncSettings {
    pub requesting_threads: usize,
    pub responding_threads: usize,
    pub thread_name_prefix: String,
}

impl Default for AsyncSettings {
    fn default() -> Self {
        Self {
            requesting_threads: 4,
            responding_threads: 2,
            thread_name_prefix: "flare-client".to_owned(),
        }
    }
}

/// 客户端配置。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(rename = "async")]
    pub async_settings: AsyncSettings,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析并校验 TOML 文本。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.async_settings.requesting_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "async.requesting_threads",
                reason: "must be at least 1".into(),
            });
        }
        if self.async_settings.responding_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "async.responding_threads",
                reason: "must be at least 1".into(),
            });
        }
        if self.async_settings.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "async.thread_name_prefix",
                reason: "must not be blank".into(),
            });
        }
        Ok(())
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_requesting_threads(mut self, threads: usize) -> Self {
        self.async_settings.requesting_threads = threads;
        self
    }

    pub fn with_responding_threads(mut self, threads: usize) -> Self {
        self.async_settings.responding_threads = threads;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.async_settings.thread_name_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ClientConfig::from_toml_str("").expect("空文档应使用默认值");
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.async_settings.requesting_threads, 4);
        assert_eq!(config.async_settings.responding_threads, 2);
    }

    #[test]
    fn parses_async_section_and_properties() {
        let config = ClientConfig::from_toml_str(
            r#"
            [async]
            requesting_threads = 8
            thread_name_prefix = "billing"

            [properties]
            "flare.follow_redirects" = true
            "flare.user_agent" = "billing/1.0"
            "#,
        )
        .expect("合法配置应解析成功");
        assert_eq!(config.async_settings.requesting_threads, 8);
        assert_eq!(config.async_settings.responding_threads, 2);
        assert_eq!(config.async_settings.thread_name_prefix, "billing");
        assert_eq!(
            config.property("flare.follow_redirects"),
            Some(&PropertyValue::Bool(true))
        );
        assert_eq!(
            config.property("flare.user_agent").and_then(PropertyValue::as_str),
            Some("billing/1.0")
        );
    }

    #[test]
    fn zero_threads_fail_validation() {
        let err = ClientConfig::from_toml_str("[async]\nresponding_threads = 0\n")
            .expect_err("零线程应被拒绝");
        assert_eq!(err.code(), crate::error::codes::CONFIG_INVALID);
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let err = ClientConfig::from_toml_str("[async]\nthreads = 3\n").expect_err("未知字段应报错");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
