use std::{fmt, io::Read};

use bytes::Bytes;

/// 消息实体。
///
/// - `Buffered`：已驻留内存，可重复读取；
/// - `Stream`：一次性读取的字节流，调用 [`ClientResponse::buffer_entity`](super::ClientResponse::buffer_entity)
///   后转为 `Buffered`。
#[derive(Default)]
pub enum Entity {
    #[default]
    Empty,
    Buffered(Bytes),
    Stream(Box<dyn Read + Send + Sync>),
}

impl Entity {
    pub fn stream(reader: impl Read + Send + Sync + 'static) -> Self {
        Entity::Stream(Box::new(reader))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Entity::Empty => true,
            Entity::Buffered(bytes) => bytes.is_empty(),
            Entity::Stream(_) => false,
        }
    }

    pub fn is_buffered(&self) -> bool {
        !matches!(self, Entity::Stream(_))
    }

    /// 已缓冲的内容；流式实体返回 `None`。
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Entity::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// 复制一份实体。流式实体无法复制，返回 `None`。
    pub fn try_clone(&self) -> Option<Entity> {
        match self {
            Entity::Empty => Some(Entity::Empty),
            Entity::Buffered(bytes) => Some(Entity::Buffered(bytes.clone())),
            Entity::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Empty => f.write_str("Empty"),
            Entity::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Entity::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Entity {
    fn from(bytes: Bytes) -> Self {
        Entity::Buffered(bytes)
    }
}

impl From<Vec<u8>> for Entity {
    fn from(bytes: Vec<u8>) -> Self {
        Entity::Buffered(Bytes::from(bytes))
    }
}

impl From<String> for Entity {
    fn from(text: String) -> Self {
        Entity::Buffered(Bytes::from(text))
    }
}

impl From<&'static str> for Entity {
    fn from(text: &'static str) -> Self {
        Entity::Buffered(Bytes::from_static(text.as_bytes()))
    }
}
