use std::{fmt, io::Read};

use bytes::Bytes;

use crate::error::ClientError;

use super::{Entity, Headers, StatusCode};

/// 入站响应载荷：由连接器产生，或由 Abort 合成。
pub struct ClientResponse {
    status: StatusCode,
    headers: Headers,
    entity: Entity,
}

impl ClientResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            entity: Entity::Empty,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_entity(mut self, entity: impl Into<Entity>) -> Self {
        self.entity = entity.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
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

    pub fn set_entity_stream(&mut self, reader: impl Read + Send + Sync + 'static) {
        self.entity = Entity::stream(reader);
    }

    pub fn take_entity(&mut self) -> Entity {
        std::mem::take(&mut self.entity)
    }

    /// 把流式实体读入内存，使其可被重复读取。
    ///
    /// 已缓冲或空实体直接返回。读取失败时返回 [`ClientError::Processing`]，
    /// 失败后实体置为空，底层流随之关闭。
    pub fn buffer_entity(&mut self) -> Result<(), ClientError> {
        let mut reader = match std::mem::take(&mut self.entity) {
            Entity::Stream(reader) => reader,
            settled => {
                self.entity = settled;
                return Ok(());
            }
        };
        let mut buffer = Vec::new();
        match reader.read_to_end(&mut buffer) {
            Ok(read) => {
                tracing::trace!(bytes = read, "response entity buffered");
                self.entity = Entity::Buffered(Bytes::from(buffer));
                Ok(())
            }
            Err(err) => Err(ClientError::processing(
                "failed to buffer the response entity",
                err,
            )),
        }
    }

    /// 读取实体字节；流式实体会先被缓冲。
    pub fn read_entity_bytes(&mut self) -> Result<Bytes, ClientError> {
        self.buffer_entity()?;
        Ok(self.entity.as_bytes().cloned().unwrap_or_default())
    }

    /// 以 UTF-8 读取实体。
    pub fn read_entity_string(&mut self) -> Result<String, ClientError> {
        let bytes = self.read_entity_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| ClientError::processing("response entity is not valid UTF-8", err))
    }
}

impl fmt::Debug for ClientResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("entity", &self.entity)
            .finish()
    }
}
