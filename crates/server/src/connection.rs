use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use minidb_common::{ConnectionError, INITIAL_BUFFER_CAPACITY};
use minidb_protocol::Frame;

/// Socket de um cliente com buffers próprios. O buffer de entrada
/// acumula bytes até formar um frame; requests pipelinados ficam
/// enfileirados nele e saem um por chamada de `read_frame`.
pub struct Connection {
    stream: TcpStream,
    inbound: BytesMut,
    outbound: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            inbound: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            outbound: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Próximo frame do cliente. None significa EOF limpo (cliente
    /// encerrou entre frames); EOF no meio de um frame é erro.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        loop {
            if let Some((frame, used)) = Frame::decode(&self.inbound)? {
                self.inbound.advance(used);
                return Ok(Some(frame));
            }

            if self.stream.read_buf(&mut self.inbound).await? == 0 {
                return if self.inbound.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::TruncatedFrame)
                };
            }
        }
    }

    /// Serializa e envia um frame de resposta.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        self.outbound.clear();
        frame.encode(&mut self.outbound);
        self.stream.write_all(&self.outbound).await?;
        Ok(())
    }
}
