use bytes::{BufMut, Bytes, BytesMut};
use minidb_common::{MAX_FRAME_SIZE, ProtocolError};

/// Um frame RESP. Requests chegam como Array de Bulk strings;
/// respostas usam qualquer variante.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Tenta decodificar um frame do início de `src`, em passada única.
    /// `Ok(None)` significa que o buffer ainda não contém um frame
    /// inteiro; `Some` devolve o frame e quantos bytes ele ocupou, para
    /// o caller avançar o buffer.
    pub fn decode(src: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
        let mut scanner = Scanner { src, pos: 0 };
        Ok(scanner.frame()?.map(|frame| (frame, scanner.pos)))
    }

    /// Serializa o frame no buffer de saída.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put(s.as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Error(s) => {
                dst.put_u8(b'-');
                dst.put(s.as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                dst.put(n.to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                dst.put(data.len().to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
                dst.put(data.as_ref());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Null => {
                dst.put(&b"$-1\r\n"[..]);
            }
            Frame::Array(items) => {
                dst.put_u8(b'*');
                dst.put(items.len().to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
                for item in items {
                    item.encode(dst);
                }
            }
        }
    }

    /// Helper: Frame::Bulk a partir de &str.
    pub fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Helper: Array de Bulk strings, no formato de um request.
    pub fn array_from_strs(strs: &[&str]) -> Frame {
        Frame::Array(strs.iter().map(|s| Frame::bulk(s)).collect())
    }
}

/// Cursor de decodificação: anda pelo slice uma única vez, validando
/// enquanto materializa. Helpers que devolvem Option sinalizam "faltam
/// bytes"; erros de sintaxe sobem como ProtocolError.
struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(prefix) = self.byte() else {
            return Ok(None);
        };

        match prefix {
            b'+' => {
                let Some(line) = self.line() else {
                    return Ok(None);
                };
                Ok(Some(Frame::Simple(text(line, "simple")?)))
            }
            b'-' => {
                let Some(line) = self.line() else {
                    return Ok(None);
                };
                Ok(Some(Frame::Error(text(line, "error")?)))
            }
            b':' => {
                let Some(n) = self.integer()? else {
                    return Ok(None);
                };
                Ok(Some(Frame::Integer(n)))
            }
            b'$' => {
                let Some(len) = self.integer()? else {
                    return Ok(None);
                };
                if len == -1 {
                    return Ok(Some(Frame::Null)); // bulk nulo: $-1\r\n
                }
                if len < 0 {
                    return Err(ProtocolError::BadLength(len));
                }
                let len = len as usize;
                if len > MAX_FRAME_SIZE {
                    return Err(ProtocolError::BulkTooLarge {
                        got: len,
                        limit: MAX_FRAME_SIZE,
                    });
                }
                let Some(chunk) = self.take(len + 2) else {
                    return Ok(None);
                };
                if &chunk[len..] != b"\r\n" {
                    return Err(ProtocolError::MissingCrlf);
                }
                Ok(Some(Frame::Bulk(Bytes::copy_from_slice(&chunk[..len]))))
            }
            b'*' => {
                let Some(count) = self.integer()? else {
                    return Ok(None);
                };
                if count == -1 {
                    return Ok(Some(Frame::Null));
                }
                if count < 0 {
                    return Err(ProtocolError::BadLength(count));
                }
                let mut items = Vec::new();
                for _ in 0..count {
                    let Some(item) = self.frame()? else {
                        return Ok(None);
                    };
                    items.push(item);
                }
                Ok(Some(Frame::Array(items)))
            }
            other => Err(ProtocolError::UnknownPrefix(other)),
        }
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.src.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.src.len() - self.pos < n {
            return None;
        }
        let chunk = &self.src[self.pos..self.pos + n];
        self.pos += n;
        Some(chunk)
    }

    /// Linha até o próximo CRLF, sem o terminador. None enquanto o
    /// terminador não chegou.
    fn line(&mut self) -> Option<&'a [u8]> {
        let rest = &self.src[self.pos..];
        let end = rest.windows(2).position(|w| w == b"\r\n")?;
        self.pos += end + 2;
        Some(&rest[..end])
    }

    fn integer(&mut self) -> Result<Option<i64>, ProtocolError> {
        let Some(line) = self.line() else {
            return Ok(None);
        };
        let s = std::str::from_utf8(line)
            .map_err(|_| ProtocolError::BadInteger(String::from_utf8_lossy(line).into_owned()))?;
        s.parse::<i64>()
            .map(Some)
            .map_err(|_| ProtocolError::BadInteger(s.to_string()))
    }
}

fn text(line: &[u8], kind: &'static str) -> Result<String, ProtocolError> {
    String::from_utf8(line.to_vec()).map_err(|_| ProtocolError::NotUtf8(kind))
}
