use bytes::Bytes;
use minidb_common::CommandError;

use crate::Frame;

/// Cursor sobre um Frame::Array para consumir argumentos em ordem.
pub struct Parse {
    parts: std::vec::IntoIter<Frame>,
    remaining: usize,
}

impl Parse {
    /// Cria um Parse a partir de um Frame. O frame deve ser Array.
    pub fn new(frame: Frame) -> Result<Parse, CommandError> {
        match frame {
            Frame::Array(parts) => {
                let remaining = parts.len();
                Ok(Parse {
                    parts: parts.into_iter(),
                    remaining,
                })
            }
            _ => Err(CommandError::InvalidArgument("esperado array".into())),
        }
    }

    /// Próximo argumento como String (de Bulk ou Simple).
    pub fn next_string(&mut self) -> Result<String, CommandError> {
        match self.next()? {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(data) => String::from_utf8(data.to_vec())
                .map_err(|_| CommandError::InvalidArgument("string UTF-8 inválida".into())),
            _ => Err(CommandError::InvalidArgument(
                "esperado string ou bulk".into(),
            )),
        }
    }

    /// Próximo argumento como Bytes (payload bruto).
    pub fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        match self.next()? {
            Frame::Bulk(data) => Ok(data),
            Frame::Simple(s) => Ok(Bytes::from(s)),
            _ => Err(CommandError::InvalidArgument("esperado bulk".into())),
        }
    }

    /// Próximo argumento como i64.
    pub fn next_int(&mut self) -> Result<i64, CommandError> {
        let s = self.next_string()?;
        s.parse::<i64>()
            .map_err(|_| CommandError::InvalidArgument(format!("'{s}' não é um inteiro")))
    }

    /// Falha se sobraram argumentos não consumidos.
    pub fn finish(&self) -> Result<(), CommandError> {
        if self.remaining > 0 {
            Err(CommandError::InvalidArgument(
                "argumentos extras não esperados".into(),
            ))
        } else {
            Ok(())
        }
    }

    /// Ainda há argumentos?
    pub fn has_remaining(&self) -> bool {
        self.remaining > 0
    }

    fn next(&mut self) -> Result<Frame, CommandError> {
        match self.parts.next() {
            Some(frame) => {
                self.remaining -= 1;
                Ok(frame)
            }
            None => Err(CommandError::InvalidArgument(
                "argumentos insuficientes".into(),
            )),
        }
    }
}
