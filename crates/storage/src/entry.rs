use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::list::List;

/// Tipo do valor armazenado. A tag é imutável: reatribuir uma chave
/// com outro tipo substitui a entrada inteira.
#[derive(Debug, Clone)]
pub enum Value {
    String(Bytes),
    List(List),
}

/// Entrada no keyspace: valor + instante absoluto de expiração opcional,
/// em milissegundos Unix (UTC).
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<i64>,
}

impl Entry {
    pub fn new(value: Value, expires_at: Option<i64>) -> Self {
        Self { value, expires_at }
    }

    /// Uma entrada com expiração no passado é logicamente ausente.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Instante atual em milissegundos Unix.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_expiry_never_expires() {
        let entry = Entry::new(Value::String(Bytes::from("v")), None);
        assert!(!entry.is_expired_at(i64::MAX));
    }

    #[test]
    fn expires_at_boundary() {
        let entry = Entry::new(Value::String(Bytes::from("v")), Some(1_000));
        assert!(!entry.is_expired_at(999));
        assert!(entry.is_expired_at(1_000));
        assert!(entry.is_expired_at(1_001));
    }

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // depois de 2020
    }
}
