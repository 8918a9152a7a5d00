use bytes::Bytes;
use std::collections::VecDeque;

/// Payload de lista: sequência ordenada de byte strings com inserção e
/// remoção O(1) nas duas pontas. `prepend` coloca no índice 0; `append`
/// coloca no índice `len`.
#[derive(Debug, Clone, Default)]
pub struct List {
    items: VecDeque<Bytes>,
}

impl List {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn prepend(&mut self, value: Bytes) {
        self.items.push_front(value);
    }

    pub fn append(&mut self, value: Bytes) {
        self.items.push_back(value);
    }

    pub fn pop_head(&mut self) -> Option<Bytes> {
        self.items.pop_front()
    }

    pub fn pop_tail(&mut self) -> Option<Bytes> {
        self.items.pop_back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.items.iter()
    }

    /// Fatia no estilo LRANGE do Redis. Índices negativos contam a partir
    /// do fim (-1 = último). Depois da normalização, `start` é limitado a
    /// 0 por baixo e `stop` a `len-1` por cima; `start > stop` resulta em
    /// sequência vazia. Retorna cópias dos valores.
    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        let len = self.items.len() as i64;

        let mut start = if start < 0 { len + start } else { start };
        let mut stop = if stop < 0 { len + stop } else { stop };

        if start < 0 {
            start = 0;
        }
        if stop > len - 1 {
            stop = len - 1;
        }
        if start > stop {
            return Vec::new();
        }

        self.items
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect()
    }
}

impl FromIterator<Bytes> for List {
    fn from_iter<T: IntoIterator<Item = Bytes>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
