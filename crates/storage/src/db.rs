use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::{Duration, interval};
use tracing::debug;

use minidb_common::{SWEEP_INTERVAL_MS, StorageError};

use crate::entry::{Entry, Value, now_ms};
use crate::heap::ExpiryHeap;
use crate::list::List;

/// Keyspace + índice de expiração. As duas estruturas e todos os payloads
/// de lista são um único recurso lógico, protegido pelo mesmo lock.
pub(crate) struct Keyspace {
    pub(crate) map: HashMap<String, Entry>,
    pub(crate) heap: ExpiryHeap,
}

impl Keyspace {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            heap: ExpiryHeap::new(),
        }
    }

    /// Expiração lazy: se a entrada existe e já expirou, deleta e retorna
    /// true. Exige acesso exclusivo (deleção é escrita).
    fn remove_if_expired(&mut self, key: &str, now: i64) -> bool {
        if let Some(entry) = self.map.get(key)
            && entry.is_expired_at(now)
        {
            self.map.remove(key);
            return true;
        }
        false
    }

    /// Um passo do sweeper: drena do heap todos os registros vencidos.
    /// Uma chave só é deletada se ainda existe e sua expiração atual é
    /// exatamente o instante do registro; qualquer outro caso significa
    /// registro obsoleto (re-expirada, persistida ou deletada) e o
    /// registro é descartado sem efeito.
    pub(crate) fn sweep_once(&mut self, now: i64) -> usize {
        let mut purged = 0;
        while let Some(record) = self.heap.peek() {
            if record.expire_at > now {
                break;
            }
            let record = match self.heap.pop() {
                Some(r) => r,
                None => break,
            };
            if let Some(entry) = self.map.get(&record.key)
                && entry.expires_at == Some(record.expire_at)
            {
                self.map.remove(&record.key);
                purged += 1;
            }
        }
        purged
    }
}

struct Shared {
    state: RwLock<Keyspace>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Handle para o engine in-memory. Clonável; todas as cópias compartilham
/// o mesmo keyspace.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
}

impl Db {
    /// Cria o engine e inicia o sweeper de expiração ativa.
    /// Requer um runtime tokio.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            state: RwLock::new(Keyspace::new()),
            shutdown_tx,
        });

        tokio::spawn(sweep_expired_keys(shared.clone(), shutdown_rx));

        Db { shared }
    }

    /// Sinaliza o sweeper para encerrar. O sinal é observado entre ticks.
    pub fn shutdown(&self) {
        let _ = self.shared.shutdown_tx.send(());
    }

    pub(crate) fn state(&self) -> &RwLock<Keyspace> {
        &self.shared.state
    }

    // --- String operations ---

    /// Sobrescreve incondicionalmente; o tipo vira string e qualquer
    /// expiração anterior é limpa. Registros antigos no heap ficam
    /// obsoletos e são descartados pelo sweeper.
    pub fn set(&self, key: String, value: Bytes) {
        let mut state = self.shared.state.write().unwrap();
        state.map.insert(key, Entry::new(Value::String(value), None));
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut state = self.shared.state.write().unwrap();
        if state.remove_if_expired(key, now_ms()) {
            return None;
        }
        match state.map.get(key) {
            Some(Entry {
                value: Value::String(data),
                ..
            }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn del(&self, key: &str) -> bool {
        let mut state = self.shared.state.write().unwrap();
        if state.remove_if_expired(key, now_ms()) {
            return false;
        }
        state.map.remove(key).is_some()
    }

    // --- Expiry operations ---

    /// Define expiração em `now + seconds`. Retorna false se a chave não
    /// existe ou já expirou. Cada chamada empilha um registro novo no
    /// heap; o anterior vira obsoleto.
    pub fn expire(&self, key: &str, seconds: i64) -> bool {
        let mut state = self.shared.state.write().unwrap();
        let now = now_ms();
        if state.remove_if_expired(key, now) {
            return false;
        }
        let at = now + seconds.saturating_mul(1_000);
        match state.map.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(at);
            }
            None => return false,
        }
        state.heap.push(key.to_string(), at);
        true
    }

    /// -2 se ausente ou expirada, -1 sem expiração, senão segundos
    /// inteiros restantes (truncados). Único caminho de leitura
    /// compartilhada: uma entrada expirada é reportada como -2 sem
    /// deleção; a limpeza fica para o próximo acesso exclusivo ou para
    /// o sweeper.
    pub fn ttl(&self, key: &str) -> i64 {
        let state = self.shared.state.read().unwrap();
        let now = now_ms();
        match state.map.get(key) {
            None => -2,
            Some(entry) if entry.is_expired_at(now) => -2,
            Some(Entry {
                expires_at: None, ..
            }) => -1,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => (at - now) / 1_000,
        }
    }

    /// Remove a expiração sem mexer no heap. Retorna true somente se a
    /// chave existe, não expirou e tinha expiração.
    pub fn persist(&self, key: &str) -> bool {
        let mut state = self.shared.state.write().unwrap();
        if state.remove_if_expired(key, now_ms()) {
            return false;
        }
        match state.map.get_mut(key) {
            Some(entry) if entry.expires_at.is_some() => {
                entry.expires_at = None;
                true
            }
            _ => false,
        }
    }

    // --- List operations ---

    pub fn lpush(&self, key: &str, values: &[Bytes]) -> Result<usize, StorageError> {
        self.list_push(key, values, true)
    }

    pub fn rpush(&self, key: &str, values: &[Bytes]) -> Result<usize, StorageError> {
        self.list_push(key, values, false)
    }

    /// Cria a entrada de lista se ausente (ou expirada na observação);
    /// uma lista recém-criada não tem expiração. Valores são aplicados
    /// na ordem dos argumentos.
    fn list_push(
        &self,
        key: &str,
        values: &[Bytes],
        at_head: bool,
    ) -> Result<usize, StorageError> {
        let mut state = self.shared.state.write().unwrap();
        state.remove_if_expired(key, now_ms());

        let entry = state
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(List::new()), None));

        match &mut entry.value {
            Value::List(list) => {
                for v in values {
                    if at_head {
                        list.prepend(v.clone());
                    } else {
                        list.append(v.clone());
                    }
                }
                Ok(list.len())
            }
            Value::String(_) => Err(StorageError::WrongType),
        }
    }

    pub fn lpop(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        self.list_pop(key, true)
    }

    pub fn rpop(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        self.list_pop(key, false)
    }

    fn list_pop(&self, key: &str, at_head: bool) -> Result<Option<Bytes>, StorageError> {
        let mut state = self.shared.state.write().unwrap();
        if state.remove_if_expired(key, now_ms()) {
            return Ok(None);
        }

        let (popped, emptied) = match state.map.get_mut(key) {
            None => return Ok(None),
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    let popped = if at_head {
                        list.pop_head()
                    } else {
                        list.pop_tail()
                    };
                    (popped, list.is_empty())
                }
                Value::String(_) => return Err(StorageError::WrongType),
            },
        };

        // Lista vazia não é observável: a chave sai junto.
        if emptied {
            state.map.remove(key);
        }
        Ok(popped)
    }

    /// Retorna cópias dos valores; o caller nunca segura referência ao
    /// payload através do lock.
    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Bytes>, StorageError> {
        let mut state = self.shared.state.write().unwrap();
        if state.remove_if_expired(key, now_ms()) {
            return Ok(Vec::new());
        }
        match state.map.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.range(start, stop)),
                Value::String(_) => Err(StorageError::WrongType),
            },
        }
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

/// Task do sweeper: tick de 1 segundo; em cada tick drena os registros
/// vencidos do heap sob acesso exclusivo. Cancelamento é observado entre
/// ticks, nunca no meio de um.
async fn sweep_expired_keys(shared: Arc<Shared>, mut shutdown: broadcast::Receiver<()>) {
    let mut tick = interval(Duration::from_millis(SWEEP_INTERVAL_MS));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let purged = {
                    let mut state = shared.state.write().unwrap();
                    state.sweep_once(now_ms())
                };
                if purged > 0 {
                    debug!("sweeper removeu {purged} chaves expiradas");
                }
            }
            _ = shutdown.recv() => {
                debug!("sweeper encerrado");
                return;
            }
        }
    }
}
