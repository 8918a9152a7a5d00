//! Snapshot binário do keyspace (formato MINIDB v1).
//!
//! Layout, inteiros em big-endian:
//!
//! ```text
//! "MINIDB" | versão 0x01
//! entrada*:
//!   tipo (0x00 string, 0x01 lista)
//!   chave: u32 len + bytes
//!   string: u32 len + bytes
//!   lista:  u32 count + count × (u32 len + bytes)
//!   expiração: 0x00, ou 0x01 + i64 ms Unix
//! 0xFF
//! CRC-32 (IEEE) u32 sobre todos os bytes anteriores
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::info;

use minidb_common::PersistenceError;

use crate::db::Db;
use crate::entry::{Entry, Value, now_ms};
use crate::list::List;

const MAGIC: &[u8; 6] = b"MINIDB";
const VERSION: u8 = 0x01;
const TYPE_STRING: u8 = 0x00;
const TYPE_LIST: u8 = 0x01;
const NO_EXPIRY: u8 = 0x00;
const HAS_EXPIRY: u8 = 0x01;
const EOF_MARKER: u8 = 0xFF;
const CHECKSUM_SIZE: usize = 4;

/// Encoder streaming: cada byte emitido passa pelo sink bufferizado e
/// pelo CRC corrente, exceto o checksum final.
struct Encoder<W: Write> {
    w: BufWriter<W>,
    hasher: crc32fast::Hasher,
}

impl<W: Write> Encoder<W> {
    fn new(w: W) -> Self {
        Self {
            w: BufWriter::new(w),
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn write_header(&mut self) -> io::Result<()> {
        self.emit(MAGIC)?;
        self.emit(&[VERSION])
    }

    fn write_string_entry(
        &mut self,
        key: &str,
        value: &Bytes,
        expires_at: Option<i64>,
    ) -> io::Result<()> {
        self.emit(&[TYPE_STRING])?;
        self.write_blob(key.as_bytes())?;
        self.write_blob(value)?;
        self.write_expiry(expires_at)
    }

    fn write_list_entry(
        &mut self,
        key: &str,
        list: &List,
        expires_at: Option<i64>,
    ) -> io::Result<()> {
        self.emit(&[TYPE_LIST])?;
        self.write_blob(key.as_bytes())?;
        self.write_u32(list.len() as u32)?;
        for item in list.iter() {
            self.write_blob(item)?;
        }
        self.write_expiry(expires_at)
    }

    /// Marca o fim das entradas, anexa o checksum e dá flush.
    /// O checksum cobre todos os bytes anteriores e não entra no CRC.
    fn finish(mut self) -> Result<W, PersistenceError> {
        self.emit(&[EOF_MARKER])?;
        let checksum = self.hasher.finalize();
        self.w.write_all(&checksum.to_be_bytes())?;
        self.w.flush()?;
        self.w
            .into_inner()
            .map_err(|e| PersistenceError::Io(e.into_error()))
    }

    fn emit(&mut self, data: &[u8]) -> io::Result<()> {
        self.w.write_all(data)?;
        self.hasher.update(data);
        Ok(())
    }

    fn write_u32(&mut self, n: u32) -> io::Result<()> {
        self.emit(&n.to_be_bytes())
    }

    /// Length-prefixed: u32 com o tamanho, depois os bytes.
    fn write_blob(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_u32(data.len() as u32)?;
        self.emit(data)
    }

    fn write_expiry(&mut self, expires_at: Option<i64>) -> io::Result<()> {
        match expires_at {
            None => self.emit(&[NO_EXPIRY]),
            Some(at) => {
                self.emit(&[HAS_EXPIRY])?;
                self.emit(&at.to_be_bytes())
            }
        }
    }
}

/// Entrada decodificada, ainda não aplicada ao keyspace.
struct DecodedEntry {
    key: String,
    value: Value,
    expires_at: Option<i64>,
}

/// Decoder sequencial sobre o corpo do arquivo (sem o checksum, já
/// verificado à parte).
struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_header(&mut self) -> Result<(), PersistenceError> {
        let magic = self.read_bytes(MAGIC.len())?;
        if magic != MAGIC {
            return Err(PersistenceError::InvalidMagic);
        }
        let version = self.read_u8()?;
        if version != VERSION {
            return Err(PersistenceError::UnsupportedVersion(version));
        }
        Ok(())
    }

    /// Próxima entrada, ou None no marcador de fim.
    /// Byte de tipo desconhecido é erro duro.
    fn read_entry(&mut self) -> Result<Option<DecodedEntry>, PersistenceError> {
        let type_byte = self.read_u8()?;
        if type_byte == EOF_MARKER {
            return Ok(None);
        }

        let key = self.read_blob()?;
        let key = String::from_utf8(key.to_vec())
            .map_err(|e| PersistenceError::InvalidKey(e.to_string()))?;

        let value = match type_byte {
            TYPE_STRING => Value::String(Bytes::copy_from_slice(self.read_blob()?)),
            TYPE_LIST => {
                let count = self.read_u32()?;
                let mut list = List::new();
                for _ in 0..count {
                    list.append(Bytes::copy_from_slice(self.read_blob()?));
                }
                Value::List(list)
            }
            other => return Err(PersistenceError::UnknownEntryType(other)),
        };

        let expires_at = match self.read_u8()? {
            NO_EXPIRY => None,
            _ => Some(self.read_i64()?),
        };

        Ok(Some(DecodedEntry {
            key,
            value,
            expires_at,
        }))
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], PersistenceError> {
        let remaining = self.data.len() - self.pos;
        if remaining < n {
            return Err(PersistenceError::Truncated {
                expected: n,
                remaining,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, PersistenceError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, PersistenceError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i64(&mut self) -> Result<i64, PersistenceError> {
        let b = self.read_bytes(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_blob(&mut self) -> Result<&'a [u8], PersistenceError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }
}

/// Verificação de integridade, separada da decodificação estrutural:
/// os 4 últimos bytes devem ser o CRC-32 de todo o resto.
fn verify_checksum(data: &[u8]) -> Result<(), PersistenceError> {
    if data.len() < CHECKSUM_SIZE {
        return Err(PersistenceError::TooShort(data.len()));
    }
    let (body, tail) = data.split_at(data.len() - CHECKSUM_SIZE);
    let expected = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(body);
    let actual = hasher.finalize();

    if expected != actual {
        return Err(PersistenceError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Serializa uma visão consistente do keyspace em `path`.
/// Retorna o número de entradas gravadas.
pub async fn save_snapshot(db: &Db, path: &Path) -> Result<usize, PersistenceError> {
    let db = db.clone();
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_snapshot(&db, &path))
        .await
        .map_err(|e| PersistenceError::Io(io::Error::other(e)))?
}

/// Carrega o snapshot em `path` para o keyspace (vazio) de `db`.
/// Arquivo ausente não é erro: retorna Ok(0). Retorna o número de
/// entradas restauradas.
pub async fn load_snapshot(db: &Db, path: &Path) -> Result<usize, PersistenceError> {
    let db = db.clone();
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_snapshot(&db, &path))
        .await
        .map_err(|e| PersistenceError::Io(io::Error::other(e)))?
}

/// Corpo do SAVE, em thread de blocking: segura acesso compartilhado ao
/// keyspace durante toda a escrita. Entradas expiradas são puladas por
/// comparação, nunca deletadas: deleção exigiria acesso exclusivo.
fn write_snapshot(db: &Db, path: &Path) -> Result<usize, PersistenceError> {
    let state = db.state().read().unwrap();

    let file = File::create(path)?;
    let mut enc = Encoder::new(file);
    enc.write_header()?;

    let now = now_ms();
    let mut count = 0;
    for (key, entry) in &state.map {
        if entry.is_expired_at(now) {
            continue;
        }
        match &entry.value {
            Value::String(data) => enc.write_string_entry(key, data, entry.expires_at)?,
            Value::List(list) => enc.write_list_entry(key, list, entry.expires_at)?,
        }
        count += 1;
    }

    enc.finish()?;
    info!("snapshot gravado: {count} entradas em {}", path.display());
    Ok(count)
}

fn read_snapshot(db: &Db, path: &Path) -> Result<usize, PersistenceError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("snapshot não encontrado em {}, iniciando vazio", path.display());
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    verify_checksum(&data)?;
    let body = &data[..data.len() - CHECKSUM_SIZE];

    let mut dec = Decoder::new(body);
    dec.read_header()?;
    let mut entries = Vec::new();
    while let Some(entry) = dec.read_entry()? {
        entries.push(entry);
    }

    // Só depois de decodificar tudo o keyspace é tocado: uma falha
    // estrutural no meio do arquivo não deixa estado parcial.
    let now = now_ms();
    let mut state = db.state().write().unwrap();
    let mut count = 0;
    for entry in entries {
        if let Some(at) = entry.expires_at
            && at <= now
        {
            continue; // já expirada no momento do load
        }
        if let Value::List(list) = &entry.value
            && list.is_empty()
        {
            continue; // lista vazia não é observável
        }
        if let Some(at) = entry.expires_at {
            state.heap.push(entry.key.clone(), at);
        }
        state
            .map
            .insert(entry.key, Entry::new(entry.value, entry.expires_at));
        count += 1;
    }

    info!("snapshot restaurado: {count} entradas de {}", path.display());
    Ok(count)
}
