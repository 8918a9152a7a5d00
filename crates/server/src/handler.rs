use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use minidb_common::{ConnectionError, StorageError};
use minidb_protocol::{Command, Frame};
use minidb_storage::{Db, save_snapshot};

use crate::Connection;

const WRONGTYPE_MSG: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Loop de tratamento de uma conexão: um frame de request por vez,
/// na ordem de chegada. Erros de framing encerram só esta conexão.
pub async fn handle_connection(
    mut conn: Connection,
    db: Db,
    dump_path: Arc<PathBuf>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    loop {
        let frame = tokio::select! {
            result = conn.read_frame() => result?,
            _ = shutdown.recv() => {
                return Ok(());
            }
        };

        let frame = match frame {
            Some(f) => f,
            None => return Ok(()), // EOF
        };

        // Comando malformado responde -ERR sem tocar o engine
        let cmd = match Command::from_frame(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                conn.write_frame(&err_frame(e)).await?;
                continue;
            }
        };

        debug!("comando recebido: {cmd:?}");

        let response = execute_command(&cmd, &db, &dump_path).await;
        conn.write_frame(&response).await?;
    }
}

/// Executa um comando contra o engine e monta o Frame de resposta.
async fn execute_command(cmd: &Command, db: &Db, dump_path: &Path) -> Frame {
    match cmd {
        Command::Ping(msg) => match msg {
            Some(m) => Frame::Bulk(m.clone()),
            None => Frame::Simple("PONG".into()),
        },
        Command::Echo(msg) => Frame::Bulk(msg.clone()),
        Command::Get(key) => match db.get(key) {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        },
        Command::Set { key, value } => {
            db.set(key.clone(), value.clone());
            Frame::Simple("OK".into())
        }
        Command::Del(key) => Frame::Integer(db.del(key) as i64),
        Command::Expire { key, seconds } => Frame::Integer(db.expire(key, *seconds) as i64),
        Command::Ttl(key) => Frame::Integer(db.ttl(key)),
        Command::Persist(key) => Frame::Integer(db.persist(key) as i64),
        Command::LPush { key, values } => match db.lpush(key, values) {
            Ok(len) => Frame::Integer(len as i64),
            Err(StorageError::WrongType) => err_frame(WRONGTYPE_MSG),
        },
        Command::RPush { key, values } => match db.rpush(key, values) {
            Ok(len) => Frame::Integer(len as i64),
            Err(StorageError::WrongType) => err_frame(WRONGTYPE_MSG),
        },
        Command::LPop(key) => match db.lpop(key) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::Null,
            Err(StorageError::WrongType) => err_frame(WRONGTYPE_MSG),
        },
        Command::RPop(key) => match db.rpop(key) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::Null,
            Err(StorageError::WrongType) => err_frame(WRONGTYPE_MSG),
        },
        Command::LRange { key, start, stop } => match db.lrange(key, *start, *stop) {
            Ok(items) => Frame::Array(items.into_iter().map(Frame::Bulk).collect()),
            Err(StorageError::WrongType) => err_frame(WRONGTYPE_MSG),
        },
        Command::Save => match save_snapshot(db, dump_path).await {
            Ok(count) => {
                debug!("SAVE gravou {count} entradas");
                Frame::Simple("OK".into())
            }
            Err(e) => err_frame(e),
        },
        Command::Unknown(name) => Frame::Error(format!("ERR unknown command '{name}'")),
    }
}

fn err_frame(msg: impl std::fmt::Display) -> Frame {
    Frame::Error(format!("ERR {msg}"))
}
