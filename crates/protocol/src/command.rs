use bytes::Bytes;
use minidb_common::CommandError;

use crate::{Frame, Parse};

/// Enum com todos os comandos suportados.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<Bytes>),
    Echo(Bytes),
    Get(String),
    Set { key: String, value: Bytes },
    Del(String),
    Expire { key: String, seconds: i64 },
    Ttl(String),
    Persist(String),
    LPush { key: String, values: Vec<Bytes> },
    RPush { key: String, values: Vec<Bytes> },
    LPop(String),
    RPop(String),
    LRange { key: String, start: i64, stop: i64 },
    Save,
    Unknown(String),
}

impl Command {
    /// Faz o parse de um Frame (array de bulks) em um Command.
    /// O nome do comando é case-insensitive.
    pub fn from_frame(frame: Frame) -> Result<Command, CommandError> {
        let mut parse = Parse::new(frame)?;
        let cmd_name = parse.next_string()?.to_uppercase();

        let cmd = match cmd_name.as_str() {
            "PING" => {
                let msg = if parse.has_remaining() {
                    Some(parse.next_bytes()?)
                } else {
                    None
                };
                parse.finish()?;
                Command::Ping(msg)
            }
            "ECHO" => {
                let msg = parse.next_bytes()?;
                parse.finish()?;
                Command::Echo(msg)
            }
            "GET" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Get(key)
            }
            "SET" => {
                let key = parse.next_string()?;
                let value = parse.next_bytes()?;
                parse.finish()?;
                Command::Set { key, value }
            }
            "DEL" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Del(key)
            }
            "EXPIRE" => {
                let key = parse.next_string()?;
                let seconds = parse.next_int()?;
                parse.finish()?;
                Command::Expire { key, seconds }
            }
            "TTL" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Ttl(key)
            }
            "PERSIST" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Persist(key)
            }
            "LPUSH" => {
                let key = parse.next_string()?;
                if !parse.has_remaining() {
                    return Err(CommandError::WrongArity("LPUSH".into()));
                }
                let mut values = Vec::new();
                while parse.has_remaining() {
                    values.push(parse.next_bytes()?);
                }
                Command::LPush { key, values }
            }
            "RPUSH" => {
                let key = parse.next_string()?;
                if !parse.has_remaining() {
                    return Err(CommandError::WrongArity("RPUSH".into()));
                }
                let mut values = Vec::new();
                while parse.has_remaining() {
                    values.push(parse.next_bytes()?);
                }
                Command::RPush { key, values }
            }
            "LPOP" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::LPop(key)
            }
            "RPOP" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::RPop(key)
            }
            "LRANGE" => {
                let key = parse.next_string()?;
                let start = parse.next_int()?;
                let stop = parse.next_int()?;
                parse.finish()?;
                Command::LRange { key, start, stop }
            }
            "SAVE" => {
                parse.finish()?;
                Command::Save
            }
            _ => Command::Unknown(cmd_name),
        };

        Ok(cmd)
    }

    /// Encoda o comando como Frame de request (usado pelo cli e testes).
    pub fn to_frame(&self) -> Frame {
        match self {
            Command::Ping(None) => Frame::Array(vec![Frame::bulk("PING")]),
            Command::Ping(Some(msg)) => {
                Frame::Array(vec![Frame::bulk("PING"), Frame::Bulk(msg.clone())])
            }
            Command::Echo(msg) => Frame::Array(vec![Frame::bulk("ECHO"), Frame::Bulk(msg.clone())]),
            Command::Get(key) => Frame::Array(vec![Frame::bulk("GET"), Frame::bulk(key)]),
            Command::Set { key, value } => Frame::Array(vec![
                Frame::bulk("SET"),
                Frame::bulk(key),
                Frame::Bulk(value.clone()),
            ]),
            Command::Del(key) => Frame::Array(vec![Frame::bulk("DEL"), Frame::bulk(key)]),
            Command::Expire { key, seconds } => Frame::Array(vec![
                Frame::bulk("EXPIRE"),
                Frame::bulk(key),
                Frame::bulk(&seconds.to_string()),
            ]),
            Command::Ttl(key) => Frame::Array(vec![Frame::bulk("TTL"), Frame::bulk(key)]),
            Command::Persist(key) => Frame::Array(vec![Frame::bulk("PERSIST"), Frame::bulk(key)]),
            Command::LPush { key, values } => {
                let mut parts = vec![Frame::bulk("LPUSH"), Frame::bulk(key)];
                parts.extend(values.iter().map(|v| Frame::Bulk(v.clone())));
                Frame::Array(parts)
            }
            Command::RPush { key, values } => {
                let mut parts = vec![Frame::bulk("RPUSH"), Frame::bulk(key)];
                parts.extend(values.iter().map(|v| Frame::Bulk(v.clone())));
                Frame::Array(parts)
            }
            Command::LPop(key) => Frame::Array(vec![Frame::bulk("LPOP"), Frame::bulk(key)]),
            Command::RPop(key) => Frame::Array(vec![Frame::bulk("RPOP"), Frame::bulk(key)]),
            Command::LRange { key, start, stop } => Frame::Array(vec![
                Frame::bulk("LRANGE"),
                Frame::bulk(key),
                Frame::bulk(&start.to_string()),
                Frame::bulk(&stop.to_string()),
            ]),
            Command::Save => Frame::Array(vec![Frame::bulk("SAVE")]),
            Command::Unknown(name) => Frame::Array(vec![Frame::bulk(name)]),
        }
    }
}
