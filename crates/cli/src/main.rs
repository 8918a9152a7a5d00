use std::io::{self, Write};

use bytes::{Buf, BytesMut};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use minidb_common::{DEFAULT_HOST, DEFAULT_PORT};
use minidb_protocol::Frame;

const HELP: &str = "\
comandos suportados:
  PING [msg]              ECHO msg
  SET chave valor         GET chave            DEL chave
  EXPIRE chave segundos   TTL chave            PERSIST chave
  LPUSH chave v [v ...]   RPUSH chave v [v ...]
  LPOP chave              RPOP chave           LRANGE chave início fim
  SAVE
  help                    quit";

#[derive(Parser, Debug)]
#[command(name = "minidb-cli", about = "MiniDB CLI client")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Comando para executar diretamente (modo não interativo)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// Conexão do cliente: buffer de decodificação persiste entre requests,
/// então respostas que chegam coladas não se perdem.
struct Client {
    stream: TcpStream,
    pending: BytesMut,
}

impl Client {
    async fn connect(addr: &str) -> anyhow::Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
            pending: BytesMut::with_capacity(4096),
        })
    }

    /// Envia um request e bloqueia até a resposta correspondente.
    async fn roundtrip(&mut self, args: &[&str]) -> anyhow::Result<Frame> {
        let mut out = BytesMut::new();
        Frame::array_from_strs(args).encode(&mut out);
        self.stream.write_all(&out).await?;

        loop {
            if let Some((frame, used)) = Frame::decode(&self.pending)? {
                self.pending.advance(used);
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.pending).await? == 0 {
                anyhow::bail!("servidor fechou a conexão");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let mut client = Client::connect(&addr).await?;

    // Modo comando único: imprime a resposta e propaga erro no exit code
    if !args.command.is_empty() {
        let tokens: Vec<&str> = args.command.iter().map(|s| s.as_str()).collect();
        let reply = client.roundtrip(&tokens).await?;
        println!("{}", render(&reply, 0));
        if matches!(reply, Frame::Error(_)) {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("Conectado a {addr} (digite 'help' para os comandos)");

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        print!("minidb> ");
        io::stdout().flush()?;

        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break; // EOF
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        if line.eq_ignore_ascii_case("help") {
            println!("{HELP}");
            continue;
        }

        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }

        let refs: Vec<&str> = tokens.iter().map(|s| s.as_str()).collect();
        match client.roundtrip(&refs).await {
            Ok(reply) => println!("{}", render(&reply, 0)),
            Err(e) => {
                println!("(error) {e}");
                break;
            }
        }
    }

    Ok(())
}

/// Tokeniza a linha com suporte a aspas simples e duplas.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) if c == '\\' => {
                let escaped = match chars.peek() {
                    Some('n') => Some('\n'),
                    Some('t') => Some('\t'),
                    Some('\\') => Some('\\'),
                    Some('"') => Some('"'),
                    Some('\'') => Some('\''),
                    _ => None,
                };
                match escaped {
                    Some(e) => {
                        current.push(e);
                        chars.next();
                    }
                    None => current.push(c),
                }
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Formata a resposta no estilo do redis-cli: status sem aspas, bulks
/// entre aspas, arrays numerados com recuo nos níveis aninhados.
fn render(frame: &Frame, depth: usize) -> String {
    match frame {
        Frame::Simple(s) => s.clone(),
        Frame::Error(s) => format!("(error) {s}"),
        Frame::Integer(n) => format!("(integer) {n}"),
        Frame::Bulk(data) => format!("\"{}\"", String::from_utf8_lossy(data)),
        Frame::Null => "(nil)".into(),
        Frame::Array(items) if items.is_empty() => "(empty list)".into(),
        Frame::Array(items) => {
            let pad = "   ".repeat(depth);
            items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{pad}{}) {}", i + 1, render(item, depth + 1)))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn tokenize_simple() {
        assert_eq!(tokenize("SET key value"), vec!["SET", "key", "value"]);
    }

    #[test]
    fn tokenize_double_quotes() {
        assert_eq!(
            tokenize(r#"SET key "hello world""#),
            vec!["SET", "key", "hello world"]
        );
    }

    #[test]
    fn tokenize_single_quotes() {
        assert_eq!(
            tokenize("SET key 'hello world'"),
            vec!["SET", "key", "hello world"]
        );
    }

    #[test]
    fn tokenize_escapes() {
        assert_eq!(
            tokenize(r#"SET key "a\"b\nc""#),
            vec!["SET", "key", "a\"b\nc"]
        );
    }

    #[test]
    fn tokenize_collapses_whitespace() {
        assert_eq!(tokenize("  LRANGE   l  0   -1 "), vec!["LRANGE", "l", "0", "-1"]);
    }

    #[test]
    fn tokenize_empty() {
        assert_eq!(tokenize(""), Vec::<String>::new());
    }

    #[test]
    fn render_status_without_quotes() {
        assert_eq!(render(&Frame::Simple("OK".into()), 0), "OK");
    }

    #[test]
    fn render_bulk_quoted() {
        assert_eq!(render(&Frame::Bulk(Bytes::from("redis")), 0), "\"redis\"");
    }

    #[test]
    fn render_scalars() {
        assert_eq!(render(&Frame::Integer(-2), 0), "(integer) -2");
        assert_eq!(render(&Frame::Null, 0), "(nil)");
        assert_eq!(render(&Frame::Error("ERR x".into()), 0), "(error) ERR x");
    }

    #[test]
    fn render_array_numbered() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("a")),
            Frame::Bulk(Bytes::from("b")),
        ]);
        assert_eq!(render(&frame, 0), "1) \"a\"\n2) \"b\"");
    }

    #[test]
    fn render_empty_array() {
        assert_eq!(render(&Frame::Array(vec![]), 0), "(empty list)");
    }

    #[test]
    fn render_nested_array_indents() {
        let frame = Frame::Array(vec![
            Frame::Array(vec![Frame::Integer(1), Frame::Integer(2)]),
            Frame::Bulk(Bytes::from("x")),
        ]);
        assert_eq!(
            render(&frame, 0),
            "1)    1) (integer) 1\n   2) (integer) 2\n2) \"x\""
        );
    }
}
