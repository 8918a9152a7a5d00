/// Erros de decodificação RESP. Buffer incompleto não é erro: o decoder
/// sinaliza com `None` e o caller acumula mais bytes do socket antes de
/// tentar de novo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("prefixo RESP desconhecido: {0:#04x}")]
    UnknownPrefix(u8),
    #[error("tamanho declarado inválido: {0}")]
    BadLength(i64),
    #[error("bulk de {got} bytes excede o limite de {limit} bytes")]
    BulkTooLarge { got: usize, limit: usize },
    #[error("delimitador CRLF ausente após payload de bulk")]
    MissingCrlf,
    #[error("inteiro malformado: {0}")]
    BadInteger(String),
    #[error("frame {0} com bytes fora de UTF-8")]
    NotUtf8(&'static str),
}

/// Erros do engine de keyspace.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("o tipo do valor não corresponde à operação")]
    WrongType,
}

/// Erros do snapshot binário (encode/decode/verificação).
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("magic bytes inválidos no cabeçalho")]
    InvalidMagic,
    #[error("versão de formato não suportada: {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("tipo de entrada desconhecido: {0:#04x}")]
    UnknownEntryType(u8),
    #[error("chave inválida no snapshot: {0}")]
    InvalidKey(String),
    #[error("arquivo truncado: esperados {expected} bytes, restam {remaining}")]
    Truncated { expected: usize, remaining: usize },
    #[error("checksum CRC-32 não confere: esperado {expected:#010x}, calculado {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("arquivo curto demais para conter checksum ({0} bytes)")]
    TooShort(usize),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Erros no ciclo de vida de uma conexão cliente.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("peer desconectou no meio de um frame")]
    TruncatedFrame,
    #[error("request malformado: {0}")]
    BadFrame(#[from] ProtocolError),
    #[error("socket: {0}")]
    Socket(#[from] std::io::Error),
}

/// Erros de parsing/validação de comandos.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("comando não reconhecido: {0}")]
    Unknown(String),
    #[error("aridade inválida para '{0}'")]
    WrongArity(String),
    #[error("argumento malformado: {0}")]
    InvalidArgument(String),
}

/// Erro top-level do MiniDB.
#[derive(Debug, thiserror::Error)]
pub enum MiniError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Result type alias.
pub type MiniResult<T> = Result<T, MiniError>;

// Conversão implícita de io::Error → MiniError (via ConnectionError)
impl From<std::io::Error> for MiniError {
    fn from(e: std::io::Error) -> Self {
        MiniError::Connection(ConnectionError::Socket(e))
    }
}
