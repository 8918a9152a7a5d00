use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use minidb_common::{
    DEFAULT_DUMP_PATH, DEFAULT_HOST, DEFAULT_PORT, MAX_CONNECTIONS, PersistenceError,
};
use minidb_server::{Connection, handle_connection};
use minidb_storage::{Db, load_snapshot};

#[derive(Parser, Debug)]
#[command(name = "minidb-server", about = "MiniDB — in-memory key/value store")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
    /// Arquivo de snapshot: carregado no boot, gravado pelo SAVE
    #[arg(long, value_name = "FILE", default_value = DEFAULT_DUMP_PATH)]
    dump: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minidb_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let db = Db::new();

    // Rehidratar o keyspace antes de aceitar tráfego
    match load_snapshot(&db, &args.dump).await {
        Ok(0) => {}
        Ok(count) => info!("{count} entradas restauradas do snapshot"),
        Err(e @ PersistenceError::ChecksumMismatch { .. }) => {
            // Arquivo presente mas corrompido: recusar a descartar
            // dados silenciosamente
            anyhow::bail!("snapshot corrompido em {}: {e}", args.dump.display());
        }
        Err(e) => {
            warn!("falha ao carregar snapshot ({e}); iniciando com keyspace vazio");
        }
    }

    let listener = TcpListener::bind(&addr).await?;
    info!("MiniDB escutando em {addr}");

    let dump_path = Arc::new(args.dump);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(args.max_connections));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    loop {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit.unwrap(),
            _ = signal::ctrl_c() => {
                info!("shutdown signal recebido");
                break;
            }
        };

        let (socket, addr) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(v) => v,
                    Err(e) => {
                        error!("erro ao aceitar conexão: {e}");
                        continue;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal recebido");
                break;
            }
        };

        info!("nova conexão: {addr}");
        let db = db.clone();
        let dump_path = dump_path.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let conn = Connection::new(socket);
            if let Err(e) = handle_connection(conn, db, dump_path, &mut shutdown_rx).await {
                error!("erro na conexão {addr}: {e}");
            }
            info!("conexão encerrada: {addr}");
            drop(permit);
        });
    }

    drop(shutdown_tx);
    db.shutdown();

    Ok(())
}
