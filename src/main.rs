use anyhow::{Context, Result};
use babble::Engine;
use babble::auth::crypto::encrypt_password_pem;
use babble::auth::{KeyPair, PasswordStore};
use babble::backup::BackupScheduler;
use babble::config::Config;
use babble::constants;
use babble::server::{self, AppState};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "babble", version, about = "Path-addressable JSON document store")]
struct Args {
    /// Directory holding data/, auth/ and backups/.
    #[arg(long, env = "BABBLE_ROOT", default_value = ".")]
    root: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    #[arg(long, env = "BABBLE_PORT", default_value_t = constants::DEFAULT_PORT)]
    port: u16,

    /// Reuse the key pair from a previous run instead of generating a new one.
    #[arg(long)]
    keep_keys: bool,

    /// Seconds between backup passes.
    #[arg(long, default_value_t = constants::BACKUP_INTERVAL.as_secs())]
    backup_interval: u64,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default).
    Serve,
    /// Encrypt a password for the x-babble-password header or a create request.
    Encrypt {
        /// The server's public key (auth/keys/public.pem).
        #[arg(long)]
        key: PathBuf,
        /// Read from stdin if omitted.
        password: Option<String>,
    },
}

impl Args {
    fn config(&self) -> Config {
        Config::new(&self.root)
            .with_keep_keys(self.keep_keys)
            .with_backup_interval(Duration::from_secs(self.backup_interval))
            .with_listen_addr(SocketAddr::new(self.bind, self.port))
    }
}

pub fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(Command::Encrypt { key, password }) = &args.command {
        return encrypt(key, password.as_deref());
    }

    init_logging(args.log_file.as_deref())?;

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .context("Could not create tokio runtime")?;

    let result = tokio_runtime.block_on(run(args.config()));
    tokio_runtime.shutdown_timeout(Duration::from_secs(10));
    result
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    // Accepted `RUST_LOG` values are `trace`, `debug`, `info`, `warn`, and `error`.
    let info_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Could not open log file {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };

    let subscriber = FmtSubscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(info_env_filter)
        .with_ansi(log_file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set trace subscriber")
}

async fn run(config: Config) -> Result<()> {
    let keys_dir = config.keys_dir.clone();
    let (bits, keep) = (config.rsa_key_bits, config.keep_keys);
    let keys = tokio::task::spawn_blocking(move || KeyPair::provision(keys_dir, bits, keep))
        .await??;
    let keys = Arc::new(keys);

    let passwords = PasswordStore::new(&config.passwords_dir, keys, config.bcrypt_cost)?;
    let engine = Arc::new(Engine::open(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Arc::new(BackupScheduler::from_config(Arc::clone(&engine), &config));
    let backups = scheduler.spawn(shutdown_rx.clone());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Could not bind {}", config.listen_addr))?;

    let mut server_shutdown = shutdown_rx;
    let shutdown = async move {
        let _ = server_shutdown.changed().await;
    };
    let server = tokio::spawn(server::serve(
        listener,
        AppState::new(engine, passwords),
        shutdown,
    ));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received ctrl-c, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for ctrl-c, shutting down"),
    }
    let _ = shutdown_tx.send(true);

    server.await??;
    backups.await?;
    Ok(())
}

fn encrypt(key: &Path, password: Option<&str>) -> Result<()> {
    let pem = std::fs::read_to_string(key)
        .with_context(|| format!("Could not read public key {}", key.display()))?;

    let password = match password {
        Some(password) => password.to_string(),
        None => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    println!("{}", encrypt_password_pem(&password, &pem)?);
    Ok(())
}
