//! counterd: run, seed, or poke the counter service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use atomic_counter::{
    handler, CounterBackend, CounterConfig, CounterHandler, CounterId, CounterStore,
    InMemoryCounterBackend, Invocation, MissingPolicy,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::fmt;

#[derive(Parser, Debug)]
#[command(author, version, about)]
/// Top-level options for counterd
struct Opts {
    /// Table / namespace holding the counter
    #[arg(long, env = "COUNTER_TABLE", default_value = "visitors")]
    table: String,

    /// Identifier of the counter inside the table
    #[arg(long, env = "COUNTER_ID", default_value_t = 0)]
    counter_id: u64,

    /// Storage backend
    #[arg(long, value_enum, env = "COUNTER_BACKEND", default_value_t = Backend::Memory)]
    backend: Backend,

    /// Database directory for the rocksdb backend
    #[arg(long, env = "COUNTER_ROCKSDB_PATH", default_value = "counter_data")]
    rocksdb_path: PathBuf,

    /// Timeout for each storage call, in milliseconds
    #[arg(long, default_value_t = 2_000)]
    op_timeout_ms: u64,

    /// Overall deadline for one increment, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    deadline_ms: u64,

    /// Maximum read-modify-write attempts per increment
    #[arg(long, default_value_t = CounterConfig::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Seed a missing counter on first increment instead of failing
    #[arg(long)]
    auto_seed: bool,

    /// Maximum log level: trace, debug, info, warn or error
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Memory,
    Rocksdb,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serve the counter over HTTP
    Serve {
        /// Address to bind
        #[arg(long, env = "COUNTER_BIND", default_value = "0.0.0.0:3000")]
        bind: String,

        /// Seed the counter before serving
        #[arg(long)]
        seed: bool,
    },
    /// Create the counter at zero if it does not exist
    Seed,
    /// Run one invocation and print the response envelope
    Increment,
}

impl Opts {
    fn config(&self) -> CounterConfig {
        let missing = if self.auto_seed {
            MissingPolicy::AutoSeed
        } else {
            MissingPolicy::Fail
        };

        CounterConfig::new(self.table.clone())
            .with_counter_id(CounterId(self.counter_id))
            .with_op_timeout(Duration::from_millis(self.op_timeout_ms))
            .with_deadline(Duration::from_millis(self.deadline_ms))
            .with_max_attempts(self.max_attempts)
            .with_missing_policy(missing)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    let subscriber = fmt::Subscriber::builder()
        .with_max_level(opts.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match opts.backend {
        Backend::Memory => run(InMemoryCounterBackend::new(), &opts).await,
        #[cfg(feature = "rocksdb")]
        Backend::Rocksdb => {
            let backend = atomic_counter::RocksDbCounterBackend::open(&opts.rocksdb_path)
                .with_context(|| format!("opening {}", opts.rocksdb_path.display()))?;
            run(backend, &opts).await
        }
        #[cfg(not(feature = "rocksdb"))]
        Backend::Rocksdb => bail!(
            "cannot open {}: counterd was built without the \"rocksdb\" feature",
            opts.rocksdb_path.display()
        ),
    }
}

async fn run<B: CounterBackend + 'static>(backend: B, opts: &Opts) -> Result<()> {
    let store = CounterStore::new(backend, opts.config());

    match &opts.cmd {
        Cmd::Serve { bind, seed } => {
            if *seed {
                let count = store.initialize().await.context("seeding counter")?;
                info!(key = store.key(), count, "counter ready");
            }

            let handler = Arc::new(CounterHandler::new(store));
            info!(addr = %bind, "serving counter");
            handler::serve(handler, bind)
                .await
                .with_context(|| format!("serving on {}", bind))
        }
        Cmd::Seed => {
            let count = store.initialize().await.context("seeding counter")?;
            println!("{}", count);
            Ok(())
        }
        Cmd::Increment => {
            let envelope = CounterHandler::new(store).handle(Invocation::new()).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.is_success() {
                bail!("increment failed with status {}", envelope.status_code);
            }
            Ok(())
        }
    }
}
