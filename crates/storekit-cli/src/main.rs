#![forbid(unsafe_code)]

// Native-only tool. Workspace-wide `wasm32` builds still compile every member, so provide a stub
// `main` there.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::path::{Path, PathBuf};

    use anyhow::{bail, Context, Result};
    use clap::{Parser, Subcommand};
    use serde_json::{json, Value};
    use storekit::opfs::native::{NativeDirectory, ThreadWorkerSpawner};
    use storekit::{
        scenario, EntryBatch, OpfsAdapter, OpfsWorkerAdapter, StorageAdapter, StorageType,
        WorkerOptions,
    };
    use tracing_subscriber::EnvFilter;

    #[derive(Debug, Parser)]
    #[command(
        name = "storekit",
        about = "Drive the OPFS key/value adapters against a directory on disk"
    )]
    pub struct Args {
        /// Directory standing in for the origin-private root; one file per key.
        #[arg(long, env = "STOREKIT_ROOT", default_value = "./storekit-data")]
        root: PathBuf,

        /// `opfs` works on the calling thread; `opfs-worker` goes through a worker thread.
        #[arg(long, env = "STOREKIT_BACKEND", default_value = "opfs")]
        backend: StorageType,

        /// Per-request deadline for the worker, in milliseconds. 0 waits forever.
        #[arg(long, env = "STOREKIT_TIMEOUT_MS", default_value_t = 30_000)]
        timeout_ms: u64,

        /// `tracing` filter directive, e.g. `debug` or `storekit_opfs=trace`.
        #[arg(long, env = "STOREKIT_LOG", default_value = "warn")]
        log_level: String,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Debug, Subcommand)]
    enum Command {
        Has { key: String },
        Get { key: String },
        /// VALUE is parsed as JSON, falling back to a plain string.
        Set { key: String, value: String },
        Remove { key: String },
        Keys,
        Entries,
        /// JSON object or array of `[key, value]` pairs.
        SetMany { entries: String },
        GetMany {
            #[arg(required = true)]
            keys: Vec<String>,
        },
        RemoveMany {
            #[arg(required = true)]
            keys: Vec<String>,
        },
        /// Run the end-to-end scenario on both backends in scratch directories.
        Selftest,
    }

    pub async fn main() -> Result<()> {
        let args = Args::parse();

        let filter = EnvFilter::try_new(&args.log_level)
            .with_context(|| format!("invalid log filter `{}`", args.log_level))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();

        let worker_options = WorkerOptions {
            request_timeout_ms: (args.timeout_ms > 0).then_some(args.timeout_ms),
            ..WorkerOptions::default()
        };

        if let Command::Selftest = args.command {
            return selftest(&worker_options).await;
        }

        let store = open(args.backend, &args.root, &worker_options)?;
        let output = run(store.as_ref(), args.command).await?;
        println!("{output}");
        Ok(())
    }

    fn open(
        backend: StorageType,
        root: &Path,
        worker_options: &WorkerOptions,
    ) -> Result<Box<dyn StorageAdapter>> {
        let dir = NativeDirectory::new(root);
        Ok(match backend {
            StorageType::Opfs => Box::new(OpfsAdapter::new(dir)),
            StorageType::OpfsWorker => Box::new(OpfsWorkerAdapter::with_options(
                ThreadWorkerSpawner::new(dir),
                worker_options.clone(),
            )),
            other => bail!("backend `{other}` needs a browser; use `opfs` or `opfs-worker`"),
        })
    }

    fn parse_value(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
    }

    async fn run(store: &dyn StorageAdapter, command: Command) -> Result<Value> {
        Ok(match command {
            Command::Has { key } => json!(store.has(&key).await?),
            Command::Get { key } => store.get(&key).await?,
            Command::Set { key, value } => {
                store.set(&key, &parse_value(&value)).await?;
                json!(true)
            }
            Command::Remove { key } => {
                store.remove(&key).await?;
                json!(true)
            }
            Command::Keys => json!(store.keys().await?),
            Command::Entries => json!(store.entries().await?),
            Command::SetMany { entries } => {
                let entries: Value =
                    serde_json::from_str(&entries).context("set-many expects JSON")?;
                let batch = EntryBatch::try_from(entries)?;
                let all_ok = store.set_many(batch).await;
                if !all_ok {
                    bail!("set-many: at least one write failed");
                }
                json!(true)
            }
            Command::GetMany { keys } => json!(store.get_many(keys.into()).await?),
            Command::RemoveMany { keys } => {
                if !store.remove_many(keys.into()).await {
                    bail!("remove-many: at least one remove failed");
                }
                json!(true)
            }
            Command::Selftest => bail!("selftest does not run against --root"),
        })
    }

    async fn selftest(worker_options: &WorkerOptions) -> Result<()> {
        let mut report = serde_json::Map::new();
        let mut failed = false;
        for backend in [StorageType::Opfs, StorageType::OpfsWorker] {
            let scratch = tempfile::tempdir().context("creating scratch directory")?;
            let store = open(backend, scratch.path(), worker_options)?;
            let outcome = match scenario::run(store.as_ref()).await {
                Ok(()) => "pass".to_owned(),
                Err(err) => {
                    failed = true;
                    tracing::error!(%backend, error = %err, "scenario failed");
                    format!("fail: {err}")
                }
            };
            report.insert(backend.to_string(), Value::String(outcome));
        }
        println!("{}", Value::Object(report));
        if failed {
            bail!("selftest failed");
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    native::main().await
}
