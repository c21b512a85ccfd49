//! Application wiring and command dispatch.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tandem_core::{RecordSchema, Result, SharedHandle};
use tandem_llm::create_llm_provider;
use tandem_rag::{Answer, AnswerComposer, RetrievalCache, spawn_sweeper};
use tandem_sync::{
    BackfillStats, ChangeFeedWatcher, DebounceHandler, DebounceScheduler, MemoryStore,
    PrimaryStore, Reindexer,
};
use tandem_vector::{
    CanonicalTextBuilder, Chunker, EmbeddingPipeline, VectorIndex, create_embedding_provider,
    create_vector_index,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, Command};
use crate::config::TandemConfig;
use crate::config_handlers;
use crate::http::{self, AppState};

// ============================================================================
// Services
// ============================================================================

/// Every long-lived component, built from one configuration.
pub struct Services {
    /// Effective configuration.
    pub config: TandemConfig,
    /// Lazily opened primary store.
    pub store: SharedHandle<dyn PrimaryStore>,
    /// Vector index.
    pub index: Arc<dyn VectorIndex>,
    /// Fetch, embed and write path.
    pub reindexer: Arc<Reindexer>,
    /// Answer path.
    pub composer: Arc<AnswerComposer>,
    /// Answer cache, shared with the composer.
    pub cache: Arc<RetrievalCache<Answer>>,
}

impl Services {
    /// Build every component. The store is opened on first use.
    pub async fn build(config: &TandemConfig) -> Result<Self> {
        let schema = RecordSchema::catalog();

        let seed_path = config.store.seed_path.clone().map(PathBuf::from);
        let store_schema = schema.clone();
        let store: SharedHandle<dyn PrimaryStore> = SharedHandle::new("primary-store", move || {
            let schema = store_schema.clone();
            let seed_path = seed_path.clone();
            async move {
                let store = MemoryStore::open(schema, seed_path.as_deref()).await?;
                Ok(Arc::new(store) as Arc<dyn PrimaryStore>)
            }
        });

        let provider = create_embedding_provider(&config.vector)?;
        let chunker = Chunker::new(config.vector.chunk_size, config.vector.chunk_overlap)?;
        let pipeline = EmbeddingPipeline::new(
            provider,
            Arc::new(CanonicalTextBuilder::new(schema.clone())),
            chunker,
        );
        let index = create_vector_index(&config.vector, pipeline.dimension()).await?;

        let reindexer = Arc::new(Reindexer::new(
            store.clone(),
            pipeline.clone(),
            Arc::clone(&index),
            schema,
        ));

        let llm = create_llm_provider(&config.generation)?;
        let cache = Arc::new(RetrievalCache::new(config.cache.ttl()));
        let composer = AnswerComposer::new(
            pipeline,
            Arc::clone(&index),
            llm,
            Arc::clone(&cache),
            config.answer.clone(),
        )
        .with_generation(&config.generation);

        tracing::info!(
            embedding = config.vector.provider.as_str(),
            index = index.name(),
            generation = config.generation.provider.as_str(),
            "services ready"
        );

        Ok(Self {
            config: config.clone(),
            store,
            index,
            reindexer,
            composer: Arc::new(composer),
            cache,
        })
    }

    /// Serve HTTP on `listener` with the watcher and cache sweeper running,
    /// until `shutdown` resolves or the watcher gives up.
    ///
    /// On the way out the background tasks are stopped, pending debounce
    /// timers dropped and the store handle closed.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);

        let debounce = Arc::new(DebounceScheduler::new(
            self.config.sync.debounce_delay(),
            Arc::clone(&self.reindexer) as Arc<dyn DebounceHandler>,
        ));
        let watcher = Arc::new(ChangeFeedWatcher::new(
            self.store.clone(),
            Arc::clone(&self.reindexer),
            Arc::clone(&debounce),
            self.config.sync.clone(),
        ));
        let watcher_stats = watcher.stats();

        let watcher_task = {
            let watcher = Arc::clone(&watcher);
            let rx = stop_rx.clone();
            let stop_tx = stop_tx.clone();
            tokio::spawn(async move {
                if let Err(err) = watcher.run(rx).await {
                    tracing::error!(error = %err, "change feed watcher gave up, shutting down");
                    let _ = stop_tx.send(true);
                }
            })
        };
        // Subscribe before the backfill so nothing written meanwhile is lost.
        let mut startup_stop = stop_rx.clone();
        tokio::select! {
            _ = watcher.wait_subscribed() => {}
            _ = startup_stop.wait_for(|stopped| *stopped) => {}
        }

        if self.config.sync.backfill_on_start && watcher.is_subscribed() {
            match self.reindexer.backfill().await {
                Ok(stats) => {
                    tracing::info!(indexed = stats.indexed, failed = stats.failed, "startup backfill done");
                }
                Err(err) => tracing::warn!(error = %err, "startup backfill failed"),
            }
        }

        let sweeper = spawn_sweeper(
            Arc::clone(&self.cache),
            self.config.cache.sweep_interval(),
            stop_rx.clone(),
        );

        let app = http::router(AppState {
            composer: Arc::clone(&self.composer),
            store: self.store.clone(),
            watcher: Some(watcher_stats),
        });
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "listening");
        }

        let mut server_stop = stop_rx.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown => tracing::info!("shutdown requested"),
                    _ = server_stop.wait_for(|stopped| *stopped) => {}
                }
            })
            .await;

        let _ = stop_tx.send(true);
        if let Err(err) = watcher_task.await {
            tracing::warn!(error = %err, "watcher task failed");
        }
        if let Err(err) = sweeper.await {
            tracing::warn!(error = %err, "cache sweeper task failed");
        }
        let dropped = debounce.shutdown();
        if dropped > 0 {
            tracing::info!(dropped, "pending re-embeds dropped at shutdown");
        }
        self.store.close().await?;

        served?;
        Ok(())
    }

    /// Embed every record in the store.
    pub async fn backfill(&self) -> Result<BackfillStats> {
        self.reindexer.backfill().await
    }
}

// ============================================================================
// TandemCli
// ============================================================================

/// The command-line application.
pub struct TandemCli {
    config: TandemConfig,
    version: String,
}

impl TandemCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = TandemConfig::load(args.config.as_deref())?;
        Ok(Self::new(config))
    }

    /// Create from an already loaded configuration.
    pub fn new(config: TandemConfig) -> Self {
        Self {
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The effective configuration.
    pub fn config(&self) -> &TandemConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity flags.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // A subscriber may already be set (e.g. in tests).
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        match args.command {
            Some(Command::Serve { host, port }) => {
                let mut config = self.config.clone();
                if let Some(host) = host {
                    config.server.host = host;
                }
                if let Some(port) = port {
                    config.server.port = port;
                }
                let listener = TcpListener::bind(config.server.bind_address()).await?;
                let services = Services::build(&config).await?;
                services.serve(listener, ctrl_c()).await
            }
            Some(Command::Ask { query, json }) => {
                let services = Services::build(&self.config).await?;
                services.backfill().await?;
                let answer = services.composer.answer(&query.join(" ")).await;
                services.store.close().await?;
                let answer = answer?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&answer)?);
                } else {
                    println!("{}", answer.answer);
                }
                Ok(())
            }
            Some(Command::Index) => {
                let services = Services::build(&self.config).await?;
                let stats = services.backfill().await;
                services.store.close().await?;
                let stats = stats?;
                println!(
                    "indexed {} record(s), {} skipped, {} failed",
                    stats.indexed, stats.skipped, stats.failed
                );
                Ok(())
            }
            Some(Command::Version) => {
                println!("tandem {}", self.version);
                Ok(())
            }
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            None => {
                println!("tandem {}, use --help for usage", self.version);
                Ok(())
            }
        }
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;
    use tandem_core::{Scalar, SourceRecord};

    fn seed_file(dir: &tempfile::TempDir) -> String {
        let records = vec![
            SourceRecord::new("car-1")
                .with_field("name", "Corolla")
                .with_field("brand", "Toyota")
                .with_field("category", "sedan")
                .with_field("description", "Reliable compact sedan")
                .with_field("price", 20000i64)
                .with_field("in_stock", true),
            SourceRecord::new("car-2")
                .with_field("name", "F-150")
                .with_field("brand", "Ford")
                .with_field("category", "truck")
                .with_field("price", 45000i64)
                .with_field("in_stock", false),
        ];
        let path = dir.path().join("cars.json");
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn config_with_seed(seed: String) -> TandemConfig {
        let mut config = TandemConfig::default();
        config.store.seed_path = Some(seed);
        config.sync.debounce_ms = 50;
        config.sync.reconnect_delay_ms = 10;
        config
    }

    #[tokio::test]
    async fn test_services_backfill_and_answer() {
        let dir = tempfile::TempDir::new().unwrap();
        let services = Services::build(&config_with_seed(seed_file(&dir)))
            .await
            .unwrap();

        let stats = services.backfill().await.unwrap();
        assert_eq!(stats.indexed, 2);
        assert_eq!(services.index.count().await.unwrap(), 2);

        let answer = services
            .composer
            .answer("Do you have a Toyota Corolla?")
            .await
            .unwrap();
        assert!(answer.answer.contains("Corolla"));
        assert!(answer.answer.contains("Toyota"));
        assert!(answer.answer.contains("$20,000"));

        services.store.close().await.unwrap();
        assert!(services.store.get().await.is_err());
    }

    #[tokio::test]
    async fn test_serve_indexes_store_writes_and_shuts_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let services = Services::build(&config_with_seed(seed_file(&dir)))
            .await
            .unwrap();
        let store = services.store.clone();
        let index = Arc::clone(&services.index);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(services.serve(listener, async {
            let _ = stopped.await;
        }));

        // Startup backfill.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(index.count().await.unwrap(), 2);

        let fields = [
            ("name", Scalar::from("Civic")),
            ("brand", Scalar::from("Honda")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        store
            .get()
            .await
            .unwrap()
            .insert(Some("car-3".into()), fields)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(index.count().await.unwrap(), 3);

        stop.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert!(!store.is_open());
    }

    #[tokio::test]
    async fn test_run_version_and_config_path() {
        let cli = TandemCli::new(TandemConfig::default());
        cli.run(CliArgs::parse_from(["tandem", "version"]))
            .await
            .unwrap();
        cli.run(CliArgs::parse_from(["tandem", "--config", "/tmp/none.toml", "config", "path"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_index_and_ask() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = TandemCli::new(config_with_seed(seed_file(&dir)));
        cli.run(CliArgs::parse_from(["tandem", "index"]))
            .await
            .unwrap();
        cli.run(CliArgs::parse_from(["tandem", "ask", "--json", "cheap", "truck"]))
            .await
            .unwrap();
    }

    #[test]
    fn test_from_args_missing_file_uses_defaults() {
        let args = CliArgs::parse_from(["tandem", "--config", "/nonexistent/tandem.toml"]);
        let cli = TandemCli::from_args(&args).unwrap();
        assert_eq!(cli.config().server.port, 3000);
    }
}
