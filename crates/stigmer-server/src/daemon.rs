//! Daemon bring-up, serving, and graceful shutdown.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use stigmer_config::{Config, StigmerHome};
use stigmer_controllers::ControllerDeps;
use stigmer_core::{IdGenerator, SystemClock};
use stigmer_crypto::{SecretBox, resolve_key};
use stigmer_fabric::{Controllers, DownstreamClients, KindStampLayer, Loopback, RequestLogLayer};
use stigmer_orchestration::activities::{
    AgentExecutionActivities, SystemActivities, WorkflowExecutionActivities,
};
use stigmer_orchestration::{
    LocalEngine, TemporalConfig, WorkerRegistry, WorkflowCreator, WorkflowValidation, workflows,
};
use stigmer_store::SledKvStore;
use stigmer_supervisor::{ComponentSpec, Probe, ProbeTarget, Supervisor};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};

/// Fatal daemon errors, mapped to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration or scaffolding failure (exit 1).
    #[error("configuration: {0}")]
    Config(String),

    /// The daemon lock is held by another live process (exit 2).
    #[error("another stigmer-server instance holds the daemon lock (pid file: {0})")]
    LockHeld(String),

    /// The gRPC port could not be bound (exit 3).
    #[error("failed to bind gRPC port {port}: {source}")]
    Bind {
        /// Port requested.
        port: u16,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Any other startup failure (exit 1).
    #[error("startup: {0}")]
    Startup(String),
}

impl DaemonError {
    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::Config(_) | DaemonError::Startup(_) => 1,
            DaemonError::LockHeld(_) => 2,
            DaemonError::Bind { .. } => 3,
        }
    }
}

/// The running daemon.
pub struct Daemon {
    /// The controller set (shared with both listeners).
    pub controllers: Controllers,
    /// Loopback channel, also handed to orchestration activities.
    pub loopback: tonic::transport::Channel,
    /// Subprocess supervisor.
    pub supervisor: Supervisor,
    /// Bound TCP address.
    pub tcp_addr: SocketAddr,
    store: SledKvStore,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    // Held for the daemon's lifetime; the OS frees it on death.
    _lock: std::fs::File,
}

impl Daemon {
    /// Bring the daemon up. See the module docs for the mandatory
    /// ordering.
    ///
    /// # Errors
    ///
    /// Returns a [`DaemonError`] carrying the exit code contract:
    /// 1 fatal config, 2 lock held, 3 port bind.
    pub async fn start(config: Config) -> Result<Daemon, DaemonError> {
        // Scaffolding and the daemon lock.
        let home = StigmerHome::from_config(&config);
        home.ensure().map_err(|e| DaemonError::Config(e.to_string()))?;

        let own_paths = home.component("stigmer-server");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&own_paths.lock_file)
            .map_err(|e| DaemonError::Config(e.to_string()))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(DaemonError::LockHeld(
                own_paths.pid_file.display().to_string(),
            ));
        }
        std::fs::write(&own_paths.pid_file, std::process::id().to_string())
            .map_err(|e| DaemonError::Config(e.to_string()))?;

        // Store and secrets.
        let store = SledKvStore::open(home.store_path())
            .map_err(|e| DaemonError::Startup(format!("opening store: {e}")))?;
        let key = resolve_key(
            config.encryption_key.as_deref(),
            &home.encryption_key_path(),
        )
        .map_err(|e| DaemonError::Config(format!("encryption key: {e}")))?;
        let secrets = Arc::new(SecretBox::new(&key));

        // Controllers, without downstream clients yet.
        let deps = ControllerDeps::new(
            Arc::new(store.clone()),
            Arc::new(IdGenerator::new()),
            Arc::new(SystemClock),
        );
        let controllers = Controllers::new(&deps, &secrets);

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = Vec::new();

        // Loopback server first: clients cannot dial until it consumes
        // connections.
        let (loopback, incoming) = Loopback::new();
        {
            let routes = controllers.routes();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                let result = Server::builder()
                    .layer(RequestLogLayer::new())
                    .layer(KindStampLayer::new())
                    .add_routes(routes)
                    .serve_with_incoming_shutdown(incoming, async move {
                        let _ = shutdown_rx.recv().await;
                    })
                    .await;
                if let Err(err) = result {
                    warn!(error = %err, "loopback server exited");
                }
            }));
        }

        let channel = loopback
            .dial()
            .await
            .map_err(|e| DaemonError::Startup(format!("dialling loopback: {e}")))?;
        let clients = DownstreamClients::new(channel.clone());
        clients.inject(&controllers);

        // Orchestration: registry, engine, workers, creators.
        let temporal = TemporalConfig {
            address: config.temporal.address.clone(),
            namespace: config.temporal.namespace.clone(),
            ..TemporalConfig::default()
        };
        let registry = WorkerRegistry::new();
        let engine = LocalEngine::new(registry.clone());

        workflows::register_execution_workflow(&registry, workflows::AGENT_EXECUTION);
        workflows::register_execution_workflow(&registry, workflows::WORKFLOW_EXECUTION);
        workflows::register_validation_workflow(&registry);
        AgentExecutionActivities::new(channel.clone()).register(&registry);
        WorkflowExecutionActivities::new(channel.clone()).register(&registry);
        SystemActivities::new(Arc::new(engine.clone())).register(&registry);

        let service: Arc<dyn stigmer_orchestration::WorkflowService> = Arc::new(engine.clone());
        controllers
            .agent_execution
            .set_workflow_creator(Arc::new(WorkflowCreator::agent_execution(
                Arc::clone(&service),
                temporal.clone(),
            )));
        controllers
            .workflow_execution
            .set_workflow_creator(Arc::new(WorkflowCreator::workflow_execution(
                Arc::clone(&service),
                temporal.clone(),
            )));
        let validation = Arc::new(WorkflowValidation::new(Arc::clone(&service), temporal));
        controllers.workflow.set_spec_validator(validation.clone());
        controllers
            .workflow_execution
            .set_spec_validator(validation);

        // TCP listener only after the internal wiring is complete.
        let bind_addr: SocketAddr = ([0, 0, 0, 0], config.grpc_port).into();
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| DaemonError::Bind {
                port: config.grpc_port,
                source,
            })?;
        let tcp_addr = listener
            .local_addr()
            .map_err(|source| DaemonError::Bind {
                port: config.grpc_port,
                source,
            })?;
        {
            let routes = controllers.routes();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                let result = Server::builder()
                    .layer(RequestLogLayer::new())
                    .layer(KindStampLayer::new())
                    .add_routes(routes)
                    .serve_with_incoming_shutdown(
                        TcpListenerStream::new(listener),
                        async move {
                            let _ = shutdown_rx.recv().await;
                        },
                    )
                    .await;
                if let Err(err) = result {
                    warn!(error = %err, "tcp server exited");
                }
            }));
        }
        info!(addr = %tcp_addr, "gRPC listener up");

        // Supervisor for the managed runners (dev overrides only).
        let supervisor = Supervisor::new();
        if let Some(runner) = &config.supervisor.workflow_runner_bin {
            register_runner(
                &supervisor,
                &home,
                "workflow-runner",
                &runner.display().to_string(),
            )
            .await;
        }
        if let Some(script) = &config.supervisor.agent_runner_script {
            register_runner(
                &supervisor,
                &home,
                "agent-runner",
                &script.display().to_string(),
            )
            .await;
        }
        tasks.push(abort_on_shutdown(
            supervisor.spawn_watchdog(),
            shutdown_tx.subscribe(),
        ));

        // ExecutionContext TTL sweeper (backstop for the 24 h TTL).
        tasks.push(crate::sweeper::spawn(
            Arc::new(store.clone()),
            channel.clone(),
            shutdown_tx.subscribe(),
        ));

        Ok(Daemon {
            controllers,
            loopback: channel,
            supervisor,
            tcp_addr,
            store,
            shutdown_tx,
            tasks,
            _lock: lock,
        })
    }

    /// Graceful shutdown in reverse bring-up order.
    pub async fn shutdown(self) {
        info!("shutting down");
        let _ = self.shutdown_tx.send(());
        self.supervisor.shutdown().await;

        for task in self.tasks {
            // Give each task a moment to drain, then drop it.
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }

        if let Err(err) = self.store.flush() {
            warn!(error = %err, "store flush on shutdown failed");
        }
        info!("shutdown complete");
    }
}

async fn register_runner(supervisor: &Supervisor, home: &StigmerHome, name: &str, program: &str) {
    let spec = ComponentSpec {
        name: name.to_string(),
        program: program.to_string(),
        args: Vec::new(),
        startup: Probe::new(ProbeTarget::Process, Duration::from_secs(10), 1),
        liveness: Probe::new(ProbeTarget::Process, Duration::from_secs(10), 1),
        readiness: None,
    };
    if let Err(err) = supervisor.register(spec, home.component(name)).await {
        warn!(component = name, error = %err, "failed to start managed runner");
    }
}

fn abort_on_shutdown(
    task: tokio::task::JoinHandle<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let _ = shutdown_rx.recv().await;
        task.abort();
    })
}
