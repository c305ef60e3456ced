/*!
 * Master bootstrap
 *
 * Builds the automaton and the services around it, and owns their
 * lifetimes.
 *
 * ```text
 *                 ┌──────────── ConfigManager ──(watch)──┐
 *                 │                                      ▼
 * GcSweeper ──► LocalHydra ──commit──► AutomatonInvoker ──► MasterAutomaton
 *                                            ▲
 * profiling ─────────────────────────────────┘
 * ```
 *
 * [`Bootstrap::new`] spawns the automaton task and must run inside a tokio
 * runtime.
 */

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use cellmaster_hydra::{AutomatonInvoker, HydraManager, LocalHydra, PeerStatus, PeriodicExecutor};
use cellmaster_object_server::{GcMetrics, GcSweeper};
use cellmaster_observability::{MetricsRegistry, PrometheusSensorBuffer};

use crate::automaton::MasterAutomaton;
use crate::config::MasterConfig;
use crate::config_manager::ConfigManager;
use crate::error::Result;
use crate::heartbeat::{self, HeartbeatRequest, HeartbeatResponse, JobScheduler};
use crate::mutation::MasterMutation;

pub type MasterHydra = LocalHydra<MasterAutomaton, MasterMutation>;

/// Prefix of every series exported by job tracker profiling
pub const PROFILING_PREFIX: &str = "cellmaster_job_tracker";

const PROFILING_PERIOD: Duration = Duration::from_secs(10);

pub struct Bootstrap {
    config: MasterConfig,
    config_manager: Arc<ConfigManager>,
    metrics: Arc<MetricsRegistry>,
    gc_metrics: GcMetrics,
    peer_status: Arc<PeerStatus>,
    invoker: AutomatonInvoker<MasterAutomaton>,
    automaton_task: Option<JoinHandle<MasterAutomaton>>,
    hydra: Arc<MasterHydra>,
    gc_sweeper: GcSweeper,
    profiler: PeriodicExecutor,
    config_watcher: Option<JoinHandle<()>>,
}

fn apply_mutation(automaton: &mut MasterAutomaton, mutation: &MasterMutation) {
    if let Err(e) = automaton.apply_mutation(mutation) {
        warn!(mutation = mutation.name(), error = %e, "Mutation rejected");
    }
}

async fn profile_once(
    invoker: &AutomatonInvoker<MasterAutomaton>,
    metrics: Arc<MetricsRegistry>,
) -> Result<()> {
    invoker
        .call(move |automaton| {
            let mut buffer = PrometheusSensorBuffer::new(&metrics, PROFILING_PREFIX);
            automaton.on_profiling(&mut buffer);
        })
        .await?;
    Ok(())
}

impl Bootstrap {
    /// Build a single-peer master that considers itself leader
    pub fn new(config: MasterConfig) -> Result<Self> {
        Self::with_peer_status(config, Arc::new(PeerStatus::leader()))
    }

    pub fn with_peer_status(config: MasterConfig, peer_status: Arc<PeerStatus>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsRegistry::new());
        let gc_metrics = GcMetrics::new();
        gc_metrics.register(&metrics)?;

        let automaton = MasterAutomaton::new(&config, peer_status.clone(), gc_metrics.clone())?;
        let (invoker, automaton_task) = AutomatonInvoker::spawn("master", automaton);
        let hydra = Arc::new(LocalHydra::new(
            invoker.clone(),
            peer_status.clone(),
            apply_mutation,
        ));

        info!(
            cell_tag = %config.cell.cell_tag(),
            secondary_cells = config.cell.secondary_cell_count(),
            "Master bootstrapped"
        );

        Ok(Self {
            config_manager: Arc::new(ConfigManager::new(config.dynamic_config())),
            gc_sweeper: GcSweeper::new(config.object_manager.gc_sweep_period()),
            profiler: PeriodicExecutor::new("profiling", PROFILING_PERIOD),
            config,
            metrics,
            gc_metrics,
            peer_status,
            invoker,
            automaton_task: Some(automaton_task),
            hydra,
            config_watcher: None,
        })
    }

    /// Start the GC sweeper, profiling and dynamic config delivery
    pub fn start(&mut self) {
        self.gc_sweeper.start::<MasterAutomaton, MasterMutation, MasterHydra>(
            self.invoker.clone(),
            self.hydra.clone(),
            self.gc_metrics.clone(),
            MasterAutomaton::gc,
        );

        let invoker = self.invoker.clone();
        let metrics = self.metrics.clone();
        self.profiler.start(move |_| {
            let invoker = invoker.clone();
            let metrics = metrics.clone();
            async move {
                if let Err(e) = profile_once(&invoker, metrics).await {
                    warn!(error = %e, "Profiling failed");
                }
            }
        });

        if self.config_watcher.is_none() {
            let mut subscription = self.config_manager.subscribe_config_changed();
            let invoker = self.invoker.clone();
            self.config_watcher = Some(tokio::spawn(async move {
                while let Some(config) = subscription.changed().await {
                    let applied = invoker
                        .call(move |automaton| automaton.on_config_changed(&config))
                        .await;
                    match applied {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!(error = %e, "Failed to apply dynamic config"),
                        Err(_) => break,
                    }
                }
            }));
        }

        info!(
            gc_sweep_period_ms = self.gc_sweeper.period().as_millis() as u64,
            "Master services started"
        );
    }

    /// Stop background services, then the automaton
    pub async fn stop(&mut self) {
        self.gc_sweeper.stop().await;
        self.profiler.stop().await;
        if let Some(watcher) = self.config_watcher.take() {
            watcher.abort();
        }

        self.invoker.stop();
        if let Some(task) = self.automaton_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Automaton task failed");
            }
        }
        info!("Master stopped");
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    pub fn invoker(&self) -> &AutomatonInvoker<MasterAutomaton> {
        &self.invoker
    }

    pub fn hydra(&self) -> &Arc<MasterHydra> {
        &self.hydra
    }

    pub fn peer_status(&self) -> &Arc<PeerStatus> {
        &self.peer_status
    }

    pub fn gc_metrics(&self) -> &GcMetrics {
        &self.gc_metrics
    }

    pub fn metrics_registry(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn metrics_text(&self) -> Result<String> {
        Ok(self.metrics.metrics_text()?)
    }

    /// Export job tracker sensors now rather than on the next tick
    pub async fn profile(&self) -> Result<()> {
        profile_once(&self.invoker, self.metrics.clone()).await
    }

    pub async fn commit(&self, mutation: MasterMutation) -> Result<()> {
        self.hydra.commit_mutation(mutation).await?;
        Ok(())
    }

    /// Wait until every zombie queued so far, and any queued meanwhile, is
    /// destroyed
    pub async fn collect_garbage(&self) -> Result<()> {
        let collected = self
            .invoker
            .call(|automaton| automaton.gc().collect())
            .await?;
        collected.await;
        Ok(())
    }

    pub async fn process_heartbeat(
        &self,
        request: HeartbeatRequest,
        mut scheduler: Box<dyn JobScheduler + Send>,
    ) -> Result<HeartbeatResponse> {
        self.invoker
            .call(move |automaton| {
                heartbeat::process_heartbeat(automaton, &request, scheduler.as_mut())
            })
            .await?
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        self.invoker
            .call(move |automaton| save_snapshot_to(automaton, &path))
            .await?
    }

    pub async fn load_snapshot(&self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        self.invoker
            .call(move |automaton| automaton.load(BufReader::new(file)))
            .await?
    }
}

fn save_snapshot_to(automaton: &MasterAutomaton, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = automaton.save(BufWriter::new(file))?;
    writer.flush()?;
    info!(path = %path.display(), "Snapshot saved");
    Ok(())
}
