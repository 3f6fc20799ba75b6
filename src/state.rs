//! Application State
//!
//! The explicit service context: every handle is constructed once at
//! startup and passed through. No module-level singletons or lazy
//! globals.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::api::rate_limit::RateLimiter;
use crate::config::Config;
use crate::services::http::HttpGateway;
use crate::services::llm::{build_cascade, LlmCascade, TextGenerator};
use crate::services::providers::{build_sources, ProviderContext};
use crate::services::queue::{InProcessBroker, QueuePublisher};
use crate::services::workflow::{WorkflowDeps, WorkflowEngine};
use crate::storage::{CacheRepository, ReportsRepository, Storage, ThreadsRepository};
use crate::utils::error::AppResult;

pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<Storage>,
    pub gateway: Arc<HttpGateway>,
    pub cache: CacheRepository,
    pub reports: ReportsRepository,
    pub threads: ThreadsRepository,
    pub llm: Arc<LlmCascade>,
    pub engine: Arc<WorkflowEngine>,
    pub broker: Arc<InProcessBroker>,
    pub publisher: QueuePublisher,
    pub rate_limiter: RateLimiter,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the full service graph from configuration.
    pub fn build(config: Config) -> AppResult<Arc<Self>> {
        let config = Arc::new(config);
        let storage = Storage::open(&config);
        let gateway = Arc::new(HttpGateway::new(config.clone())?);

        let cache = CacheRepository::new(storage.clone());
        let reports = ReportsRepository::new(storage.clone());
        let threads = ThreadsRepository::new(storage.clone());

        let provider_ctx = ProviderContext::new(gateway.clone(), cache.clone(), config.clone());
        let sources = build_sources(&provider_ctx);
        let llm = Arc::new(build_cascade(&config, gateway.clone()));
        let generator: Arc<dyn TextGenerator> = llm.clone();

        let engine = WorkflowEngine::new(WorkflowDeps {
            config: config.clone(),
            sources,
            generator,
            reports: reports.clone(),
            threads: threads.clone(),
            global_search_permits: Arc::new(Semaphore::new(config.global_search_cap)),
            accept_degraded: false,
        });

        let broker = Arc::new(InProcessBroker::new(config.queue_max_delivery));
        let publisher = QueuePublisher::new(broker.clone());
        let rate_limiter = RateLimiter::new(config.rate_limits);

        Ok(Arc::new(Self {
            config,
            storage,
            gateway,
            cache,
            reports,
            threads,
            llm,
            engine,
            broker,
            publisher,
            rate_limiter,
            started_at: Instant::now(),
        }))
    }
}
