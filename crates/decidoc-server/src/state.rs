//! Shared application state for the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use decidoc_agent::{build_orchestrator, AnalysisToggles, Orchestrator};
use decidoc_batch::Coalescer;
use decidoc_core::config::Config;
use decidoc_core::directory::{Credentials, Directory};
use decidoc_core::sink::AnalysisLog;
use decidoc_providers::classifier::ClassifierClient;
use decidoc_providers::traits::ResponsesApi;
use decidoc_slack::SlackClient;

/// App state shared across routes. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<Directory>,
    pub classifier: Arc<ClassifierClient>,
    pub slack: Arc<SlackClient>,
    pub sink: Arc<dyn AnalysisLog>,
    pub coalescer: Coalescer,
    pub responses: Arc<dyn ResponsesApi>,
}

impl AppState {
    /// Assemble the state from loaded config and the externally constructed
    /// collaborators (directory, responses gateway, slack client, sink).
    pub fn new(
        config: Config,
        directory: Directory,
        responses: Arc<dyn ResponsesApi>,
        slack: SlackClient,
        sink: Arc<dyn AnalysisLog>,
    ) -> Self {
        let classifier = Arc::new(ClassifierClient::new(config.classifier.base_url.clone()));
        let coalescer = Coalescer::new(
            Duration::from_secs(config.batch.timeout_seconds),
            sink.clone(),
        );

        AppState {
            config: Arc::new(config),
            directory: Arc::new(directory),
            classifier,
            slack: Arc::new(slack),
            sink,
            coalescer,
            responses,
        }
    }

    /// Build a per-tenant orchestrator handle.
    ///
    /// Credentials are read fresh on every call (one per batch flush or
    /// direct analysis) — no long-lived cache.
    pub fn orchestrator_for(
        &self,
        credentials: &Credentials,
        toggles: AnalysisToggles,
    ) -> Arc<Orchestrator> {
        Arc::new(build_orchestrator(
            self.responses.clone(),
            &self.config.openai,
            &self.config.mcp,
            &self.config.analysis,
            credentials,
            toggles,
        ))
    }
}
