//! Main application state shared by every request

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::path::DocPath;
use crate::core::store::{ContentStore, FsContentStore};
use crate::error::PatchError;
use crate::patch::cancel::TokenRegistry;
use crate::patch::generator::EditPlanGenerator;
use crate::patch::naming::document_path_for_request;
use crate::patch::orchestrator::{EditOrchestrator, EditProposal};
use crate::patch;

/// Proposals older than this are dropped instead of applied
const PENDING_TTL: Duration = Duration::from_secs(60 * 60);

/// Main application state
pub struct DocpatchApp {
    /// Application configuration
    pub config: AppConfig,
    /// Edit flow over the store and the generator
    pub orchestrator: Arc<EditOrchestrator>,
    /// In-flight edit requests
    pub tokens: TokenRegistry,
    /// Generated proposals awaiting confirmation
    pending: Mutex<HashMap<Uuid, (Instant, EditProposal)>>,
}

impl DocpatchApp {
    /// Build the application from configuration.
    ///
    /// `config.workspace.root` must already be absolute.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let store = FsContentStore::open(&config.workspace.root, config.workspace.read_cache)?;
        let generator = patch::build_generator(&config.generator)?;
        Ok(Self::new(config, Arc::new(store), generator))
    }

    pub fn new(
        config: AppConfig,
        store: Arc<dyn ContentStore>,
        generator: Arc<dyn EditPlanGenerator>,
    ) -> Self {
        Self {
            config,
            orchestrator: Arc::new(EditOrchestrator::new(store, generator)),
            tokens: TokenRegistry::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        self.orchestrator.store()
    }

    /// Path for an edit: the given one, or one derived from the request text.
    ///
    /// The flag is set when the path was derived; such requests always create.
    pub fn target_path(
        &self,
        path: Option<&str>,
        change_request: &str,
    ) -> Result<(DocPath, bool), PatchError> {
        match path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => Ok((DocPath::parse(raw)?, false)),
            None => {
                let dir = &self.config.workspace.new_document_dir;
                Ok((document_path_for_request(dir, change_request)?, true))
            }
        }
    }

    /// Keep a proposal until it is applied or discarded.
    pub fn hold_proposal(&self, proposal: EditProposal) -> Uuid {
        let id = Uuid::new_v4();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|_, (created, _)| created.elapsed() < PENDING_TTL);
        pending.insert(id, (Instant::now(), proposal));
        id
    }

    /// Remove and return a live proposal.
    pub fn take_proposal(&self, id: Uuid) -> Option<EditProposal> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let (created, proposal) = pending.remove(&id)?;
        (created.elapsed() < PENDING_TTL).then_some(proposal)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
