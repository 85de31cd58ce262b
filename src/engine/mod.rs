//! Entry point for an embedding UI: owns the dispatcher, the store, the
//! in-memory workspace and the cancel registry.

pub mod cancel;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collections::{Collection, TestCase, Workspace};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::http::client::Dispatcher;
use crate::http::normalize::normalize_dispatch;
use crate::http::request::RequestSpec;
use crate::http::response::ResponseRecord;
use crate::store::CollectionStore;
use crate::store::rest::RestStore;
use crate::store::sqlite::SqliteStore;
use crate::testing::runner::{BatchRunner, RunEvent, RunReport};
use crate::testing::{CaseRun, record_outcome};

use cancel::CancelRegistry;

pub struct Engine {
    dispatcher: Dispatcher,
    store: Box<dyn CollectionStore>,
    workspace: Workspace,
    cancels: CancelRegistry,
}

impl Engine {
    pub fn new(config: &EngineConfig, store: Box<dyn CollectionStore>) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(config)?,
            store,
            workspace: Workspace::default(),
            cancels: CancelRegistry::new(),
        })
    }

    /// Pick the store from the config: the REST backend when `backendUrl` is
    /// set, otherwise SQLite (in memory without `databasePath`).
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let store: Box<dyn CollectionStore> = match (&config.backend_url, &config.database_path) {
            (Some(_), _) => Box::new(RestStore::new(config)?),
            (None, Some(path)) => Box::new(SqliteStore::open(path)?),
            (None, None) => Box::new(SqliteStore::open_in_memory()?),
        };
        Self::new(config, store)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Handle for cancelling from another task while a call is outstanding.
    pub fn cancel_registry(&self) -> CancelRegistry {
        self.cancels.clone()
    }

    pub fn cancel(&self, id: &str) -> bool {
        self.cancels.cancel(id)
    }

    pub async fn load(&mut self) -> Result<()> {
        let collections = self.store.list_collections().await?;
        info!(count = collections.len(), "Workspace loaded");
        self.workspace = Workspace::new(collections);
        Ok(())
    }

    /// Send a plain request. `request_id` identifies it for [`Engine::cancel`].
    pub async fn send(&self, request_id: &str, spec: &RequestSpec) -> Result<ResponseRecord> {
        let mut guard = self.cancels.register(request_id)?;
        let dispatch = self.dispatcher.dispatch(spec, guard.receiver()).await;
        Ok(normalize_dispatch(&dispatch))
    }

    /// Dispatch one test case, write its result fields and persist them.
    ///
    /// The workspace is updated before the store is called, so a store error
    /// still leaves the fresh result visible in memory.
    pub async fn run_case(&mut self, case_id: &str) -> Result<CaseRun> {
        let case = self.case(case_id)?.clone();
        let mut guard = self.cancels.register(case_id)?;

        let dispatch = self.dispatcher.dispatch(&case.request, guard.receiver()).await;
        let run = record_outcome(&case, normalize_dispatch(&dispatch));
        self.workspace.replace_case(&run.case);

        if let Some(result) = run.case.result() {
            self.store.save_result(case_id, &result).await?;
        }
        Ok(run)
    }

    /// Run every case of a collection in order. Cancel with the collection id.
    pub async fn run_all(
        &mut self,
        collection_id: &str,
        events: Option<&UnboundedSender<RunEvent>>,
    ) -> Result<RunReport> {
        let mut guard = self.cancels.register(collection_id)?;
        let runner = BatchRunner::new(&self.dispatcher, self.store.as_ref());
        runner
            .run_all(&mut self.workspace, collection_id, guard.receiver(), events)
            .await
    }

    pub async fn create_collection(&mut self, name: &str) -> Result<Collection> {
        let collection = Collection::new(Uuid::new_v4().to_string(), name);
        self.store.create_collection(&collection).await?;
        self.workspace.upsert_collection(collection.clone());
        Ok(collection)
    }

    pub async fn rename_collection(&mut self, id: &str, name: &str) -> Result<()> {
        let renamed = self
            .workspace
            .collection(id)
            .ok_or_else(|| EngineError::not_found("Collection", id))?
            .renamed(name);
        self.store.rename_collection(id, name).await?;
        self.workspace.upsert_collection(renamed);
        Ok(())
    }

    pub async fn delete_collection(&mut self, id: &str) -> Result<()> {
        self.store.delete_collection(id).await?;
        self.workspace.remove_collection(id);
        Ok(())
    }

    /// Create a blank GET case at the end of the collection.
    pub async fn add_case(&mut self, collection_id: &str) -> Result<TestCase> {
        if self.workspace.collection(collection_id).is_none() {
            return Err(EngineError::not_found("Collection", collection_id));
        }
        let case = TestCase::new(Uuid::new_v4().to_string(), collection_id);
        self.store.create_case(collection_id, &case).await?;
        self.workspace.add_case(collection_id, case.clone());
        Ok(case)
    }

    /// In-memory edit; nothing is persisted until [`Engine::save_case`].
    pub fn update_case(&mut self, case: &TestCase) -> Result<()> {
        if self.workspace.replace_case(case) {
            Ok(())
        } else {
            Err(EngineError::not_found("Test case", &case.id))
        }
    }

    /// Validate and persist the full case. An unparseable string body aborts
    /// the save and leaves both the store and the workspace untouched.
    pub async fn save_case(&mut self, case_id: &str) -> Result<TestCase> {
        let case = self.case(case_id)?;
        let request = case.request.prepare_for_save().inspect_err(|err| {
            warn!(case_id, error = %err, "Refusing to save test case");
        })?;
        let case = case.with_request(request);

        self.store.update_case(&case).await?;
        self.workspace.replace_case(&case);
        Ok(case)
    }

    pub async fn delete_case(&mut self, case_id: &str) -> Result<()> {
        self.store.delete_case(case_id).await?;
        self.workspace.remove_case(case_id);
        Ok(())
    }

    fn case(&self, case_id: &str) -> Result<&TestCase> {
        self.workspace
            .find_case(case_id)
            .map(|(_, case)| case)
            .ok_or_else(|| EngineError::not_found("Test case", case_id))
    }
}
