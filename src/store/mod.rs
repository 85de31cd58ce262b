pub mod rest;
pub mod sqlite;

use async_trait::async_trait;

use crate::collections::{CaseResult, Collection, TestCase};
use crate::error::Result;

/// Persistence boundary for collections and their test cases.
///
/// Updates always carry the full value. Deleting a collection is expected to
/// take its cases with it.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<Collection>>;

    async fn create_collection(&self, collection: &Collection) -> Result<()>;

    async fn rename_collection(&self, id: &str, name: &str) -> Result<()>;

    async fn delete_collection(&self, id: &str) -> Result<()>;

    async fn create_case(&self, collection_id: &str, case: &TestCase) -> Result<()>;

    async fn update_case(&self, case: &TestCase) -> Result<()>;

    async fn save_result(&self, case_id: &str, result: &CaseResult) -> Result<()>;

    async fn delete_case(&self, id: &str) -> Result<()>;
}
