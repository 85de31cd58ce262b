use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collections::{CaseResult, Collection, RequestGroup, SavedRequest, TestCase};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::http::method::HttpMethod;

use super::CollectionStore;

const COLLECTIONS_PATH: &str = "/published-records";
const CASES_PATH: &str = "/ai-test-cases";
const GROUPS_PATH: &str = "/groups";
const REQUESTS_PATH: &str = "/api-requests";

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    data: ListData<T>,
}

#[derive(Debug, Deserialize)]
struct ListData<T> {
    #[serde(default = "Vec::new")]
    records: Vec<T>,
}

#[derive(Serialize)]
struct NamedRecord<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct NewCase<'a> {
    id: &'a str,
    publish_id: &'a str,
    test_case_name: &'a str,
    method: HttpMethod,
}

#[derive(Serialize)]
struct ResultUpdate<'a> {
    id: &'a str,
    #[serde(flatten)]
    result: &'a CaseResult,
}

/// Client for the REST backend that owns collections and test cases.
///
/// All calls go to `{backendUrl}/v1` with the configured bearer token.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestStore {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let base_url = config
            .backend_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| EngineError::Config {
                message: "backendUrl is required for the REST store".to_string(),
            })?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|err| EngineError::Config {
            message: format!("Failed to build backend client: {err}"),
        })?;

        Ok(Self {
            client,
            base_url: format!("{base_url}/v1"),
            token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|err| EngineError::backend(context, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(context, status = status.as_u16(), body = %body, "Backend call rejected");
            return Err(EngineError::backend(context, format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    async fn list<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<Vec<T>> {
        let builder = self
            .request(Method::GET, path)
            .query(&[("page", "1"), ("perPage", "-1")]);
        let envelope: ListEnvelope<T> = self
            .send(builder, context)
            .await?
            .json()
            .await
            .map_err(|err| EngineError::backend(context, err))?;
        Ok(envelope.data.records)
    }

    pub async fn list_groups(&self) -> Result<Vec<RequestGroup>> {
        self.list(GROUPS_PATH, "listing request groups").await
    }

    /// Persist a saved request in full. A string body must be valid JSON.
    pub async fn update_request(&self, request: &SavedRequest) -> Result<()> {
        let request = SavedRequest {
            request: request.request.prepare_for_save()?,
            ..request.clone()
        };
        let builder = self.request(Method::PUT, REQUESTS_PATH).json(&request);
        self.send(builder, "saving request").await?;
        Ok(())
    }
}

#[async_trait]
impl CollectionStore for RestStore {
    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let collections: Vec<Collection> =
            self.list(COLLECTIONS_PATH, "listing collections").await?;
        debug!(count = collections.len(), "Loaded collections from backend");
        Ok(collections)
    }

    async fn create_collection(&self, collection: &Collection) -> Result<()> {
        let builder = self.request(Method::POST, COLLECTIONS_PATH).json(&NamedRecord {
            id: &collection.id,
            name: &collection.name,
        });
        self.send(builder, "creating collection").await?;
        Ok(())
    }

    async fn rename_collection(&self, id: &str, name: &str) -> Result<()> {
        let builder = self
            .request(Method::PUT, COLLECTIONS_PATH)
            .json(&NamedRecord { id, name });
        self.send(builder, "renaming collection").await?;
        Ok(())
    }

    async fn delete_collection(&self, id: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("{COLLECTIONS_PATH}/{id}"));
        self.send(builder, "deleting collection").await?;
        Ok(())
    }

    async fn create_case(&self, collection_id: &str, case: &TestCase) -> Result<()> {
        let builder = self.request(Method::POST, CASES_PATH).json(&NewCase {
            id: &case.id,
            publish_id: collection_id,
            test_case_name: &case.test_case_name,
            method: case.request.method,
        });
        self.send(builder, "creating test case").await?;
        Ok(())
    }

    async fn update_case(&self, case: &TestCase) -> Result<()> {
        let builder = self.request(Method::PUT, CASES_PATH).json(case);
        self.send(builder, "saving test case").await?;
        Ok(())
    }

    async fn save_result(&self, case_id: &str, result: &CaseResult) -> Result<()> {
        let builder = self.request(Method::PUT, CASES_PATH).json(&ResultUpdate {
            id: case_id,
            result,
        });
        self.send(builder, "saving test result").await?;
        Ok(())
    }

    async fn delete_case(&self, id: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("{CASES_PATH}/{id}"));
        self.send(builder, "deleting test case").await?;
        Ok(())
    }
}
