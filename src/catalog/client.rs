//! Catalog API client
//!
//! A thin typed wrapper over the remote layer/dataset catalog. The client is
//! an explicit context object constructed once from [`Config`] and threaded
//! through; requests carry its bearer token.

use crate::catalog::resource::{envelope_data, envelope_list, Dataset, Layer, Resource};
use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const TIMEOUT_SECONDS: u64 = 60;

/// The catalog operations the freeze workflow depends on; a seam so tests
/// can substitute an in-memory catalog.
pub trait LayerCatalog {
    /// Fetch a layer by id
    fn layer(&self, id: &str) -> Result<Layer>;

    /// Fetch a dataset by id
    fn dataset(&self, id: &str) -> Result<Dataset>;

    /// Create a new layer (the layer must not have an id yet)
    fn create_layer(&self, layer: &Layer) -> Result<Layer>;
}

/// Blocking HTTP client for the catalog API
pub struct CatalogClient {
    http: HttpClient,
    api_url: String,
    token: String,
}

impl CatalogClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Base URL this client talks to
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_url, endpoint.trim_matches('/'))
    }

    fn into_json(response: Response) -> Result<Value> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(Error::RemoteRequest {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self.url(endpoint);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()?;
        Self::into_json(response)
    }

    fn send_json(&self, method: Method, endpoint: &str, body: &Value) -> Result<Value> {
        let url = self.url(endpoint);
        debug!(%url, %method, "request");
        let response = self
            .http
            .request(method, &url)
            .bearer_auth(&self.token)
            .json(body)
            .send()?;
        Self::into_json(response)
    }

    /// Probe the auth-check endpoint; logs and returns false on failure
    /// rather than erroring, since some read paths work unauthenticated.
    pub fn check_auth(&self) -> bool {
        let base = self
            .api_url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .to_string();
        let url = format!("{}/auth/check-logged", base);
        let result = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .map_err(Error::from)
            .and_then(Self::into_json);
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "failed to authenticate");
                false
            }
        }
    }

    pub fn get_layer(&self, id: &str) -> Result<Layer> {
        let value = self.get_json(&format!("layer/{}", id), &[])?;
        Layer::from_envelope(&value)
    }

    pub fn get_dataset(&self, id: &str) -> Result<Dataset> {
        self.get_dataset_with(id, &[])
    }

    /// Fetch a dataset with embedded sub-resources, e.g. `includes=["layer"]`
    pub fn get_dataset_with(&self, id: &str, includes: &[&str]) -> Result<Dataset> {
        let mut query = Vec::new();
        if !includes.is_empty() {
            query.push(("includes", includes.join(",")));
        }
        let value = self.get_json(&format!("dataset/{}", id), &query)?;
        Dataset::from_envelope(&value)
    }

    /// Create `resource` on the catalog, returning the stored copy
    pub fn create<R: Resource>(&self, resource: &R) -> Result<R> {
        let value = self.send_json(
            Method::POST,
            &resource.mutate_endpoint()?,
            &resource.attributes_value()?,
        )?;
        R::from_data(envelope_data(&value)?)
    }

    /// Update `resource` on the catalog, returning the stored copy
    pub fn update<R: Resource>(&self, resource: &R) -> Result<R> {
        let value = self.send_json(
            Method::PATCH,
            &resource.mutate_endpoint()?,
            &resource.attributes_value()?,
        )?;
        R::from_data(envelope_data(&value)?)
    }

    /// Delete `resource` from the catalog; the resource must have an id
    pub fn delete<R: Resource>(&self, resource: &R) -> Result<()> {
        if resource.id().is_none() {
            return Err(Error::Resource(format!(
                "cannot delete a {} that has no id",
                resource.kind()
            )));
        }
        self.send_json(Method::DELETE, &resource.mutate_endpoint()?, &Value::Null)?;
        Ok(())
    }

    /// List layers, optionally filtered by application
    pub fn list_layers(&self, app: Option<&str>, published: bool, limit: u32) -> Result<Vec<Layer>> {
        let mut query = vec![("page[size]", limit.to_string())];
        if published {
            query.push(("published", "true".to_string()));
        }
        if let Some(app) = app {
            query.push(("app", app.to_string()));
        }
        let value = self.get_json("layer", &query)?;
        envelope_list(&value)?.iter().map(Layer::from_data).collect()
    }

    /// List datasets, optionally filtered by application
    pub fn list_datasets(
        &self,
        app: Option<&str>,
        published: bool,
        limit: u32,
    ) -> Result<Vec<Dataset>> {
        let mut query = vec![("page[size]", limit.to_string())];
        if published {
            query.push(("published", "true".to_string()));
        }
        if let Some(app) = app {
            query.push(("app", app.to_string()));
        }
        let value = self.get_json("dataset", &query)?;
        envelope_list(&value)?.iter().map(Dataset::from_data).collect()
    }
}

impl LayerCatalog for CatalogClient {
    fn layer(&self, id: &str) -> Result<Layer> {
        self.get_layer(id)
    }

    fn dataset(&self, id: &str) -> Result<Dataset> {
        self.get_dataset(id)
    }

    fn create_layer(&self, layer: &Layer) -> Result<Layer> {
        self.create(layer)
    }
}
