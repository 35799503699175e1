//! Execution-engine client
//!
//! Typed wrapper over the remote service that runs SQL and manages physical
//! tables. The workflow only needs a handful of operations, expressed as the
//! [`SqlExecutor`] trait so tests can run against an in-memory engine.

use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

const TIMEOUT_SECONDS: u64 = 300;

/// Table visibility levels the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privacy {
    /// Visible to anyone holding the link
    Link,
    Private,
    Public,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Link => "LINK",
            Privacy::Private => "PRIVATE",
            Privacy::Public => "PUBLIC",
        }
    }
}

/// Operations the freeze workflow needs from the execution engine
#[cfg_attr(test, automock)]
pub trait SqlExecutor {
    /// Whether `table` exists and is queryable
    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Drop `table`
    fn drop_table(&self, table: &str) -> Result<()>;

    /// Materialize `query` into a new table named `table`
    fn create_table_from_query(&self, table: &str, query: &str) -> Result<()>;

    /// Set the visibility of `table`
    fn set_privacy(&self, table: &str, privacy: Privacy) -> Result<()>;

    /// List the engine's dataset catalog; refreshing it nudges the engine
    /// into recognizing freshly created tables
    fn refresh_datasets(&self) -> Result<()>;

    /// Values of one column as text, newest-first when ordered; the CSV
    /// header row is already stripped
    fn field_values(
        &self,
        field: &str,
        table: &str,
        order: Option<String>,
        limit: Option<u32>,
    ) -> Result<Vec<String>>;
}

/// Blocking HTTP implementation of [`SqlExecutor`]
pub struct HttpExecutor {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl HttpExecutor {
    pub fn new(config: &Config) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            http,
            base_url: config.exec_url.trim_end_matches('/').to_string(),
            api_key: config.exec_key.clone(),
        })
    }

    fn check(response: Response) -> Result<String> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(Error::RemoteRequest {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn run_sql(&self, statement: &str) -> Result<String> {
        debug!(%statement, "running statement");
        let url = format!("{}/v2/sql", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[("q", statement), ("api_key", self.api_key.as_str())])
            .send()?;
        Self::check(response)
    }

    fn run_sql_csv(&self, statement: &str) -> Result<String> {
        debug!(%statement, "running csv statement");
        let url = format!("{}/v2/sql", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("q", statement), ("format", "csv"), ("api_key", self.api_key.as_str())])
            .send()?;
        Self::check(response)
    }
}

impl SqlExecutor for HttpExecutor {
    fn table_exists(&self, table: &str) -> Result<bool> {
        // a failed probe means the engine cannot see the table
        match self.run_sql(&format!("select 1 from {} limit 0", table)) {
            Ok(_) => Ok(true),
            Err(Error::RemoteRequest { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        self.run_sql(&format!("drop table {}", table))?;
        Ok(())
    }

    fn create_table_from_query(&self, table: &str, query: &str) -> Result<()> {
        self.run_sql(&format!("create table {} as {}", table, query))?;
        Ok(())
    }

    fn set_privacy(&self, table: &str, privacy: Privacy) -> Result<()> {
        let url = format!("{}/v1/datasets/{}/privacy", self.base_url, table);
        let response = self
            .http
            .put(&url)
            .query(&[("api_key", &self.api_key)])
            .json(&json!({ "privacy": privacy.as_str() }))
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn refresh_datasets(&self) -> Result<()> {
        let url = format!("{}/v1/datasets", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("api_key", &self.api_key)])
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn field_values(
        &self,
        field: &str,
        table: &str,
        order: Option<String>,
        limit: Option<u32>,
    ) -> Result<Vec<String>> {
        let mut statement = format!("select {} from {}", field, table);
        if let Some(order) = order {
            statement.push_str(&format!(" order by {}", order));
        }
        if let Some(limit) = limit {
            statement.push_str(&format!(" limit {}", limit));
        }
        let csv = self.run_sql_csv(&statement)?;
        // first line is the CSV header
        Ok(csv.lines().skip(1).map(str::to_string).collect())
    }
}
