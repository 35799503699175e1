//! End-to-end freeze workflow tests over in-memory catalog and engine fakes

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use layer_freeze::catalog::{Dataset, Layer, LayerCatalog};
use layer_freeze::error::{Error, Result};
use layer_freeze::exec::{Privacy, SqlExecutor};
use layer_freeze::freeze::{freeze_layer, frozen_table_name, FreezeRequest, SQL_PROVIDER};
use layer_freeze::time::TimeRange;
use proptest::prelude::*;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::time::Duration;

fn layer_fixture(provider: &str) -> Layer {
    Layer::from_envelope(&json!({
        "data": {
            "id": "lyr-1",
            "type": "layer",
            "attributes": {
                "name": "Air quality",
                "slug": "air-quality",
                "dataset": "ds-1",
                "application": ["rw"],
                "provider": provider,
                "published": true,
                "layerConfig": {
                    "body": {
                        "layers": [{
                            "options": {
                                "sql": "select * from air_quality where utc_time >= '2019-01-01' and region = 'x'"
                            }
                        }]
                    }
                }
            }
        }
    }))
    .unwrap()
}

fn dataset_fixture() -> Dataset {
    Dataset::from_envelope(&json!({
        "data": {
            "id": "ds-1",
            "type": "dataset",
            "attributes": {
                "name": "Air quality stations",
                "tableName": "air_quality",
                "mainDateField": "utc_time",
                "provider": "cartodb"
            }
        }
    }))
    .unwrap()
}

struct FakeCatalog {
    layer: Layer,
    dataset: Option<Dataset>,
    created: RefCell<Vec<Layer>>,
}

impl FakeCatalog {
    fn new(layer: Layer, dataset: Option<Dataset>) -> Self {
        Self {
            layer,
            dataset,
            created: RefCell::new(Vec::new()),
        }
    }
}

impl LayerCatalog for FakeCatalog {
    fn layer(&self, id: &str) -> Result<Layer> {
        if self.layer.id.as_deref() == Some(id) {
            Ok(self.layer.clone())
        } else {
            Err(Error::RemoteRequest {
                status: 404,
                body: "layer not found".to_string(),
            })
        }
    }

    fn dataset(&self, id: &str) -> Result<Dataset> {
        match &self.dataset {
            Some(dataset) if dataset.id.as_deref() == Some(id) => Ok(dataset.clone()),
            _ => Err(Error::RemoteRequest {
                status: 404,
                body: "dataset not found".to_string(),
            }),
        }
    }

    fn create_layer(&self, layer: &Layer) -> Result<Layer> {
        let mut stored = layer.clone();
        stored.id = Some(format!("created-{}", self.created.borrow().len()));
        self.created.borrow_mut().push(stored.clone());
        Ok(stored)
    }
}

#[derive(Default)]
struct FakeExecutor {
    tables: RefCell<HashSet<String>>,
    dropped: RefCell<Vec<String>>,
    created: RefCell<Vec<(String, String)>>,
    privacy_failures: Cell<u32>,
    refreshes: Cell<u32>,
    latest: Option<String>,
}

impl FakeExecutor {
    fn with_latest(latest: &str) -> Self {
        Self {
            latest: Some(latest.to_string()),
            ..Self::default()
        }
    }
}

impl SqlExecutor for FakeExecutor {
    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.borrow().contains(table))
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        self.tables.borrow_mut().remove(table);
        self.dropped.borrow_mut().push(table.to_string());
        Ok(())
    }

    fn create_table_from_query(&self, table: &str, query: &str) -> Result<()> {
        self.tables.borrow_mut().insert(table.to_string());
        self.created
            .borrow_mut()
            .push((table.to_string(), query.to_string()));
        Ok(())
    }

    fn set_privacy(&self, _table: &str, _privacy: Privacy) -> Result<()> {
        let remaining = self.privacy_failures.get();
        if remaining > 0 {
            self.privacy_failures.set(remaining - 1);
            Err(Error::RemoteRequest {
                status: 404,
                body: "table not recognized yet".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn refresh_datasets(&self) -> Result<()> {
        self.refreshes.set(self.refreshes.get() + 1);
        Ok(())
    }

    fn field_values(
        &self,
        _field: &str,
        _table: &str,
        _order: Option<String>,
        _limit: Option<u32>,
    ) -> Result<Vec<String>> {
        Ok(self.latest.iter().cloned().collect())
    }
}

fn window() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2020, 2, 2, 0, 0, 0).unwrap(),
    )
}

fn request() -> FreezeRequest {
    let (start, end) = window();
    FreezeRequest::new("lyr-1", start, end).with_poll_interval(Duration::ZERO)
}

#[test]
fn freeze_materializes_table_and_publishes_unpublished_clone() {
    let catalog = FakeCatalog::new(layer_fixture(SQL_PROVIDER), Some(dataset_fixture()));
    let executor = FakeExecutor::with_latest("2020-03-01T00:00:00Z");

    let outcome = freeze_layer(&catalog, &executor, &request()).unwrap();

    assert_eq!(outcome.table, "air_quality_20200201_0000_20200202_0000");
    let created = executor.created.borrow();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0, outcome.table);
    assert_eq!(
        created[0].1,
        "select * from air_quality where utc_time >= '2020-02-01T00:00:00' \
         and utc_time < '2020-02-02T00:00:00' and region = 'x'"
    );

    let published = catalog.created.borrow();
    assert_eq!(published.len(), 1);
    assert!(!published[0].attributes.published);
    assert_eq!(published[0].attributes.slug, None);
    assert_eq!(
        published[0].sql().unwrap(),
        format!("SELECT * FROM {}", outcome.table)
    );
    assert!(published[0].attributes.name.starts_with("Air quality ("));
    assert_eq!(outcome.layer.id.as_deref(), Some("created-0"));
}

#[test]
fn freeze_rejects_non_sql_provider() {
    let catalog = FakeCatalog::new(layer_fixture("gee"), Some(dataset_fixture()));
    let executor = FakeExecutor::with_latest("2020-03-01T00:00:00Z");

    let err = freeze_layer(&catalog, &executor, &request()).unwrap_err();
    assert!(matches!(err, Error::ProviderMismatch { .. }));
    assert!(executor.created.borrow().is_empty());
}

#[test]
fn freeze_rejects_window_past_available_data_unless_overridden() {
    let catalog = FakeCatalog::new(layer_fixture(SQL_PROVIDER), Some(dataset_fixture()));
    let executor = FakeExecutor::with_latest("2020-01-15T00:00:00Z");

    let err = freeze_layer(&catalog, &executor, &request()).unwrap_err();
    assert!(matches!(err, Error::FutureData(_)));

    let overridden = request().with_ignore_future(true);
    assert!(freeze_layer(&catalog, &executor, &overridden).is_ok());
}

#[test]
fn freeze_rejects_future_end() {
    let catalog = FakeCatalog::new(layer_fixture(SQL_PROVIDER), Some(dataset_fixture()));
    let executor = FakeExecutor::with_latest("2020-03-01T00:00:00Z");

    let (start, _) = window();
    let end = Utc::now() + ChronoDuration::days(1);
    let future = FreezeRequest::new("lyr-1", start, end).with_poll_interval(Duration::ZERO);
    let err = freeze_layer(&catalog, &executor, &future).unwrap_err();
    assert!(matches!(err, Error::FutureData(_)));
}

#[test]
fn refreeze_of_same_window_overwrites_the_table() {
    let catalog = FakeCatalog::new(layer_fixture(SQL_PROVIDER), Some(dataset_fixture()));
    let executor = FakeExecutor::with_latest("2020-03-01T00:00:00Z");

    let first = freeze_layer(&catalog, &executor, &request()).unwrap();
    let second = freeze_layer(&catalog, &executor, &request()).unwrap();

    assert_eq!(first.table, second.table);
    assert_eq!(*executor.dropped.borrow(), vec![first.table.clone()]);
    assert_eq!(executor.created.borrow().len(), 2);
    assert!(executor.tables.borrow().contains(&first.table));
}

#[test]
fn explicit_time_field_and_table_skip_dataset_resolution() {
    let catalog = FakeCatalog::new(layer_fixture(SQL_PROVIDER), None);
    let executor = FakeExecutor::with_latest("2020-03-01T00:00:00Z");

    let explicit = request()
        .with_time_field("utc_time")
        .with_table_name("air_quality");
    assert!(freeze_layer(&catalog, &executor, &explicit).is_ok());
}

#[test]
fn visibility_poll_refreshes_datasets_until_table_appears() {
    let catalog = FakeCatalog::new(layer_fixture(SQL_PROVIDER), Some(dataset_fixture()));
    let executor = FakeExecutor::with_latest("2020-03-01T00:00:00Z");
    executor.privacy_failures.set(2);

    let bounded = request().with_visibility_attempts(5);
    assert!(freeze_layer(&catalog, &executor, &bounded).is_ok());
    assert_eq!(executor.refreshes.get(), 2);
}

#[test]
fn visibility_poll_surfaces_last_error_when_attempts_run_out() {
    let catalog = FakeCatalog::new(layer_fixture(SQL_PROVIDER), Some(dataset_fixture()));
    let executor = FakeExecutor::with_latest("2020-03-01T00:00:00Z");
    executor.privacy_failures.set(99);

    let bounded = request().with_visibility_attempts(3);
    let err = freeze_layer(&catalog, &executor, &bounded).unwrap_err();
    assert!(matches!(err, Error::RemoteRequest { status: 404, .. }));
    assert_eq!(executor.refreshes.get(), 3);
    // no layer gets published over a table the engine cannot see
    assert!(catalog.created.borrow().is_empty());
}

#[test]
fn reversed_window_is_normalized_not_rejected() {
    let catalog = FakeCatalog::new(layer_fixture(SQL_PROVIDER), Some(dataset_fixture()));
    let executor = FakeExecutor::with_latest("2020-03-01T00:00:00Z");

    let (start, end) = window();
    let reversed = FreezeRequest::new("lyr-1", end, start).with_poll_interval(Duration::ZERO);
    let outcome = freeze_layer(&catalog, &executor, &reversed).unwrap();
    assert_eq!(outcome.table, "air_quality_20200201_0000_20200202_0000");
}

proptest! {
    #[test]
    fn frozen_table_names_are_deterministic_and_bounded(table in "[a-z][a-z0-9_]{0,79}") {
        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 2, 2, 0, 0, 0).unwrap(),
        );
        let first = frozen_table_name(&table, &range);
        let second = frozen_table_name(&table, &range);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.len() <= 62);
    }
}
