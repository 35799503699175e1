//! Catalog resources and client

pub mod client;
pub mod resource;

pub use client::{CatalogClient, LayerCatalog};
pub use resource::{diff_resources, Dataset, Layer, Metadata, Resource, Widget};
