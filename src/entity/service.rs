//! CRUD service trait and its REST implementation

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{Entity, ListFilter, Patch};
use crate::client::{ApiRequest, Transport, decode};
use crate::error::Result;

/// CRUD operations for one entity type
#[async_trait]
pub trait EntityService<E: Entity>: Send + Sync {
    /// List records matching `filter`
    async fn list(&self, filter: &ListFilter) -> Result<Vec<E>>;

    /// Fetch one record
    async fn get(&self, id: &str) -> Result<E>;

    /// Create a record; the backend assigns `id` and timestamps
    async fn create(&self, draft: &E::Draft) -> Result<E>;

    /// Apply a partial update; only the patch's stripped fields are sent
    async fn update(&self, id: &str, patch: &Patch) -> Result<E>;

    /// Delete a record
    async fn delete(&self, id: &str) -> Result<()>;
}

/// List payloads come back either bare or wrapped in a page object
#[derive(Deserialize)]
#[serde(untagged)]
enum ListPayload<E> {
    Items(Vec<E>),
    Page {
        #[serde(alias = "rows", alias = "data")]
        items: Vec<E>,
    },
}

impl<E> ListPayload<E> {
    fn into_items(self) -> Vec<E> {
        match self {
            ListPayload::Items(items) | ListPayload::Page { items } => items,
        }
    }
}

/// [`EntityService`] over the generic REST layout `/{kind}[/{id}]`
pub struct RestEntityService<E> {
    transport: Arc<dyn Transport>,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for RestEntityService<E> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> RestEntityService<E> {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            _marker: PhantomData,
        }
    }

    fn item_path(id: &str) -> String {
        format!("{}/{}", E::KIND.path(), id)
    }
}

#[async_trait]
impl<E: Entity> EntityService<E> for RestEntityService<E> {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<E>> {
        let request = ApiRequest::get(E::KIND.path()).query(filter.to_params(E::KIND));
        let data = self.transport.request(request).await?;
        let payload: ListPayload<E> = decode(data)?;
        Ok(payload.into_items())
    }

    async fn get(&self, id: &str) -> Result<E> {
        let data = self.transport.request(ApiRequest::get(Self::item_path(id))).await?;
        decode(data)
    }

    async fn create(&self, draft: &E::Draft) -> Result<E> {
        let body = serde_json::to_value(draft)?;
        let data = self
            .transport
            .request(ApiRequest::post(E::KIND.path()).json(body))
            .await?;
        decode(data)
    }

    async fn update(&self, id: &str, patch: &Patch) -> Result<E> {
        let body = Value::Object(patch.stripped());
        let data = self
            .transport
            .request(ApiRequest::patch(Self::item_path(id)).json(body))
            .await?;
        decode(data)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.transport
            .request(ApiRequest::delete(Self::item_path(id)))
            .await?;
        Ok(())
    }
}
