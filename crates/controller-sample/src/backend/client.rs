//! # Service Client
//!
//! [`RemoteClient`] plays the role of an SDK client: a cheap, cloneable handle
//! whose async methods turn into requests to the owning
//! [`RemoteActor`](super::RemoteActor).

use super::entity::RemoteEntity;
use super::error::BackendError;
use super::message::RemoteRequest;
use controller_runtime::Tags;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

pub struct RemoteClient<T: RemoteEntity> {
    sender: mpsc::Sender<RemoteRequest<T>>,
}

impl<T: RemoteEntity> Clone for RemoteClient<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: RemoteEntity> RemoteClient<T> {
    pub fn new(sender: mpsc::Sender<RemoteRequest<T>>) -> Self {
        Self { sender }
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<R, BackendError>>) -> RemoteRequest<T>,
    ) -> Result<R, BackendError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| BackendError::ServiceClosed)?;
        response.await.map_err(|_| BackendError::ServiceDropped)?
    }

    #[instrument(skip(self))]
    pub async fn create(&self, params: T::Create) -> Result<T, BackendError> {
        self.request(|respond_to| RemoteRequest::Create { params, respond_to })
            .await
    }

    #[instrument(skip(self))]
    pub async fn describe(&self, id: T::Id) -> Result<T, BackendError> {
        self.request(|respond_to| RemoteRequest::Describe { id, respond_to })
            .await
    }

    pub async fn list(&self) -> Result<Vec<T>, BackendError> {
        self.request(|respond_to| RemoteRequest::List { respond_to })
            .await
    }

    #[instrument(skip(self))]
    pub async fn update(&self, id: T::Id, update: T::Update) -> Result<T, BackendError> {
        self.request(|respond_to| RemoteRequest::Update {
            id,
            update,
            respond_to,
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: T::Id) -> Result<(), BackendError> {
        self.request(|respond_to| RemoteRequest::Delete { id, respond_to })
            .await
    }

    #[instrument(skip(self))]
    pub async fn tag(&self, id: T::Id, tags: Tags) -> Result<T, BackendError> {
        self.request(|respond_to| RemoteRequest::Tag {
            id,
            tags,
            respond_to,
        })
        .await
    }

    /// Fails the next `requests` calls to this service with a throttling error.
    pub async fn inject_throttle(&self, requests: u32) -> Result<(), BackendError> {
        self.request(|respond_to| RemoteRequest::InjectThrottle {
            requests,
            respond_to,
        })
        .await
    }
}
