//! # Service Requests
//!
//! The messages a [`RemoteClient`](super::RemoteClient) sends to a
//! [`RemoteActor`](super::RemoteActor). They mirror the calls a cloud API
//! exposes for one resource kind: create, describe, list, modify, delete and
//! tag. `InjectThrottle` is a control message for tests and demos.

use super::entity::RemoteEntity;
use super::error::BackendError;
use controller_runtime::Tags;
use tokio::sync::oneshot;

pub type Response<T> = oneshot::Sender<Result<T, BackendError>>;

#[derive(Debug)]
pub enum RemoteRequest<T: RemoteEntity> {
    Create {
        params: T::Create,
        respond_to: Response<T>,
    },
    Describe {
        id: T::Id,
        respond_to: Response<T>,
    },
    List {
        respond_to: Response<Vec<T>>,
    },
    Update {
        id: T::Id,
        update: T::Update,
        respond_to: Response<T>,
    },
    Delete {
        id: T::Id,
        respond_to: Response<()>,
    },
    /// Adds or overwrites the given tags, leaving all others alone.
    Tag {
        id: T::Id,
        tags: Tags,
        respond_to: Response<T>,
    },
    /// Makes the next `requests` API calls fail with [`BackendError::Throttled`].
    InjectThrottle {
        requests: u32,
        respond_to: Response<()>,
    },
}

impl<T: RemoteEntity> RemoteRequest<T> {
    /// Answers the request with `err` without touching any record.
    pub(crate) fn reject(self, err: BackendError) {
        match self {
            RemoteRequest::Create { respond_to, .. }
            | RemoteRequest::Describe { respond_to, .. }
            | RemoteRequest::Update { respond_to, .. }
            | RemoteRequest::Tag { respond_to, .. } => {
                let _ = respond_to.send(Err(err));
            }
            RemoteRequest::List { respond_to } => {
                let _ = respond_to.send(Err(err));
            }
            RemoteRequest::Delete { respond_to, .. }
            | RemoteRequest::InjectThrottle { respond_to, .. } => {
                let _ = respond_to.send(Err(err));
            }
        }
    }
}
