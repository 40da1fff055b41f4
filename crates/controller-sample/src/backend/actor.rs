//! # Service Actor
//!
//! [`RemoteActor`] is the server half of one simulated cloud service. It owns
//! every record of its kind and answers requests one at a time, so the store
//! needs no lock and every call observes a consistent state.

use super::client::RemoteClient;
use super::entity::RemoteEntity;
use super::error::BackendError;
use super::message::RemoteRequest;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Holds the records of one resource kind and processes API calls sequentially.
///
/// Create the pair with [`RemoteActor::new`], hand the client to whoever
/// needs it, then spawn [`RemoteActor::run`] with the kind's context. The
/// actor stops once every client has been dropped.
pub struct RemoteActor<T: RemoteEntity> {
    receiver: mpsc::Receiver<RemoteRequest<T>>,
    store: HashMap<T::Id, T>,
    next_seq: u32,
    throttle: u32,
}

impl<T: RemoteEntity> RemoteActor<T> {
    /// Creates the actor and its client; `buffer_size` bounds in-flight requests.
    pub fn new(buffer_size: usize) -> (Self, RemoteClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
            next_seq: 1,
            throttle: 0,
        };
        (actor, RemoteClient::new(sender))
    }

    /// Runs the service until the channel closes.
    ///
    /// `context` is passed to every entity hook.
    pub async fn run(mut self, context: T::Context) {
        let entity_type = std::any::type_name::<T>()
            .split("::")
            .last()
            .unwrap_or("Unknown");
        info!(entity_type, "Service started");

        while let Some(msg) = self.receiver.recv().await {
            if let RemoteRequest::InjectThrottle {
                requests,
                respond_to,
            } = msg
            {
                info!(entity_type, requests, "Throttling");
                self.throttle = requests;
                let _ = respond_to.send(Ok(()));
                continue;
            }
            if self.throttle > 0 {
                self.throttle -= 1;
                warn!(entity_type, remaining = self.throttle, "Throttled");
                msg.reject(BackendError::Throttled);
                continue;
            }

            match msg {
                RemoteRequest::Create { params, respond_to } => {
                    debug!(entity_type, ?params, "Create");
                    let id = T::assign_id(self.next_seq, &params);
                    if self.store.contains_key(&id) {
                        warn!(entity_type, %id, "Already exists");
                        let _ = respond_to.send(Err(BackendError::AlreadyExists(id.to_string())));
                        continue;
                    }
                    self.next_seq += 1;

                    match T::from_create_params(id.clone(), params, &context) {
                        Ok(mut item) => {
                            if let Err(e) = item.on_create(&context).await {
                                warn!(entity_type, %id, error = %e, "on_create failed");
                                let _ = respond_to.send(Err(e));
                                continue;
                            }
                            self.store.insert(id.clone(), item.clone());
                            info!(entity_type, %id, size = self.store.len(), "Created");
                            let _ = respond_to.send(Ok(item));
                        }
                        Err(e) => {
                            warn!(entity_type, error = %e, "Create failed");
                            let _ = respond_to.send(Err(e));
                        }
                    }
                }
                RemoteRequest::Describe { id, respond_to } => {
                    let now = Instant::now();
                    match self.store.get_mut(&id) {
                        Some(item) => {
                            item.refresh(now);
                            debug!(entity_type, %id, "Describe");
                            let _ = respond_to.send(Ok(item.clone()));
                        }
                        None => {
                            debug!(entity_type, %id, "Not found");
                            let _ = respond_to.send(Err(BackendError::NotFound(id.to_string())));
                        }
                    }
                }
                RemoteRequest::List { respond_to } => {
                    let now = Instant::now();
                    let items: Vec<T> = self
                        .store
                        .values_mut()
                        .map(|item| {
                            item.refresh(now);
                            item.clone()
                        })
                        .collect();
                    debug!(entity_type, count = items.len(), "List");
                    let _ = respond_to.send(Ok(items));
                }
                RemoteRequest::Update {
                    id,
                    update,
                    respond_to,
                } => {
                    debug!(entity_type, %id, ?update, "Update");
                    if let Some(item) = self.store.get_mut(&id) {
                        item.refresh(Instant::now());
                        if let Err(e) = item.on_update(update, &context).await {
                            warn!(entity_type, %id, error = %e, "Update failed");
                            let _ = respond_to.send(Err(e));
                            continue;
                        }
                        info!(entity_type, %id, "Updated");
                        let _ = respond_to.send(Ok(item.clone()));
                    } else {
                        warn!(entity_type, %id, "Not found");
                        let _ = respond_to.send(Err(BackendError::NotFound(id.to_string())));
                    }
                }
                RemoteRequest::Delete { id, respond_to } => {
                    debug!(entity_type, %id, "Delete");
                    if let Some(item) = self.store.get(&id) {
                        if let Err(e) = item.on_delete(&context).await {
                            warn!(entity_type, %id, error = %e, "on_delete failed");
                            let _ = respond_to.send(Err(e));
                            continue;
                        }
                        self.store.remove(&id);
                        info!(entity_type, %id, size = self.store.len(), "Deleted");
                        let _ = respond_to.send(Ok(()));
                    } else {
                        warn!(entity_type, %id, "Not found");
                        let _ = respond_to.send(Err(BackendError::NotFound(id.to_string())));
                    }
                }
                RemoteRequest::Tag {
                    id,
                    tags,
                    respond_to,
                } => {
                    debug!(entity_type, %id, ?tags, "Tag");
                    if let Some(item) = self.store.get_mut(&id) {
                        item.tags_mut().extend(tags);
                        info!(entity_type, %id, "Tagged");
                        let _ = respond_to.send(Ok(item.clone()));
                    } else {
                        warn!(entity_type, %id, "Not found");
                        let _ = respond_to.send(Err(BackendError::NotFound(id.to_string())));
                    }
                }
                RemoteRequest::InjectThrottle { respond_to, .. } => {
                    let _ = respond_to.send(Ok(()));
                }
            }
        }

        info!(entity_type, size = self.store.len(), "Shutdown");
    }
}
