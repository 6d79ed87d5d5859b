//! Routing of change envelopes to the session.

use crate::envelope::{ChangeEvent, Envelope, ObjectRef};
use crate::fetch::ResourceFetcher;
use crate::json_patch::JsonPatchApplier;
use crate::resource::{ResourceLoader, default_loaders};
use arbor_core::Session;
use arbor_core::config::SyncConfig;
use arbor_core::ids::ResourceKind;
use arbor_core::notify::SessionEvent;
use arbor_core::patch::{PatchApplier, PatchOperation};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Applies server-pushed changes to a session, one envelope at a time.
///
/// Nothing that happens while handling an envelope is returned as an error:
/// malformed frames, failing patches and changes for unknown kinds are
/// logged and dropped so the channel keeps going.
pub struct ChangeManager {
    applier: Box<dyn PatchApplier>,
    fetcher: Option<Box<dyn ResourceFetcher>>,
    loaders: BTreeMap<ResourceKind, Box<dyn ResourceLoader>>,
    /// Patches parked for entities whose fetch is in flight.
    deferred: BTreeMap<String, Vec<Vec<PatchOperation>>>,
    pending_fetches: BTreeSet<String>,
}

impl std::fmt::Debug for ChangeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeManager")
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .field("deferred", &self.deferred.len())
            .field("pending_fetches", &self.pending_fetches)
            .finish()
    }
}

impl ChangeManager {
    /// A manager with the JSON applier and the loaders enabled in `config`.
    pub fn new(config: &SyncConfig) -> Self {
        let mut manager = Self {
            applier: Box::new(JsonPatchApplier::new()),
            fetcher: None,
            loaders: BTreeMap::new(),
            deferred: BTreeMap::new(),
            pending_fetches: BTreeSet::new(),
        };
        for loader in default_loaders(&config.lazy_load) {
            manager.register_loader(loader);
        }
        manager
    }

    pub fn with_applier(mut self, applier: impl PatchApplier + 'static) -> Self {
        self.applier = Box::new(applier);
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl ResourceFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Registers the loader for its kind, replacing any previous one.
    pub fn register_loader(&mut self, loader: Box<dyn ResourceLoader>) {
        self.loaders.insert(loader.kind(), loader);
    }

    pub fn is_fetch_pending(&self, id: &str) -> bool {
        self.pending_fetches.contains(id)
    }

    /// Number of patches parked for `id`.
    pub fn deferred_count(&self, id: &str) -> usize {
        self.deferred.get(id).map_or(0, Vec::len)
    }

    /// Parses and processes one raw frame.
    ///
    /// Returns the number of notifications delivered; an unparseable frame
    /// delivers none.
    pub fn handle_text(&mut self, session: &mut Session, text: &str) -> usize {
        match Envelope::parse(text) {
            Ok(envelope) => self.process(session, envelope),
            Err(err) => {
                tracing::warn!("Dropping unparseable change frame: {}", err);
                tracing::debug!(frame = %text, "Unparseable frame");
                0
            }
        }
    }

    /// One processing turn: dispatch the envelope, then flush notifications.
    pub fn process(&mut self, session: &mut Session, envelope: Envelope) -> usize {
        self.dispatch(session, envelope);
        session.flush()
    }

    pub fn dispatch(&mut self, session: &mut Session, envelope: Envelope) {
        match envelope {
            Envelope::Change { data } => self.dispatch_change(session, data),
            Envelope::Operation { data } => {
                tracing::debug!("Forwarding operation envelope");
                session.publish(SessionEvent::Operation { data });
            }
        }
    }

    fn dispatch_change(&mut self, session: &mut Session, change: ChangeEvent) {
        let object = change.object();
        tracing::info!(
            operation = change.operation_name(),
            object_type = %object.kind,
            object_id = %object.id,
            "Change event"
        );
        match change {
            ChangeEvent::Create { object, data } => self.handle_create(session, &object, data, true),
            ChangeEvent::Update { object, data } => self.handle_update(session, &object, data),
            ChangeEvent::Delete { object } => self.handle_delete(session, &object),
        }
    }

    /// Delivers the payload of a completed fetch.
    ///
    /// Patches parked while the fetch was in flight are replayed on the new
    /// entity.
    pub fn fetched(&mut self, session: &mut Session, kind: ResourceKind, data: Value) -> usize {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let object = ObjectRef::new(kind.segment(), id);
        self.handle_create(session, &object, data, false);
        session.flush()
    }

    /// Forgets a failed fetch together with the patches parked for it.
    pub fn fetch_failed(&mut self, id: &str) {
        self.pending_fetches.remove(id);
        let dropped = self.deferred.remove(id).map_or(0, |parked| parked.len());
        tracing::warn!(id, dropped, "Fetch failed; dropping parked patches");
    }

    fn handle_create(
        &mut self,
        session: &mut Session,
        object: &ObjectRef,
        mut data: Value,
        from_websocket: bool,
    ) {
        let Some(kind) = object.resource_kind() else {
            tracing::debug!(object_type = %object.kind, "Ignoring create for unknown kind");
            return;
        };
        if let Value::Object(payload) = &mut data {
            if from_websocket {
                payload.insert("from_websocket".to_string(), Value::Bool(true));
            }
            if !object.id.is_empty() {
                payload
                    .entry("id")
                    .or_insert_with(|| Value::String(object.id.clone()));
            }
        }
        tracing::debug!(payload = %data, "Create payload");

        let id = match session.create_from_payload(kind, data) {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(object_id = %object.id, "Dropping create: {}", err);
                return;
            }
        };
        self.pending_fetches.remove(&id);
        for operations in self.deferred.remove(&id).unwrap_or_default() {
            self.apply_patch(session, &id, &operations);
        }
    }

    fn handle_update(
        &mut self,
        session: &mut Session,
        object: &ObjectRef,
        operations: Vec<PatchOperation>,
    ) {
        let properties: Vec<&str> = operations.iter().map(|op| op.property.as_str()).collect();
        tracing::debug!(object_id = %object.id, ?properties, "Patch operations");

        if self.pending_fetches.contains(&object.id) {
            self.park(&object.id, operations);
            return;
        }
        if session.registry().contains(&object.id) {
            self.apply_patch(session, &object.id, &operations);
            return;
        }
        self.handle_orphaned_patch(session, object, operations);
    }

    fn apply_patch(&self, session: &mut Session, id: &str, operations: &[PatchOperation]) {
        match session.apply_remote_patch(id, operations, self.applier.as_ref()) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(id, "Patch target is not patchable; ignoring");
            }
            Err(err) => {
                tracing::error!(id, "Failed to apply patch: {}", err);
            }
        }
    }

    fn handle_orphaned_patch(
        &mut self,
        session: &Session,
        object: &ObjectRef,
        operations: Vec<PatchOperation>,
    ) {
        let loader = object
            .resource_kind()
            .and_then(|kind| self.loaders.get(&kind));
        let Some(loader) = loader else {
            tracing::debug!(object_id = %object.id, "Ignoring patch for uncached entity");
            return;
        };
        if !loader.should_load(&operations, session) {
            tracing::debug!(object_id = %object.id, "Patch does not warrant loading");
            return;
        }
        let kind = loader.kind();
        let Some(fetcher) = &self.fetcher else {
            tracing::warn!(object_id = %object.id, "No fetcher configured; dropping patch");
            return;
        };

        tracing::info!(object_id = %object.id, "Fetching {} for patch", kind.segment());
        fetcher.fetch(kind, &object.id);
        self.pending_fetches.insert(object.id.clone());
        self.park(&object.id, operations);
    }

    fn park(&mut self, id: &str, operations: Vec<PatchOperation>) {
        self.deferred
            .entry(id.to_string())
            .or_default()
            .push(operations);
    }

    fn handle_delete(&mut self, session: &mut Session, object: &ObjectRef) {
        self.pending_fetches.remove(&object.id);
        self.deferred.remove(&object.id);
        if !session.destroy_entity(&object.id) {
            tracing::debug!(object_id = %object.id, "Delete for uncached entity");
        }
    }
}
