//! Routing of structural message events to the models of a message.

use super::context::Session;
use crate::ids;
use crate::message::MessageEvent;
use crate::model::{PartChange, PartChangeKind, PartRef, TrackedPart};
use crate::part::Part;

/// What a single message event means for one model.
#[derive(Debug)]
enum Route {
    /// The model's root part content changed.
    RootChanged { model_id: String },
    /// A part with the root's node id but a new part id arrived.
    RootReplaced { model_id: String, part: Part },
    /// A tracked child part changed, or was replaced under the same node id.
    ChildChanged { model_id: String, part: Part },
    ChildAdded { model_id: String, part: Part },
    ChildRemoved { model_id: String, part: Part },
    /// The response summary part was added, changed or replaced.
    ResponsesChanged { model_id: String, part: Part },
    ResponsesRemoved { model_id: String, part: Part },
    RootRemoved { model_id: String },
    /// A top-level part no model projects yet.
    NewRoot { part_id: String },
}

impl Session {
    /// Drains a message's structural events and applies them to its models.
    pub fn route_message_events(&mut self, message_id: &str) {
        let events = match self.registry.message_mut(message_id) {
            Some(message) => message.take_events(),
            None => return,
        };
        for event in events {
            for route in self.classify(message_id, &event) {
                tracing::debug!(message_id, ?route, "Routing part event");
                self.apply_route(message_id, route);
            }
        }
    }

    fn classify(&self, message_id: &str, event: &MessageEvent) -> Vec<Route> {
        let model_ids = self.registry.models_for_message(message_id);
        let models: Vec<_> = model_ids
            .iter()
            .filter_map(|id| self.registry.model(id))
            .collect();
        let mut routes = Vec::new();

        match event {
            MessageEvent::PartChanged { part_id } => {
                let Some(part) = self
                    .registry
                    .message(message_id)
                    .and_then(|message| message.part(part_id))
                else {
                    return routes;
                };
                for model in &models {
                    let model_id = model.id().to_string();
                    if model.state().is_root_part(part_id) {
                        routes.push(Route::RootChanged {
                            model_id: model_id.clone(),
                        });
                    }
                    if model.state().tracks_part(part_id) {
                        routes.push(child_route(model_id, part.clone()));
                    }
                }
            }
            MessageEvent::PartAdded { part_id } => {
                let Some(part) = self
                    .registry
                    .message(message_id)
                    .and_then(|message| message.part(part_id))
                else {
                    return routes;
                };
                let node_id = part.node_id();
                let mut claimed = false;
                for model in &models {
                    let model_id = model.id().to_string();
                    if node_id.is_some() && model.node_id() == node_id {
                        claimed = true;
                        routes.push(Route::RootReplaced {
                            model_id: model_id.clone(),
                            part: part.clone(),
                        });
                    }
                    let known_child = model
                        .state()
                        .child_parts()
                        .iter()
                        .any(|tracked| node_id.is_some() && tracked.node_id.as_deref() == node_id);
                    if known_child {
                        // Duplicate node id: treated as a change.
                        claimed = true;
                        routes.push(child_route(model_id, part.clone()));
                    } else if part.parent_id().is_some() && part.parent_id() == model.node_id() {
                        claimed = true;
                        if part.is_response_summary() {
                            routes.push(Route::ResponsesChanged {
                                model_id,
                                part: part.clone(),
                            });
                        } else {
                            routes.push(Route::ChildAdded {
                                model_id,
                                part: part.clone(),
                            });
                        }
                    }
                }
                if !claimed && part.parent_id().is_none() {
                    routes.push(Route::NewRoot {
                        part_id: part_id.clone(),
                    });
                }
            }
            MessageEvent::PartRemoved { part } => {
                for model in &models {
                    let model_id = model.id().to_string();
                    if model.state().is_root_part(&part.id) {
                        routes.push(Route::RootRemoved {
                            model_id: model_id.clone(),
                        });
                    }
                    if model.state().tracks_part(&part.id) {
                        if part.is_response_summary() {
                            routes.push(Route::ResponsesRemoved {
                                model_id,
                                part: part.clone(),
                            });
                        } else {
                            routes.push(Route::ChildRemoved {
                                model_id,
                                part: part.clone(),
                            });
                        }
                    }
                }
            }
        }
        // Re-keyed models must settle before their parents look them up.
        routes.sort_by_key(|route| !matches!(route, Route::RootReplaced { .. }));
        routes
    }

    fn apply_route(&mut self, message_id: &str, route: Route) {
        match route {
            Route::RootChanged { model_id } => {
                let part = self
                    .registry
                    .model(&model_id)
                    .and_then(|model| model.part_id())
                    .and_then(|part_id| self.registry.message(message_id)?.part(part_id))
                    .cloned();
                if let (Some(part), Some(model)) = (part, self.registry.model_mut(&model_id)) {
                    model.parse_part(&part, true);
                }
            }
            Route::RootReplaced { model_id, part } => {
                if let Some(model) = self.registry.model_mut(&model_id) {
                    let state = model.state_mut();
                    state.part = Some(PartRef::from_part(&part));
                    state.role = part.role().map(String::from);
                    model.parse_part(&part, true);
                }
                self.rekey_model(message_id, &model_id, &ids::model_id_for_part(&part.id));
            }
            Route::ChildChanged { model_id, part } => {
                let child_model = self.track_child(&model_id, &part);
                self.parse_child_parts(
                    &model_id,
                    vec![PartChange::new(PartChangeKind::Changed, part, child_model)],
                    true,
                );
            }
            Route::ChildAdded { model_id, part } => {
                self.track_child(&model_id, &part);
                let child_model = self.model_for_part(message_id, &part.id);
                if let (Some(child_id), Some(model)) =
                    (&child_model, self.registry.model_mut(&model_id))
                {
                    model.state_mut().bind_child(&part.id, child_id);
                }
                self.parse_child_parts(
                    &model_id,
                    vec![PartChange::new(PartChangeKind::Added, part, child_model)],
                    false,
                );
            }
            Route::ChildRemoved { model_id, part } => {
                let child_model = self.untrack_child(&model_id, &part);
                if let Some(child_id) = &child_model {
                    self.destroy_model(child_id);
                }
                self.parse_child_parts(
                    &model_id,
                    vec![PartChange::new(PartChangeKind::Removed, part, child_model)],
                    true,
                );
            }
            Route::ResponsesChanged { model_id, part } => {
                self.track_child(&model_id, &part);
                self.apply_response_part(&model_id, &part);
            }
            Route::ResponsesRemoved { model_id, part } => {
                self.untrack_child(&model_id, &part);
                self.with_model(&model_id, |kind, state, _| {
                    let old = state.responses.to_value();
                    state.responses.reset();
                    state.notify_changed("responses", old, state.responses.to_value());
                    kind.parse_responses(state);
                });
            }
            Route::RootRemoved { model_id } => {
                self.destroy_model(&model_id);
            }
            Route::NewRoot { part_id } => {
                self.model_for_part(message_id, &part_id);
            }
        }
    }

    /// Rescans a model's children from the message parts.
    ///
    /// Every child part is tracked, child models are materialized, and the
    /// type sees all children as added.
    pub fn setup_model(&mut self, model_id: &str) {
        let Some(model) = self.registry.model(model_id) else {
            return;
        };
        let (Some(message_id), Some(node_id)) = (
            model.message_id().map(String::from),
            model.node_id().map(String::from),
        ) else {
            return;
        };
        let model_id = model.id().to_string();
        let children: Vec<Part> = match self.registry.message(&message_id) {
            Some(message) => message
                .parts()
                .iter()
                .filter(|part| part.parent_id() == Some(node_id.as_str()))
                .filter(|part| part.node_id() != Some(node_id.as_str()))
                .cloned()
                .collect(),
            None => return,
        };

        if let Some(model) = self.registry.model_mut(&model_id) {
            let state = model.state_mut();
            state.child_parts = children.iter().map(TrackedPart::from_part).collect();
            state.child_models.clear();
        }

        let mut changes = Vec::new();
        for part in children {
            if part.is_response_summary() {
                self.apply_response_part(&model_id, &part);
                continue;
            }
            let child_model = self.model_for_part(&message_id, &part.id);
            if let (Some(child_id), Some(model)) =
                (&child_model, self.registry.model_mut(&model_id))
            {
                model.state_mut().bind_child(&part.id, child_id);
            }
            changes.push(PartChange::new(PartChangeKind::Added, part, child_model));
        }
        self.parse_child_parts(&model_id, changes, false);
    }

    /// Materializes models for the top-level parts of a message.
    pub(super) fn materialize_roots(&mut self, message_id: &str) {
        let roots: Vec<String> = match self.registry.message(message_id) {
            Some(message) => message
                .parts()
                .iter()
                .filter(|part| part.parent_id().is_none())
                .map(|part| part.id.clone())
                .collect(),
            None => return,
        };
        for part_id in roots {
            self.model_for_part(message_id, &part_id);
        }
    }

    fn parse_child_parts(&mut self, model_id: &str, changes: Vec<PartChange>, is_edit: bool) {
        self.with_model(model_id, |kind, state, registry| {
            kind.parse_child_parts(state, registry, &changes, is_edit);
        });
    }

    fn apply_response_part(&mut self, model_id: &str, part: &Part) {
        self.with_model(model_id, |kind, state, _| {
            let old = state.responses.to_value();
            if state.responses.parse_response_part(part) {
                state.notify_changed("responses", old, state.responses.to_value());
                kind.parse_responses(state);
            }
        });
    }

    /// Starts tracking `part`, replacing an entry for the same node.
    ///
    /// Returns the id of the child model projected from the part, if any.
    fn track_child(&mut self, model_id: &str, part: &Part) -> Option<String> {
        let model = self.registry.model_mut(model_id)?;
        let state = model.state_mut();
        let mut tracked = TrackedPart::from_part(part);
        match state
            .child_parts
            .iter_mut()
            .find(|existing| existing.is_same_node(part))
        {
            Some(existing) => {
                tracked.model_id = existing.model_id.take();
                *existing = tracked.clone();
            }
            None => state.child_parts.push(tracked.clone()),
        }
        let message_id = state.message_id.clone()?;

        let child_id = match tracked.model_id {
            Some(id) => self.registry.resolve_model_id(&id).map(String::from),
            None => {
                let node_id = part.node_id()?;
                let registry = &self.registry;
                registry.models_for_message(&message_id).into_iter().find(|id| {
                    id != model_id && registry.model(id).and_then(|m| m.node_id()) == Some(node_id)
                })
            }
        }?;
        if let Some(model) = self.registry.model_mut(model_id) {
            model.state_mut().bind_child(&part.id, &child_id);
        }
        Some(child_id)
    }

    /// Stops tracking a part; returns the child model it projected.
    fn untrack_child(&mut self, model_id: &str, part: &Part) -> Option<String> {
        let (tracked, child_models) = {
            let state = self.registry.model_mut(model_id)?.state_mut();
            let tracked = state
                .child_parts
                .iter()
                .find(|tracked| tracked.part_id == part.id)
                .and_then(|tracked| tracked.model_id.clone());
            state.child_parts.retain(|tracked| tracked.part_id != part.id);
            (tracked, state.child_models.clone())
        };
        let child_id = tracked
            .and_then(|id| self.registry.resolve_model_id(&id).map(String::from))
            .or_else(|| {
                child_models.into_iter().find(|id| {
                    self.registry
                        .model(id)
                        .is_some_and(|child| child.part_id() == Some(part.id.as_str()))
                })
            })?;
        if let Some(model) = self.registry.model_mut(model_id) {
            model.state_mut().child_models.retain(|id| *id != child_id);
        }
        Some(child_id)
    }

    /// Moves a model to the id derived from its new part.
    ///
    /// The old id keeps resolving; parents in the message follow the move.
    fn rekey_model(&mut self, message_id: &str, old_id: &str, new_id: &str) {
        let Some(current) = self.registry.resolve_model_id(old_id).map(String::from) else {
            return;
        };
        if current == new_id {
            return;
        }
        if !self.registry.rename_model(&current, new_id) {
            tracing::warn!(model_id = %current, new_id, "Could not re-key replaced model");
            return;
        }
        for parent_id in self.registry.models_for_message(message_id) {
            if let Some(parent) = self.registry.model_mut(&parent_id) {
                parent.state_mut().rename_child(&current, new_id);
            }
        }
        tracing::debug!(model_id = %current, new_id, "Re-keyed replaced model");
    }
}

fn child_route(model_id: String, part: Part) -> Route {
    if part.is_response_summary() {
        Route::ResponsesChanged { model_id, part }
    } else {
        Route::ChildChanged { model_id, part }
    }
}
