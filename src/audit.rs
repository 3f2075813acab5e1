//! Append-only audit trail shared by every entity kind
use super::error::{Result, WorkflowError};
use super::storage::{Store, Tx, TxResult, decode, encode};
use super::types::{ActorId, EntityKind, TimeStamp};
use super::utils::composite_key;
use super::value::Value;
use chrono::Utc;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    #[n(0)]
    Create,
    #[n(1)]
    Update,
    #[n(2)]
    StatusChange,
    #[n(3)]
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    #[n(0)]
    pub id: String, // uuid7, sorts by creation time
    #[n(1)]
    pub entity_kind: EntityKind,
    #[n(2)]
    pub entity_id: String,
    #[n(3)]
    pub action: AuditAction,
    #[n(4)]
    pub actor_id: String,
    #[n(5)]
    pub timestamp: TimeStamp<Utc>,
    #[n(6)]
    pub before: Option<Value>,
    #[n(7)]
    pub after: Option<Value>,
}

/// Filters for reading the trail back. Unset fields match everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<TimeStamp<Utc>>,
    pub to: Option<TimeStamp<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            entity_kind: None,
            entity_id: None,
            actor_id: None,
            from: None,
            to: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditQuery {
    pub fn for_entity(kind: EntityKind, entity_id: &str) -> Self {
        Self {
            entity_kind: Some(kind),
            entity_id: Some(entity_id.to_string()),
            ..Default::default()
        }
    }
    pub fn by_actor(mut self, actor_id: &str) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }
    pub fn between(mut self, from: TimeStamp<Utc>, to: TimeStamp<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        self.entity_kind.is_none_or(|kind| kind == event.entity_kind)
            && self
                .entity_id
                .as_deref()
                .is_none_or(|id| id == event.entity_id)
            && self
                .actor_id
                .as_deref()
                .is_none_or(|actor| actor == event.actor_id)
            && self.from.as_ref().is_none_or(|from| &event.timestamp >= from)
            && self.to.as_ref().is_none_or(|to| &event.timestamp <= to)
    }
}

fn index_key(kind: EntityKind, entity_id: &str, event_id: &str) -> Vec<u8> {
    composite_key(
        &composite_key(kind.as_str().as_bytes(), entity_id.as_bytes()),
        event_id.as_bytes(),
    )
}

/// Records what happened. There is no update or delete.
#[derive(Clone)]
pub struct AuditLogger {
    store: Store,
}

impl AuditLogger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn record(
        &self,
        entity_kind: EntityKind,
        entity_id: &str,
        action: AuditAction,
        before: Option<Value>,
        after: Option<Value>,
        actor: &ActorId,
    ) -> Result<AuditEvent> {
        self.store.transaction(|tx| {
            self.record_in(
                tx,
                entity_kind,
                entity_id,
                action,
                before.clone(),
                after.clone(),
                actor,
            )
        })
    }

    /// Appends inside `tx`, so the event commits with the mutation it describes
    #[allow(clippy::too_many_arguments)]
    pub fn record_in(
        &self,
        tx: &Tx<'_>,
        entity_kind: EntityKind,
        entity_id: &str,
        action: AuditAction,
        before: Option<Value>,
        after: Option<Value>,
        actor: &ActorId,
    ) -> TxResult<AuditEvent> {
        let event = AuditEvent {
            id: uuid7::uuid7().to_string(),
            entity_kind,
            entity_id: entity_id.to_string(),
            action,
            actor_id: actor.to_string(),
            timestamp: TimeStamp::new(),
            before,
            after,
        };

        tx.audit_log.insert(event.id.as_bytes(), encode(&event)?)?;
        tx.audit_index.insert(
            index_key(entity_kind, entity_id, &event.id),
            event.id.as_bytes(),
        )?;

        Ok(event)
    }

    /// Matching events, newest first
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let events: Box<dyn Iterator<Item = Result<AuditEvent>> + '_> =
            match (query.entity_kind, query.entity_id.as_deref()) {
                (Some(kind), Some(entity_id)) => {
                    let prefix = composite_key(
                        &composite_key(kind.as_str().as_bytes(), entity_id.as_bytes()),
                        b"",
                    );
                    Box::new(
                        self.store
                            .audit_index
                            .scan_prefix(prefix)
                            .values()
                            .rev()
                            .map(|event_id| self.load(&event_id?)),
                    )
                }
                _ => Box::new(
                    self.store
                        .audit_log
                        .iter()
                        .values()
                        .rev()
                        .map(|raw| decode::<AuditEvent>(&raw?)),
                ),
            };

        let mut matching = vec![];
        for event in events {
            let event = event?;
            if query.matches(&event) {
                matching.push(event);
            }
            if matching.len() >= query.offset.saturating_add(query.limit) {
                break;
            }
        }

        Ok(matching.into_iter().skip(query.offset).collect())
    }

    /// Every event recorded against one entity, oldest first
    pub fn events_for(&self, entity_kind: EntityKind, entity_id: &str) -> Result<Vec<AuditEvent>> {
        let query = AuditQuery::for_entity(entity_kind, entity_id).page(usize::MAX, 0);
        let mut events = self.query(&query)?;
        events.reverse();
        Ok(events)
    }

    fn load(&self, event_id: &[u8]) -> Result<AuditEvent> {
        let raw = self.store.audit_log.get(event_id)?.ok_or_else(|| {
            WorkflowError::not_found(
                "AuditEvent",
                String::from_utf8_lossy(event_id).into_owned(),
            )
        })?;
        decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MapBuilder;

    #[test]
    fn index_is_scoped_to_entity() {
        let store = Store::temporary().unwrap();
        let logger = AuditLogger::new(store);
        let actor = ActorId::new("user_1").unwrap();

        logger
            .record(EntityKind::Quotation, "q1", AuditAction::Create, None, None, &actor)
            .unwrap();
        logger
            .record(EntityKind::Quotation, "q10", AuditAction::Create, None, None, &actor)
            .unwrap();
        logger
            .record(
                EntityKind::Quotation,
                "q1",
                AuditAction::StatusChange,
                Some(MapBuilder::new().field("status", "draft").build()),
                Some(MapBuilder::new().field("status", "pending_approval").build()),
                &actor,
            )
            .unwrap();

        let events = logger.events_for(EntityKind::Quotation, "q1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuditAction::Create);
        assert_eq!(events[1].action, AuditAction::StatusChange);
        assert!(events[0].before.is_none());
    }

    #[test]
    fn query_pages_newest_first() {
        let store = Store::temporary().unwrap();
        let logger = AuditLogger::new(store);
        let alice = ActorId::new("alice").unwrap();
        let bob = ActorId::new("bob").unwrap();

        for (n, actor) in [&alice, &bob, &alice, &alice].into_iter().enumerate() {
            logger
                .record(
                    EntityKind::Invoice,
                    &format!("inv{n}"),
                    AuditAction::Create,
                    None,
                    None,
                    actor,
                )
                .unwrap();
        }

        let page = logger
            .query(&AuditQuery::default().by_actor("alice").page(2, 1))
            .unwrap();
        let ids: Vec<_> = page.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, ["inv2", "inv0"]);
    }
}
