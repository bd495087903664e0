//! In-process notification bus keyed by event name.
//!
//! Handlers run synchronously inside `emit`, in registration order. Nothing
//! is buffered: a handler registered after an emit never sees that event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{DATE_FORMAT, DayTargets, DayTotals};

pub const TOTALS_CHANGED: &str = "totals:changed";
pub const TARGETS_SAVED: &str = "targets:saved";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Published after every successful recompute.
    TotalsChanged {
        user_id: String,
        date: NaiveDate,
        totals: DayTotals,
    },
    /// Raw target payload, published when a target is saved and before the
    /// follow-up recompute finishes. `date` is `None` for standing targets.
    TargetsSaved {
        user_id: String,
        date: Option<NaiveDate>,
        targets: DayTargets,
    },
}

impl Event {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::TotalsChanged { .. } => TOTALS_CHANGED,
            Event::TargetsSaved { .. } => TARGETS_SAVED,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Event::TotalsChanged { user_id, .. } | Event::TargetsSaved { user_id, .. } => user_id,
        }
    }

    #[must_use]
    pub fn date_key(&self) -> Option<String> {
        match self {
            Event::TotalsChanged { date, .. } => Some(date.format(DATE_FORMAT).to_string()),
            Event::TargetsSaved { date, .. } => date.map(|d| d.format(DATE_FORMAT).to_string()),
        }
    }
}

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct NotificationBus {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
    emit_count: AtomicU64,
}

impl NotificationBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event_name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(event_name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            removed |= list.len() != before;
        }
        handlers.retain(|_, list| !list.is_empty());
        removed
    }

    /// Call every handler registered for the event's name. Returns how many ran.
    ///
    /// The handler list is snapshotted first so handlers may subscribe or
    /// unsubscribe without deadlocking; such changes apply to the next emit.
    pub fn emit(&self, event: &Event) -> usize {
        self.emit_count.fetch_add(1, Ordering::Relaxed);
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            handlers
                .get(event.name())
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    #[must_use]
    pub fn subscriber_count(&self, event_name: &str) -> usize {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        handlers.get(event_name).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals_event(user: &str) -> Event {
        Event::TotalsChanged {
            user_id: user.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            totals: DayTotals::empty(2000.0),
        }
    }

    #[test]
    fn test_emit_with_no_subscribers() {
        let bus = NotificationBus::new();
        assert_eq!(bus.emit(&totals_event("u1")), 0);
        assert_eq!(bus.emit_count(), 1);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(TOTALS_CHANGED, move |_| seen.lock().unwrap().push(tag));
        }

        assert_eq!(bus.emit(&totals_event("u1")), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_events_only_reach_their_name() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(TARGETS_SAVED, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.emit(&totals_event("u1")), 0);
        let saved = Event::TargetsSaved {
            user_id: "u1".to_string(),
            date: None,
            targets: DayTargets::default(),
        };
        assert_eq!(bus.emit(&saved), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_subscriber_misses_past_events() {
        let bus = NotificationBus::new();
        bus.emit(&totals_event("u1"));

        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(TOTALS_CHANGED, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.emit(&totals_event("u1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let id = bus.subscribe(TOTALS_CHANGED, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.subscriber_count(TOTALS_CHANGED), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(TOTALS_CHANGED), 0);
        assert_eq!(bus.emit(&totals_event("u1")), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let bus = Arc::new(NotificationBus::new());
        let inner_bus = Arc::clone(&bus);
        bus.subscribe(TOTALS_CHANGED, move |_| {
            inner_bus.subscribe(TOTALS_CHANGED, |_| {});
        });

        assert_eq!(bus.emit(&totals_event("u1")), 1);
        assert_eq!(bus.subscriber_count(TOTALS_CHANGED), 2);
    }

    #[test]
    fn test_event_accessors() {
        let event = totals_event("u9");
        assert_eq!(event.name(), TOTALS_CHANGED);
        assert_eq!(event.user_id(), "u9");
        assert_eq!(event.date_key().as_deref(), Some("2024-01-05"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "totals_changed");
        assert_eq!(json["totals"]["allowance"], 2000.0);
    }
}
