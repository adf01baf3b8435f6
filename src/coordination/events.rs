//! Event bus for table narration.
//!
//! Every state transition on the table is published here as a structured
//! event. Subscribers (the console narrator, tests) observe transitions in
//! the exact order the table applied them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};

use crate::ingredient::{Ingredient, Placement};

/// Kinds of events that can be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The agent put two ingredients on the table.
    IngredientsPlaced,
    /// A smoker took the ingredients and started smoking.
    IngredientsTaken,
    /// A smoker finished smoking.
    SmokingFinished,
    /// An ineligible smoker passed its wake-up on.
    WakeHandedBack,
}

impl EventKind {
    /// String representation for logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::IngredientsPlaced => "ingredients_placed",
            EventKind::IngredientsTaken => "ingredients_taken",
            EventKind::SmokingFinished => "smoking_finished",
            EventKind::WakeHandedBack => "wake_handed_back",
        }
    }
}

/// A transition on the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID.
    pub id: String,
    /// Kind of event.
    pub kind: EventKind,
    /// Smoker involved (if applicable).
    pub smoker: Option<Ingredient>,
    /// Ingredients involved (if applicable).
    pub placement: Option<Placement>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            kind,
            smoker: None,
            placement: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the smoker.
    pub fn by_smoker(mut self, smoker: Ingredient) -> Self {
        self.smoker = Some(smoker);
        self
    }

    /// Set the placement.
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Human-readable narration of the event.
    pub fn narration(&self) -> String {
        let smoker = self.smoker.map(|s| s.as_str()).unwrap_or("?");
        match self.kind {
            EventKind::IngredientsPlaced => match &self.placement {
                Some(placement) => format!("agent places {}", placement),
                None => "agent places ingredients".to_string(),
            },
            EventKind::IngredientsTaken => {
                format!("smoker with {} takes the ingredients and starts smoking", smoker)
            }
            EventKind::SmokingFinished => format!("smoker with {} finished smoking", smoker),
            EventKind::WakeHandedBack => format!("smoker with {} passes", smoker),
        }
    }
}

/// Subscription to events.
pub struct Subscription {
    /// Receiver for events.
    receiver: Receiver<Event>,
    /// Filter for event kinds (empty = all).
    kinds: Vec<EventKind>,
}

impl Subscription {
    /// Receive the next event matching the filters.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("event subscriber lagged, skipped {} events", skipped);
                    continue;
                }
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    fn matches(&self, event: &Event) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&event.kind)
    }
}

/// Event bus fanning table transitions out to subscribers.
pub struct EventBus {
    /// Broadcast sender for events.
    sender: Sender<Event>,
    /// History of recent events.
    history: Arc<Mutex<Vec<Event>>>,
    /// Maximum history size.
    max_history: usize,
    /// Event counts by kind.
    counts: Arc<Mutex<HashMap<EventKind, usize>>>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        Self::with_history_size(1000)
    }

    /// Create an event bus with custom history size.
    pub fn with_history_size(size: usize) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            history: Arc::new(Mutex::new(Vec::new())),
            max_history: size,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish an event.
    ///
    /// Never suspends, so the table can publish while holding its guard.
    pub fn publish(&self, event: Event) {
        {
            let mut history = self.history.lock();
            history.push(event.clone());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(..excess);
            }
        }

        {
            let mut counts = self.counts.lock();
            *counts.entry(event.kind).or_insert(0) += 1;
        }

        // Broadcast (ignore if no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_to(Vec::new())
    }

    /// Subscribe to specific event kinds.
    pub fn subscribe_to(&self, kinds: Vec<EventKind>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            kinds,
        }
    }

    /// Get recent events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        let history = self.history.lock();
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    /// Get event counts by kind.
    pub fn event_counts(&self) -> HashMap<EventKind, usize> {
        self.counts.lock().clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// Convenience functions for table transitions
impl EventBus {
    /// Publish an ingredients placed event.
    pub fn ingredients_placed(&self, placement: Placement) {
        self.publish(Event::new(EventKind::IngredientsPlaced).with_placement(placement));
    }

    /// Publish an ingredients taken event.
    pub fn ingredients_taken(&self, smoker: Ingredient, placement: Placement) {
        self.publish(
            Event::new(EventKind::IngredientsTaken)
                .by_smoker(smoker)
                .with_placement(placement),
        );
    }

    /// Publish a smoking finished event.
    pub fn smoking_finished(&self, smoker: Ingredient) {
        self.publish(Event::new(EventKind::SmokingFinished).by_smoker(smoker));
    }

    /// Publish a wake handed back event.
    pub fn wake_handed_back(&self, smoker: Ingredient) {
        self.publish(Event::new(EventKind::WakeHandedBack).by_smoker(smoker));
    }
}
