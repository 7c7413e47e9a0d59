//! Map change notification
//!
//! Observers subscribe to a [`MapEventBus`] and receive events over a
//! crossbeam channel. Events are sent after the mutation they describe has
//! been applied, from the thread that performed it.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::common::Point3D;

/// Change notification raised by the grid map
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Cylindrical obstacles were rasterized (and inflated)
    ObstaclesAdded { count: usize },
    /// A single cell was marked occupied
    CellMarked { position: Point3D },
    /// A perception batch landed
    CellsMarked { count: usize },
    /// Every cell was reset to free
    Cleared,
}

/// Fan-out of map events to any number of subscribers
#[derive(Debug, Default)]
pub struct MapEventBus {
    subscribers: Vec<Sender<MapEvent>>,
}

impl MapEventBus {
    pub fn new() -> Self {
        Self { subscribers: Vec::new() }
    }

    pub fn subscribe(&mut self) -> Receiver<MapEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Send `event` to every live subscriber, pruning dropped receivers
    pub fn publish(&mut self, event: MapEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let mut bus = MapEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(MapEvent::Cleared);
        assert_eq!(a.try_recv(), Ok(MapEvent::Cleared));
        assert_eq!(b.try_recv(), Ok(MapEvent::Cleared));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut bus = MapEventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(MapEvent::CellsMarked { count: 2 });
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.len(), 1);
    }
}
