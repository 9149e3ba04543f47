//! Events and their payloads.

use downcast_rs::{impl_downcast, Downcast};
use dyn_clone::{clone_trait_object, DynClone};
use serde::ser::Serialize;

use crate::component::Id;

/// Identifies one event. Identifiers are handed out in scheduling order,
/// which doubles as the delivery tiebreak for events due at the same
/// instant.
pub type EventId = u64;

/// Payload carried by an event.
///
/// Any `Serialize + Clone + 'static` type qualifies through the blanket
/// implementation, so event structs only derive `Serialize` and `Clone`.
/// Serialization is used when a payload has to be rendered into a log line;
/// downcasting is how [`on_event!`](crate::on_event!) routes payloads back
/// to their concrete types.
pub trait EventData: Downcast + DynClone + erased_serde::Serialize {}

impl_downcast!(EventData);

clone_trait_object!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + DynClone + 'static> EventData for T {}

/// A payload in flight between two components.
///
/// An event is inert data: it carries no ordering of its own. The pending
/// queue ranks events by `(time, id)` when deciding what fires next.
#[derive(Clone)]
pub struct Event {
    /// Scheduling-order identifier.
    pub id: EventId,
    /// Virtual instant at which the event is due.
    pub time: f64,
    /// Component that scheduled the event.
    pub src: Id,
    /// Component the event is addressed to.
    pub dst: Id,
    /// Typed payload.
    pub data: Box<dyn EventData>,
}
