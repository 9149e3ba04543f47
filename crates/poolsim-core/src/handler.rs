//! Event consumption.

use crate::event::Event;

/// Implemented by components that receive events.
pub trait EventHandler {
    /// Processes a single delivered event.
    fn on(&mut self, event: Event);
}

/// Routes an event to the arm whose payload type matches, destructuring the
/// payload into the arm's bindings.
///
/// The event is consumed by the first matching arm; a payload matching no
/// arm is reported as unrouted at ERROR level. Arms need not be exhaustive.
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use serde::Serialize;
/// use poolsim_core::{on_event, Event, EventHandler, Simulation};
///
/// #[derive(Clone, Serialize)]
/// struct Ping {
///     payload: u32,
/// }
///
/// struct Receiver {
///     last: u32,
/// }
///
/// impl EventHandler for Receiver {
///     fn on(&mut self, event: Event) {
///         on_event!(event, {
///             Ping { payload } => {
///                 self.last = payload;
///             }
///         })
///     }
/// }
///
/// let mut sim = Simulation::new(1);
/// let receiver = Rc::new(RefCell::new(Receiver { last: 0 }));
/// let id = sim.add_handler("receiver", receiver.clone());
/// let ctx = sim.create_context("driver");
/// ctx.emit(Ping { payload: 7 }, id, 1.0);
/// sim.step_until_no_events();
/// assert_eq!(receiver.borrow().last, 7);
/// ```
#[macro_export]
macro_rules! on_event {
    ( $event:ident, { $( $ty:ident { $($binding:tt)* } => $body:block )+ } ) => {{
        let mut __pending = Some($event);
        $(
            if __pending.as_ref().map_or(false, |e| e.data.is::<$ty>()) {
                if let Some(__taken) = __pending.take() {
                    if let Ok(__payload) = __taken.data.downcast::<$ty>() {
                        let $ty { $($binding)* } = *__payload;
                        $body
                    }
                }
            }
        )+
        if let Some(__stray) = __pending {
            $crate::log::report_unrouted(__stray);
        }
    }};
}
