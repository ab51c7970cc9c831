//! Event handling.

use super::event::Event;

/// Trait for consuming events in simulation components.
pub trait EventHandler {
    /// Processes an event delivered to the component.
    fn on(&mut self, event: Event);
}

/// Pattern matching over event payload types.
///
/// Each arm downcasts `event.data` to the named struct and destructures it. Payloads matching no arm
/// are logged as unhandled at `ERROR` level.
///
/// ```ignore
/// cast!(match event.data {
///     FlowArrival { flow } => {
///         self.admit(flow);
///     }
///     FlowCompleted { flow_id, .. } => {
///         self.complete(flow_id);
///     }
/// })
/// ```
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        $(
            if $event.data.is::<$type>() {
                if let Ok(__value) = $event.data.downcast::<$type>() {
                    let $type { $($tt)* } = *__value;
                    $($expr)*
                }
            } else
        )*
        {
            $crate::engine::log::log_unhandled_event($event);
        }
    }
}
