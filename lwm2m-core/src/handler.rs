//! Seam between the resource core and the notification-dispatch layer

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::base::ResourceBase;

/// Implemented by the CoAP/notification-dispatch layer. A [`ResourceBase`]
/// raises these events when its observation state demands traffic; the
/// implementation owns message construction, transmission, and
/// retransmission pacing. All calls arrive on the device's single protocol
/// loop, none of them may block.
pub trait ObservationHandler {
    /// a value change on an observed resource must go out as a notification
    /// carrying the current token and observation number; bumping the
    /// number for the next notification is this layer's job
    fn on_observation_ready(&mut self, resource: &ResourceBase);
    /// a single observed resource is being deregistered
    fn on_resource_removed(&mut self, path: &str);
    /// the observed object subtree rooted at `resource` is being removed
    fn on_object_removed(&mut self, resource: &ResourceBase);
    /// a server write landed on the resource
    fn on_value_updated(&mut self, resource: &ResourceBase);
}

/// Owning handle to a dispatch layer, held by the protocol loop.
pub type SharedHandler = Rc<RefCell<dyn ObservationHandler>>;

/// Non-owning handle a resource keeps to its dispatch layer, upgraded at
/// call time. A handle whose target is gone turns delivery into a no-op,
/// the resource never extends the dispatch layer's lifetime.
pub type WeakHandler = Weak<RefCell<dyn ObservationHandler>>;
