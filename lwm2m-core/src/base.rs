//! Base entity for addressable LWM2M nodes
//!
//! [`ResourceBase`] carries what every node of the object tree shares:
//! identity and Link-Format metadata, the allowed-operation mask, and the
//! whole observation lifecycle (token, sequence number, dispatch handle,
//! notification trigger). The tree container owns values and CRUD; this
//! type owns the decision of when and how the dispatch layer hears about
//! changes.

use bitflags::bitflags;
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    handler::{SharedHandler, WeakHandler},
    report::ReportHandler,
};

use std::{
    rc::{Rc, Weak},
    time::Instant,
};

/// Maximum observation token length accepted, the CoAP token size limit
pub const MAX_TOKEN_LEN: usize = 8;

/// Observation token storage, inline and bounded
pub type Token = heapless::Vec<u8, MAX_TOKEN_LEN>;

bitflags! {
    /// CoAP methods a resource admits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Operation: u8 {
        /// retrieval and observe
        const GET = 0x01;
        /// replace-style write
        const PUT = 0x02;
        /// create or execute
        const POST = 0x04;
        /// removal
        const DELETE = 0x08;
    }
}

impl Operation {
    /// Whether any of the contained methods mutate the resource
    pub fn is_write_class(self) -> bool {
        self.intersects(Operation::PUT | Operation::POST | Operation::DELETE)
    }
}

/// Position of a node in the LWM2M object tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaseType {
    /// top-level object
    #[default]
    Object,
    /// instance of an object
    ObjectInstance,
    /// resource under an object instance
    Resource,
    /// instance of a multiple-instance resource
    ResourceInstance,
}

/// Whether the node's value is device-fixed or server-writable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// value fixed at the device, write-class methods are denied at
    /// access time no matter what the operation mask says
    Static,
    /// value writable through the server interface
    Dynamic,
}

/// An addressable LWM2M node and its observation state.
///
/// The token buffer and the [`ReportHandler`] are exclusively owned.
/// The dispatch handle is not: it is a weak reference resolved on every
/// delivery, so a torn-down dispatch layer degrades events to no-ops.
#[derive(Debug)]
pub struct ResourceBase {
    name: String,
    mode: Mode,
    base_type: BaseType,
    operation: Operation,
    instance_id: u16,
    interface_description: String,
    resource_type: String,
    coap_content_type: u8,
    observable: bool,
    under_observation: bool,
    observation_number: u16,
    token: Token,
    report_handler: Option<ReportHandler>,
    sink: Option<WeakHandler>,
}

impl Clone for ResourceBase {
    // token and report handler are value state and copy deep; the sink
    // reference identifies a live subscription and never follows a copy
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            mode: self.mode,
            base_type: self.base_type,
            operation: self.operation,
            instance_id: self.instance_id,
            interface_description: self.interface_description.clone(),
            resource_type: self.resource_type.clone(),
            coap_content_type: self.coap_content_type,
            observable: self.observable,
            under_observation: self.under_observation,
            observation_number: self.observation_number,
            token: self.token.clone(),
            report_handler: self.report_handler.clone(),
            sink: None,
        }
    }
}

impl ResourceBase {
    /// Node with the given name and value mode. Everything else starts
    /// empty: no allowed operations, not observable, not observed.
    pub fn new(name: impl Into<String>, mode: Mode) -> Self {
        Self {
            name: name.into(),
            mode,
            base_type: BaseType::default(),
            operation: Operation::empty(),
            instance_id: 0,
            interface_description: String::new(),
            resource_type: String::new(),
            coap_content_type: 0,
            observable: false,
            under_observation: false,
            observation_number: 0,
            token: Token::new(),
            report_handler: None,
            sink: None,
        }
    }

    /// Replace the allowed-operation mask.
    ///
    /// The mask is stored as given even on a static node; the static
    /// restriction is enforced when access is checked, not here.
    pub fn set_operation(&mut self, operation: Operation) {
        self.operation = operation;
    }

    /// Whether `operation` may be performed on this node right now.
    pub fn is_operation_allowed(&self, operation: Operation) -> bool {
        if self.mode == Mode::Static && operation.is_write_class() {
            return false;
        }
        self.operation.contains(operation)
    }

    /// Set the node's position in the object tree.
    pub fn set_base_type(&mut self, base_type: BaseType) {
        self.base_type = base_type;
    }

    /// Set the instance identifier. Meaningful for
    /// [`BaseType::ObjectInstance`] and [`BaseType::ResourceInstance`].
    pub fn set_instance_id(&mut self, instance_id: u16) {
        self.instance_id = instance_id;
    }

    /// Set the Link-Format interface description.
    pub fn set_interface_description(&mut self, desc: impl Into<String>) {
        self.interface_description = desc.into();
    }

    /// Set the Link-Format resource type.
    pub fn set_resource_type(&mut self, rt: impl Into<String>) {
        self.resource_type = rt.into();
    }

    /// Set the CoAP content-format code values are served with.
    pub fn set_coap_content_type(&mut self, content_type: u8) {
        self.coap_content_type = content_type;
    }

    /// Mark the node as capable of being observed. Off by default.
    pub fn set_observable(&mut self, observable: bool) {
        self.observable = observable;
    }

    /// Enable or disable observation and (re)attach the dispatch layer.
    ///
    /// Enabling on a node that is not observable fails with
    /// [`Error::NotObservable`]. Enabling replaces the stored dispatch
    /// handle with `sink` (a `None` sink is permitted and just leaves no
    /// handle attached) and lazily creates the report handler. Disabling
    /// drops the handle and clears the token, leaving observation fully
    /// torn down.
    ///
    /// The token and the observation number are managed separately via
    /// [`set_observation_token`](Self::set_observation_token); observation
    /// is reported to the outside only once both the flag and a non-empty
    /// token are in place.
    pub fn set_under_observation(
        &mut self,
        enable: bool,
        sink: Option<&SharedHandler>,
    ) -> Result<()> {
        if enable && !self.observable {
            return Err(Error::NotObservable {
                name: self.name.clone(),
            });
        }
        debug!(name = %self.name, enable, has_sink = sink.is_some(), "observation state change");
        if enable {
            self.sink = sink.map(Rc::downgrade);
            if self.report_handler.is_none() {
                self.report_handler = Some(ReportHandler::new());
            }
        } else {
            self.sink = None;
            self.token.clear();
        }
        self.under_observation = enable;
        Ok(())
    }

    /// Store a fresh observation token, replacing any previous one.
    ///
    /// The bytes are copied into the node's own buffer. An empty slice is
    /// legal and stands for "no token", which exits the observed state.
    /// Every replacement restarts the notification sequence at zero.
    pub fn set_observation_token(&mut self, token: &[u8]) -> Result<()> {
        self.token = Token::from_slice(token).map_err(|()| Error::TokenTooLong {
            len: token.len(),
            max: MAX_TOKEN_LEN,
        })?;
        self.observation_number = 0;
        trace!(name = %self.name, len = token.len(), "observation token replaced");
        Ok(())
    }

    /// Copy the current token into `buf`, returning how many bytes were
    /// written. Fails with [`Error::BufferTooSmall`] when `buf` cannot
    /// hold it.
    pub fn get_observation_token(&self, buf: &mut [u8]) -> Result<usize> {
        let needed = self.token.len();
        if buf.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                capacity: buf.len(),
            });
        }
        buf[..needed].copy_from_slice(&self.token);
        Ok(needed)
    }

    /// Current observation token, empty when none is registered.
    pub fn observation_token(&self) -> &[u8] {
        &self.token
    }

    /// Overwrite the notification sequence counter. The dispatch layer
    /// bumps this after each notification it sends.
    pub fn set_observation_number(&mut self, number: u16) {
        self.observation_number = number;
    }

    /// Sequence counter carried by the next notification.
    pub fn observation_number(&self) -> u16 {
        self.observation_number
    }

    /// Whether a server currently observes this node: observation is
    /// enabled and a non-empty token is registered.
    pub fn is_under_observation(&self) -> bool {
        self.under_observation && !self.token.is_empty()
    }

    /// Whether the node may be observed at all.
    pub fn is_observable(&self) -> bool {
        self.observable
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value mode, fixed at construction.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Allowed-operation mask as stored.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Position in the object tree.
    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    /// Instance identifier.
    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    /// Link-Format interface description.
    pub fn interface_description(&self) -> &str {
        &self.interface_description
    }

    /// Link-Format resource type.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// CoAP content-format code.
    pub fn coap_content_type(&self) -> u8 {
        self.coap_content_type
    }

    /// Notification trigger, present once observation has begun.
    pub fn report_handler(&self) -> Option<&ReportHandler> {
        self.report_handler.as_ref()
    }

    /// Apply a server-written attribute query (`pmin`, `pmax`, `st`) to
    /// the notification trigger. False when no trigger exists yet or the
    /// query is rejected as malformed or contradictory.
    pub fn handle_observation_attribute(&mut self, query: &str) -> bool {
        match &mut self.report_handler {
            Some(handler) => handler.configure(query),
            None => false,
        }
    }

    /// Evaluate a changed value against the notification trigger and, if
    /// it must go out, raise it to the dispatch layer. Returns whether a
    /// notification was raised. Nothing happens unless the node is
    /// observed.
    pub fn report_value_change(&mut self, value: f64, now: Instant) -> bool {
        if !self.is_under_observation() {
            return false;
        }
        let Some(handler) = &mut self.report_handler else {
            return false;
        };
        if !handler.should_notify(value, now) {
            return false;
        }
        self.observation_to_be_sent();
        true
    }

    /// Hand the current state to the dispatch layer for packaging into a
    /// notification. No-op unless the node is observed and the dispatch
    /// layer is still alive.
    pub fn observation_to_be_sent(&self) {
        if !self.is_under_observation() {
            return;
        }
        if let Some(sink) = self.live_sink() {
            debug!(name = %self.name, number = self.observation_number, "notification ready");
            sink.borrow_mut().on_observation_ready(self);
        }
    }

    /// Tell the dispatch layer this observed node is being deregistered.
    /// `path` is the node's location in the tree. No-op unless observed
    /// with a live dispatch layer.
    pub fn remove_resource_from_coap(&self, path: &str) {
        if !self.is_under_observation() {
            return;
        }
        if let Some(sink) = self.live_sink() {
            debug!(name = %self.name, path, "deregistering observed resource");
            sink.borrow_mut().on_resource_removed(path);
        }
    }

    /// Tell the dispatch layer the observed object subtree rooted here is
    /// being removed. No-op unless observed with a live dispatch layer.
    pub fn remove_object_from_coap(&self) {
        if !self.is_under_observation() {
            return;
        }
        if let Some(sink) = self.live_sink() {
            debug!(name = %self.name, "deregistering observed object");
            sink.borrow_mut().on_object_removed(self);
        }
    }

    /// Tell the dispatch layer a server write landed here. Requires only
    /// an attached, live dispatch layer; the node need not be observed.
    pub fn value_updated(&self) {
        if let Some(sink) = self.live_sink() {
            trace!(name = %self.name, "value updated");
            sink.borrow_mut().on_value_updated(self);
        }
    }

    fn live_sink(&self) -> Option<SharedHandler> {
        self.sink.as_ref().and_then(Weak::upgrade)
    }
}
