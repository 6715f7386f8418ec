// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! The abstract transport the RPC core is layered over (spec.md §6).
//!
//! `RpcServer` and `RpcClient` are generic over [`TransportClient`]; this
//! crate never talks to a real broker. The only implementation shipped here
//! is [`mock::MockTransport`], an in-process channel-backed transport used by
//! the test suite and the demo binary.

pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::transport::TransportError;
use crate::protocol::wire::Correlator;

/// The decoded or still-encoded body of a transport message.
#[derive(Debug, Clone)]
pub enum MessageBody {
    /// A string-encoded body; the dispatch pipeline must JSON-decode it.
    Text(String),
    /// A native value, as if the transport had already decoded the wire
    /// encoding on the caller's behalf.
    Value(Value),
}

/// Routing properties carried alongside a message body.
#[derive(Debug, Clone, Default)]
pub struct MessageProperties {
    /// The address a reply should be published to.
    pub reply_to: Option<String>,
    /// The correlator to echo back on reply.
    pub correlation_id: Option<Correlator>,
}

/// Header fields carried alongside a message body.
#[derive(Debug, Clone, Default)]
pub struct MessageHeader {
    /// Hint to the transport for expiring the message, in milliseconds.
    pub ttl_ms: Option<u64>,
}

/// A transport message: an optional body plus routing properties and header.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// The message body, or `None` for a malformed/bodyless message.
    pub body: Option<MessageBody>,
    /// Routing properties.
    pub properties: MessageProperties,
    /// Header fields.
    pub header: MessageHeader,
}

impl Message {
    /// Builds a message with a JSON value body and no special routing.
    pub fn from_value(value: Value) -> Self {
        Self {
            body: Some(MessageBody::Value(value)),
            properties: MessageProperties::default(),
            header: MessageHeader::default(),
        }
    }
}

/// Terminal disposition of a received message, signaled back to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Successfully dispatched (or batched) and to be replied to.
    Accept,
    /// The interceptor chose to requeue the message.
    Release,
    /// Not used by the default dispatch pipeline, but available to embedders.
    Reject,
    /// Malformed (no body); tells the broker the message is undeliverable
    /// here.
    Modify {
        /// Whether the broker should consider this message undeliverable at
        /// this receiver specifically, vs. in general.
        undeliverable_here: bool,
    },
}

/// A handle that settles its delivery exactly once, shareable with whatever
/// stage of the dispatch pipeline (an interceptor, then the pipeline itself)
/// ends up deciding the disposition.
#[derive(Clone)]
pub struct DeliveryHandle(Arc<Mutex<Option<Box<dyn FnOnce(Disposition) + Send>>>>);

impl DeliveryHandle {
    /// Settles the delivery. A second call is a silent no-op — at-most-once
    /// settlement is enforced by the inner `Option::take`.
    pub fn settle(&self, disposition: Disposition) {
        if let Some(settle) = self.0.lock().take() {
            settle(disposition);
        }
    }

    /// Shorthand for `settle(Disposition::Accept)`.
    pub fn accept(&self) {
        self.settle(Disposition::Accept);
    }

    /// Shorthand for `settle(Disposition::Release)`.
    pub fn release(&self) {
        self.settle(Disposition::Release);
    }

    /// Shorthand for `settle(Disposition::Modify { undeliverable_here })`.
    pub fn modify(&self, undeliverable_here: bool) {
        self.settle(Disposition::Modify { undeliverable_here });
    }
}

/// A received message paired with the means to settle it exactly once.
pub struct Delivery {
    /// The received message.
    pub message: Message,
    /// A cloneable settlement handle for this delivery.
    pub handle: DeliveryHandle,
}

impl Delivery {
    /// Builds a delivery from a message and the closure that performs
    /// settlement against the concrete transport.
    pub fn new(message: Message, settle: impl FnOnce(Disposition) + Send + 'static) -> Self {
        Self {
            message,
            handle: DeliveryHandle(Arc::new(Mutex::new(Some(Box::new(settle))))),
        }
    }

    /// Shorthand for `handle.accept()`.
    pub fn accept(self) {
        self.handle.accept();
    }

    /// Shorthand for `handle.release()`.
    pub fn release(self) {
        self.handle.release();
    }

    /// Shorthand for `handle.modify(undeliverable_here)`.
    pub fn modify(self, undeliverable_here: bool) {
        self.handle.modify(undeliverable_here);
    }
}

/// Options for attaching a receiver link.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverOptions {
    /// When true, the broker assigns the receiver's address dynamically.
    pub dynamic: bool,
}

/// A receiver link: manual settlement, credit quantum 1 (spec.md §4.2),
/// serializing delivery per link.
#[async_trait]
pub trait Receiver: Send {
    /// The address this receiver is attached at. For a dynamic receiver this
    /// is only meaningful after the first call to `recv`/once attach
    /// completes.
    fn address(&self) -> &str;

    /// Awaits the next delivery, or `None` once the link has closed.
    async fn recv(&mut self) -> Option<Delivery>;
}

/// A sender link, created per-address and, for replies, per-message.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Sends `body` with the given `properties`/`header` to this sender's
    /// bound address.
    async fn send(
        &self,
        body: MessageBody,
        properties: MessageProperties,
        header: MessageHeader,
    ) -> Result<(), TransportError>;
}

/// The transport client the RPC core is layered over. Opaque beyond this
/// surface: authentication, reconnection, and broker topology are the
/// transport's problem, not the RPC core's (spec.md §1 non-goals).
#[async_trait]
pub trait TransportClient: Clone + Send + Sync + 'static {
    /// Concrete receiver type produced by this transport.
    type Receiver: Receiver + 'static;
    /// Concrete sender type produced by this transport.
    type Sender: Sender + 'static;

    /// Attaches a receiver. `address` is `None` for a dynamic receiver.
    async fn create_receiver(
        &self,
        address: Option<&str>,
        options: ReceiverOptions,
    ) -> Result<Self::Receiver, TransportError>;

    /// Attaches a sender to `address`.
    async fn create_sender(&self, address: &str) -> Result<Self::Sender, TransportError>;
}
