// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! An in-process, channel-backed stand-in for a real broker.
//!
//! `MockTransport` is the only [`super::TransportClient`] implementation in
//! this crate. It routes messages between named addresses over
//! `tokio::sync::mpsc` channels and assigns dynamic addresses for response
//! receivers, exactly the semantics the RPC core relies on from §6 — nothing
//! more. It is not meant to model broker failure modes beyond a closed link.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::transport::TransportError;
use crate::protocol::wire::Correlator;

use super::{Delivery, Disposition, Message, MessageBody, MessageHeader, MessageProperties};
use super::{Receiver, ReceiverOptions, Sender, TransportClient};

/// Shared routing table: address -> the channel feeding that address's
/// current receiver.
#[derive(Default)]
struct Broker {
    queues: HashMap<String, mpsc::UnboundedSender<Message>>,
}

/// A cheaply-cloneable handle to an in-process mock broker.
#[derive(Clone, Default)]
pub struct MockTransport {
    broker: Arc<Mutex<Broker>>,
}

impl MockTransport {
    /// Creates a fresh, empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    type Receiver = MockReceiver;
    type Sender = MockSender;

    async fn create_receiver(
        &self,
        address: Option<&str>,
        options: ReceiverOptions,
    ) -> Result<Self::Receiver, TransportError> {
        let address = match (address, options.dynamic) {
            (Some(addr), false) => addr.to_string(),
            (Some(addr), true) => addr.to_string(),
            (None, _) => format!("dynamic/{}", Correlator::generate()),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.broker.lock().queues.insert(address.clone(), tx.clone());

        Ok(MockReceiver { address, rx, requeue: tx })
    }

    async fn create_sender(&self, address: &str) -> Result<Self::Sender, TransportError> {
        let tx = self
            .broker
            .lock()
            .queues
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::SenderAttach {
                address: address.to_string(),
                message: "no receiver attached at this address".to_string(),
            })?;
        Ok(MockSender { tx })
    }
}

/// The [`Receiver`] half of [`MockTransport`].
pub struct MockReceiver {
    address: String,
    rx: mpsc::UnboundedReceiver<Message>,
    requeue: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl Receiver for MockReceiver {
    fn address(&self) -> &str {
        &self.address
    }

    async fn recv(&mut self) -> Option<Delivery> {
        let message = self.rx.recv().await?;
        let requeue = self.requeue.clone();
        let settle_copy = message.clone();
        Some(Delivery::new(message, move |disposition| {
            // Modeling a real broker's redelivery policy is out of scope; a
            // released message is simply requeued at the tail of the same
            // link, matching the one case the RPC core actually exercises
            // (an interceptor asking for redelivery).
            if disposition == Disposition::Release {
                let _ = requeue.send(settle_copy);
            }
        }))
    }
}

/// The [`Sender`] half of [`MockTransport`].
#[derive(Clone)]
pub struct MockSender {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl Sender for MockSender {
    async fn send(
        &self,
        body: MessageBody,
        properties: MessageProperties,
        header: MessageHeader,
    ) -> Result<(), TransportError> {
        self.tx
            .send(Message {
                body: Some(body),
                properties,
                header,
            })
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn send_then_recv_round_trips_a_message() {
        let transport = MockTransport::new();
        let mut receiver = transport
            .create_receiver(Some("rpc/requests"), ReceiverOptions::default())
            .await
            .unwrap();
        let sender = transport.create_sender("rpc/requests").await.unwrap();

        sender
            .send(
                MessageBody::Value(json!({"method": "echo"})),
                MessageProperties::default(),
                MessageHeader::default(),
            )
            .await
            .unwrap();

        let delivery = receiver.recv().await.unwrap();
        match delivery.message.body {
            Some(MessageBody::Value(ref v)) => assert_eq!(v, &json!({"method": "echo"})),
            _ => panic!("expected a value body"),
        }
        delivery.accept();
    }

    #[tokio::test]
    async fn sender_to_unknown_address_fails() {
        let transport = MockTransport::new();
        let result = transport.create_sender("nowhere").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dynamic_receivers_get_distinct_addresses() {
        let transport = MockTransport::new();
        let a = transport
            .create_receiver(None, ReceiverOptions { dynamic: true })
            .await
            .unwrap();
        let b = transport
            .create_receiver(None, ReceiverOptions { dynamic: true })
            .await
            .unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[tokio::test]
    async fn released_message_is_requeued() {
        let transport = MockTransport::new();
        let mut receiver = transport
            .create_receiver(Some("rpc/requests"), ReceiverOptions::default())
            .await
            .unwrap();
        let sender = transport.create_sender("rpc/requests").await.unwrap();

        sender
            .send(
                MessageBody::Value(json!({"method": "echo"})),
                MessageProperties::default(),
                MessageHeader::default(),
            )
            .await
            .unwrap();

        let delivery = receiver.recv().await.unwrap();
        delivery.release();

        let redelivered = receiver.recv().await.unwrap();
        match redelivered.message.body {
            Some(MessageBody::Value(ref v)) => assert_eq!(v, &json!({"method": "echo"})),
            _ => panic!("expected a value body"),
        }
        redelivered.accept();
    }
}
