//! Fans one transport subscription per namespace out to many local handlers.
//!
//! The transport only ever sees a single subscription for a namespace, no
//! matter how many handlers are registered for it.  Handlers may be added
//! before the session is casting; their namespaces are remembered and
//! subscribed by [`ChannelMultiplexer::resubscribe_all`] once it is.
//!
//! Transport subscriptions do not survive a reconnect, so every time the link
//! drops the owner calls [`ChannelMultiplexer::mark_all_unsubscribed`] and the
//! next casting transition subscribes everything again.

use std::collections::HashMap;
use std::sync::Arc;

use racecast_core::{decode_message, Message};
use tracing::{debug, warn};

use crate::application::transport::Transport;

/// A handler for decoded messages.  Identity is the `Arc` allocation.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
struct NamespaceSubscription {
    handlers: Vec<MessageHandler>,
    /// Whether the transport currently holds a subscription for this namespace.
    subscribed: bool,
}

#[derive(Default)]
pub struct ChannelMultiplexer {
    namespaces: HashMap<String, NamespaceSubscription>,
}

impl ChannelMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to `namespace`.
    ///
    /// When this is the namespace's first handler and `live` is given, the
    /// namespace is subscribed at that transport.  A failed subscription is
    /// logged and retried on the next [`resubscribe_all`](Self::resubscribe_all).
    ///
    /// Returns `false` if the handler was already registered for `namespace`.
    pub fn add_handler(
        &mut self,
        namespace: &str,
        handler: MessageHandler,
        live: Option<&mut dyn Transport>,
    ) -> bool {
        let entry = self.namespaces.entry(namespace.to_string()).or_default();
        if entry.handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        entry.handlers.push(handler);

        if !entry.subscribed {
            if let Some(transport) = live {
                entry.subscribed = subscribe(transport, namespace);
            }
        }
        true
    }

    /// Removes `handler` from `namespace`.  When the last handler goes the
    /// namespace is unsubscribed (if it was subscribed and `live` is given)
    /// and forgotten.
    ///
    /// Returns `false` if the namespace or handler was unknown.
    pub fn remove_handler(
        &mut self,
        namespace: &str,
        handler: &MessageHandler,
        live: Option<&mut dyn Transport>,
    ) -> bool {
        let Some(entry) = self.namespaces.get_mut(namespace) else {
            return false;
        };
        let before = entry.handlers.len();
        entry.handlers.retain(|h| !Arc::ptr_eq(h, handler));
        if entry.handlers.len() == before {
            return false;
        }

        if entry.handlers.is_empty() {
            if entry.subscribed {
                if let Some(transport) = live {
                    if let Err(e) = transport.unsubscribe(namespace) {
                        warn!("failed to unsubscribe from {namespace}: {e}");
                    }
                }
            }
            self.namespaces.remove(namespace);
            debug!("namespace {namespace} has no handlers left, dropped");
        }
        true
    }

    /// Subscribes every tracked namespace the transport does not yet hold.
    ///
    /// Returns the number of namespaces newly subscribed.
    pub fn resubscribe_all(&mut self, transport: &mut dyn Transport) -> usize {
        let mut count = 0;
        for (namespace, entry) in self.namespaces.iter_mut() {
            if entry.subscribed {
                continue;
            }
            entry.subscribed = subscribe(transport, namespace);
            if entry.subscribed {
                count += 1;
            }
        }
        count
    }

    /// Records that the transport has lost every subscription.
    pub fn mark_all_unsubscribed(&mut self) {
        for entry in self.namespaces.values_mut() {
            entry.subscribed = false;
        }
    }

    /// Decodes `raw` and hands it to every handler of `namespace`, in
    /// registration order.
    ///
    /// Payloads for namespaces without handlers are dropped silently;
    /// payloads that fail to decode are dropped with a warning.  Returns the
    /// number of handlers invoked.
    pub fn dispatch(&self, namespace: &str, raw: &str) -> usize {
        let Some(entry) = self.namespaces.get(namespace) else {
            return 0;
        };
        let message = match decode_message(raw) {
            Ok(m) => m,
            Err(e) => {
                warn!("dropping undecodable payload on {namespace}: {e}");
                return 0;
            }
        };
        for handler in &entry.handlers {
            handler(&message);
        }
        entry.handlers.len()
    }

    pub fn handler_count(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map_or(0, |entry| entry.handlers.len())
    }

    pub fn is_subscribed(&self, namespace: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|entry| entry.subscribed)
    }

    /// All namespaces with at least one handler, in no particular order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }
}

fn subscribe(transport: &mut dyn Transport, namespace: &str) -> bool {
    match transport.subscribe(namespace) {
        Ok(()) => {
            debug!("subscribed to {namespace}");
            true
        }
        Err(e) => {
            warn!("failed to subscribe to {namespace}: {e}");
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
