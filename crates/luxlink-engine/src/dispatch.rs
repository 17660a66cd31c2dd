//! Per-link message dispatch.
//!
//! A [`LinkDispatcher`] binds one frame buffer and codec to one transport.
//! It owns:
//!
//! - a registry mapping a [`DispatchKey`] to the callback of the one
//!   integration addressed by that key,
//! - a FIFO queue of outgoing command lines, drained by the transport,
//! - the link's `initialized` flag, whose false→true transition is the
//!   only mechanism by which integrations refresh their cached state
//!   after a (re)connect.
//!
//! The protocol has no request/response correlation: a query merely makes
//! the processor eventually emit the same keyed response line it would
//! emit spontaneously. Routing is therefore purely by key, and only the
//! latest decoded value per key is retained by the integrations.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use luxlink_protocol::{parse, CommandKind, FrameBuffer, Message, Mode};
use tracing::{debug, trace};

use crate::error::{EngineError, EngineResult};
use crate::event::{Signal, Subscription};

/// Routing key for inbound responses: command category plus integration
/// id, plus the component number for component-aware categories.
///
/// Exactly one integration may hold a key at a time. Two integrations of
/// different categories may share a numeric id without collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    /// The command category.
    pub kind: CommandKind,
    /// The addressed integration id.
    pub integration_id: u32,
    /// The component number, for component-aware categories only.
    pub component: Option<u32>,
}

impl DispatchKey {
    /// Create a key for the component-less grammar.
    pub fn new(kind: CommandKind, integration_id: u32) -> Self {
        DispatchKey { kind, integration_id, component: None }
    }

    /// Create a key for the component-aware grammar.
    pub fn with_component(kind: CommandKind, integration_id: u32, component: u32) -> Self {
        DispatchKey { kind, integration_id, component: Some(component) }
    }

    /// Compute the key addressing a parsed message.
    pub fn for_message(message: &Message) -> Self {
        DispatchKey {
            kind: message.command,
            integration_id: message.integration_id,
            component: if message.command.component_aware() {
                message.component
            } else {
                None
            },
        }
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.component {
            Some(component) => {
                write!(f, "{},{},{}", self.kind.keyword(), self.integration_id, component)
            }
            None => write!(f, "{},{}", self.kind.keyword(), self.integration_id),
        }
    }
}

type DispatchCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Shared state behind a [`LinkDispatcher`] handle.
struct LinkShared {
    framer: Mutex<FrameBuffer>,
    registry: Mutex<HashMap<DispatchKey, DispatchCallback>>,
    outgoing: Mutex<VecDeque<String>>,
    initialized: Mutex<bool>,
    initialized_changed: Signal<bool>,
    /// Complete frames that are not dispatchable responses (login prompt,
    /// banner text). An outer layer watches this to run the login
    /// sequence.
    session: Signal<String>,
}

/// Dispatcher for one link to one processor. Cheap to clone; all clones
/// share the same state.
#[derive(Clone)]
pub struct LinkDispatcher {
    shared: Arc<LinkShared>,
}

impl LinkDispatcher {
    /// Create a dispatcher for a fresh, not-yet-initialized link.
    pub fn new() -> Self {
        LinkDispatcher {
            shared: Arc::new(LinkShared {
                framer: Mutex::new(FrameBuffer::new()),
                registry: Mutex::new(HashMap::new()),
                outgoing: Mutex::new(VecDeque::new()),
                initialized: Mutex::new(false),
                initialized_changed: Signal::new(),
                session: Signal::new(),
            }),
        }
    }

    /// Get a non-owning handle to this dispatcher.
    ///
    /// Callbacks held by the dispatcher itself (registry entries, resync
    /// hooks) must capture a [`WeakLink`] rather than a clone, so that
    /// the dispatcher never keeps itself alive through its own registry.
    pub fn downgrade(&self) -> WeakLink {
        WeakLink { shared: Arc::downgrade(&self.shared) }
    }

    /// Register the callback for a dispatch key.
    ///
    /// Fails with [`EngineError::DuplicateKey`] if the key is already
    /// taken: one integration per key at a time.
    pub fn register_callback<F>(&self, key: DispatchKey, callback: F) -> EngineResult<()>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut registry = self
            .shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match registry.entry(key) {
            Entry::Occupied(_) => Err(EngineError::DuplicateKey(key)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(callback));
                Ok(())
            }
        }
    }

    /// Remove the callback for a dispatch key. No-op if absent, since
    /// disposal may race with a registration that never completed.
    pub fn unregister_callback(&self, key: &DispatchKey) {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Check whether a key currently has a registered callback.
    pub fn is_registered(&self, key: &DispatchKey) -> bool {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Append a command line to the outgoing queue. Never blocks; the
    /// transport drains the queue sequentially so wire order matches
    /// submission order.
    ///
    /// Commands are fire-and-forget. A query does not get a paired reply;
    /// it makes the processor eventually emit the same keyed response it
    /// would emit on a spontaneous change.
    pub fn enqueue_command(&self, line: String) {
        trace!("link: queueing command '{}'", line);
        self.shared
            .outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(line);
    }

    /// Take the next queued outgoing line, if any. Called by the
    /// transport's single writer.
    pub fn next_outgoing(&self) -> Option<String> {
        self.shared
            .outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Take every queued outgoing line.
    pub fn drain_outgoing(&self) -> Vec<String> {
        self.shared
            .outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Feed a chunk of received characters from the transport.
    ///
    /// Every complete response frame is routed to the callback registered
    /// for its key; unparseable frames and frames addressed to no one are
    /// dropped. The transport's read loop must call this sequentially.
    pub fn on_incoming_data(&self, chunk: &str) {
        let frames = self
            .shared
            .framer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .feed(chunk);

        for frame in frames {
            if frame.is_empty() {
                continue;
            }
            match parse(&frame) {
                Ok(message) if message.mode == Mode::Response => {
                    self.dispatch(&message);
                }
                Ok(message) => {
                    // Execute/Query lines are never received; most likely
                    // a terminal echo of our own command.
                    trace!("link: ignoring non-response line '{}' ({:?})", frame, message.mode);
                }
                Err(error) => {
                    debug!("link: undecodable frame '{}': {}", frame, error);
                    self.shared.session.emit(&frame);
                }
            }
        }
    }

    fn dispatch(&self, message: &Message) {
        let key = DispatchKey::for_message(message);
        let callback = self
            .shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        match callback {
            Some(callback) => callback(message),
            // Broadcast-style traffic for uninstantiated integrations is
            // normal; drop it.
            None => trace!("link: no integration registered for {}", key),
        }
    }

    /// Whether the link has completed its connect/login sequence.
    pub fn is_initialized(&self) -> bool {
        *self
            .shared
            .initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the initialized flag.
    ///
    /// A false→true transition notifies every registered integration,
    /// each of which re-queries its own state; this is the sole resync
    /// mechanism after a reconnect. A true→false transition notifies but
    /// does not clear cached integration state, which is merely stale
    /// until the next resync. Setting the current value again fires
    /// nothing.
    pub fn set_initialized(&self, value: bool) {
        {
            let mut initialized = self
                .shared
                .initialized
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *initialized == value {
                return;
            }
            *initialized = value;
        }
        debug!("link: initialized -> {}", value);
        self.shared.initialized_changed.emit(&value);
    }

    /// Observe initialized-flag transitions.
    pub fn subscribe_initialized<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.shared.initialized_changed.subscribe(observer)
    }

    /// Stop observing initialized-flag transitions.
    pub fn unsubscribe_initialized(&self, subscription: &Subscription) {
        self.shared.initialized_changed.unsubscribe(subscription);
    }

    /// Observe frames that are not dispatchable responses, such as the
    /// login prompt (delivered verbatim, token included).
    pub fn subscribe_session<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.shared.session.subscribe(observer)
    }

    /// Stop observing session frames.
    pub fn unsubscribe_session(&self, subscription: &Subscription) {
        self.shared.session.unsubscribe(subscription);
    }

    /// Discard partially-accumulated frame data. Called by the transport
    /// on disconnect, where a half-received line must not bleed into the
    /// next connection.
    pub fn clear_buffer(&self) {
        self.shared
            .framer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for LinkDispatcher {
    fn default() -> Self {
        LinkDispatcher::new()
    }
}

/// Non-owning handle to a [`LinkDispatcher`].
#[derive(Clone)]
pub struct WeakLink {
    shared: Weak<LinkShared>,
}

impl WeakLink {
    /// Get a usable dispatcher handle, if the link still exists.
    pub fn upgrade(&self) -> Option<LinkDispatcher> {
        self.shared.upgrade().map(|shared| LinkDispatcher { shared })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_duplicate_key_fails_loudly() {
        let link = LinkDispatcher::new();
        let key = DispatchKey::new(CommandKind::Output, 1);
        link.register_callback(key, |_| {}).unwrap();
        let result = link.register_callback(key, |_| {});
        assert!(matches!(result, Err(EngineError::DuplicateKey(k)) if k == key));
    }

    #[test]
    fn test_unregister_absent_key_is_noop() {
        let link = LinkDispatcher::new();
        link.unregister_callback(&DispatchKey::new(CommandKind::Shade, 9));
    }

    #[test]
    fn test_same_id_different_category_does_not_collide() {
        let link = LinkDispatcher::new();
        link.register_callback(DispatchKey::new(CommandKind::Output, 4), |_| {})
            .unwrap();
        link.register_callback(DispatchKey::new(CommandKind::Shade, 4), |_| {})
            .unwrap();
    }

    #[test]
    fn test_dispatch_routes_by_key() {
        let link = LinkDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let observed = hits.clone();
        link.register_callback(DispatchKey::new(CommandKind::Output, 2), move |message| {
            assert_eq!(message.parameters, vec!["50.00"]);
            observed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        link.on_incoming_data("~OUTPUT,2,1,50.00\r\n");
        // Different id: valid but unaddressed, silently dropped.
        link.on_incoming_data("~OUTPUT,3,1,50.00\r\n");
        // Garbage: dropped.
        link.on_incoming_data("!!!\r\n");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_response_modes_are_not_dispatched() {
        let link = LinkDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let observed = hits.clone();
        link.register_callback(DispatchKey::new(CommandKind::Output, 2), move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        // A terminal echo of our own command.
        link.on_incoming_data("#OUTPUT,2,1,50.00\r\n");
        link.on_incoming_data("?OUTPUT,2,1\r\n");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_component_key_routing() {
        let link = LinkDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let observed = hits.clone();
        link.register_callback(
            DispatchKey::with_component(CommandKind::Scene, 3, 5),
            move |_| {
                observed.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        link.on_incoming_data("~SCENE,3,5,1\r\n");
        link.on_incoming_data("~SCENE,3,6,1\r\n");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_outgoing_queue_is_fifo() {
        let link = LinkDispatcher::new();
        link.enqueue_command("#OUTPUT,1,1,10.00".to_string());
        link.enqueue_command("#OUTPUT,2,1,20.00".to_string());
        assert_eq!(link.next_outgoing().as_deref(), Some("#OUTPUT,1,1,10.00"));
        assert_eq!(link.next_outgoing().as_deref(), Some("#OUTPUT,2,1,20.00"));
        assert_eq!(link.next_outgoing(), None);
    }

    #[test]
    fn test_initialized_transition_fires_once() {
        let link = LinkDispatcher::new();
        let transitions = Arc::new(AtomicUsize::new(0));
        let observed = transitions.clone();
        let _sub = link.subscribe_initialized(move |value| {
            if *value {
                observed.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(!link.is_initialized());
        link.set_initialized(true);
        link.set_initialized(true);
        assert!(link.is_initialized());
        assert_eq!(transitions.load(Ordering::SeqCst), 1);
        link.set_initialized(false);
        link.set_initialized(true);
        assert_eq!(transitions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_login_prompt_reaches_session_observer() {
        let link = LinkDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = link.subscribe_session(move |frame: &String| {
            sink.lock().unwrap().push(frame.clone());
        });
        link.on_incoming_data("login: ");
        assert_eq!(*seen.lock().unwrap(), vec!["login: ".to_string()]);
    }

    #[test]
    fn test_display_of_dispatch_keys() {
        assert_eq!(DispatchKey::new(CommandKind::Output, 7).to_string(), "OUTPUT,7");
        assert_eq!(
            DispatchKey::with_component(CommandKind::Scene, 3, 5).to_string(),
            "SCENE,3,5"
        );
    }
}
