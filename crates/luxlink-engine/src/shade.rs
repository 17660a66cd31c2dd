//! Shade and shade-group integrations.
//!
//! Shades and shade groups speak the same grammar under different
//! keywords (`SHADE` / `SHADEGRP`), so one type covers both; the category
//! is fixed at construction.

use std::sync::{Arc, Mutex, PoisonError};

use luxlink_protocol::{build, CommandKind, Message, Mode};
use tracing::trace;

use crate::dispatch::{DispatchKey, LinkDispatcher};
use crate::error::EngineResult;
use crate::event::{Signal, Subscription};

/// Action: query or report the movement direction.
const ACTION_DIRECTION: u32 = 1;
/// Action: start raising (opening).
const ACTION_START_RAISING: u32 = 2;
/// Action: start lowering (closing).
const ACTION_START_LOWERING: u32 = 3;
/// Action: stop movement.
const ACTION_STOP: u32 = 4;

/// The physical kind of shade. Fixed at configuration time; the
/// processor does not report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeType {
    /// Not specified.
    None,
    /// Roller shade.
    Roller,
    /// Drapery track.
    Drape,
    /// Venetian blind.
    Venetian,
}

/// The last reported movement direction of a shade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeDirection {
    /// Not moving, or nothing reported yet.
    Neither,
    /// Opening (raising).
    Open,
    /// Closing (lowering).
    Close,
}

impl ShadeDirection {
    /// Decode a direction from its wire code.
    pub fn from_code(code: u32) -> Option<ShadeDirection> {
        match code {
            0 => Some(ShadeDirection::Neither),
            1 => Some(ShadeDirection::Open),
            2 => Some(ShadeDirection::Close),
            _ => None,
        }
    }
}

/// A single shade or a shade group.
pub struct Shade {
    id: u32,
    name: String,
    kind: CommandKind,
    shade_type: ShadeType,
    link: LinkDispatcher,
    key: DispatchKey,
    direction: Arc<Mutex<ShadeDirection>>,
    direction_changed: Arc<Signal<ShadeDirection>>,
    init_subscription: Option<Subscription>,
    disposed: bool,
}

impl Shade {
    /// Create a single shade (`SHADE`) and register it with the link.
    pub fn new(
        link: &LinkDispatcher,
        id: u32,
        name: impl Into<String>,
        shade_type: ShadeType,
    ) -> EngineResult<Shade> {
        Shade::with_kind(link, CommandKind::Shade, id, name, shade_type)
    }

    /// Create a shade group (`SHADEGRP`) and register it with the link.
    pub fn new_group(
        link: &LinkDispatcher,
        id: u32,
        name: impl Into<String>,
        shade_type: ShadeType,
    ) -> EngineResult<Shade> {
        Shade::with_kind(link, CommandKind::ShadeGroup, id, name, shade_type)
    }

    fn with_kind(
        link: &LinkDispatcher,
        kind: CommandKind,
        id: u32,
        name: impl Into<String>,
        shade_type: ShadeType,
    ) -> EngineResult<Shade> {
        let key = DispatchKey::new(kind, id);
        let direction = Arc::new(Mutex::new(ShadeDirection::Neither));
        let direction_changed = Arc::new(Signal::new());

        let decode_direction = direction.clone();
        let decode_signal = direction_changed.clone();
        link.register_callback(key, move |message| {
            decode_shade(message, &decode_direction, &decode_signal);
        })?;

        let weak = link.downgrade();
        let init_subscription = link.subscribe_initialized(move |initialized| {
            if *initialized {
                if let Some(link) = weak.upgrade() {
                    link.enqueue_command(build(Mode::Query, kind, id, ACTION_DIRECTION, &[]));
                }
            }
        });

        Ok(Shade {
            id,
            name: name.into(),
            kind,
            shade_type,
            link: link.clone(),
            key,
            direction,
            direction_changed,
            init_subscription: Some(init_subscription),
            disposed: false,
        })
    }

    /// Get the shade's integration id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Get the shade's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the physical shade type given at construction.
    pub fn shade_type(&self) -> ShadeType {
        self.shade_type
    }

    /// Whether this integration addresses a shade group.
    pub fn is_group(&self) -> bool {
        self.kind == CommandKind::ShadeGroup
    }

    /// Get the last reported movement direction.
    pub fn last_direction(&self) -> ShadeDirection {
        *self
            .direction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start raising (opening) the shade.
    pub fn start_raising(&self) {
        self.execute(ACTION_START_RAISING);
    }

    /// Start lowering (closing) the shade.
    pub fn start_lowering(&self) {
        self.execute(ACTION_START_LOWERING);
    }

    /// Stop movement.
    pub fn stop_moving(&self) {
        self.execute(ACTION_STOP);
    }

    /// Ask the processor to report the current movement direction.
    pub fn query_direction(&self) {
        self.link
            .enqueue_command(build(Mode::Query, self.kind, self.id, ACTION_DIRECTION, &[]));
    }

    /// Observe direction changes. Fires only on actual transitions.
    pub fn subscribe_direction_changed<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ShadeDirection) + Send + Sync + 'static,
    {
        self.direction_changed.subscribe(observer)
    }

    /// Stop observing direction changes.
    pub fn unsubscribe_direction_changed(&self, subscription: &Subscription) {
        self.direction_changed.unsubscribe(subscription);
    }

    /// Deregister from the link. Idempotent and infallible; also called
    /// on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.link.unregister_callback(&self.key);
        if let Some(subscription) = self.init_subscription.take() {
            self.link.unsubscribe_initialized(&subscription);
        }
    }

    fn execute(&self, action: u32) {
        self.link
            .enqueue_command(build(Mode::Execute, self.kind, self.id, action, &[]));
    }
}

impl Drop for Shade {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Decode a `SHADE`/`SHADEGRP` response into the cached direction.
fn decode_shade(
    message: &Message,
    direction: &Mutex<ShadeDirection>,
    changed: &Signal<ShadeDirection>,
) {
    if message.action != ACTION_DIRECTION {
        trace!("shade {}: ignoring action {}", message.integration_id, message.action);
        return;
    }
    let Some(code) = message.first_parameter().and_then(|raw| raw.parse::<u32>().ok()) else {
        trace!("shade {}: direction report without a code", message.integration_id);
        return;
    };
    let Some(value) = ShadeDirection::from_code(code) else {
        trace!("shade {}: unknown direction code {}", message.integration_id, code);
        return;
    };

    let mut cached = direction.lock().unwrap_or_else(PoisonError::into_inner);
    if *cached != value {
        *cached = value;
        drop(cached);
        changed.emit(&value);
    }
}
