//! Scene integration.
//!
//! Scenes are read-only catalog entries: they carry an (area id, scene
//! number) address and a name, and they are activated only through
//! [`Room::set_scene`](crate::room::Room::set_scene). Scene lines use the
//! component-aware grammar, with the scene number as the component. The
//! only inbound traffic is the activation report, re-raised as an event;
//! scenes hold no state, so there is nothing to re-query on reconnect.

use std::sync::Arc;

use luxlink_protocol::{CommandKind, Message};
use tracing::trace;

use crate::dispatch::{DispatchKey, LinkDispatcher};
use crate::error::EngineResult;
use crate::event::{Signal, Subscription};

/// Action: activate, or report activation of, a scene.
pub(crate) const ACTION_ACTIVATE: u32 = 1;

/// One selectable scene within an area.
pub struct Scene {
    area_id: u32,
    scene_number: u32,
    name: String,
    link: LinkDispatcher,
    key: DispatchKey,
    activated: Arc<Signal<u32>>,
    disposed: bool,
}

impl Scene {
    /// Create a scene and register it with the link.
    pub fn new(
        link: &LinkDispatcher,
        area_id: u32,
        scene_number: u32,
        name: impl Into<String>,
    ) -> EngineResult<Scene> {
        let key = DispatchKey::with_component(CommandKind::Scene, area_id, scene_number);
        let activated = Arc::new(Signal::new());

        let decode_signal = activated.clone();
        link.register_callback(key, move |message| {
            decode_scene(message, scene_number, &decode_signal);
        })?;

        Ok(Scene {
            area_id,
            scene_number,
            name: name.into(),
            link: link.clone(),
            key,
            activated,
            disposed: false,
        })
    }

    /// Get the id of the area this scene belongs to.
    pub fn area_id(&self) -> u32 {
        self.area_id
    }

    /// Get the scene number within the area.
    pub fn scene_number(&self) -> u32 {
        self.scene_number
    }

    /// Get the scene's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Observe activation reports for this scene. The value is the scene
    /// number.
    pub fn subscribe_activated<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&u32) + Send + Sync + 'static,
    {
        self.activated.subscribe(observer)
    }

    /// Stop observing activation reports.
    pub fn unsubscribe_activated(&self, subscription: &Subscription) {
        self.activated.unsubscribe(subscription);
    }

    /// Deregister from the link. Idempotent and infallible; also called
    /// on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.link.unregister_callback(&self.key);
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn decode_scene(message: &Message, scene_number: u32, activated: &Signal<u32>) {
    if message.action != ACTION_ACTIVATE {
        trace!(
            "scene {},{}: ignoring action {}",
            message.integration_id,
            scene_number,
            message.action
        );
        return;
    }
    activated.emit(&scene_number);
}
