//! Room container.
//!
//! A room owns the integrations configured for one area and tracks the
//! area-level state the processor reports: the current scene and the
//! occupancy state. Zone, shade, shade-group and scene namespaces are
//! independent, so the same numeric id may appear in more than one
//! category.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use luxlink_protocol::{build, build_with_component, CommandKind, Message, Mode};
use tracing::trace;

use crate::dispatch::{DispatchKey, LinkDispatcher};
use crate::error::EngineResult;
use crate::event::{Signal, Subscription};
use crate::scene::{Scene, ACTION_ACTIVATE};
use crate::shade::{Shade, ShadeType};
use crate::zone::Zone;

/// Action: query or report the area's current scene.
const ACTION_SCENE: u32 = 6;
/// Action: query or report the area's occupancy state.
const ACTION_OCCUPANCY: u32 = 8;

/// Scene number the processor reports when no scene is active.
const SCENE_NONE: u32 = 0;

/// Occupancy state of an area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    /// No occupancy report yet, or sensing unavailable.
    Unknown,
    /// Sensors present but not reporting.
    Inactive,
    /// The area is occupied.
    Occupied,
    /// The area is unoccupied.
    Unoccupied,
}

impl Occupancy {
    /// Decode an occupancy state from its wire code. Codes outside the
    /// known range decode as [`Occupancy::Unknown`].
    pub fn from_code(code: u32) -> Occupancy {
        match code {
            2 => Occupancy::Inactive,
            3 => Occupancy::Occupied,
            4 => Occupancy::Unoccupied,
            _ => Occupancy::Unknown,
        }
    }
}

/// Area-level state decoded from `AREA` responses.
struct RoomStatus {
    scene: Option<u32>,
    occupancy: Occupancy,
}

/// One room (area) and the integrations configured within it.
pub struct Room {
    id: u32,
    name: String,
    link: LinkDispatcher,
    key: DispatchKey,
    zones: HashMap<u32, Zone>,
    shades: HashMap<u32, Shade>,
    shade_groups: HashMap<u32, Shade>,
    scenes: HashMap<u32, Scene>,
    status: Arc<Mutex<RoomStatus>>,
    scene_changed: Arc<Signal<Option<u32>>>,
    occupancy_changed: Arc<Signal<Occupancy>>,
    init_subscription: Option<Subscription>,
    disposed: bool,
}

impl Room {
    /// Create a room and register it for the area's status reports.
    pub fn new(link: &LinkDispatcher, id: u32, name: impl Into<String>) -> EngineResult<Room> {
        let key = DispatchKey::new(CommandKind::Area, id);
        let status = Arc::new(Mutex::new(RoomStatus {
            scene: None,
            occupancy: Occupancy::Unknown,
        }));
        let scene_changed = Arc::new(Signal::new());
        let occupancy_changed = Arc::new(Signal::new());

        let decode_status = status.clone();
        let decode_scene_signal = scene_changed.clone();
        let decode_occupancy_signal = occupancy_changed.clone();
        link.register_callback(key, move |message| {
            decode_area(
                message,
                &decode_status,
                &decode_scene_signal,
                &decode_occupancy_signal,
            );
        })?;

        let weak = link.downgrade();
        let init_subscription = link.subscribe_initialized(move |initialized| {
            if *initialized {
                if let Some(link) = weak.upgrade() {
                    link.enqueue_command(build(Mode::Query, CommandKind::Area, id, ACTION_SCENE, &[]));
                    link.enqueue_command(build(
                        Mode::Query,
                        CommandKind::Area,
                        id,
                        ACTION_OCCUPANCY,
                        &[],
                    ));
                }
            }
        });

        Ok(Room {
            id,
            name: name.into(),
            link: link.clone(),
            key,
            zones: HashMap::new(),
            shades: HashMap::new(),
            shade_groups: HashMap::new(),
            scenes: HashMap::new(),
            status,
            scene_changed,
            occupancy_changed,
            init_subscription: Some(init_subscription),
            disposed: false,
        })
    }

    /// Get the room's area id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Get the room's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Integration ownership
    // ========================================================================

    /// Add a zone to the room.
    pub fn add_zone(&mut self, id: u32, name: impl Into<String>) -> EngineResult<()> {
        let zone = Zone::new(&self.link, id, name)?;
        self.zones.insert(id, zone);
        Ok(())
    }

    /// Add a single shade to the room.
    pub fn add_shade(
        &mut self,
        id: u32,
        name: impl Into<String>,
        shade_type: ShadeType,
    ) -> EngineResult<()> {
        let shade = Shade::new(&self.link, id, name, shade_type)?;
        self.shades.insert(id, shade);
        Ok(())
    }

    /// Add a shade group to the room.
    pub fn add_shade_group(
        &mut self,
        id: u32,
        name: impl Into<String>,
        shade_type: ShadeType,
    ) -> EngineResult<()> {
        let group = Shade::new_group(&self.link, id, name, shade_type)?;
        self.shade_groups.insert(id, group);
        Ok(())
    }

    /// Add a scene to the room. The scene is addressed by this room's
    /// area id plus the scene number.
    pub fn add_scene(&mut self, scene_number: u32, name: impl Into<String>) -> EngineResult<()> {
        let scene = Scene::new(&self.link, self.id, scene_number, name)?;
        self.scenes.insert(scene_number, scene);
        Ok(())
    }

    /// Look up a zone by id.
    pub fn zone(&self, id: u32) -> Option<&Zone> {
        self.zones.get(&id)
    }

    /// Look up a shade by id.
    pub fn shade(&self, id: u32) -> Option<&Shade> {
        self.shades.get(&id)
    }

    /// Look up a shade group by id.
    pub fn shade_group(&self, id: u32) -> Option<&Shade> {
        self.shade_groups.get(&id)
    }

    /// Look up a scene by scene number.
    pub fn scene_by_number(&self, scene_number: u32) -> Option<&Scene> {
        self.scenes.get(&scene_number)
    }

    /// Check whether the room contains a zone with this id.
    pub fn contains_zone(&self, id: u32) -> bool {
        self.zones.contains_key(&id)
    }

    /// Check whether the room contains a shade with this id.
    pub fn contains_shade(&self, id: u32) -> bool {
        self.shades.contains_key(&id)
    }

    /// Check whether the room contains a shade group with this id.
    pub fn contains_shade_group(&self, id: u32) -> bool {
        self.shade_groups.contains_key(&id)
    }

    /// Check whether the room contains a scene with this number.
    pub fn contains_scene(&self, scene_number: u32) -> bool {
        self.scenes.contains_key(&scene_number)
    }

    /// Iterate over the room's zones.
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Iterate over the room's shades.
    pub fn shades(&self) -> impl Iterator<Item = &Shade> {
        self.shades.values()
    }

    /// Iterate over the room's shade groups.
    pub fn shade_groups(&self) -> impl Iterator<Item = &Shade> {
        self.shade_groups.values()
    }

    /// Iterate over the room's scenes.
    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    // ========================================================================
    // Area state
    // ========================================================================

    /// Get the currently active scene, or `None` if no scene is active
    /// (or none has been reported yet).
    pub fn scene(&self) -> Option<u32> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .scene
    }

    /// Get the last reported occupancy state.
    pub fn occupancy(&self) -> Occupancy {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .occupancy
    }

    /// Activate a scene in this room.
    ///
    /// Fire-and-forget: the cached scene updates when the processor
    /// reports the change, exactly as it would for a scene selected at a
    /// keypad.
    pub fn set_scene(&self, scene_number: u32) {
        self.link.enqueue_command(build_with_component(
            Mode::Execute,
            CommandKind::Scene,
            self.id,
            scene_number,
            ACTION_ACTIVATE,
            &[],
        ));
    }

    /// Observe scene changes. `None` means no scene is active.
    pub fn subscribe_scene_changed<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Option<u32>) + Send + Sync + 'static,
    {
        self.scene_changed.subscribe(observer)
    }

    /// Stop observing scene changes.
    pub fn unsubscribe_scene_changed(&self, subscription: &Subscription) {
        self.scene_changed.unsubscribe(subscription);
    }

    /// Observe occupancy transitions.
    pub fn subscribe_occupancy_changed<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Occupancy) + Send + Sync + 'static,
    {
        self.occupancy_changed.subscribe(observer)
    }

    /// Stop observing occupancy transitions.
    pub fn unsubscribe_occupancy_changed(&self, subscription: &Subscription) {
        self.occupancy_changed.unsubscribe(subscription);
    }

    /// Deregister the room and every integration it owns. Idempotent and
    /// infallible; also called on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.link.unregister_callback(&self.key);
        if let Some(subscription) = self.init_subscription.take() {
            self.link.unsubscribe_initialized(&subscription);
        }
        // Owned integrations deregister themselves on drop.
        self.zones.clear();
        self.shades.clear();
        self.shade_groups.clear();
        self.scenes.clear();
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Decode an `AREA` response into the room status, raising events only on
/// actual transitions.
fn decode_area(
    message: &Message,
    status: &Mutex<RoomStatus>,
    scene_changed: &Signal<Option<u32>>,
    occupancy_changed: &Signal<Occupancy>,
) {
    match message.action {
        ACTION_SCENE => {
            let Some(number) = message.first_parameter().and_then(|raw| raw.parse::<u32>().ok())
            else {
                trace!("area {}: scene report without a number", message.integration_id);
                return;
            };
            let value = if number == SCENE_NONE { None } else { Some(number) };
            let mut cached = status.lock().unwrap_or_else(PoisonError::into_inner);
            if cached.scene != value {
                cached.scene = value;
                drop(cached);
                scene_changed.emit(&value);
            }
        }
        ACTION_OCCUPANCY => {
            let Some(code) = message.first_parameter().and_then(|raw| raw.parse::<u32>().ok())
            else {
                trace!("area {}: occupancy report without a code", message.integration_id);
                return;
            };
            let value = Occupancy::from_code(code);
            let mut cached = status.lock().unwrap_or_else(PoisonError::into_inner);
            if cached.occupancy != value {
                cached.occupancy = value;
                drop(cached);
                occupancy_changed.emit(&value);
            }
        }
        other => {
            trace!("area {}: ignoring action {}", message.integration_id, other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lookup_and_membership() {
        let link = LinkDispatcher::new();
        let mut room = Room::new(&link, 10, "Great Room").unwrap();
        room.add_zone(2, "Downlights").unwrap();
        room.add_shade(7, "East Shade", ShadeType::Roller).unwrap();
        room.add_shade_group(4, "All Shades", ShadeType::Roller).unwrap();
        room.add_scene(5, "Evening").unwrap();

        assert!(room.contains_zone(2));
        assert!(!room.contains_zone(7));
        assert!(room.contains_shade(7));
        assert!(room.contains_shade_group(4));
        assert!(room.contains_scene(5));
        assert_eq!(room.zone(2).map(Zone::id), Some(2));
        assert_eq!(room.zones().count(), 1);
        assert_eq!(room.scenes().count(), 1);
    }

    #[test]
    fn test_same_id_across_categories() {
        let link = LinkDispatcher::new();
        let mut room = Room::new(&link, 10, "Great Room").unwrap();
        room.add_zone(4, "Downlights").unwrap();
        room.add_shade(4, "East Shade", ShadeType::Roller).unwrap();
        room.add_shade_group(4, "All Shades", ShadeType::Roller).unwrap();
    }

    #[test]
    fn test_set_scene_line() {
        let link = LinkDispatcher::new();
        let room = Room::new(&link, 10, "Great Room").unwrap();
        room.set_scene(5);
        assert_eq!(link.drain_outgoing(), vec!["#SCENE,10,5,1"]);
    }

    #[test]
    fn test_scene_report_dedup() {
        let link = LinkDispatcher::new();
        let room = Room::new(&link, 10, "Great Room").unwrap();
        let events = Arc::new(AtomicUsize::new(0));
        let observed = events.clone();
        let _sub = room.subscribe_scene_changed(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        room.set_scene(5);
        assert_eq!(room.scene(), None);
        link.on_incoming_data("~AREA,10,6,5\r\n");
        assert_eq!(room.scene(), Some(5));
        assert_eq!(events.load(Ordering::SeqCst), 1);

        // Repeated report of the same scene: no event.
        link.on_incoming_data("~AREA,10,6,5\r\n");
        assert_eq!(events.load(Ordering::SeqCst), 1);

        // Scene 0 means no scene is active.
        link.on_incoming_data("~AREA,10,6,0\r\n");
        assert_eq!(room.scene(), None);
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_occupancy_transitions() {
        let link = LinkDispatcher::new();
        let room = Room::new(&link, 10, "Great Room").unwrap();
        let events = Arc::new(AtomicUsize::new(0));
        let observed = events.clone();
        let _sub = room.subscribe_occupancy_changed(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(room.occupancy(), Occupancy::Unknown);
        link.on_incoming_data("~AREA,10,8,3\r\n");
        assert_eq!(room.occupancy(), Occupancy::Occupied);
        assert_eq!(events.load(Ordering::SeqCst), 1);

        link.on_incoming_data("~AREA,10,8,3\r\n");
        assert_eq!(events.load(Ordering::SeqCst), 1);

        link.on_incoming_data("~AREA,10,8,4\r\n");
        assert_eq!(room.occupancy(), Occupancy::Unoccupied);
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resync_queries_scene_and_occupancy() {
        let link = LinkDispatcher::new();
        let _room = Room::new(&link, 10, "Great Room").unwrap();
        link.set_initialized(true);
        assert_eq!(link.drain_outgoing(), vec!["?AREA,10,6", "?AREA,10,8"]);
    }

    #[test]
    fn test_dispose_releases_everything() {
        let link = LinkDispatcher::new();
        let mut room = Room::new(&link, 10, "Great Room").unwrap();
        room.add_zone(2, "Downlights").unwrap();
        room.add_scene(5, "Evening").unwrap();
        room.dispose();
        room.dispose();
        assert!(!link.is_registered(&DispatchKey::new(CommandKind::Area, 10)));
        assert!(!link.is_registered(&DispatchKey::new(CommandKind::Output, 2)));
        assert!(!link.is_registered(&DispatchKey::with_component(CommandKind::Scene, 10, 5)));
    }

    #[test]
    fn test_occupancy_codes() {
        assert_eq!(Occupancy::from_code(1), Occupancy::Unknown);
        assert_eq!(Occupancy::from_code(2), Occupancy::Inactive);
        assert_eq!(Occupancy::from_code(3), Occupancy::Occupied);
        assert_eq!(Occupancy::from_code(4), Occupancy::Unoccupied);
        assert_eq!(Occupancy::from_code(99), Occupancy::Unknown);
    }
}
