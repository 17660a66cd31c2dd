//! Dimmer/switch zone integration.

use std::sync::{Arc, Mutex, PoisonError};

use luxlink_protocol::{build, CommandKind, CommandParameter, FadeTime, Message, Mode};
use tracing::trace;

use crate::dispatch::{DispatchKey, LinkDispatcher};
use crate::error::EngineResult;
use crate::event::{Signal, Subscription};

/// Action: set, query or report the output level.
const ACTION_OUTPUT_LEVEL: u32 = 1;
/// Action: start raising the output.
const ACTION_START_RAISING: u32 = 2;
/// Action: start lowering the output.
const ACTION_START_LOWERING: u32 = 3;
/// Action: stop an in-progress raise/lower.
const ACTION_STOP: u32 = 4;

/// Output levels closer than this are considered equal. The wire format
/// carries two decimals of a percentage, so anything below one hundredth
/// of a percent is echo noise, not a change.
const LEVEL_EPSILON: f32 = 0.0001;

/// One dimmable (or switched) output zone on the processor.
///
/// The zone caches the last reported output level and raises its change
/// event only when a report actually differs from the cache; processors
/// echo redundant unsolicited status, and deduplication keeps that from
/// becoming an event storm.
pub struct Zone {
    id: u32,
    name: String,
    link: LinkDispatcher,
    key: DispatchKey,
    level: Arc<Mutex<Option<f32>>>,
    level_changed: Arc<Signal<f32>>,
    init_subscription: Option<Subscription>,
    disposed: bool,
}

impl Zone {
    /// Create a zone and register it with the link.
    ///
    /// Fails with `DuplicateKey` if another zone already claimed this id
    /// on the same link.
    pub fn new(link: &LinkDispatcher, id: u32, name: impl Into<String>) -> EngineResult<Zone> {
        let key = DispatchKey::new(CommandKind::Output, id);
        let level = Arc::new(Mutex::new(None));
        let level_changed = Arc::new(Signal::new());

        let decode_level = level.clone();
        let decode_signal = level_changed.clone();
        link.register_callback(key, move |message| {
            decode_output(message, &decode_level, &decode_signal);
        })?;

        // Re-query on every (re)connect; the cached level is stale after
        // a disconnect and the protocol keeps no session state for us.
        let weak = link.downgrade();
        let init_subscription = link.subscribe_initialized(move |initialized| {
            if *initialized {
                if let Some(link) = weak.upgrade() {
                    link.enqueue_command(query_level_line(id));
                }
            }
        });

        Ok(Zone {
            id,
            name: name.into(),
            link: link.clone(),
            key,
            level,
            level_changed,
            init_subscription: Some(init_subscription),
            disposed: false,
        })
    }

    /// Get the zone's integration id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Get the zone's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the last reported output level (`0.0..=1.0`), or `None` if no
    /// report has arrived yet.
    pub fn output_level(&self) -> Option<f32> {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Command the zone to the given output level (`0.0..=1.0`), with an
    /// optional fade time and an optional delay before the fade starts.
    ///
    /// Fire-and-forget: the confirming response is indistinguishable from
    /// a spontaneous status report and arrives through the change event.
    pub fn set_output_level(&self, level: f32, fade: Option<FadeTime>, delay: Option<FadeTime>) {
        let mut parameters = vec![CommandParameter::Percentage(level)];
        if fade.is_some() || delay.is_some() {
            parameters.push(CommandParameter::Duration(fade.unwrap_or(FadeTime::ZERO)));
        }
        if let Some(delay) = delay {
            parameters.push(CommandParameter::Duration(delay));
        }
        self.link.enqueue_command(build(
            Mode::Execute,
            CommandKind::Output,
            self.id,
            ACTION_OUTPUT_LEVEL,
            &parameters,
        ));
    }

    /// Start raising the output level.
    pub fn start_raising(&self) {
        self.execute(ACTION_START_RAISING);
    }

    /// Start lowering the output level.
    pub fn start_lowering(&self) {
        self.execute(ACTION_START_LOWERING);
    }

    /// Stop an in-progress raise or lower.
    pub fn stop_raising_lowering(&self) {
        self.execute(ACTION_STOP);
    }

    /// Ask the processor to report the current output level.
    pub fn query_output_level(&self) {
        self.link.enqueue_command(query_level_line(self.id));
    }

    /// Observe output-level changes. Fires only on actual changes, never
    /// on redundant reports.
    pub fn subscribe_level_changed<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&f32) + Send + Sync + 'static,
    {
        self.level_changed.subscribe(observer)
    }

    /// Stop observing output-level changes.
    pub fn unsubscribe_level_changed(&self, subscription: &Subscription) {
        self.level_changed.unsubscribe(subscription);
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
            .enqueue_command(build(Mode::Execute, CommandKind::Output, self.id, action, &[]));
    }
}

impl Drop for Zone {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn query_level_line(id: u32) -> String {
    build(Mode::Query, CommandKind::Output, id, ACTION_OUTPUT_LEVEL, &[])
}

/// Decode an `OUTPUT` response into the cached level, raising the change
/// event only on an actual update.
fn decode_output(message: &Message, level: &Mutex<Option<f32>>, changed: &Signal<f32>) {
    if message.action != ACTION_OUTPUT_LEVEL {
        trace!("zone {}: ignoring action {}", message.integration_id, message.action);
        return;
    }
    let Some(raw) = message.first_parameter() else {
        trace!("zone {}: level report without a level", message.integration_id);
        return;
    };
    let Ok(percent) = raw.parse::<f32>() else {
        trace!("zone {}: unparseable level '{}'", message.integration_id, raw);
        return;
    };
    let value = (percent / 100.0).clamp(0.0, 1.0);

    let mut cached = level.lock().unwrap_or_else(PoisonError::into_inner);
    let updated = match *cached {
        Some(previous) => (previous - value).abs() >= LEVEL_EPSILON,
        None => true,
    };
    if updated {
        *cached = Some(value);
        drop(cached);
        changed.emit(&value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_output_level_lines() {
        let link = LinkDispatcher::new();
        let zone = Zone::new(&link, 2, "Downlights").unwrap();

        zone.set_output_level(0.5, None, None);
        zone.set_output_level(1.0, Some(FadeTime::from_seconds(4)), None);
        zone.set_output_level(0.0, None, Some(FadeTime::from_seconds(60)));

        assert_eq!(
            link.drain_outgoing(),
            vec![
                "#OUTPUT,2,1,50.00",
                "#OUTPUT,2,1,100.00,00:00:04",
                "#OUTPUT,2,1,0.00,00:00:00,00:01:00",
            ]
        );
    }

    #[test]
    fn test_raise_lower_stop_lines() {
        let link = LinkDispatcher::new();
        let zone = Zone::new(&link, 2, "Downlights").unwrap();
        zone.start_raising();
        zone.start_lowering();
        zone.stop_raising_lowering();
        assert_eq!(
            link.drain_outgoing(),
            vec!["#OUTPUT,2,2", "#OUTPUT,2,3", "#OUTPUT,2,4"]
        );
    }

    #[test]
    fn test_level_report_dedup() {
        let link = LinkDispatcher::new();
        let zone = Zone::new(&link, 2, "Downlights").unwrap();
        let events = Arc::new(AtomicUsize::new(0));
        let observed = events.clone();
        let _sub = zone.subscribe_level_changed(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(zone.output_level(), None);
        link.on_incoming_data("~OUTPUT,2,1,50.00\r\n");
        assert_eq!(zone.output_level(), Some(0.5));
        assert_eq!(events.load(Ordering::SeqCst), 1);

        // The processor echoes the same level again: no event.
        link.on_incoming_data("~OUTPUT,2,1,50.00\r\n");
        assert_eq!(events.load(Ordering::SeqCst), 1);

        link.on_incoming_data("~OUTPUT,2,1,75.00\r\n");
        assert_eq!(zone.output_level(), Some(0.75));
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resync_on_initialized() {
        let link = LinkDispatcher::new();
        let _zone = Zone::new(&link, 2, "Downlights").unwrap();
        link.set_initialized(true);
        assert_eq!(link.drain_outgoing(), vec!["?OUTPUT,2,1"]);

        // Disconnect does not re-query; the next connect does.
        link.set_initialized(false);
        assert!(link.drain_outgoing().is_empty());
        link.set_initialized(true);
        assert_eq!(link.drain_outgoing(), vec!["?OUTPUT,2,1"]);
    }

    #[test]
    fn test_disconnect_keeps_cached_state() {
        let link = LinkDispatcher::new();
        let zone = Zone::new(&link, 2, "Downlights").unwrap();
        link.on_incoming_data("~OUTPUT,2,1,30.00\r\n");
        link.set_initialized(false);
        assert_eq!(zone.output_level(), Some(0.3));
    }

    #[test]
    fn test_duplicate_zone_id_rejected() {
        let link = LinkDispatcher::new();
        let _zone = Zone::new(&link, 2, "Downlights").unwrap();
        assert!(Zone::new(&link, 2, "Imposter").is_err());
    }

    #[test]
    fn test_dispose_is_idempotent_and_clears_registration() {
        let link = LinkDispatcher::new();
        let key = DispatchKey::new(CommandKind::Output, 2);
        let mut zone = Zone::new(&link, 2, "Downlights").unwrap();
        assert!(link.is_registered(&key));
        zone.dispose();
        zone.dispose();
        assert!(!link.is_registered(&key));
        // The id is free again.
        let _replacement = Zone::new(&link, 2, "Downlights").unwrap();
    }

    #[test]
    fn test_drop_unregisters() {
        let link = LinkDispatcher::new();
        let key = DispatchKey::new(CommandKind::Output, 2);
        {
            let _zone = Zone::new(&link, 2, "Downlights").unwrap();
            assert!(link.is_registered(&key));
        }
        assert!(!link.is_registered(&key));
    }
}
