//! Integration engine for lighting-control processors.
//!
//! This crate turns the raw line traffic of [`luxlink_protocol`] into
//! addressable integrations with typed state and change events. It sits
//! between a transport (serial or TCP terminal, not provided here) and
//! the device adapters above it:
//!
//! - [`LinkDispatcher`] owns one frame buffer per link, a registry
//!   routing inbound responses by [`DispatchKey`], and the outgoing
//!   command queue the transport drains.
//! - [`Zone`], [`Shade`] and [`Scene`] decode the responses addressed to
//!   them into cached state, raising change events only on actual
//!   updates.
//! - [`Room`] aggregates the integrations of one area and tracks the
//!   area's scene and occupancy.
//!
//! The transport's contract is small: call
//! [`LinkDispatcher::on_incoming_data`] sequentially from its read loop,
//! drain [`LinkDispatcher::next_outgoing`] from its write loop, answer
//! the login prompt surfaced by the session signal, and flip
//! [`LinkDispatcher::set_initialized`] as the connection comes and goes.
//! Everything else is event-driven.
//!
//! # Example
//!
//! ```rust,ignore
//! use luxlink_engine::{LinkDispatcher, Room, ShadeType};
//!
//! let link = LinkDispatcher::new();
//! let mut room = Room::new(&link, 10, "Great Room")?;
//! room.add_zone(2, "Downlights")?;
//! room.add_shade(7, "East Shade", ShadeType::Roller)?;
//!
//! // Transport connected and logged in: integrations re-query state.
//! link.set_initialized(true);
//! while let Some(line) = link.next_outgoing() {
//!     // write line + terminator to the wire
//! }
//!
//! // Transport read loop:
//! link.on_incoming_data("~OUTPUT,2,1,75.00\r\n");
//! assert_eq!(room.zone(2).unwrap().output_level(), Some(0.75));
//! ```

mod dispatch;
mod error;
mod event;
mod room;
mod scene;
mod shade;
mod zone;

pub use dispatch::*;
pub use error::*;
pub use event::*;
pub use room::*;
pub use scene::*;
pub use shade::*;
pub use zone::*;
