//! Integration protocol for lighting-control processors.
//!
//! This crate provides the wire-level half of the link to a processor
//! exposing the line-oriented ASCII integration protocol (serial or
//! IP-terminal style). It is pure: no transport, no state beyond the
//! frame accumulation buffer.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → processor): `#OUTPUT,2,1,75.00` sets zone 2 to
//!   75% output.
//! - **Queries** (host → processor): `?OUTPUT,2,1` asks for zone 2's
//!   output level.
//! - **Responses** (processor → host): `~OUTPUT,2,1,75.00` reports it.
//!   Responses are not correlated to queries; the processor emits the
//!   same line spontaneously on local changes.
//!
//! Messages are terminated by `\r\n` or by one of the prompt markers the
//! terminal prints between lines; the login prompt is surfaced verbatim
//! so an outer layer can authenticate.
//!
//! # Example
//!
//! ```rust,ignore
//! use luxlink_protocol::{build, parse, CommandKind, CommandParameter, Mode};
//!
//! let line = build(Mode::Execute, CommandKind::Output, 2, 1,
//!     &[CommandParameter::Percentage(0.75)]);
//! assert_eq!(line, "#OUTPUT,2,1,75.00");
//!
//! let message = parse("~OUTPUT,2,1,75.00")?;
//! ```

mod codec;
mod error;
mod frame;
mod message;

pub use codec::*;
pub use error::*;
pub use frame::*;
pub use message::*;
