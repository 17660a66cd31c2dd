//! Building and parsing of protocol lines.
//!
//! Building is pure string assembly; framing terminators are appended by
//! the transport. Parsing accepts any mode character, but only `~`
//! (response) lines are ever received in practice; the dispatcher drops
//! everything else.
//!
//! The grammars are:
//!
//! ```text
//! <mode><KEYWORD>,<id>,<action>[,<parameter>...]
//! <mode><KEYWORD>,<id>,<component>,<action>[,<parameter>...]
//! ```
//!
//! For every valid input, `parse(build(...))` reproduces the original
//! fields with parameters in their rendered wire form.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{CommandKind, CommandParameter, Message, Mode};

/// Field delimiter within a line.
pub const FIELD_DELIMITER: char = ',';

/// Build a command line for the component-less grammar.
pub fn build(
    mode: Mode,
    kind: CommandKind,
    integration_id: u32,
    action: u32,
    parameters: &[CommandParameter],
) -> String {
    build_line(mode, kind, integration_id, None, action, parameters)
}

/// Build a command line for the component-aware grammar, with the
/// component number between the integration id and the action.
pub fn build_with_component(
    mode: Mode,
    kind: CommandKind,
    integration_id: u32,
    component: u32,
    action: u32,
    parameters: &[CommandParameter],
) -> String {
    build_line(mode, kind, integration_id, Some(component), action, parameters)
}

fn build_line(
    mode: Mode,
    kind: CommandKind,
    integration_id: u32,
    component: Option<u32>,
    action: u32,
    parameters: &[CommandParameter],
) -> String {
    let mut line = format!("{}{},{}", mode.mode_char(), kind.keyword(), integration_id);
    if let Some(component) = component {
        line.push(FIELD_DELIMITER);
        line.push_str(&component.to_string());
    }
    line.push(FIELD_DELIMITER);
    line.push_str(&action.to_string());
    for parameter in parameters {
        line.push(FIELD_DELIMITER);
        line.push_str(&parameter.render());
    }
    line
}

/// Parse a received line into a [`Message`].
///
/// The line must already be stripped of framing terminators. Structural
/// problems (unknown mode or keyword, missing fields, non-numeric ids)
/// fail with [`ProtocolError::MalformedMessage`]; the caller drops the
/// line and keeps reading.
pub fn parse(line: &str) -> ProtocolResult<Message> {
    let trimmed = line.trim();
    let mut chars = trimmed.chars();
    let mode_char = chars
        .next()
        .ok_or_else(|| ProtocolError::malformed(line, "empty line"))?;
    let mode = Mode::from_char(mode_char)
        .ok_or_else(|| ProtocolError::malformed(line, format!("unknown mode '{}'", mode_char)))?;

    let fields: Vec<&str> = chars.as_str().split(FIELD_DELIMITER).collect();
    let keyword = fields[0].trim();
    let command = CommandKind::from_keyword(keyword)
        .ok_or_else(|| ProtocolError::malformed(line, format!("unknown command '{}'", keyword)))?;

    let required = if command.component_aware() { 4 } else { 3 };
    if fields.len() < required {
        return Err(ProtocolError::malformed(
            line,
            format!("expected at least {} fields, got {}", required, fields.len()),
        ));
    }

    let integration_id = parse_number(line, fields[1], "integration id")?;
    let (component, action_index) = if command.component_aware() {
        (Some(parse_number(line, fields[2], "component")?), 3)
    } else {
        (None, 2)
    };
    let action = parse_number(line, fields[action_index], "action")?;
    let parameters = fields[action_index + 1..]
        .iter()
        .map(|field| field.trim().to_string())
        .collect();

    Ok(Message {
        mode,
        command,
        integration_id,
        component,
        action,
        parameters,
    })
}

fn parse_number(line: &str, field: &str, what: &str) -> ProtocolResult<u32> {
    field
        .trim()
        .parse()
        .map_err(|_| ProtocolError::malformed(line, format!("invalid {} '{}'", what, field.trim())))
}
