use std::{fmt::Write as _, sync::Arc, time::Duration};

use crate::{
    color::ColorSample,
    console::{Board, Console, QuickCommand},
    pipeline::Mode,
    rules::RuleDraft,
    serial::{list_ports, HardwarePortProvider, PortSelector},
    settings::SettingsStore,
};

const PICK_TIMEOUT: Duration = Duration::from_secs(30);

pub const HELP: &str = "\
Commands:
  ports                                   list serial ports
  select <receive|send> <port|usb>        choose the port used on next connect
  connect <receive|send>                  open a board
  disconnect <receive|send>               close a board
  status                                  connection state of both boards
  send <text>                             write text to the send board
  cmd <COLOR|ON|OFF>                      quick control command
  mode [data|control]                     show or switch the console mode
  rule add <r> <g> <b> <pin> <HIGH|LOW> [threshold]
  rule update <id> <r> <g> <b> <pin> <HIGH|LOW> [threshold]
  rule delete <id>
  rules                                   list rules
  pick                                    wait for the next color from the receive board
  history                                 recent colors
  log [received|sent]                     message logs
  clear                                   clear the received log
  help                                    this text
  exit                                    disconnect and quit";

pub struct AppState {
    pub console: Console,
    pub settings: SettingsStore,
    pub receive_port: Arc<HardwarePortProvider>,
    pub send_port: Arc<HardwarePortProvider>,
}

impl AppState {
    fn port(&self, board: Board) -> &HardwarePortProvider {
        match board {
            Board::Receive => &self.receive_port,
            Board::Send => &self.send_port,
        }
    }
}

/// Run one shell line. Blank input yields an empty reply.
pub async fn dispatch(line: &str, state: &AppState) -> Result<String, String> {
    let line = line.trim();
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map(|(command, rest)| (command, rest.trim()))
        .unwrap_or((line, ""));
    let args: Vec<&str> = rest.split_whitespace().collect();

    match command.to_ascii_lowercase().as_str() {
        "" => Ok(String::new()),
        "help" | "?" => Ok(HELP.to_string()),
        "ports" => get_ports(),
        "select" => match args.as_slice() {
            [board, port] => select_port(board.parse()?, PortSelector::from_arg(port), state),
            _ => Err("usage: select <receive|send> <port|usb>".into()),
        },
        "connect" => connect_board(one_arg(&args, "connect <receive|send>")?.parse()?, state).await,
        "disconnect" => {
            disconnect_board(one_arg(&args, "disconnect <receive|send>")?.parse()?, state).await
        }
        "status" => Ok(get_status(state)),
        "send" => send_data(rest, state).await,
        "cmd" => send_command(one_arg(&args, "cmd <COLOR|ON|OFF>")?.parse()?, state).await,
        "mode" => match args.as_slice() {
            [] => Ok(format!("Mode: {}", state.console.mode())),
            [mode] => set_mode(mode.parse()?, state),
            _ => Err("usage: mode [data|control]".into()),
        },
        "rule" => match args.split_first() {
            Some((&"add", fields)) => save_rule(None, parse_draft(fields)?, state).await,
            Some((&"update", [id, fields @ ..])) => {
                save_rule(Some(*id), parse_draft(fields)?, state).await
            }
            Some((&"delete", [id])) => delete_rule(id, state),
            _ => Err("usage: rule add|update|delete ... (see help)".into()),
        },
        "rules" => Ok(get_rules(state)),
        "pick" => pick_color(state).await,
        "history" => Ok(get_history(state)),
        "log" => match args.as_slice() {
            [] | ["received"] => Ok(numbered(&state.console.received_log())),
            ["sent"] => Ok(numbered(&state.console.sent_log())),
            _ => Err("usage: log [received|sent]".into()),
        },
        "clear" => {
            state.console.clear_received();
            Ok("Received log cleared".into())
        }
        other => Err(format!("Unknown command '{other}', try help")),
    }
}

fn one_arg<'a>(args: &[&'a str], usage: &str) -> Result<&'a str, String> {
    match args {
        [arg] => Ok(*arg),
        _ => Err(format!("usage: {usage}")),
    }
}

fn get_ports() -> Result<String, String> {
    let ports = list_ports().map_err(|e| e.to_string())?;
    if ports.is_empty() {
        return Ok("No serial ports found".into());
    }
    Ok(ports
        .iter()
        .map(|port| port.to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn select_port(board: Board, selector: PortSelector, state: &AppState) -> Result<String, String> {
    state.port(board).set_selector(selector.clone());
    state
        .settings
        .update_port(board, selector.clone())
        .map_err(|e| e.to_string())?;
    Ok(format!("{board} will use {selector}"))
}

async fn connect_board(board: Board, state: &AppState) -> Result<String, String> {
    let device = state
        .console
        .connect(board)
        .await
        .map_err(|e| e.to_string())?;
    Ok(format!("{board} connected: {device}"))
}

async fn disconnect_board(board: Board, state: &AppState) -> Result<String, String> {
    state.console.disconnect(board).await;
    Ok(format!("{board} disconnected"))
}

fn get_status(state: &AppState) -> String {
    let mut out = String::new();
    for board in [Board::Receive, Board::Send] {
        let session = state.console.state(board);
        let _ = write!(out, "{board}: {:?}", session.status);
        if let Some(device) = &session.device {
            let _ = write!(out, " ({device})");
        }
        out.push('\n');
    }
    let _ = write!(out, "mode: {}", state.console.mode());
    out
}

async fn send_data(text: &str, state: &AppState) -> Result<String, String> {
    let sent = state
        .console
        .send_data(text)
        .await
        .map_err(|e| e.to_string())?;
    Ok(if sent {
        format!("Sent: {text}")
    } else {
        "Nothing to send".into()
    })
}

async fn send_command(command: QuickCommand, state: &AppState) -> Result<String, String> {
    state
        .console
        .send_command(command)
        .await
        .map_err(|e| e.to_string())?;
    Ok(format!("Command sent: {}", command.as_str()))
}

fn set_mode(mode: Mode, state: &AppState) -> Result<String, String> {
    state.console.set_mode(mode);
    state
        .settings
        .update_mode(mode)
        .map_err(|e| e.to_string())?;
    Ok(format!("Mode: {mode}"))
}

fn parse_draft(fields: &[&str]) -> Result<RuleDraft, String> {
    let (color_r, color_g, color_b, pin_number, pin_state, threshold) = match fields {
        [r, g, b, pin, state] => (r, g, b, pin, state, None),
        [r, g, b, pin, state, threshold] => (r, g, b, pin, state, Some(threshold)),
        _ => return Err("expected <r> <g> <b> <pin> <HIGH|LOW> [threshold]".into()),
    };

    Ok(RuleDraft {
        color_r: integer("colorR", color_r)?,
        color_g: integer("colorG", color_g)?,
        color_b: integer("colorB", color_b)?,
        pin_number: integer("pinNumber", pin_number)?,
        pin_state: pin_state.to_string(),
        threshold: threshold
            .map(|value| {
                value
                    .parse::<u32>()
                    .map_err(|_| format!("threshold must be a non-negative integer, got '{value}'"))
            })
            .transpose()?,
    })
}

fn integer(field: &str, value: &str) -> Result<i64, String> {
    value
        .parse::<i64>()
        .map_err(|_| format!("{field} must be an integer, got '{value}'"))
}

async fn save_rule(
    existing_id: Option<&str>,
    draft: RuleDraft,
    state: &AppState,
) -> Result<String, String> {
    let saved = state
        .console
        .save_rule(existing_id, &draft)
        .await
        .map_err(|e| e.to_string())?;

    let verb = if existing_id.is_some() { "Updated" } else { "Added" };
    Ok(match saved.sent {
        Some(line) => format!("{verb} {}\nSent {line}", saved.rule),
        None => format!("{verb} {}\nNot sent to the send board", saved.rule),
    })
}

fn delete_rule(id: &str, state: &AppState) -> Result<String, String> {
    if state.console.delete_rule(id) {
        Ok(format!("Deleted rule {id}"))
    } else {
        Err(format!("No rule {id}"))
    }
}

fn get_rules(state: &AppState) -> String {
    let rules = state.console.rules();
    if rules.is_empty() {
        return "No rules".into();
    }
    rules
        .iter()
        .map(|rule| rule.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn pick_color(state: &AppState) -> Result<String, String> {
    let pick = state.console.pick_color();
    match tokio::time::timeout(PICK_TIMEOUT, pick).await {
        Ok(Ok(rgb)) => {
            let sample = ColorSample::from_rgb(rgb);
            Ok(format!(
                "Picked {} {} {} ({} {})",
                rgb.r, rgb.g, rgb.b, sample.hex, sample.name
            ))
        }
        Ok(Err(_)) => Err("Color pick cancelled".into()),
        Err(_) => {
            state.console.cancel_pick();
            Err("No color received, pick cancelled".into())
        }
    }
}

fn get_history(state: &AppState) -> String {
    let history = state.console.history();
    if history.is_empty() {
        return "No colors yet".into();
    }
    history
        .iter()
        .map(|entry| format!("{} {}", entry.hex, entry.name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn numbered(entries: &[String]) -> String {
    if entries.is_empty() {
        return "Empty".into();
    }
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| format!("{:>2}. {entry}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
