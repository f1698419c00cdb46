//! Input handling.
//!
//! A headless client has no keyboard, so input comes from console lines:
//! movement letters (`w`, `a`, `s`, `d`), `jump`, `use`, `turn <radians>`,
//! and `say <text>` for chat.

use blox_shared::protocol::{ChatMessage, ClientMessage, InputMessage};

/// Held keys and camera yaw.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub interact: bool,
    pub yaw: f32,
}

impl InputState {
    pub fn is_idle(&self) -> bool {
        !(self.up || self.down || self.left || self.right || self.jump || self.interact)
    }
}

/// Turns sampled input into the wire message for one send.
pub fn build_input(state: InputState) -> InputMessage {
    InputMessage {
        up: state.up,
        down: state.down,
        left: state.left,
        right: state.right,
        space: state.jump,
        interact: state.interact,
        angle: state.yaw,
    }
}

/// Parses one console line. `None` for blank or unrecognised lines.
pub fn parse_line(line: &str, yaw: &mut f32) -> Option<ClientMessage> {
    let line = line.trim();
    if let Some(text) = line.strip_prefix("say ") {
        return Some(ClientMessage::Chat(ChatMessage {
            content: text.trim().to_string(),
        }));
    }
    if let Some(angle) = line.strip_prefix("turn ") {
        *yaw = angle.trim().parse().ok()?;
        return None;
    }

    let mut state = InputState {
        yaw: *yaw,
        ..InputState::default()
    };
    for token in line.split_whitespace() {
        match token {
            "w" => state.up = true,
            "s" => state.down = true,
            "a" => state.left = true,
            "d" => state.right = true,
            "jump" => state.jump = true,
            "use" => state.interact = true,
            _ => return None,
        }
    }
    if state.is_idle() {
        return None;
    }
    Some(ClientMessage::Input(build_input(state)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_tokens_combine() {
        let mut yaw = 0.5;
        let Some(ClientMessage::Input(msg)) = parse_line("w d jump", &mut yaw) else {
            panic!("expected input");
        };
        assert!(msg.up && msg.right && msg.space);
        assert!(!msg.down && !msg.left && !msg.interact);
        assert_eq!(msg.angle, 0.5);
    }

    #[test]
    fn say_becomes_chat() {
        let mut yaw = 0.0;
        assert_eq!(
            parse_line("say  hi there ", &mut yaw),
            Some(ClientMessage::Chat(ChatMessage {
                content: "hi there".into()
            }))
        );
    }

    #[test]
    fn turn_updates_yaw_only() {
        let mut yaw = 0.0;
        assert_eq!(parse_line("turn 1.5", &mut yaw), None);
        assert_eq!(yaw, 1.5);
        assert_eq!(parse_line("turn north", &mut yaw), None);
        assert_eq!(yaw, 1.5);
        assert_eq!(parse_line("dance", &mut yaw), None);
        assert_eq!(parse_line("   ", &mut yaw), None);
    }
}
