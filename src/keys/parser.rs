use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::error::{OutlineError, Result};

/// Parses strings like `Shift+Tab` or `Ctrl+j` into a normalized key event.
pub fn parse_key(input: &str) -> Result<KeyEvent> {
    let parts: Vec<&str> = input.split('+').collect();
    let mut modifiers = KeyModifiers::NONE;
    let mut key_part = None;

    for (i, part) in parts.iter().enumerate() {
        let part = part.trim();
        match part.to_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            "alt" | "meta" => modifiers |= KeyModifiers::ALT,
            _ if i == parts.len() - 1 => key_part = Some(part),
            _ => {
                return Err(OutlineError::Config(format!(
                    "unknown modifier '{}' in key '{}'",
                    part, input
                )))
            }
        }
    }

    let key_str = key_part
        .filter(|k| !k.is_empty())
        .ok_or_else(|| OutlineError::Config(format!("no key code in '{}'", input)))?;
    let code = parse_key_code(key_str)?;
    Ok(normalize(KeyEvent::new(code, modifiers)))
}

/// Terminals disagree on Shift+Tab: some report `Tab` with SHIFT, some
/// `BackTab` with or without it. All of them become `BackTab` + SHIFT. Kind
/// and state are dropped so repeats match their bindings.
pub fn normalize(event: KeyEvent) -> KeyEvent {
    match event.code {
        KeyCode::Tab if event.modifiers.contains(KeyModifiers::SHIFT) => {
            KeyEvent::new(KeyCode::BackTab, event.modifiers)
        }
        KeyCode::BackTab => KeyEvent::new(KeyCode::BackTab, event.modifiers | KeyModifiers::SHIFT),
        code => KeyEvent::new(code, event.modifiers),
    }
}

/// Named keys accepted in config strings. The first name listed for a code
/// is the one shown in hints.
pub(crate) const NAMED_KEYS: &[(&str, KeyCode)] = &[
    ("Enter", KeyCode::Enter),
    ("Return", KeyCode::Enter),
    ("Esc", KeyCode::Esc),
    ("Escape", KeyCode::Esc),
    ("Tab", KeyCode::Tab),
    ("BackTab", KeyCode::BackTab),
    ("Backspace", KeyCode::Backspace),
    ("Delete", KeyCode::Delete),
    ("Home", KeyCode::Home),
    ("End", KeyCode::End),
    ("PageUp", KeyCode::PageUp),
    ("PageDown", KeyCode::PageDown),
    ("↑", KeyCode::Up),
    ("Up", KeyCode::Up),
    ("↓", KeyCode::Down),
    ("Down", KeyCode::Down),
    ("←", KeyCode::Left),
    ("Left", KeyCode::Left),
    ("→", KeyCode::Right),
    ("Right", KeyCode::Right),
    ("Space", KeyCode::Char(' ')),
];

fn parse_key_code(s: &str) -> Result<KeyCode> {
    if let Some((_, code)) = NAMED_KEYS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(s))
    {
        return Ok(*code);
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(KeyCode::Char(ch)),
        _ => Err(OutlineError::Config(format!("unknown key: {}", s))),
    }
}
