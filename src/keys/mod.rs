pub mod parser;
pub mod preset;

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::error::{OutlineError, Result};
use crate::outline::Gesture;
use preset::get_preset;

/// Resolves terminal key events to edit gestures.
#[derive(Debug, Clone)]
pub struct KeybindingMap {
    bindings: HashMap<KeyEvent, Gesture>,
}

impl KeybindingMap {
    /// `overrides` maps gesture names to key strings. An override replaces
    /// every preset binding for that gesture.
    pub fn from_preset(name: &str, overrides: &HashMap<String, String>) -> Result<Self> {
        let mut bindings = get_preset(name)
            .ok_or_else(|| OutlineError::Config(format!("unknown keybinding preset: {}", name)))?;

        for (gesture_name, key_str) in overrides {
            let gesture = Gesture::from_str(gesture_name)
                .ok_or_else(|| OutlineError::Config(format!("unknown gesture: {}", gesture_name)))?;
            let key_event = parser::parse_key(key_str)?;

            bindings.retain(|_, g| *g != gesture);
            bindings.insert(key_event, gesture);
        }

        Ok(Self { bindings })
    }

    pub fn resolve(&self, key: &KeyEvent) -> Option<Gesture> {
        self.bindings.get(&parser::normalize(*key)).copied()
    }

    pub fn hints(&self) -> Vec<(String, &'static str)> {
        let mut hints: Vec<(String, &'static str)> = self
            .bindings
            .iter()
            .map(|(key, gesture)| (format_key_event(key), gesture.hint_text()))
            .collect();
        hints.sort();
        hints
    }
}

fn format_key_event(key: &KeyEvent) -> String {
    let mut label = String::new();
    for (flag, name) in [(KeyModifiers::CONTROL, "Ctrl+"), (KeyModifiers::ALT, "Alt+")] {
        if key.modifiers.contains(flag) {
            label.push_str(name);
        }
    }
    if key.modifiers.contains(KeyModifiers::SHIFT) || key.code == KeyCode::BackTab {
        label.push_str("Shift+");
    }

    match key.code {
        KeyCode::BackTab => label.push_str("Tab"),
        KeyCode::Char(c) if c != ' ' => label.push(c),
        code => match parser::NAMED_KEYS.iter().find(|(_, named)| *named == code) {
            Some((name, _)) => label.push_str(name),
            None => label.push_str(&format!("{:?}", code)),
        },
    }
    label
}
