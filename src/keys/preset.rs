use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::outline::Gesture;

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn ctrl(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::CONTROL)
}

fn alt(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::ALT)
}

fn shift(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::SHIFT)
}

/// Browser-style outliner keys. Shift+Enter stays unbound so the shell can
/// insert a literal newline.
pub fn default_preset() -> HashMap<KeyEvent, Gesture> {
    let mut m = HashMap::new();
    m.insert(key(KeyCode::Enter), Gesture::Split);
    m.insert(key(KeyCode::Backspace), Gesture::MergeDelete);
    m.insert(key(KeyCode::Up), Gesture::NavigateUp);
    m.insert(key(KeyCode::Down), Gesture::NavigateDown);
    m.insert(key(KeyCode::Tab), Gesture::Indent);
    m.insert(shift(KeyCode::BackTab), Gesture::Outdent);
    m
}

pub fn emacs_preset() -> HashMap<KeyEvent, Gesture> {
    let mut m = default_preset();
    m.insert(ctrl(KeyCode::Char('p')), Gesture::NavigateUp);
    m.insert(ctrl(KeyCode::Char('n')), Gesture::NavigateDown);
    m.insert(ctrl(KeyCode::Char('j')), Gesture::Split);
    m.insert(alt(KeyCode::Right), Gesture::Indent);
    m.insert(alt(KeyCode::Left), Gesture::Outdent);
    m
}

pub fn get_preset(name: &str) -> Option<HashMap<KeyEvent, Gesture>> {
    match name.to_lowercase().as_str() {
        "default" => Some(default_preset()),
        "emacs" => Some(emacs_preset()),
        _ => None,
    }
}
