//! Global keyboard hooks. `rdev` owns the listener thread; presses are
//! forwarded to the async side over an unbounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rdev::{EventType, Key};
use tokio::sync::mpsc::UnboundedSender;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    Trigger,
    Exit,
}

/// Map a human key name (`"F4"`, `"esc"`, `"k"`, `"5"`) to an `rdev::Key`.
pub fn parse_key(name: &str) -> Option<Key> {
    let lower = name.trim().to_ascii_lowercase();
    let key = match lower.as_str() {
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        "esc" | "escape" => Key::Escape,
        "space" => Key::Space,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "pause" => Key::Pause,
        "scrolllock" | "scroll_lock" => Key::ScrollLock,
        "printscreen" | "print_screen" => Key::PrintScreen,
        "insert" => Key::Insert,
        "delete" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" => Key::PageUp,
        "pagedown" | "page_down" => Key::PageDown,
        other => return single_char_key(other),
    };
    Some(key)
}

fn single_char_key(name: &str) -> Option<Key> {
    let mut chars = name.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let key = match c {
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        '0' => Key::Num0,
        '1' => Key::Num1,
        '2' => Key::Num2,
        '3' => Key::Num3,
        '4' => Key::Num4,
        '5' => Key::Num5,
        '6' => Key::Num6,
        '7' => Key::Num7,
        '8' => Key::Num8,
        '9' => Key::Num9,
        _ => return None,
    };
    Some(key)
}

/// Turns raw key events into hotkey events. Auto-repeat presses are dropped
/// until the key is released.
#[derive(Debug)]
pub struct KeyFilter {
    trigger: Key,
    exit: Key,
    trigger_down: bool,
}

impl KeyFilter {
    pub fn new(trigger: Key, exit: Key) -> Self {
        Self {
            trigger,
            exit,
            trigger_down: false,
        }
    }

    pub fn on_event(&mut self, event: &EventType) -> Option<HotkeyEvent> {
        match event {
            EventType::KeyPress(k) if *k == self.exit => Some(HotkeyEvent::Exit),
            EventType::KeyPress(k) if *k == self.trigger => {
                if self.trigger_down {
                    return None;
                }
                self.trigger_down = true;
                Some(HotkeyEvent::Trigger)
            }
            EventType::KeyRelease(k) if *k == self.trigger => {
                self.trigger_down = false;
                None
            }
            _ => None,
        }
    }
}

pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Spawn the global listener thread. It lives until the process exits;
    /// `stop()` only silences it.
    pub fn start(trigger: Key, exit: Key, tx: UnboundedSender<HotkeyEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut filter = KeyFilter::new(trigger, exit);

            // Requires Accessibility permission on macOS and an X11 session on Linux.
            let callback = move |event: rdev::Event| {
                if stop_thread.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(hotkey) = filter.on_event(&event.event_type) {
                    let _ = tx.send(hotkey);
                }
            };

            if let Err(e) = rdev::listen(callback) {
                error!("global hotkey listener failed: {:?}", e);
            }
        });

        Self { stop }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_names() {
        assert_eq!(parse_key("F4"), Some(Key::F4));
        assert_eq!(parse_key(" esc "), Some(Key::Escape));
        assert_eq!(parse_key("Escape"), Some(Key::Escape));
        assert_eq!(parse_key("k"), Some(Key::KeyK));
        assert_eq!(parse_key("7"), Some(Key::Num7));
        assert_eq!(parse_key("PageDown"), Some(Key::PageDown));
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("F13"), None);
        assert_eq!(parse_key("kk"), None);
    }

    #[test]
    fn test_filter_fires_once_per_press() {
        let mut f = KeyFilter::new(Key::F4, Key::Escape);
        assert_eq!(f.on_event(&EventType::KeyPress(Key::F4)), Some(HotkeyEvent::Trigger));
        // auto-repeat
        assert_eq!(f.on_event(&EventType::KeyPress(Key::F4)), None);
        assert_eq!(f.on_event(&EventType::KeyRelease(Key::F4)), None);
        assert_eq!(f.on_event(&EventType::KeyPress(Key::F4)), Some(HotkeyEvent::Trigger));
    }

    #[test]
    fn test_filter_exit_and_other_keys() {
        let mut f = KeyFilter::new(Key::F4, Key::Escape);
        assert_eq!(f.on_event(&EventType::KeyPress(Key::KeyA)), None);
        assert_eq!(f.on_event(&EventType::KeyRelease(Key::Escape)), None);
        assert_eq!(f.on_event(&EventType::KeyPress(Key::Escape)), Some(HotkeyEvent::Exit));
    }
}
