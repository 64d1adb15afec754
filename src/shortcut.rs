//! Menu shortcut decoding
//!
//! Converts the raw values an accessibility menu item exposes into one
//! display string:
//!
//! - `AXMenuItemCmdChar` - literal key character (preferred)
//! - `AXMenuItemCmdVirtualKey` - virtual key code, used when there is no character
//! - `AXMenuItemCmdModifiers` - modifier bitmask
//!
//! The modifier mask is the menu-item encoding, not the event-flag encoding:
//! bit 3 means "Command is NOT part of the shortcut", so an empty mask is
//! plain ⌘ + key.
//!
//! ```ignore
//! use menukeys::shortcut::decode_shortcut;
//!
//! assert_eq!(decode_shortcut(Some("n"), None, Some(1)).as_deref(), Some("⌘⇧N"));
//! ```

use bitflags::bitflags;

/// Glyphs, in display order
pub const COMMAND_GLYPH: char = '⌘';
pub const OPTION_GLYPH: char = '⌥';
pub const CONTROL_GLYPH: char = '⌃';
pub const SHIFT_GLYPH: char = '⇧';

bitflags! {
    /// Modifier mask as reported by `AXMenuItemCmdModifiers`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MenuModifiers: u32 {
        /// Shift key (⇧)
        const SHIFT = 1 << 0;
        /// Option key (⌥)
        const OPTION = 1 << 1;
        /// Control key (⌃)
        const CONTROL = 1 << 2;
        /// Command is absent (inverted bit)
        const NO_COMMAND = 1 << 3;
    }
}

impl MenuModifiers {
    pub fn has_command(self) -> bool {
        !self.contains(MenuModifiers::NO_COMMAND)
    }

    /// Modifier glyphs in the fixed order ⌘ ⌥ ⌃ ⇧
    pub fn glyphs(self) -> String {
        let mut result = String::new();
        if self.has_command() {
            result.push(COMMAND_GLYPH);
        }
        if self.contains(MenuModifiers::OPTION) {
            result.push(OPTION_GLYPH);
        }
        if self.contains(MenuModifiers::CONTROL) {
            result.push(CONTROL_GLYPH);
        }
        if self.contains(MenuModifiers::SHIFT) {
            result.push(SHIFT_GLYPH);
        }
        result
    }
}

/// A decoded menu shortcut
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardShortcut {
    /// Key glyph (e.g. "S", "F5", "↩")
    pub key: String,
    pub modifiers: MenuModifiers,
}

impl KeyboardShortcut {
    pub fn new(key: impl Into<String>, modifiers: MenuModifiers) -> Self {
        Self {
            key: key.into(),
            modifiers,
        }
    }

    /// Build a shortcut from raw AX values.
    ///
    /// Returns `None` when neither the character nor the virtual key yields a
    /// key glyph. A missing modifier value decodes as `0` (⌘ only).
    pub fn from_ax_values(
        cmd_char: Option<&str>,
        virtual_key: Option<u32>,
        cmd_modifiers: Option<u32>,
    ) -> Option<Self> {
        let key = match cmd_char {
            Some(ch) if !ch.is_empty() => ch.to_uppercase(),
            _ => virtual_key_glyph(virtual_key?)?.to_string(),
        };
        let modifiers = MenuModifiers::from_bits_truncate(cmd_modifiers.unwrap_or(0));
        Some(Self { key, modifiers })
    }

    /// Convert to the display string, e.g. "⌘⌥⇧S"
    pub fn to_display_string(&self) -> String {
        let mut result = self.modifiers.glyphs();
        result.push_str(&self.key);
        result
    }
}

impl std::fmt::Display for KeyboardShortcut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Decode raw AX shortcut values straight to a display string
pub fn decode_shortcut(
    cmd_char: Option<&str>,
    virtual_key: Option<u32>,
    cmd_modifiers: Option<u32>,
) -> Option<String> {
    KeyboardShortcut::from_ax_values(cmd_char, virtual_key, cmd_modifiers)
        .map(|shortcut| shortcut.to_display_string())
}

/// Map a virtual key code (Carbon `kVK_*`) to its display glyph.
///
/// Only keys that can't be expressed as a menu character are listed.
pub fn virtual_key_glyph(code: u32) -> Option<&'static str> {
    let glyph = match code {
        // Function keys
        0x7A => "F1",
        0x78 => "F2",
        0x63 => "F3",
        0x76 => "F4",
        0x60 => "F5",
        0x61 => "F6",
        0x62 => "F7",
        0x64 => "F8",
        0x65 => "F9",
        0x6D => "F10",
        0x67 => "F11",
        0x6F => "F12",
        0x69 => "F13",
        0x6B => "F14",
        0x71 => "F15",
        0x6A => "F16",
        0x40 => "F17",
        0x4F => "F18",
        0x50 => "F19",
        0x5A => "F20",
        // Arrows
        0x7B => "←",
        0x7C => "→",
        0x7D => "↓",
        0x7E => "↑",
        // Named keys
        0x33 => "⌫",
        0x75 => "⌦",
        0x35 => "⎋",
        0x24 => "↩",
        0x4C => "⌤",
        0x30 => "⇥",
        0x31 => "Space",
        0x73 => "↖",
        0x77 => "↘",
        0x74 => "⇞",
        0x79 => "⇟",
        0x47 => "⌧",
        0x72 => "Help",
        _ => return None,
    };
    Some(glyph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mask_is_command() {
        assert_eq!(decode_shortcut(Some("c"), None, Some(0)).as_deref(), Some("⌘C"));
    }

    #[test]
    fn test_missing_mask_is_command() {
        assert_eq!(decode_shortcut(Some("q"), None, None).as_deref(), Some("⌘Q"));
    }

    #[test]
    fn test_no_command_bit_drops_command() {
        assert_eq!(decode_shortcut(Some("x"), None, Some(8)).as_deref(), Some("X"));
        // Control-only: bits 2 and 3
        assert_eq!(decode_shortcut(Some("a"), None, Some(12)).as_deref(), Some("⌃A"));
    }

    #[test]
    fn test_modifier_order_is_fixed() {
        for mask in 0u32..16 {
            let label = decode_shortcut(Some("k"), None, Some(mask)).unwrap();
            let order: Vec<usize> = [COMMAND_GLYPH, OPTION_GLYPH, CONTROL_GLYPH, SHIFT_GLYPH]
                .iter()
                .filter_map(|glyph| label.find(*glyph))
                .collect();
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(order, sorted, "mask {} produced {}", mask, label);
            assert!(label.ends_with('K'));
            assert_eq!(label.contains(COMMAND_GLYPH), mask & 8 == 0);
        }
    }

    #[test]
    fn test_all_modifiers() {
        // Shift + Option + Control, Command present
        assert_eq!(decode_shortcut(Some("z"), None, Some(7)).as_deref(), Some("⌘⌥⌃⇧Z"));
    }

    #[test]
    fn test_unknown_high_bits_ignored() {
        assert_eq!(decode_shortcut(Some("s"), None, Some(0x100 | 1)).as_deref(), Some("⌘⇧S"));
    }

    #[test]
    fn test_character_wins_over_virtual_key() {
        assert_eq!(decode_shortcut(Some("p"), Some(0x7A), Some(0)).as_deref(), Some("⌘P"));
    }

    #[test]
    fn test_virtual_key_fallback() {
        assert_eq!(decode_shortcut(None, Some(0x7A), Some(8)).as_deref(), Some("F1"));
        assert_eq!(decode_shortcut(Some(""), Some(0x5A), Some(0)).as_deref(), Some("⌘F20"));
        assert_eq!(decode_shortcut(None, Some(0x7E), Some(2)).as_deref(), Some("⌘⌥↑"));
        assert_eq!(decode_shortcut(None, Some(0x33), Some(0)).as_deref(), Some("⌘⌫"));
    }

    #[test]
    fn test_unmapped_virtual_key_has_no_shortcut() {
        assert_eq!(decode_shortcut(None, Some(0x00), Some(0)), None);
        assert_eq!(decode_shortcut(None, Some(9999), None), None);
    }

    #[test]
    fn test_nothing_decodes_to_none() {
        assert_eq!(decode_shortcut(None, None, Some(0)), None);
        assert_eq!(decode_shortcut(Some(""), None, None), None);
    }

    #[test]
    fn test_function_keys_complete() {
        let codes = [
            0x7A, 0x78, 0x63, 0x76, 0x60, 0x61, 0x62, 0x64, 0x65, 0x6D, 0x67, 0x6F, 0x69, 0x6B,
            0x71, 0x6A, 0x40, 0x4F, 0x50, 0x5A,
        ];
        for (index, code) in codes.iter().enumerate() {
            assert_eq!(
                virtual_key_glyph(*code),
                Some(format!("F{}", index + 1).as_str())
            );
        }
    }

    #[test]
    fn test_display_impl() {
        let shortcut = KeyboardShortcut::new("N", MenuModifiers::SHIFT);
        assert_eq!(shortcut.to_string(), "⌘⇧N");
    }
}
