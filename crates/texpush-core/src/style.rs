//! Terminal display styles.
//!
//! A [`Palette`] is chosen once at startup and handed to whatever renders
//! output; nothing consults the terminal or the environment after that.

use std::io::IsTerminal;

/// What a piece of text means, independent of how it is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Heading,
    Success,
    Failure,
    Warning,
    Muted,
}

impl Role {
    fn sgr(&self) -> &'static str {
        match self {
            Role::Heading => "\x1b[1;36m",
            Role::Success => "\x1b[1;32m",
            Role::Failure => "\x1b[1;31m",
            Role::Warning => "\x1b[33m",
            Role::Muted => "\x1b[2m",
        }
    }
}

const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn plain() -> Self {
        Self { enabled: false }
    }

    pub fn ansi() -> Self {
        Self { enabled: true }
    }

    /// Priority: `NO_COLOR` disables, `COLOR=1` forces, otherwise color only
    /// when stdout is a terminal.
    pub fn detect() -> Self {
        Self::from_env(
            std::env::var_os("NO_COLOR").is_some(),
            std::env::var("COLOR").is_ok_and(|v| v == "1"),
            std::io::stdout().is_terminal(),
        )
    }

    fn from_env(no_color: bool, force: bool, is_tty: bool) -> Self {
        Self {
            enabled: !no_color && (force || is_tty),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn paint(&self, text: &str, role: Role) -> String {
        if self.enabled {
            format!("{}{}{}", role.sgr(), text, RESET)
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_palette_leaves_text_alone() {
        assert_eq!(Palette::plain().paint("BUILD OK", Role::Success), "BUILD OK");
    }

    #[test]
    fn ansi_palette_wraps_and_resets() {
        let painted = Palette::ansi().paint("BUILD FAILED", Role::Failure);
        assert!(painted.starts_with("\x1b[1;31m"));
        assert!(painted.ends_with("\x1b[0m"));
        assert!(painted.contains("BUILD FAILED"));
    }

    #[test]
    fn detection_priority() {
        assert!(!Palette::from_env(true, true, true).is_enabled());
        assert!(Palette::from_env(false, true, false).is_enabled());
        assert!(Palette::from_env(false, false, true).is_enabled());
        assert!(!Palette::from_env(false, false, false).is_enabled());
    }
}
