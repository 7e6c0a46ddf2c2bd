//! Special (event) triggers.
//!
//! Besides command words, regex patterns and timers, a script can ask to be
//! run when the host observes a platform event.  Scripts declare these with
//! `special <name>`; the host checks [`SpecialSet::contains`] when the event
//! happens.

use std::fmt;
use std::str::FromStr;

// ── Special ───────────────────────────────────────────────────────────────────

/// A platform event a script can subscribe to.
///
/// Discriminants are dense so `special as u32` indexes a [`SpecialSet`] bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum Special {
    /// An inbound chat message carried platform emotes.
    TwitchEmotes = 0,
    /// A user joined the channel.
    TwitchJoin   = 1,
    /// A user left the channel.
    TwitchPart   = 2,
}

impl Special {
    pub const ALL: &'static [Special] = &[
        Special::TwitchEmotes,
        Special::TwitchJoin,
        Special::TwitchPart,
    ];

    /// The name used after the `special` keyword.
    pub fn name(self) -> &'static str {
        match self {
            Special::TwitchEmotes => "twitch:emotes",
            Special::TwitchJoin   => "twitch:join",
            Special::TwitchPart   => "twitch:part",
        }
    }
}

impl fmt::Display for Special {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Special {
    type Err = String;

    /// Case-insensitive parse.
    fn from_str(s: &str) -> Result<Self, String> {
        let lower = s.to_ascii_lowercase();
        Special::ALL
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| format!("unknown special trigger {s:?}"))
    }
}

// ── SpecialSet ────────────────────────────────────────────────────────────────

/// Zero or more [`Special`] triggers as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecialSet(u32);

impl SpecialSet {
    pub const NONE: Self = Self(0);

    #[inline]
    pub fn contains(self, t: Special) -> bool {
        self.0 & (1u32 << t as u32) != 0
    }

    #[inline]
    pub fn insert(&mut self, t: Special) {
        self.0 |= 1u32 << t as u32;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Special> {
        Special::ALL.iter().copied().filter(move |&t| self.contains(t))
    }
}

impl From<Special> for SpecialSet {
    fn from(t: Special) -> Self {
        let mut s = SpecialSet::NONE;
        s.insert(t);
        s
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_from_str() {
        for &t in Special::ALL {
            assert_eq!(t.name().parse::<Special>().unwrap(), t);
        }
    }

    #[test]
    fn case_insensitive_parse() {
        assert_eq!("Twitch:Emotes".parse::<Special>().unwrap(), Special::TwitchEmotes);
    }

    #[test]
    fn unknown_errors() {
        assert!("irc:emotes".parse::<Special>().is_err());
    }

    #[test]
    fn set_insert_contains() {
        let mut s = SpecialSet::NONE;
        assert!(s.is_empty());
        s.insert(Special::TwitchJoin);
        assert!(s.contains(Special::TwitchJoin));
        assert!(!s.contains(Special::TwitchEmotes));
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![Special::TwitchJoin]);
    }

    #[test]
    fn discriminants_are_dense() {
        for (i, &t) in Special::ALL.iter().enumerate() {
            assert_eq!(t as usize, i, "{t:?} has wrong discriminant");
        }
    }
}
