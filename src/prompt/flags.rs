//! Screen classification
//!
//! Every screen snapshot is classified from scratch into a set of flags.
//! A flag is set when any of its literal markers occurs anywhere in the
//! screen text.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PromptFlags: u32 {
        const ALWAYS_YES_QUESTION = 1 << 0;
        const ALWAYS_NO_QUESTION  = 1 << 1;
        const KILLED              = 1 << 2;
        const END                 = 1 << 3;
        const STALE               = 1 << 4;
        const MORE                = 1 << 5;
        const KILLED_SOMETHING    = 1 << 6;
        const DGAMELAUNCH         = 1 << 7;
        const COUNT               = 1 << 8;
        const DG_LOGGED_IN        = 1 << 9;
        const GAME_SCREEN         = 1 << 10;
        const FAINTED             = 1 << 11;
        const CALL_PROMPT         = 1 << 12;
        const THROW_PROMPT        = 1 << 13;
        const ENTRY_PROBLEM       = 1 << 14;
        /// Nothing but spaces on screen
        const BLANK               = 1 << 15;
    }
}

/// Literal markers per flag
const CATALOG: &[(PromptFlags, &[&str])] = &[
    (PromptFlags::ALWAYS_YES_QUESTION, &["Force its termination? [yn]", "Really save?"]),
    (
        PromptFlags::ALWAYS_NO_QUESTION,
        &["who are you?", "Still climb?", "re you sure?", "Really quit?", "Really attack"],
    ),
    (PromptFlags::KILLED, &["killed by", "Voluntary challenges"]),
    (PromptFlags::END, &["(end)"]),
    (PromptFlags::STALE, &["stale"]),
    (PromptFlags::MORE, &["--More--"]),
    (PromptFlags::KILLED_SOMETHING, &["You kill"]),
    (PromptFlags::DGAMELAUNCH, &["dgamelaunch"]),
    (PromptFlags::COUNT, &["Count: "]),
    (PromptFlags::DG_LOGGED_IN, &["Logged in as"]),
    (PromptFlags::GAME_SCREEN, &["Dlvl:"]),
    (PromptFlags::FAINTED, &["Fainted"]),
    (PromptFlags::CALL_PROMPT, &["Call a"]),
    (PromptFlags::THROW_PROMPT, &["What do you want to throw?"]),
    (PromptFlags::ENTRY_PROBLEM, &["There was a problem with your last entry."]),
];

impl PromptFlags {
    /// Screens that need a keystroke before the game takes a real action
    pub const SPECIAL: Self = Self::END
        .union(Self::MORE)
        .union(Self::ALWAYS_YES_QUESTION)
        .union(Self::ALWAYS_NO_QUESTION)
        .union(Self::COUNT)
        .union(Self::CALL_PROMPT)
        .union(Self::THROW_PROMPT)
        .union(Self::ENTRY_PROBLEM)
        .union(Self::KILLED);

    /// Informational screens that a plain Enter clears
    pub const INFORMATIONAL: Self = Self::END
        .union(Self::MORE)
        .union(Self::BLANK)
        .union(Self::CALL_PROMPT)
        .union(Self::ENTRY_PROBLEM);

    /// The game is over (or we are back at the launcher menu)
    pub const TERMINAL: Self = Self::KILLED.union(Self::DGAMELAUNCH);

    pub fn is_special_prompt(self) -> bool {
        self.intersects(Self::SPECIAL)
    }
}

impl fmt::Display for PromptFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        let names: Vec<String> = self
            .iter_names()
            .map(|(name, _)| name.to_lowercase())
            .collect();
        f.write_str(&names.join(", "))
    }
}

/// Classify one screen snapshot
pub fn classify(text: &str) -> PromptFlags {
    let mut flags = CATALOG
        .iter()
        .filter(|(_, markers)| markers.iter().any(|m| text.contains(m)))
        .fold(PromptFlags::empty(), |acc, (flag, _)| acc | *flag);

    if text.chars().all(|c| c == ' ') {
        flags |= PromptFlags::BLANK;
    }
    flags
}
