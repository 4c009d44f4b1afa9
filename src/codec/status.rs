//! Status line parsing
//!
//! NetHack prints two status lines at the bottom of the screen:
//!
//! ```text
//! Aa the Stripling       St:18/02 Dx:14 Co:16 In:8 Wi:9 Ch:8  Lawful S:0
//! Dlvl:1  $:0  HP:18(18) Pw:1(1) AC:6  Xp:1/0 T:1
//! ```
//!
//! Fields the game does not show (time, score and experience are all
//! optional) are simply missing from the record.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Rows at the bottom of the screen holding the status
pub const STATUS_LINES: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusField {
    Dlvl,
    Gold,
    Hp,
    HpMax,
    Pw,
    PwMax,
    Ac,
    XpLevel,
    XpPoints,
    Turn,
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
    Score,
}

impl StatusField {
    pub fn name(self) -> &'static str {
        match self {
            StatusField::Dlvl => "dlvl",
            StatusField::Gold => "gold",
            StatusField::Hp => "hp",
            StatusField::HpMax => "hp_max",
            StatusField::Pw => "pw",
            StatusField::PwMax => "pw_max",
            StatusField::Ac => "ac",
            StatusField::XpLevel => "xp_level",
            StatusField::XpPoints => "xp_points",
            StatusField::Turn => "t",
            StatusField::Strength => "st",
            StatusField::Dexterity => "dx",
            StatusField::Constitution => "co",
            StatusField::Intelligence => "in",
            StatusField::Wisdom => "wi",
            StatusField::Charisma => "ch",
            StatusField::Score => "s",
        }
    }
}

impl fmt::Display for StatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Each pattern fills the listed fields from its capture groups, in order
static PATTERNS: Lazy<Vec<(Regex, &'static [StatusField])>> = Lazy::new(|| {
    let table: [(&str, &'static [StatusField]); 14] = [
        (r"Dlvl:(\d+)", &[StatusField::Dlvl]),
        (r"\$:(\d+)", &[StatusField::Gold]),
        (r"HP:(-?\d+)\((\d+)\)", &[StatusField::Hp, StatusField::HpMax]),
        (r"Pw:(\d+)\((\d+)\)", &[StatusField::Pw, StatusField::PwMax]),
        (r"AC:(-?\d+)", &[StatusField::Ac]),
        (r"(?:Xp|Exp|HD):(\d+)(?:/(\d+))?", &[StatusField::XpLevel, StatusField::XpPoints]),
        (r"\bT:(\d+)", &[StatusField::Turn]),
        (r"\bSt:(\d+)", &[StatusField::Strength]),
        (r"\bDx:(\d+)", &[StatusField::Dexterity]),
        (r"\bCo:(\d+)", &[StatusField::Constitution]),
        (r"\bIn:(\d+)", &[StatusField::Intelligence]),
        (r"\bWi:(\d+)", &[StatusField::Wisdom]),
        (r"\bCh:(\d+)", &[StatusField::Charisma]),
        (r"\bS:(\d+)", &[StatusField::Score]),
    ];
    table
        .into_iter()
        .map(|(pattern, fields)| (Regex::new(pattern).unwrap(), fields))
        .collect()
});

/// Named numeric fields read off the status lines
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusRecord {
    fields: BTreeMap<StatusField, i64>,
}

impl StatusRecord {
    pub fn get(&self, field: StatusField) -> Option<i64> {
        self.fields.get(&field).copied()
    }

    pub fn turn(&self) -> Option<i64> {
        self.get(StatusField::Turn)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatusField, i64)> + '_ {
        self.fields.iter().map(|(k, v)| (*k, *v))
    }

    /// Present values in field order, as a feature vector
    pub fn values(&self) -> Vec<f32> {
        self.fields.values().map(|&v| v as f32).collect()
    }
}

/// Parse the bottom status lines of a display
pub fn to_status_record(display: &[String]) -> StatusRecord {
    let start = display.len().saturating_sub(STATUS_LINES);
    let text = display[start..].join(" ");

    let mut fields = BTreeMap::new();
    for (regex, targets) in PATTERNS.iter() {
        let Some(caps) = regex.captures(&text) else {
            continue;
        };
        for (i, field) in targets.iter().enumerate() {
            if let Some(value) = caps.get(i + 1).and_then(|m| m.as_str().parse::<i64>().ok()) {
                fields.insert(*field, value);
            }
        }
    }

    StatusRecord { fields }
}
