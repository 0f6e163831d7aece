//! Instrument bank catalog.
//!
//! A bank is a named palette mapping instrument ids 0-7 to timbres. The
//! generator either uses the bank the listener asked for or opens its
//! output with `{"bank": "<id>"}`.

use crate::note::INSTRUMENT_COUNT;

/// Bank used when nothing else was selected.
pub const DEFAULT_BANK: &str = "electronic";

/// One instrument slot of a bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instrument {
    pub name: &'static str,
    /// Lowest pitch the instrument sounds good at.
    pub low: u8,
    /// Highest pitch the instrument sounds good at.
    pub high: u8,
    pub description: &'static str,
}

impl Instrument {
    /// Whether the pitch lies inside the instrument's recommended range.
    pub fn in_range(&self, pitch: u8) -> bool {
        (self.low..=self.high).contains(&pitch)
    }
}

/// A named palette of eight instruments.
#[derive(Debug)]
pub struct InstrumentBank {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub instruments: [Instrument; INSTRUMENT_COUNT as usize],
}

impl InstrumentBank {
    /// Look up an instrument slot, falling back to slot 0 for unknown ids.
    pub fn instrument(&self, id: u8) -> &Instrument {
        self.instruments
            .get(id as usize)
            .unwrap_or(&self.instruments[0])
    }
}

const fn inst(name: &'static str, low: u8, high: u8, description: &'static str) -> Instrument {
    Instrument {
        name,
        low,
        high,
        description,
    }
}

/// All known banks. The first entry is the default.
pub static BANKS: [InstrumentBank; 4] = [
    InstrumentBank {
        id: "electronic",
        name: "Electronic",
        description: "Modern synthesizers and electronic sounds",
        instruments: [
            inst("saw_lead", 48, 96, "cutting sawtooth lead synth"),
            inst("synth_bass", 24, 60, "punchy electronic bass"),
            inst("synth_strings", 48, 84, "lush synthetic string pad"),
            inst("square_lead", 60, 96, "retro square wave melody"),
            inst("polysynth", 48, 84, "warm polyphonic synth pad"),
            inst("dist_guitar", 48, 84, "distorted power guitar"),
            inst("rock_organ", 36, 84, "gritty rock organ"),
            inst("drums", 36, 72, "electronic drum kit"),
        ],
    },
    InstrumentBank {
        id: "acoustic",
        name: "Acoustic/Piano",
        description: "Natural acoustic instruments centered around piano",
        instruments: [
            inst("grand_piano", 21, 108, "concert grand piano"),
            inst("acoustic_bass", 24, 60, "upright acoustic bass"),
            inst("strings", 48, 84, "orchestral string ensemble"),
            inst("flute", 60, 96, "concert flute melody"),
            inst("choir", 48, 84, "vocal choir pad"),
            inst("acoustic_guitar", 40, 84, "nylon string guitar"),
            inst("vibraphone", 53, 89, "jazz vibraphone"),
            inst("drums", 36, 72, "acoustic drum kit"),
        ],
    },
    InstrumentBank {
        id: "orchestral",
        name: "Orchestral/Cinematic",
        description: "Epic orchestral instruments for cinematic compositions",
        instruments: [
            inst("piano", 21, 108, "grand piano"),
            inst("contrabass", 24, 60, "orchestral contrabass"),
            inst("strings", 36, 96, "full string orchestra"),
            inst("brass", 36, 84, "brass section"),
            inst("choir", 48, 84, "epic choir"),
            inst("harp", 24, 103, "concert harp"),
            inst("woodwinds", 48, 96, "woodwind ensemble"),
            inst("timpani", 36, 72, "orchestral percussion"),
        ],
    },
    InstrumentBank {
        id: "retro",
        name: "Retro/8-bit",
        description: "Chiptune and retro video game sounds",
        instruments: [
            inst("pulse_lead", 36, 96, "classic pulse wave lead"),
            inst("triangle_bass", 24, 60, "triangle wave bass"),
            inst("noise_pad", 48, 84, "filtered noise texture"),
            inst("square_lead", 60, 96, "bright square melody"),
            inst("arp_synth", 48, 84, "arpeggio synth"),
            inst("chip_pluck", 48, 84, "short chip pluck"),
            inst("fm_bells", 48, 96, "FM synthesis bells"),
            inst("drums", 36, 72, "8-bit drum samples"),
        ],
    },
];

/// Find a bank by id (case-insensitive).
pub fn find_bank(id: &str) -> Option<&'static InstrumentBank> {
    BANKS.iter().find(|bank| bank.id.eq_ignore_ascii_case(id.trim()))
}

/// Resolve an optional bank id, defaulting to [`DEFAULT_BANK`] when absent or unknown.
pub fn bank_or_default(id: Option<&str>) -> &'static InstrumentBank {
    id.and_then(find_bank).unwrap_or(&BANKS[0])
}
