use serde::Serialize;

/// A selectable synthesis voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoiceOption {
    /// Identifier passed to the synthesis service.
    pub id: &'static str,
    pub name: &'static str,
    /// Short description shown next to the name.
    pub label: &'static str,
}

/// Fixed catalog. The first entry is the default selection.
pub const VOICES: [VoiceOption; 5] = [
    VoiceOption {
        id: "Kore",
        name: "Kore",
        label: "Firm, confident",
    },
    VoiceOption {
        id: "Puck",
        name: "Puck",
        label: "Upbeat, lively",
    },
    VoiceOption {
        id: "Charon",
        name: "Charon",
        label: "Informative, steady",
    },
    VoiceOption {
        id: "Fenrir",
        name: "Fenrir",
        label: "Excitable, energetic",
    },
    VoiceOption {
        id: "Aoede",
        name: "Aoede",
        label: "Breezy, warm",
    },
];

pub fn catalog() -> &'static [VoiceOption] {
    &VOICES
}

pub fn default_voice() -> &'static VoiceOption {
    &VOICES[0]
}

pub fn find(id: &str) -> Option<&'static VoiceOption> {
    VOICES.iter().find(|v| v.id == id)
}
