//! Media service payloads

use serde::Serialize;

/// A command the user issued from the watch's media controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaCommand {
    Previous,
    Next,
    Play,
    Pause,
    /// Requested volume, passed through unchecked
    Volume(u8),
}

impl MediaCommand {
    /// Decodes a notification from the commands characteristic.
    ///
    /// Unknown tags and a volume command without its value byte yield `None`.
    pub fn decode(data: &[u8]) -> Option<Self> {
        match data {
            [0x00, ..] => Some(Self::Previous),
            [0x01, ..] => Some(Self::Next),
            [0x02, ..] => Some(Self::Play),
            [0x03, ..] => Some(Self::Pause),
            [0x04, volume, ..] => Some(Self::Volume(*volume)),
            _ => None,
        }
    }
}

pub fn encode_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

pub fn encode_playing(playing: bool) -> [u8; 1] {
    [playing as u8]
}

pub fn encode_volume(volume: u8) -> [u8; 1] {
    [volume]
}
