//! Payload sniffing by container magic

use crate::{SOUNDBANK_MAGIC, WWISE_PACK_MAGIC};

/// Container type of a raw bank payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Compiled sound bank (`BKHD`), may embed media
    SoundBank,
    /// Sample pack (`r3d2`)
    WwisePack,
    Unknown,
}

impl PayloadKind {
    /// Identify a payload from its first four bytes
    pub fn sniff(data: &[u8]) -> Self {
        if data.len() < 4 {
            return PayloadKind::Unknown;
        }
        match [data[0], data[1], data[2], data[3]] {
            SOUNDBANK_MAGIC => PayloadKind::SoundBank,
            WWISE_PACK_MAGIC => PayloadKind::WwisePack,
            _ => PayloadKind::Unknown,
        }
    }

    /// Short description used in error messages
    pub fn describe(self) -> &'static str {
        match self {
            PayloadKind::SoundBank => "sound bank",
            PayloadKind::WwisePack => "wwise pack",
            PayloadKind::Unknown => "unknown payload",
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff() {
        assert_eq!(PayloadKind::sniff(b"BKHD\x8c\x00\x00\x00"), PayloadKind::SoundBank);
        assert_eq!(PayloadKind::sniff(b"r3d2\x01\x00\x00\x00"), PayloadKind::WwisePack);
        assert_eq!(PayloadKind::sniff(b"RIFF"), PayloadKind::Unknown);

        // Too short
        assert_eq!(PayloadKind::sniff(b"BKH"), PayloadKind::Unknown);
        assert_eq!(PayloadKind::sniff(&[]), PayloadKind::Unknown);
    }

    #[test]
    fn test_display() {
        assert_eq!(PayloadKind::WwisePack.to_string(), "wwise pack");
        assert_eq!(PayloadKind::SoundBank.describe(), "sound bank");
    }
}
