//! EBML and Matroska element IDs.

/// Element ID, stored with its length marker bits intact (e.g. `0x1A45DFA3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl ElementId {
    // EBML header
    pub const EBML: Self = Self(0x1A45_DFA3);
    pub const EBML_VERSION: Self = Self(0x4286);
    pub const EBML_READ_VERSION: Self = Self(0x42F7);
    pub const EBML_MAX_ID_LENGTH: Self = Self(0x42F2);
    pub const EBML_MAX_SIZE_LENGTH: Self = Self(0x42F3);
    pub const DOC_TYPE: Self = Self(0x4282);
    pub const DOC_TYPE_VERSION: Self = Self(0x4287);
    pub const DOC_TYPE_READ_VERSION: Self = Self(0x4285);

    // Global
    pub const VOID: Self = Self(0xEC);
    pub const CRC32: Self = Self(0xBF);

    // Segment and top-level children
    pub const SEGMENT: Self = Self(0x1853_8067);
    pub const SEEK_HEAD: Self = Self(0x114D_9B74);
    pub const INFO: Self = Self(0x1549_A966);
    pub const TRACKS: Self = Self(0x1654_AE6B);
    pub const CLUSTER: Self = Self(0x1F43_B675);
    pub const CUES: Self = Self(0x1C53_BB6B);
    pub const CHAPTERS: Self = Self(0x1043_A770);
    pub const TAGS: Self = Self(0x1254_C367);
    pub const ATTACHMENTS: Self = Self(0x1941_A469);

    // Info
    pub const TIMECODE_SCALE: Self = Self(0x2A_D7B1);
    pub const DURATION: Self = Self(0x4489);
    pub const DATE_UTC: Self = Self(0x4461);
    pub const TITLE: Self = Self(0x7BA9);
    pub const MUXING_APP: Self = Self(0x4D80);
    pub const WRITING_APP: Self = Self(0x5741);

    // Tracks
    pub const TRACK_ENTRY: Self = Self(0xAE);
    pub const TRACK_NUMBER: Self = Self(0xD7);
    pub const TRACK_UID: Self = Self(0x73C5);
    pub const TRACK_TYPE: Self = Self(0x83);
    pub const FLAG_ENABLED: Self = Self(0xB9);
    pub const FLAG_DEFAULT: Self = Self(0x88);
    pub const FLAG_FORCED: Self = Self(0x55AA);
    pub const FLAG_LACING: Self = Self(0x9C);
    pub const DEFAULT_DURATION: Self = Self(0x23_E383);
    pub const NAME: Self = Self(0x536E);
    pub const LANGUAGE: Self = Self(0x22_B59C);
    pub const CODEC_ID: Self = Self(0x86);
    pub const CODEC_PRIVATE: Self = Self(0x63A2);
    pub const CODEC_NAME: Self = Self(0x25_8688);
    pub const CODEC_DELAY: Self = Self(0x56AA);
    pub const SEEK_PRE_ROLL: Self = Self(0x56BB);
    pub const VIDEO: Self = Self(0xE0);
    pub const AUDIO: Self = Self(0xE1);

    // Video
    pub const PIXEL_WIDTH: Self = Self(0xB0);
    pub const PIXEL_HEIGHT: Self = Self(0xBA);
    pub const DISPLAY_WIDTH: Self = Self(0x54B0);
    pub const DISPLAY_HEIGHT: Self = Self(0x54BA);
    pub const FRAME_RATE: Self = Self(0x23_83E3);

    // Audio
    pub const SAMPLING_FREQUENCY: Self = Self(0xB5);
    pub const OUTPUT_SAMPLING_FREQUENCY: Self = Self(0x78B5);
    pub const CHANNELS: Self = Self(0x9F);
    pub const BIT_DEPTH: Self = Self(0x6264);

    // Cluster
    pub const TIMECODE: Self = Self(0xE7);
    pub const POSITION: Self = Self(0xA7);
    pub const PREV_SIZE: Self = Self(0xAB);
    pub const SIMPLE_BLOCK: Self = Self(0xA3);
    pub const BLOCK_GROUP: Self = Self(0xA0);
    pub const BLOCK: Self = Self(0xA1);
    pub const BLOCK_DURATION: Self = Self(0x9B);
    pub const REFERENCE_BLOCK: Self = Self(0xFB);
    pub const DISCARD_PADDING: Self = Self(0x75A2);

    /// Encoded length of this ID in bytes.
    pub fn len(&self) -> usize {
        match self.0 {
            0..=0xFF => 1,
            0x100..=0xFFFF => 2,
            0x1_0000..=0xFF_FFFF => 3,
            _ => 4,
        }
    }

    /// Whether this ID is a direct child of the Segment.
    ///
    /// Encountering one of these inside an unknown-size cluster ends that cluster.
    pub fn is_top_level(&self) -> bool {
        matches!(
            *self,
            Self::SEEK_HEAD
                | Self::INFO
                | Self::TRACKS
                | Self::CLUSTER
                | Self::CUES
                | Self::CHAPTERS
                | Self::TAGS
                | Self::ATTACHMENTS
                | Self::SEGMENT
                | Self::EBML
        )
    }

    /// Human-readable element name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::EBML => "EBML",
            Self::SEGMENT => "Segment",
            Self::SEEK_HEAD => "SeekHead",
            Self::INFO => "Info",
            Self::TRACKS => "Tracks",
            Self::CLUSTER => "Cluster",
            Self::CUES => "Cues",
            Self::CHAPTERS => "Chapters",
            Self::TAGS => "Tags",
            Self::ATTACHMENTS => "Attachments",
            Self::VOID => "Void",
            Self::CRC32 => "CRC-32",
            Self::TRACK_ENTRY => "TrackEntry",
            Self::TIMECODE => "Timecode",
            Self::SIMPLE_BLOCK => "SimpleBlock",
            Self::BLOCK_GROUP => "BlockGroup",
            Self::BLOCK => "Block",
            _ => "Unknown",
        }
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:X})", self.name(), self.0)
    }
}
