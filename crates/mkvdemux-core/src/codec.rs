//! Codec identifier helpers.

use crate::{Error, Result};
use bytes::Bytes;

/// Four-character code for codec IDs that have a well-known one.
pub fn fourcc(codec_id: &str) -> Option<[u8; 4]> {
    match codec_id {
        "V_VP8" => Some(*b"VP80"),
        "V_VP9" => Some(*b"VP90"),
        "V_AV1" => Some(*b"av01"),
        "V_MPEG4/ISO/AVC" => Some(*b"avc1"),
        "V_MPEGH/ISO/HEVC" => Some(*b"hvc1"),
        "V_THEORA" => Some(*b"theo"),
        "A_VORBIS" => Some(*b"vorb"),
        "A_OPUS" => Some(*b"Opus"),
        "A_FLAC" => Some(*b"fLaC"),
        "A_AAC" => Some(*b"mp4a"),
        _ => None,
    }
}

/// Convert a Matroska codec ID to a human-readable name.
pub fn codec_name(codec_id: &str) -> String {
    match codec_id {
        // Video codecs
        "V_MPEG4/ISO/AVC" => "AVC".to_string(),
        "V_MPEGH/ISO/HEVC" => "HEVC".to_string(),
        "V_AV1" => "AV1".to_string(),
        "V_VP8" => "VP8".to_string(),
        "V_VP9" => "VP9".to_string(),
        "V_MPEG1" => "MPEG-1".to_string(),
        "V_MPEG2" => "MPEG-2".to_string(),
        "V_MPEG4/ISO/SP" | "V_MPEG4/ISO/ASP" | "V_MPEG4/ISO/AP" => "MPEG-4".to_string(),
        "V_THEORA" => "Theora".to_string(),

        // Audio codecs
        "A_AAC" | "A_AAC/MPEG2/LC" | "A_AAC/MPEG4/LC" | "A_AAC/MPEG4/LC/SBR" => "AAC".to_string(),
        "A_AC3" => "AC-3".to_string(),
        "A_EAC3" => "E-AC-3".to_string(),
        "A_DTS" => "DTS".to_string(),
        "A_FLAC" => "FLAC".to_string(),
        "A_VORBIS" => "Vorbis".to_string(),
        "A_OPUS" => "Opus".to_string(),
        "A_PCM/INT/LIT" | "A_PCM/INT/BIG" => "PCM".to_string(),
        "A_PCM/FLOAT/IEEE" => "PCM Float".to_string(),
        "A_MPEG/L3" => "MP3".to_string(),

        // Subtitle codecs
        "S_TEXT/UTF8" => "SRT".to_string(),
        "S_TEXT/SSA" | "S_TEXT/ASS" => "ASS".to_string(),
        "S_TEXT/WEBVTT" => "WebVTT".to_string(),
        "D_WEBVTT/SUBTITLES" | "D_WEBVTT/CAPTIONS" => "WebVTT".to_string(),

        other => other
            .strip_prefix("V_")
            .or_else(|| other.strip_prefix("A_"))
            .or_else(|| other.strip_prefix("S_"))
            .unwrap_or(other)
            .to_string(),
    }
}

/// Whether the codec stores its setup headers Xiph-laced in CodecPrivate.
pub fn uses_xiph_headers(codec_id: &str) -> bool {
    matches!(codec_id, "A_VORBIS" | "V_THEORA")
}

/// The three setup packets Vorbis and Theora carry in CodecPrivate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XiphHeaders {
    pub identification: Bytes,
    pub comment: Bytes,
    pub setup: Bytes,
}

/// Split a Xiph-laced CodecPrivate blob into its three header packets.
///
/// Layout: packet count minus one (always 2), the Xiph-coded sizes of the first two
/// packets, then the packets back to back; the setup packet takes the rest.
pub fn split_xiph_headers(private: &Bytes) -> Result<XiphHeaders> {
    let bad = |reason: &str| Error::malformed(0, format!("codec private: {reason}"));

    let (&count, mut rest) = private
        .split_first()
        .ok_or_else(|| bad("empty"))?;
    if count != 2 {
        return Err(bad(&format!("expected 3 Xiph-laced headers, found {}", count + 1)));
    }

    let mut sizes = [0usize; 2];
    for size in &mut sizes {
        loop {
            let (&byte, tail) = rest.split_first().ok_or_else(|| bad("truncated lace sizes"))?;
            rest = tail;
            *size += usize::from(byte);
            if byte != 255 {
                break;
            }
        }
    }

    let start = private.len() - rest.len();
    let [id_len, comment_len] = sizes;
    if id_len + comment_len > rest.len() {
        return Err(bad("header sizes exceed codec private"));
    }
    let comment_start = start + id_len;
    let setup_start = comment_start + comment_len;
    Ok(XiphHeaders {
        identification: private.slice(start..comment_start),
        comment: private.slice(comment_start..setup_start),
        setup: private.slice(setup_start..),
    })
}
