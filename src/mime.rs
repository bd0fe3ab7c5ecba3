//! Magic-byte MIME detection.
//!
//! The cache never trusts file extensions; the MIME policy is applied to
//! the bytes that actually landed on disk. For a comprehensive list of
//! signatures refer to
//! <https://en.wikipedia.org/wiki/List_of_file_signatures>.

use std::io::{self, Read, Seek};

/// MIME type assumed for files no signature matches.
pub(crate) const FALLBACK_MIME: &str = "application/octet-stream";

/// Sniffs the MIME type from the first bytes of `file`.
///
/// The read position is restored to the start afterwards. Returns `None`
/// when no known signature matches.
pub(crate) fn detect_mime<R: Read + Seek>(file: &mut R) -> io::Result<Option<&'static str>> {
    file.rewind()?;

    let mut magic = [0u8; 12];
    let mut len = 0;
    while len < magic.len() {
        let n = file.read(&mut magic[len..])?;
        if n == 0 {
            break;
        }
        len += n;
    }
    file.rewind()?;

    Ok(sniff(&magic[..len]))
}

fn sniff(magic: &[u8]) -> Option<&'static str> {
    match magic {
        [0xff, 0xd8, 0xff, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P'] => Some("image/webp"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E'] => Some("audio/wav"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'A', b'V', b'I', b' '] => Some("video/x-msvideo"),
        [b'B', b'M', ..] => Some("image/bmp"),
        [0x49, 0x49, 0x2a, 0x00, ..] | [0x4d, 0x4d, 0x00, 0x2a, ..] => Some("image/tiff"),
        [b'%', b'P', b'D', b'F', ..] => Some("application/pdf"),
        [0x50, 0x4b, 0x03, 0x04, ..] => Some("application/zip"),
        [0x1f, 0x8b, ..] => Some("application/gzip"),
        [b'I', b'D', b'3', ..] | [0xff, 0xfb, ..] | [0xff, 0xf3, ..] | [0xff, 0xf2, ..] => {
            Some("audio/mpeg")
        }
        [b'O', b'g', b'g', b'S', ..] => Some("application/ogg"),
        [0x1a, 0x45, 0xdf, 0xa3, ..] => Some("video/webm"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some("video/mp4"),
        _ => None,
    }
}
