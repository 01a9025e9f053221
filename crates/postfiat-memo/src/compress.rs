//! The `COMPRESSED__` memo layer: Brotli bytes, Base64-url-safe encoded.

use crate::{MemoError, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurpose, GeneralPurposeConfig};
use std::io::{Read, Write};

pub const COMPRESSED_PREFIX: &str = "COMPRESSED__";

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

// Decoding tolerates missing padding; senders in the wild trim it.
const B64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);
const B64_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn is_compressed(memo_data: &str) -> bool {
    memo_data.starts_with(COMPRESSED_PREFIX)
}

/// Compress a payload and wrap it with the `COMPRESSED__` prefix.
pub fn compress_memo(payload: &str) -> String {
    let mut compressed = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(
            &mut compressed,
            BROTLI_BUFFER,
            BROTLI_QUALITY,
            BROTLI_WINDOW,
        );
        // Writing to a Vec cannot fail.
        let _ = writer.write_all(payload.as_bytes());
        let _ = writer.flush();
    }
    format!("{COMPRESSED_PREFIX}{}", B64_URL.encode(compressed))
}

/// Reverse [`compress_memo`]. Accepts standard-alphabet Base64 as a fallback.
pub fn decompress_memo(memo_data: &str) -> Result<String> {
    let body = memo_data
        .strip_prefix(COMPRESSED_PREFIX)
        .ok_or_else(|| MemoError::DecompressFailed("missing COMPRESSED__ prefix".to_string()))?;

    let bytes = B64_URL
        .decode(body)
        .or_else(|_| B64_STANDARD.decode(body))
        .map_err(|err| MemoError::DecompressFailed(format!("base64: {err}")))?;

    let mut decompressed = Vec::new();
    brotli::Decompressor::new(bytes.as_slice(), BROTLI_BUFFER)
        .read_to_end(&mut decompressed)
        .map_err(|err| MemoError::DecompressFailed(format!("brotli: {err}")))?;

    String::from_utf8(decompressed)
        .map_err(|err| MemoError::DecompressFailed(format!("utf-8: {err}")))
}
