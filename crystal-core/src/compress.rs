use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};

/// Compression codecs supported at encode time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Zstd,
    Xz,
    None,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Zstd => "zstd",
            Codec::Xz => "xz",
            Codec::None => "none",
        }
    }
}

/// Self-describing codec record stored in the manifest. The codec is kept as
/// a plain string so a reader built against a newer format can fail with
/// `UnsupportedCodec` instead of a parse error.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CodecInfo {
    pub codec: String,
    pub level: i32,
    pub original_size: u64,
    pub compressed_size: u64,
}

/// Compress `data`, returning the output plus the descriptor needed to
/// reverse it.
pub fn compress(data: &[u8], codec: Codec, level: i32) -> Result<(Vec<u8>, CodecInfo)> {
    let out = match codec {
        Codec::Zstd => zstd::stream::encode_all(data, level)
            .map_err(ArchiveError::io("zstd compress"))?,
        Codec::Xz => {
            // lzma-rs has a single preset; the level is recorded for the
            // descriptor but does not change the output.
            let mut out = Vec::new();
            lzma_rs::xz_compress(&mut &data[..], &mut out)
                .map_err(ArchiveError::io("xz compress"))?;
            out
        }
        Codec::None => data.to_vec(),
    };
    let info = CodecInfo {
        codec: codec.as_str().to_string(),
        level,
        original_size: data.len() as u64,
        compressed_size: out.len() as u64,
    };
    Ok((out, info))
}

/// Reverse `compress` using the recorded descriptor.
pub fn decompress(data: &[u8], info: &CodecInfo) -> Result<Vec<u8>> {
    match info.codec.as_str() {
        "zstd" => zstd::stream::decode_all(data).map_err(|e| ArchiveError::UncorrectableArchive {
            stage: "decompress",
            detail: format!("zstd: {e}"),
        }),
        "xz" => {
            let mut out = Vec::new();
            lzma_rs::xz_decompress(&mut &data[..], &mut out).map_err(|e| {
                ArchiveError::UncorrectableArchive { stage: "decompress", detail: format!("xz: {e}") }
            })?;
            Ok(out)
        }
        "none" => Ok(data.to_vec()),
        other => Err(ArchiveError::UnsupportedCodec(other.to_string())),
    }
}
