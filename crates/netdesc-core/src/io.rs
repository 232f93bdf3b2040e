//! モデルファイルの読み込み（gzip 自動判別）
//!
//! 拡張子ではなく先頭2バイトのマジックナンバーで判別する。
//! `.gz` 拡張子の非圧縮ファイルや、拡張子なしの圧縮ファイルもそのまま扱える。

use crate::error::{DescError, DescResult};
use flate2::read::MultiGzDecoder;
use std::fs;
use std::io::Read;
use std::path::Path;

/// gzip のマジックナンバー
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 入力の圧縮形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Plain,
    Gzip,
}

/// 先頭バイトから圧縮形式を判別する
pub fn sniff_compression(bytes: &[u8]) -> Compression {
    if bytes.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else {
        Compression::Plain
    }
}

/// 必要なら展開し、モデルテキストを返す
pub fn decode_maybe_gzipped(bytes: &[u8]) -> DescResult<String> {
    let raw = match sniff_compression(bytes) {
        Compression::Plain => bytes.to_vec(),
        Compression::Gzip => {
            log::debug!("gzip-compressed model detected ({} bytes)", bytes.len());
            let mut out = Vec::new();
            MultiGzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(DescError::Compression)?;
            out
        }
    };
    String::from_utf8(raw).map_err(|e| DescError::Format {
        position: 0,
        detail: format!("model text is not valid UTF-8: {e}"),
    })
}

/// ファイルを読み込み、必要なら展開してモデルテキストを返す
pub fn read_model_text<P: AsRef<Path>>(path: P) -> DescResult<String> {
    let bytes = fs::read(path.as_ref())?;
    decode_maybe_gzipped(&bytes)
}
