//! モデル記述子の読み込み・検証で発生するエラー型

use crate::blocks::BlockKind;

/// エラーの分類
///
/// 呼び出し側（エンジン起動処理）がリトライや別ファイルへの切り替えを
/// 判断するための大分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// トークン列が不正・途中で終端・型違い
    Format,
    /// 未対応のフォーマットバージョン
    Version,
    /// 記述子間の整合性違反
    Validation,
    /// ファイルが存在しない・読めない
    Io,
    /// 圧縮ストリームの破損
    Compression,
}

/// モデル記述子のエラー
#[derive(thiserror::Error, Debug)]
pub enum DescError {
    /// トークン列の書式エラー
    ///
    /// `position` は 0 始まりのトークン番号。
    #[error("format error at token {position}: {detail}")]
    Format { position: usize, detail: String },

    /// 未対応のフォーマットバージョン
    #[error("unsupported model version {version} (supported: {supported})")]
    UnsupportedVersion { version: i64, supported: String },

    /// 単一記述子内の不変条件違反
    #[error("{layer}: {detail}")]
    Validation { layer: String, detail: String },

    /// トランク内ブロックのチャンネル数不一致
    #[error("trunk block {index} ({kind}): {detail}")]
    BlockMismatch {
        index: usize,
        kind: BlockKind,
        detail: String,
    },

    /// ファイル I/O エラー
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// gzip 展開エラー
    #[error("failed to decompress model: {0}")]
    Compression(#[source] std::io::Error),
}

impl DescError {
    /// エラーの大分類を返す
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } => ErrorKind::Format,
            Self::UnsupportedVersion { .. } => ErrorKind::Version,
            Self::Validation { .. } | Self::BlockMismatch { .. } => ErrorKind::Validation,
            Self::Io(_) => ErrorKind::Io,
            Self::Compression(_) => ErrorKind::Compression,
        }
    }

    pub(crate) fn validation(layer: &str, detail: impl Into<String>) -> Self {
        Self::Validation {
            layer: layer.to_string(),
            detail: detail.into(),
        }
    }
}

/// モデル記述子操作の Result 型
pub type DescResult<T> = Result<T, DescError>;
