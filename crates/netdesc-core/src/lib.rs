//! 囲碁エンジン用ニューラルネットワーク記述子
//!
//! 学習側が出力するテキスト形式のモデルファイルを読み込み、検証済みの
//! 不変な記述子ツリーを構築する。推論バックエンドはこのツリーを参照して
//! バッファサイズやカーネル形状を決める。
//!
//! ```no_run
//! use netdesc_core::{ModelDesc, Rules};
//!
//! let model = ModelDesc::load_from_file_maybe_gzipped("model.txt.gz")?;
//! let scratch = model.max_conv_channels(3, 3);
//! let (rules, supported) = model.supported_rules(&Rules::japanese());
//! # Ok::<(), netdesc_core::DescError>(())
//! ```

pub mod blocks;
pub mod error;
pub mod heads;
pub mod io;
pub mod layers;
pub mod model;
pub mod reader;
pub mod rules;
pub mod trunk;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

pub use blocks::{
    BlockDesc, BlockKind, DilatedResidualBlockDesc, GlobalPoolingResidualBlockDesc, ResidualBlockDesc,
};
pub use error::{DescError, DescResult, ErrorKind};
pub use heads::{PolicyHeadDesc, ValueHeadDesc};
pub use layers::{ActivationLayerDesc, BatchNormLayerDesc, ConvLayerDesc, MatBiasLayerDesc, MatMulLayerDesc};
pub use model::{ModelDesc, ModelSummary};
pub use rules::{KoRule, RuleCapabilities, Rules, ScoringRule, TaxRule};
pub use trunk::TrunkDesc;
pub use version::{layout_for, FormatLayout, LATEST_VERSION};
