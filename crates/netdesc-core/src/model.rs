//! モデル記述子（ルート）
//!
//! # 階層構造
//!
//! ```text
//! ModelDesc
//! ├── TrunkDesc
//! │   ├── initialConv / initialMatMul
//! │   ├── Vec<BlockDesc>   // Ordinary / Dilated / GlobalPooling
//! │   └── trunkTipBN / trunkTipActivation
//! ├── PolicyHeadDesc
//! └── ValueHeadDesc
//! ```
//!
//! 構築は1回のパースで完結し、以後は不変。バックエンドは `&ModelDesc` を
//! 複数スレッドから同時に参照してよい（内部可変性を持たない）。

use crate::blocks::BlockKind;
use crate::error::{DescError, DescResult};
use crate::heads::{PolicyHeadDesc, ValueHeadDesc};
use crate::io::{decode_maybe_gzipped, read_model_text};
use crate::layers::{check_eq, ConvLayerDesc};
use crate::reader::TokenReader;
use crate::rules::Rules;
use crate::trunk::TrunkDesc;
use crate::version::{layout_for, FormatLayout};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, PartialEq)]
pub struct ModelDesc {
    pub name: String,
    pub version: i32,
    /// バージョン3未満のみ。それ以外は 0
    pub x_size_pre_v3: usize,
    pub y_size_pre_v3: usize,
    pub num_input_channels: usize,
    /// 盤全体入力を持たないバージョンでは 0
    pub num_input_global_channels: usize,
    pub num_value_channels: usize,
    pub num_score_value_channels: usize,
    pub num_ownership_channels: usize,

    pub trunk: TrunkDesc,
    pub policy_head: PolicyHeadDesc,
    pub value_head: ValueHeadDesc,

    layout: &'static FormatLayout,
}

impl ModelDesc {
    /// モデルテキストをパースする
    ///
    /// バージョン → 名前 → ヘッダ → トランク → 方策ヘッド → 価値ヘッドの順に読み、
    /// 末尾に余分なトークンがあればエラーにする。
    pub fn parse(text: &str) -> DescResult<Self> {
        let mut r = TokenReader::new(text);
        let model = Self::read(&mut r)?;
        r.expect_end()?;
        Ok(model)
    }

    pub fn read(r: &mut TokenReader<'_>) -> DescResult<Self> {
        // 未対応バージョンは他のフィールドを読む前に弾く
        let layout = layout_for(r.read_int("model version")?)?;
        let name = r.next_token("model name")?.to_string();

        let (x_size_pre_v3, y_size_pre_v3) = if layout.has_board_size {
            (r.read_positive(&name, "xSizePreV3")?, r.read_positive(&name, "ySizePreV3")?)
        } else {
            (0, 0)
        };
        let num_input_channels = r.read_positive(&name, "numInputChannels")?;
        check_eq(&name, "numInputChannels", num_input_channels, layout.num_spatial_features)?;
        let num_input_global_channels = if layout.has_global_inputs() {
            let n = r.read_positive(&name, "numInputGlobalChannels")?;
            check_eq(&name, "numInputGlobalChannels", n, layout.num_global_features)?;
            n
        } else {
            0
        };

        let trunk = TrunkDesc::read(r, layout)?;
        check_eq(&name, "trunk.initialConv.inChannels", trunk.initial_conv.in_channels, num_input_channels)?;
        if trunk.initial_mat_mul.is_present() {
            check_eq(
                &name,
                "trunk.initialMatMul.inChannels",
                trunk.initial_mat_mul.in_channels,
                num_input_global_channels,
            )?;
        }
        let policy_head = PolicyHeadDesc::read(r, layout, trunk.trunk_num_channels)?;
        let value_head = ValueHeadDesc::read(r, layout, trunk.trunk_num_channels)?;

        Ok(Self {
            name,
            version: layout.version,
            x_size_pre_v3,
            y_size_pre_v3,
            num_input_channels,
            num_input_global_channels,
            num_value_channels: value_head.v3_mul.out_channels,
            num_score_value_channels: value_head.sv3_mul.out_channels,
            num_ownership_channels: value_head.v_ownership_conv.out_channels,
            trunk,
            policy_head,
            value_head,
            layout,
        })
    }

    /// バイト列から構築する（gzip なら展開してからパース）
    pub fn from_bytes_maybe_gzipped(bytes: &[u8]) -> DescResult<Self> {
        Self::parse(&decode_maybe_gzipped(bytes)?)
    }

    /// gzip 圧縮されているかもしれないファイルから読み込む
    ///
    /// 失敗時は何も返さない（部分的に構築されたモデルは存在しない）。
    pub fn load_from_file_maybe_gzipped<P: AsRef<Path>>(path: P) -> DescResult<Self> {
        let path = path.as_ref();
        let text = read_model_text(path)?;
        let model = Self::parse(&text).map_err(|e| {
            log::debug!("failed to parse {}: {e}", path.display());
            e
        })?;
        log::info!(
            "loaded model {} (version {}, {} blocks, {} trunk channels) from {}",
            model.name,
            model.version,
            model.trunk.blocks.len(),
            model.trunk.trunk_num_channels,
            path.display()
        );
        Ok(model)
    }

    /// このモデルのフォーマットレイアウト
    pub fn layout(&self) -> &'static FormatLayout {
        self.layout
    }

    /// トランク → 方策ヘッド → 価値ヘッドの順に全畳み込み層を列挙する
    ///
    /// 呼び出すたびに先頭から列挙し直す。
    pub fn conv_layers(&self) -> impl Iterator<Item = &ConvLayerDesc> + '_ {
        self.trunk
            .conv_layers()
            .chain(self.policy_head.conv_layers())
            .chain(self.value_head.conv_layers())
    }

    /// 指定カーネルサイズの畳み込み層の最大チャンネル数（入出力の大きい方）
    ///
    /// バックエンドの作業バッファ確保に使う。該当層がなければ 0。
    pub fn max_conv_channels(&self, conv_x_size: usize, conv_y_size: usize) -> usize {
        self.conv_layers()
            .filter(|c| c.conv_x_size == conv_x_size && c.conv_y_size == conv_y_size)
            .map(|c| c.in_channels.max(c.out_channels))
            .max()
            .unwrap_or(0)
    }

    /// このモデルで表現できる、`desired` に最も近いルールを返す
    ///
    /// 戻り値の bool は `desired` がそのまま表現可能なら true。
    pub fn supported_rules(&self, desired: &Rules) -> (Rules, bool) {
        let (rules, supported) = self.layout.rules.nearest(desired);
        if !supported {
            log::debug!("model version {} cannot represent [{desired}], using [{rules}]", self.version);
        }
        (rules, supported)
    }

    pub fn summary(&self) -> ModelSummary {
        let count = |kind| self.trunk.blocks_of_kind(kind).count();
        ModelSummary {
            name: self.name.clone(),
            version: self.version,
            num_blocks: self.trunk.blocks.len(),
            num_ordinary_blocks: count(BlockKind::Ordinary),
            num_dilated_blocks: count(BlockKind::Dilated),
            num_gpool_blocks: count(BlockKind::GlobalPooling),
            trunk_num_channels: self.trunk.trunk_num_channels,
            mid_num_channels: self.trunk.mid_num_channels,
            regular_num_channels: self.trunk.regular_num_channels,
            dilated_num_channels: self.trunk.dilated_num_channels,
            gpool_num_channels: self.trunk.gpool_num_channels,
            num_input_channels: self.num_input_channels,
            num_input_global_channels: self.num_input_global_channels,
            num_value_channels: self.num_value_channels,
            num_score_value_channels: self.num_score_value_channels,
            num_ownership_channels: self.num_ownership_channels,
            num_conv_layers: self.conv_layers().count(),
            max_conv_channels_3x3: self.max_conv_channels(3, 3),
            max_conv_channels_1x1: self.max_conv_channels(1, 1),
        }
    }
}

/// モデルの概要（表示・ログ用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub version: i32,
    pub num_blocks: usize,
    pub num_ordinary_blocks: usize,
    pub num_dilated_blocks: usize,
    pub num_gpool_blocks: usize,
    pub trunk_num_channels: usize,
    pub mid_num_channels: usize,
    pub regular_num_channels: usize,
    pub dilated_num_channels: usize,
    pub gpool_num_channels: usize,
    pub num_input_channels: usize,
    pub num_input_global_channels: usize,
    pub num_value_channels: usize,
    pub num_score_value_channels: usize,
    pub num_ownership_channels: usize,
    pub num_conv_layers: usize,
    pub max_conv_channels_3x3: usize,
    pub max_conv_channels_1x1: usize,
}

impl std::str::FromStr for ModelDesc {
    type Err = DescError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
