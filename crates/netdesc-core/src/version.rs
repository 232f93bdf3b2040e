//! フォーマットバージョンごとのレイアウト定義
//!
//! バージョンによって変わるフィールドの有無・形状はすべてこの表に集約する。
//! 新しいバージョンの追加は `LAYOUTS` への1行追加で済むようにし、
//! パース処理側ではバージョン番号を直接比較しない。

use crate::error::{DescError, DescResult};
use crate::rules::{KoRule, RuleCapabilities, ScoringRule, TaxRule};

/// 1つのフォーマットバージョンのレイアウト
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatLayout {
    /// バージョン番号
    pub version: i32,
    /// 盤サイズ（xSizePreV3 / ySizePreV3）をヘッダに持つか
    pub has_board_size: bool,
    /// 盤面入力の特徴量チャンネル数
    pub num_spatial_features: usize,
    /// 盤全体入力の特徴量チャンネル数（0 なら initialMatMul なし）
    pub num_global_features: usize,
    /// global pooling が出力する統計量の数（mean, max [, board-size scaled mean]）
    pub gpool_stats: usize,
    /// GlobalPooling ブロックが gpoolToBiasMul を持つか
    pub gpool_block_has_bias_mul: bool,
    /// 勝敗出力のチャンネル数
    pub num_value_channels: usize,
    /// スコア出力のチャンネル数（0 なら sv3Mul / sv3Bias なし）
    pub num_score_value_channels: usize,
    /// 入力として表現できるルール
    pub rules: RuleCapabilities,
}

impl FormatLayout {
    pub fn has_global_inputs(&self) -> bool {
        self.num_global_features > 0
    }

    pub fn has_score_value(&self) -> bool {
        self.num_score_value_channels > 0
    }
}

/// 初期バージョンはエリア計算・状況的超コウでのみ学習されている
const AREA_SITUATIONAL_ONLY: RuleCapabilities = RuleCapabilities {
    ko_rules: &[KoRule::Situational],
    scoring_rules: &[ScoringRule::Area],
    tax_rules: &[TaxRule::None],
    multi_stone_suicide: &[false, true],
    button: &[false],
};

const RULES_INPUTS: RuleCapabilities = RuleCapabilities {
    ko_rules: &[KoRule::Simple, KoRule::Positional, KoRule::Situational],
    scoring_rules: &[ScoringRule::Area, ScoringRule::Territory],
    tax_rules: &[TaxRule::None, TaxRule::Seki, TaxRule::All],
    multi_stone_suicide: &[false, true],
    button: &[false],
};

/// サポートしているバージョンの一覧
pub const LAYOUTS: &[FormatLayout] = &[
    FormatLayout {
        version: 1,
        has_board_size: true,
        num_spatial_features: 19,
        num_global_features: 0,
        gpool_stats: 2,
        gpool_block_has_bias_mul: false,
        num_value_channels: 1,
        num_score_value_channels: 0,
        rules: AREA_SITUATIONAL_ONLY,
    },
    FormatLayout {
        version: 2,
        has_board_size: true,
        num_spatial_features: 17,
        num_global_features: 0,
        gpool_stats: 2,
        gpool_block_has_bias_mul: true,
        num_value_channels: 1,
        num_score_value_channels: 0,
        rules: AREA_SITUATIONAL_ONLY,
    },
    FormatLayout {
        version: 3,
        has_board_size: false,
        num_spatial_features: 22,
        num_global_features: 14,
        gpool_stats: 3,
        gpool_block_has_bias_mul: true,
        num_value_channels: 3,
        num_score_value_channels: 1,
        rules: RULES_INPUTS,
    },
    FormatLayout {
        version: 4,
        has_board_size: false,
        num_spatial_features: 22,
        num_global_features: 14,
        gpool_stats: 3,
        gpool_block_has_bias_mul: true,
        num_value_channels: 3,
        num_score_value_channels: 2,
        rules: RULES_INPUTS,
    },
    FormatLayout {
        version: 5,
        has_board_size: false,
        num_spatial_features: 13,
        num_global_features: 12,
        gpool_stats: 3,
        gpool_block_has_bias_mul: true,
        num_value_channels: 3,
        num_score_value_channels: 2,
        rules: RULES_INPUTS,
    },
];

/// サポートしている最新バージョン
pub const LATEST_VERSION: i32 = 5;

/// バージョン番号からレイアウトを引く
pub fn layout_for(version: i64) -> DescResult<&'static FormatLayout> {
    LAYOUTS
        .iter()
        .find(|l| i64::from(l.version) == version)
        .ok_or_else(|| DescError::UnsupportedVersion {
            version,
            supported: supported_versions(),
        })
}

fn supported_versions() -> String {
    LAYOUTS
        .iter()
        .map(|l| l.version.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
