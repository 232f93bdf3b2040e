//! 残差ブロックの記述子
//!
//! ```text
//! Ordinary      : preBN → preAct → regularConv → midBN → midAct → finalConv
//! Dilated       : preBN → preAct → regularConv ┐
//!                                  dilatedConv ┴→ midBN → midAct → finalConv
//! GlobalPooling : preBN → preAct → regularConv ──────────────────────────────┐
//!                                  gpoolConv → gpoolBN → gpoolAct → pool     │
//!                                                      → gpoolToBiasMul ─(+)─┴→ midBN → midAct → finalConv
//! ```
//!
//! GlobalPooling ブロックの形状はフォーマットバージョンに依存する（`version::FormatLayout`）。

use crate::error::{DescError, DescResult};
use crate::layers::{check_eq, ActivationLayerDesc, BatchNormLayerDesc, ConvLayerDesc, MatMulLayerDesc};
use crate::reader::TokenReader;
use crate::version::FormatLayout;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// 1ブロックが持つ畳み込み層の列挙（最大3層）
pub type BlockConvLayers<'a> = smallvec::IntoIter<[&'a ConvLayerDesc; 3]>;

/// ブロックの種類
///
/// ファイル上では各ブロックの先頭に整数タグとして現れる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockKind {
    Ordinary,
    Dilated,
    GlobalPooling,
}

impl BlockKind {
    pub const ALL: [Self; 3] = [Self::Ordinary, Self::Dilated, Self::GlobalPooling];

    /// ファイル上のタグ値
    pub fn tag(&self) -> i64 {
        match self {
            Self::Ordinary => 0,
            Self::Dilated => 1,
            Self::GlobalPooling => 2,
        }
    }

    pub fn from_tag(tag: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Dilated => "dilated",
            Self::GlobalPooling => "gpool",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通常の残差ブロック
#[derive(Debug, Default, PartialEq)]
pub struct ResidualBlockDesc {
    pub name: String,
    pub pre_bn: BatchNormLayerDesc,
    pub pre_activation: ActivationLayerDesc,
    pub regular_conv: ConvLayerDesc,
    pub mid_bn: BatchNormLayerDesc,
    pub mid_activation: ActivationLayerDesc,
    pub final_conv: ConvLayerDesc,
}

impl ResidualBlockDesc {
    pub fn read(r: &mut TokenReader<'_>) -> DescResult<Self> {
        let name = r.next_token("residual block name")?.to_string();
        let block = Self {
            pre_bn: BatchNormLayerDesc::read(r)?,
            pre_activation: ActivationLayerDesc::read(r)?,
            regular_conv: ConvLayerDesc::read(r)?,
            mid_bn: BatchNormLayerDesc::read(r)?,
            mid_activation: ActivationLayerDesc::read(r)?,
            final_conv: ConvLayerDesc::read(r)?,
            name,
        };
        block.validate()?;
        Ok(block)
    }

    fn validate(&self) -> DescResult<()> {
        let n = &self.name;
        check_eq(n, "regularConv.inChannels", self.regular_conv.in_channels, self.pre_bn.num_channels)?;
        check_eq(n, "midBN.numChannels", self.mid_bn.num_channels, self.regular_conv.out_channels)?;
        check_eq(n, "finalConv.inChannels", self.final_conv.in_channels, self.mid_bn.num_channels)?;
        check_eq(n, "finalConv.outChannels", self.final_conv.out_channels, self.pre_bn.num_channels)
    }

    pub fn conv_layers(&self) -> BlockConvLayers<'_> {
        let convs: SmallVec<[&ConvLayerDesc; 3]> = smallvec![&self.regular_conv, &self.final_conv];
        convs.into_iter()
    }
}

/// dilated 畳み込み経路を持つ残差ブロック
#[derive(Debug, Default, PartialEq)]
pub struct DilatedResidualBlockDesc {
    pub name: String,
    pub pre_bn: BatchNormLayerDesc,
    pub pre_activation: ActivationLayerDesc,
    pub regular_conv: ConvLayerDesc,
    pub dilated_conv: ConvLayerDesc,
    pub mid_bn: BatchNormLayerDesc,
    pub mid_activation: ActivationLayerDesc,
    pub final_conv: ConvLayerDesc,
}

impl DilatedResidualBlockDesc {
    pub fn read(r: &mut TokenReader<'_>) -> DescResult<Self> {
        let name = r.next_token("dilated block name")?.to_string();
        let block = Self {
            pre_bn: BatchNormLayerDesc::read(r)?,
            pre_activation: ActivationLayerDesc::read(r)?,
            regular_conv: ConvLayerDesc::read(r)?,
            dilated_conv: ConvLayerDesc::read(r)?,
            mid_bn: BatchNormLayerDesc::read(r)?,
            mid_activation: ActivationLayerDesc::read(r)?,
            final_conv: ConvLayerDesc::read(r)?,
            name,
        };
        block.validate()?;
        Ok(block)
    }

    fn validate(&self) -> DescResult<()> {
        let n = &self.name;
        let trunk = self.pre_bn.num_channels;
        check_eq(n, "regularConv.inChannels", self.regular_conv.in_channels, trunk)?;
        check_eq(n, "dilatedConv.inChannels", self.dilated_conv.in_channels, trunk)?;
        // regular と dilated の出力は連結されて midBN に入る
        check_eq(
            n,
            "midBN.numChannels",
            self.mid_bn.num_channels,
            self.regular_conv.out_channels + self.dilated_conv.out_channels,
        )?;
        check_eq(n, "finalConv.inChannels", self.final_conv.in_channels, self.mid_bn.num_channels)?;
        check_eq(n, "finalConv.outChannels", self.final_conv.out_channels, trunk)
    }

    pub fn conv_layers(&self) -> BlockConvLayers<'_> {
        let convs: SmallVec<[&ConvLayerDesc; 3]> =
            smallvec![&self.regular_conv, &self.dilated_conv, &self.final_conv];
        convs.into_iter()
    }
}

/// global pooling 経路を持つ残差ブロック
#[derive(Debug, Default, PartialEq)]
pub struct GlobalPoolingResidualBlockDesc {
    pub name: String,
    /// パース時のフォーマットバージョン
    pub version: i32,
    pub pre_bn: BatchNormLayerDesc,
    pub pre_activation: ActivationLayerDesc,
    pub regular_conv: ConvLayerDesc,
    pub gpool_conv: ConvLayerDesc,
    pub gpool_bn: BatchNormLayerDesc,
    pub gpool_activation: ActivationLayerDesc,
    /// `gpool_block_has_bias_mul == false` のバージョンでは空の既定値
    pub gpool_to_bias_mul: MatMulLayerDesc,
    pub mid_bn: BatchNormLayerDesc,
    pub mid_activation: ActivationLayerDesc,
    pub final_conv: ConvLayerDesc,
}

impl GlobalPoolingResidualBlockDesc {
    pub fn read(r: &mut TokenReader<'_>, layout: &FormatLayout) -> DescResult<Self> {
        let name = r.next_token("gpool block name")?.to_string();
        let pre_bn = BatchNormLayerDesc::read(r)?;
        let pre_activation = ActivationLayerDesc::read(r)?;
        let regular_conv = ConvLayerDesc::read(r)?;
        let gpool_conv = ConvLayerDesc::read(r)?;
        let gpool_bn = BatchNormLayerDesc::read(r)?;
        let gpool_activation = ActivationLayerDesc::read(r)?;
        let gpool_to_bias_mul = if layout.gpool_block_has_bias_mul {
            MatMulLayerDesc::read(r)?
        } else {
            MatMulLayerDesc::default()
        };
        let block = Self {
            name,
            version: layout.version,
            pre_bn,
            pre_activation,
            regular_conv,
            gpool_conv,
            gpool_bn,
            gpool_activation,
            gpool_to_bias_mul,
            mid_bn: BatchNormLayerDesc::read(r)?,
            mid_activation: ActivationLayerDesc::read(r)?,
            final_conv: ConvLayerDesc::read(r)?,
        };
        block.validate(layout)?;
        Ok(block)
    }

    fn validate(&self, layout: &FormatLayout) -> DescResult<()> {
        let n = &self.name;
        let trunk = self.pre_bn.num_channels;
        check_eq(n, "regularConv.inChannels", self.regular_conv.in_channels, trunk)?;
        check_eq(n, "gpoolConv.inChannels", self.gpool_conv.in_channels, trunk)?;
        check_eq(n, "gpoolBN.numChannels", self.gpool_bn.num_channels, self.gpool_conv.out_channels)?;
        if self.gpool_to_bias_mul.is_present() {
            check_eq(
                n,
                "gpoolToBiasMul.inChannels",
                self.gpool_to_bias_mul.in_channels,
                self.gpool_bn.num_channels * layout.gpool_stats,
            )?;
            check_eq(
                n,
                "gpoolToBiasMul.outChannels",
                self.gpool_to_bias_mul.out_channels,
                self.regular_conv.out_channels,
            )?;
        }
        check_eq(n, "midBN.numChannels", self.mid_bn.num_channels, self.regular_conv.out_channels)?;
        check_eq(n, "finalConv.inChannels", self.final_conv.in_channels, self.mid_bn.num_channels)?;
        check_eq(n, "finalConv.outChannels", self.final_conv.out_channels, trunk)
    }

    pub fn conv_layers(&self) -> BlockConvLayers<'_> {
        let convs: SmallVec<[&ConvLayerDesc; 3]> =
            smallvec![&self.regular_conv, &self.gpool_conv, &self.final_conv];
        convs.into_iter()
    }
}

/// トランク内のブロック
///
/// 種類は保持しているバリアントそのものから決まるため、タグとの食い違いは起こりえない。
#[derive(Debug, PartialEq)]
pub enum BlockDesc {
    Ordinary(ResidualBlockDesc),
    Dilated(DilatedResidualBlockDesc),
    GlobalPooling(GlobalPoolingResidualBlockDesc),
}

impl BlockDesc {
    /// 種類に応じたブロックを読む
    pub fn read(r: &mut TokenReader<'_>, kind: BlockKind, layout: &FormatLayout) -> DescResult<Self> {
        Ok(match kind {
            BlockKind::Ordinary => Self::Ordinary(ResidualBlockDesc::read(r)?),
            BlockKind::Dilated => Self::Dilated(DilatedResidualBlockDesc::read(r)?),
            BlockKind::GlobalPooling => {
                Self::GlobalPooling(GlobalPoolingResidualBlockDesc::read(r, layout)?)
            }
        })
    }

    /// ブロック先頭の種類タグを読む
    pub fn read_kind(r: &mut TokenReader<'_>) -> DescResult<BlockKind> {
        let position = r.position();
        let tag = r.read_int("block kind")?;
        BlockKind::from_tag(tag).ok_or_else(|| DescError::Format {
            position,
            detail: format!("unknown block kind tag {tag}"),
        })
    }

    /// タグを読んでからブロックを読む
    pub fn read_tagged(r: &mut TokenReader<'_>, layout: &FormatLayout) -> DescResult<Self> {
        let kind = Self::read_kind(r)?;
        Self::read(r, kind, layout)
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Ordinary(_) => BlockKind::Ordinary,
            Self::Dilated(_) => BlockKind::Dilated,
            Self::GlobalPooling(_) => BlockKind::GlobalPooling,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Ordinary(b) => &b.name,
            Self::Dilated(b) => &b.name,
            Self::GlobalPooling(b) => &b.name,
        }
    }

    pub fn pre_bn(&self) -> &BatchNormLayerDesc {
        match self {
            Self::Ordinary(b) => &b.pre_bn,
            Self::Dilated(b) => &b.pre_bn,
            Self::GlobalPooling(b) => &b.pre_bn,
        }
    }

    pub fn regular_conv(&self) -> &ConvLayerDesc {
        match self {
            Self::Ordinary(b) => &b.regular_conv,
            Self::Dilated(b) => &b.regular_conv,
            Self::GlobalPooling(b) => &b.regular_conv,
        }
    }

    pub fn final_conv(&self) -> &ConvLayerDesc {
        match self {
            Self::Ordinary(b) => &b.final_conv,
            Self::Dilated(b) => &b.final_conv,
            Self::GlobalPooling(b) => &b.final_conv,
        }
    }

    /// パース順に畳み込み層を列挙する
    pub fn conv_layers(&self) -> BlockConvLayers<'_> {
        match self {
            Self::Ordinary(b) => b.conv_layers(),
            Self::Dilated(b) => b.conv_layers(),
            Self::GlobalPooling(b) => b.conv_layers(),
        }
    }
}
