//! トランク（共有の畳み込みバックボーン）の記述子
//!
//! ```text
//! initialConv (+ initialMatMul)
//!   → block[0] → block[1] → ... → block[numBlocks-1]
//!   → trunkTipBN → trunkTipActivation
//! ```
//!
//! 同じ種類のブロックはすべて同じチャンネル構成でなければならない
//! （バックエンドはブロック種別ごとに1組のバッファしか確保しない）。

use crate::blocks::{BlockDesc, BlockKind};
use crate::error::{DescError, DescResult};
use crate::layers::{check_eq, ActivationLayerDesc, BatchNormLayerDesc, ConvLayerDesc, MatMulLayerDesc};
use crate::reader::TokenReader;
use crate::version::FormatLayout;

#[derive(Debug, Default, PartialEq)]
pub struct TrunkDesc {
    pub name: String,
    pub version: i32,
    pub num_blocks: usize,
    pub trunk_num_channels: usize,
    /// 通常ブロックの mid 畳み込みのチャンネル数
    pub mid_num_channels: usize,
    /// dilated / gpool ブロックの regular 畳み込みのチャンネル数
    pub regular_num_channels: usize,
    /// dilated ブロックの dilated 畳み込みのチャンネル数
    pub dilated_num_channels: usize,
    /// gpool ブロックの gpool 畳み込みのチャンネル数
    pub gpool_num_channels: usize,
    pub initial_conv: ConvLayerDesc,
    /// 盤全体入力を持たないバージョンでは空の既定値
    pub initial_mat_mul: MatMulLayerDesc,
    pub blocks: Vec<BlockDesc>,
    pub trunk_tip_bn: BatchNormLayerDesc,
    pub trunk_tip_activation: ActivationLayerDesc,
}

impl TrunkDesc {
    pub fn read(r: &mut TokenReader<'_>, layout: &FormatLayout) -> DescResult<Self> {
        let name = r.next_token("trunk name")?.to_string();
        let num_blocks = r.read_count(&name, "numBlocks")?;
        let trunk_num_channels = r.read_positive(&name, "trunkNumChannels")?;
        let mid_num_channels = r.read_count(&name, "midNumChannels")?;
        let regular_num_channels = r.read_count(&name, "regularNumChannels")?;
        let dilated_num_channels = r.read_count(&name, "dilatedNumChannels")?;
        let gpool_num_channels = r.read_count(&name, "gpoolNumChannels")?;

        let initial_conv = ConvLayerDesc::read(r)?;
        check_eq(&name, "initialConv.outChannels", initial_conv.out_channels, trunk_num_channels)?;
        let initial_mat_mul = if layout.has_global_inputs() {
            let m = MatMulLayerDesc::read(r)?;
            check_eq(&name, "initialMatMul.outChannels", m.out_channels, trunk_num_channels)?;
            m
        } else {
            MatMulLayerDesc::default()
        };

        let mut trunk = Self {
            name,
            version: layout.version,
            num_blocks,
            trunk_num_channels,
            mid_num_channels,
            regular_num_channels,
            dilated_num_channels,
            gpool_num_channels,
            initial_conv,
            initial_mat_mul,
            blocks: Vec::with_capacity(num_blocks.min(256)),
            ..Default::default()
        };

        for index in 0..num_blocks {
            let kind = BlockDesc::read_kind(r)?;
            // ブロック内部の不整合もトランク上の位置と種類を付けて返す
            let block = BlockDesc::read(r, kind, layout).map_err(|e| match e {
                DescError::Validation { layer, detail } => DescError::BlockMismatch {
                    index,
                    kind,
                    detail: format!("{layer}: {detail}"),
                },
                other => other,
            })?;
            log::debug!("trunk block {index}: {} {}", block.kind(), block.name());
            trunk.check_block(index, &block)?;
            trunk.blocks.push(block);
        }

        trunk.trunk_tip_bn = BatchNormLayerDesc::read(r)?;
        trunk.trunk_tip_activation = ActivationLayerDesc::read(r)?;
        check_eq(
            &trunk.name,
            "trunkTipBN.numChannels",
            trunk.trunk_tip_bn.num_channels,
            trunk_num_channels,
        )?;
        Ok(trunk)
    }

    /// ブロックのチャンネル構成がトランク宣言と一致するか検証する
    fn check_block(&self, index: usize, block: &BlockDesc) -> DescResult<()> {
        let kind = block.kind();
        let mismatch = |what: &str, actual: usize, expected: usize| -> DescResult<()> {
            if actual != expected {
                return Err(DescError::BlockMismatch {
                    index,
                    kind,
                    detail: format!("{} {what} = {actual}, trunk declares {expected}", block.name()),
                });
            }
            Ok(())
        };

        mismatch("preBN.numChannels", block.pre_bn().num_channels, self.trunk_num_channels)?;
        mismatch("finalConv.outChannels", block.final_conv().out_channels, self.trunk_num_channels)?;
        // 通常ブロックの regular 畳み込みは mid チャンネル数で宣言される
        let regular_expected = match kind {
            BlockKind::Ordinary => self.mid_num_channels,
            BlockKind::Dilated | BlockKind::GlobalPooling => self.regular_num_channels,
        };
        mismatch("regularConv.outChannels", block.regular_conv().out_channels, regular_expected)?;
        match block {
            BlockDesc::Ordinary(_) => Ok(()),
            BlockDesc::Dilated(b) => {
                mismatch("dilatedConv.outChannels", b.dilated_conv.out_channels, self.dilated_num_channels)
            }
            BlockDesc::GlobalPooling(b) => {
                mismatch("gpoolConv.outChannels", b.gpool_conv.out_channels, self.gpool_num_channels)
            }
        }
    }

    /// 指定した種類のブロックを列挙する
    pub fn blocks_of_kind(&self, kind: BlockKind) -> impl Iterator<Item = &BlockDesc> + '_ {
        self.blocks.iter().filter(move |b| b.kind() == kind)
    }

    /// initialConv → 各ブロックの畳み込み層、の順に列挙する
    pub fn conv_layers(&self) -> impl Iterator<Item = &ConvLayerDesc> + '_ {
        std::iter::once(&self.initial_conv).chain(self.blocks.iter().flat_map(BlockDesc::conv_layers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{Dims, TextBuilder};
    use crate::version::layout_for;

    fn read_trunk(text: &str, version: i64) -> DescResult<TrunkDesc> {
        let mut r = TokenReader::new(text);
        let trunk = TrunkDesc::read(&mut r, layout_for(version)?)?;
        r.expect_end()?;
        Ok(trunk)
    }

    #[test]
    fn test_empty_trunk() {
        let layout = layout_for(5).unwrap();
        let mut t = TextBuilder::new();
        t.trunk(layout, &[], Dims::default());
        let trunk = read_trunk(&t.finish(), 5).unwrap();
        assert!(trunk.blocks.is_empty());
        let convs: Vec<&str> = trunk.conv_layers().map(|c| c.name.as_str()).collect();
        assert_eq!(convs, ["initial_conv"]);
        assert!(trunk.initial_mat_mul.is_present());
    }

    #[test]
    fn test_block_count_and_order() {
        let layout = layout_for(4).unwrap();
        let kinds = [
            BlockKind::Ordinary,
            BlockKind::Dilated,
            BlockKind::GlobalPooling,
            BlockKind::Ordinary,
        ];
        let mut t = TextBuilder::new();
        t.trunk(layout, &kinds, Dims::default());
        let trunk = read_trunk(&t.finish(), 4).unwrap();
        assert_eq!(trunk.blocks.len(), trunk.num_blocks);
        let got: Vec<BlockKind> = trunk.blocks.iter().map(BlockDesc::kind).collect();
        assert_eq!(got, kinds);
        assert_eq!(trunk.blocks_of_kind(BlockKind::Ordinary).count(), 2);
        // initial + 2 + 3 + 3 + 2
        assert_eq!(trunk.conv_layers().count(), 11);
        let first_block_conv = trunk.conv_layers().nth(1).unwrap();
        assert_eq!(first_block_conv.name, "block0/regular");
    }

    #[test]
    fn test_v2_trunk_has_no_initial_matmul() {
        let layout = layout_for(2).unwrap();
        let mut t = TextBuilder::new();
        t.trunk(layout, &[BlockKind::GlobalPooling], Dims::default());
        let trunk = read_trunk(&t.finish(), 2).unwrap();
        assert!(!trunk.initial_mat_mul.is_present());
    }

    #[test]
    fn test_mid_channel_mismatch_identifies_block() {
        let layout = layout_for(5).unwrap();
        let dims = Dims::default();
        let mut t = TextBuilder::new();
        // トランク宣言は mid=3 だが block1 は mid=5
        t.tok("trunk").tok(2).tok(dims.trunk).tok(dims.mid).tok(dims.regular).tok(dims.dilated).tok(dims.gpool);
        t.conv("initial_conv", 5, layout.num_spatial_features, dims.trunk);
        t.matmul("initial_matmul", layout.num_global_features, dims.trunk);
        t.tagged_block(0, BlockKind::Ordinary, dims, layout);
        t.tagged_block(1, BlockKind::Ordinary, Dims { mid: 5, ..dims }, layout);
        t.bn("trunk_tip_bn", dims.trunk).act("trunk_tip_act");

        let err = read_trunk(&t.finish(), 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        match err {
            DescError::BlockMismatch { index, kind, detail } => {
                assert_eq!(index, 1);
                assert_eq!(kind, BlockKind::Ordinary);
                assert!(detail.contains("regularConv.outChannels = 5"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pre_bn_mismatch_identifies_block() {
        let layout = layout_for(5).unwrap();
        let dims = Dims::default();
        let mut t = TextBuilder::new();
        t.tok("trunk").tok(1).tok(dims.trunk).tok(dims.mid).tok(dims.regular).tok(dims.dilated).tok(dims.gpool);
        t.conv("initial_conv", 5, layout.num_spatial_features, dims.trunk);
        t.matmul("initial_matmul", layout.num_global_features, dims.trunk);
        // preBN だけがトランクより広い
        t.tok(BlockKind::Ordinary.tag()).newline().tok("block0").newline();
        t.bn("block0/pre_bn", dims.trunk + 1)
            .act("block0/pre_act")
            .conv("block0/regular", 3, dims.trunk, dims.mid)
            .bn("block0/mid_bn", dims.mid)
            .act("block0/mid_act")
            .conv("block0/final", 3, dims.mid, dims.trunk);
        t.bn("trunk_tip_bn", dims.trunk).act("trunk_tip_act");

        let err = read_trunk(&t.finish(), 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        match err {
            DescError::BlockMismatch { index, kind, detail } => {
                assert_eq!(index, 0);
                assert_eq!(kind, BlockKind::Ordinary);
                assert!(detail.contains("block0"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_gpool_channel_mismatch() {
        let layout = layout_for(3).unwrap();
        let dims = Dims::default();
        let mut t = TextBuilder::new();
        t.tok("trunk").tok(1).tok(dims.trunk).tok(dims.mid).tok(dims.regular).tok(dims.dilated).tok(7);
        t.conv("initial_conv", 5, layout.num_spatial_features, dims.trunk);
        t.matmul("initial_matmul", layout.num_global_features, dims.trunk);
        t.tagged_block(0, BlockKind::GlobalPooling, dims, layout);
        t.bn("trunk_tip_bn", dims.trunk).act("trunk_tip_act");

        let err = read_trunk(&t.finish(), 3).unwrap_err();
        assert!(
            matches!(err, DescError::BlockMismatch { index: 0, kind: BlockKind::GlobalPooling, .. }),
            "{err}"
        );
    }

    #[test]
    fn test_truncated_block_list() {
        let layout = layout_for(5).unwrap();
        let mut t = TextBuilder::new();
        t.trunk(layout, &[BlockKind::Ordinary], Dims::default());
        let text = t.finish().replacen("trunk 1 ", "trunk 2 ", 1);
        let err = read_trunk(&text, 5).unwrap_err();
        // 2個目のブロックのタグとして trunk_tip_bn が読まれる
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
