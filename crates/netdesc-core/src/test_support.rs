//! テスト用のモデルテキスト生成
//!
//! 重みはすべて決定的な値で埋める。チャンネル数の整合が取れたテキストを組み立てるので、
//! 個々のテストでは壊したいフィールドだけを差し替えればよい。

use crate::blocks::BlockKind;
use crate::version::FormatLayout;
use std::fmt::{Display, Write as _};

/// トランクのチャンネル構成
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dims {
    pub trunk: usize,
    pub mid: usize,
    pub regular: usize,
    pub dilated: usize,
    pub gpool: usize,
}

impl Default for Dims {
    fn default() -> Self {
        Self {
            trunk: 4,
            mid: 3,
            regular: 3,
            dilated: 2,
            gpool: 2,
        }
    }
}

pub(crate) struct TextBuilder {
    out: String,
    counter: u32,
}

impl TextBuilder {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            counter: 0,
        }
    }

    pub fn tok(&mut self, t: impl Display) -> &mut Self {
        let _ = write!(self.out, "{t} ");
        self
    }

    pub fn newline(&mut self) -> &mut Self {
        self.out.push('\n');
        self
    }

    pub fn floats(&mut self, n: usize) -> &mut Self {
        for _ in 0..n {
            self.counter = self.counter.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let v = (self.counter % 2000) as f32 / 1000.0 - 1.0;
            self.tok(v);
        }
        self.newline()
    }

    pub fn conv(&mut self, name: &str, k: usize, ic: usize, oc: usize) -> &mut Self {
        self.conv_dilated(name, k, ic, oc, 1)
    }

    pub fn conv_dilated(&mut self, name: &str, k: usize, ic: usize, oc: usize, dil: usize) -> &mut Self {
        self.tok(name).tok(k).tok(k).tok(ic).tok(oc).tok(dil).tok(dil).newline();
        self.floats(k * k * ic * oc)
    }

    pub fn bn(&mut self, name: &str, n: usize) -> &mut Self {
        self.tok(name).tok(n).tok("1e-5").tok(1).tok(1).newline();
        self.floats(n);
        // 分散は非負にする
        for _ in 0..n {
            self.tok(1.0f32);
        }
        self.newline().floats(n).floats(n)
    }

    pub fn act(&mut self, name: &str) -> &mut Self {
        self.tok(name).newline()
    }

    pub fn matmul(&mut self, name: &str, ic: usize, oc: usize) -> &mut Self {
        self.tok(name).tok(ic).tok(oc).newline();
        self.floats(ic * oc)
    }

    pub fn matbias(&mut self, name: &str, n: usize) -> &mut Self {
        self.tok(name).tok(n).newline();
        self.floats(n)
    }

    pub fn ordinary_block(&mut self, name: &str, trunk: usize, mid: usize) -> &mut Self {
        self.tok(name).newline();
        self.bn(&format!("{name}/pre_bn"), trunk)
            .act(&format!("{name}/pre_act"))
            .conv(&format!("{name}/regular"), 3, trunk, mid)
            .bn(&format!("{name}/mid_bn"), mid)
            .act(&format!("{name}/mid_act"))
            .conv(&format!("{name}/final"), 3, mid, trunk)
    }

    pub fn dilated_block(&mut self, name: &str, trunk: usize, regular: usize, dilated: usize) -> &mut Self {
        self.tok(name).newline();
        self.bn(&format!("{name}/pre_bn"), trunk)
            .act(&format!("{name}/pre_act"))
            .conv(&format!("{name}/regular"), 3, trunk, regular)
            .conv_dilated(&format!("{name}/dilated"), 3, trunk, dilated, 2)
            .bn(&format!("{name}/mid_bn"), regular + dilated)
            .act(&format!("{name}/mid_act"))
            .conv(&format!("{name}/final"), 3, regular + dilated, trunk)
    }

    pub fn gpool_block(
        &mut self,
        name: &str,
        trunk: usize,
        regular: usize,
        gpool: usize,
        layout: &FormatLayout,
    ) -> &mut Self {
        self.tok(name).newline();
        self.bn(&format!("{name}/pre_bn"), trunk)
            .act(&format!("{name}/pre_act"))
            .conv(&format!("{name}/regular"), 3, trunk, regular)
            .conv(&format!("{name}/gpool"), 3, trunk, gpool)
            .bn(&format!("{name}/gpool_bn"), gpool)
            .act(&format!("{name}/gpool_act"));
        if layout.gpool_block_has_bias_mul {
            self.matmul(&format!("{name}/gpool_to_bias"), gpool * layout.gpool_stats, regular);
        }
        self.bn(&format!("{name}/mid_bn"), regular)
            .act(&format!("{name}/mid_act"))
            .conv(&format!("{name}/final"), 3, regular, trunk)
    }

    /// 種類に応じたブロック（タグ付き）
    pub fn tagged_block(&mut self, index: usize, kind: BlockKind, dims: Dims, layout: &FormatLayout) -> &mut Self {
        self.tok(kind.tag()).newline();
        let name = format!("block{index}");
        match kind {
            BlockKind::Ordinary => self.ordinary_block(&name, dims.trunk, dims.mid),
            BlockKind::Dilated => self.dilated_block(&name, dims.trunk, dims.regular, dims.dilated),
            BlockKind::GlobalPooling => {
                self.gpool_block(&name, dims.trunk, dims.regular, dims.gpool, layout)
            }
        }
    }

    pub fn trunk(&mut self, layout: &FormatLayout, kinds: &[BlockKind], dims: Dims) -> &mut Self {
        self.tok("trunk")
            .tok(kinds.len())
            .tok(dims.trunk)
            .tok(dims.mid)
            .tok(dims.regular)
            .tok(dims.dilated)
            .tok(dims.gpool)
            .newline();
        self.conv("initial_conv", 5, layout.num_spatial_features, dims.trunk);
        if layout.has_global_inputs() {
            self.matmul("initial_matmul", layout.num_global_features, dims.trunk);
        }
        for (i, &kind) in kinds.iter().enumerate() {
            self.tagged_block(i, kind, dims, layout);
        }
        self.bn("trunk_tip_bn", dims.trunk).act("trunk_tip_act")
    }

    pub fn policy_head(&mut self, layout: &FormatLayout, trunk: usize) -> &mut Self {
        let (p1, g1) = (2, 2);
        self.tok("policy_head").newline();
        self.conv("p1_conv", 1, trunk, p1)
            .conv("g1_conv", 1, trunk, g1)
            .bn("g1_bn", g1)
            .act("g1_act")
            .matmul("gpool_to_bias", g1 * layout.gpool_stats, p1)
            .bn("p1_bn", p1)
            .act("p1_act")
            .conv("p2_conv", 1, p1, 1)
            .matmul("gpool_to_pass", g1 * layout.gpool_stats, 1)
    }

    pub fn value_head(&mut self, layout: &FormatLayout, trunk: usize) -> &mut Self {
        let (v1, v2) = (2, 3);
        self.tok("value_head").newline();
        self.conv("v1_conv", 1, trunk, v1)
            .bn("v1_bn", v1)
            .act("v1_act")
            .matmul("v2_mul", v1 * layout.gpool_stats, v2)
            .matbias("v2_bias", v2)
            .act("v2_act")
            .matmul("v3_mul", v2, layout.num_value_channels)
            .matbias("v3_bias", layout.num_value_channels);
        if layout.has_score_value() {
            self.matmul("sv3_mul", v2, layout.num_score_value_channels)
                .matbias("sv3_bias", layout.num_score_value_channels);
        }
        self.conv("ownership_conv", 1, v1, 1)
    }

    /// モデルのヘッダ（バージョン〜入力チャンネル数）
    pub fn model_header(&mut self, layout: &FormatLayout, name: &str) -> &mut Self {
        self.tok(layout.version).newline().tok(name).newline();
        if layout.has_board_size {
            self.tok(19).tok(19).newline();
        }
        self.tok(layout.num_spatial_features);
        if layout.has_global_inputs() {
            self.tok(layout.num_global_features);
        }
        self.newline()
    }

    pub fn model(&mut self, layout: &FormatLayout, kinds: &[BlockKind], dims: Dims) -> &mut Self {
        self.model_header(layout, "test_model")
            .trunk(layout, kinds, dims)
            .policy_head(layout, dims.trunk)
            .value_head(layout, dims.trunk)
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// 整合の取れたモデルテキスト
pub(crate) fn model_text(layout: &FormatLayout, kinds: &[BlockKind]) -> String {
    let mut t = TextBuilder::new();
    t.model(layout, kinds, Dims::default());
    t.finish()
}
