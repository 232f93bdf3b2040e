//! 出力ヘッドの記述子
//!
//! - `PolicyHeadDesc`: 着手確率（盤上 + パス）
//! - `ValueHeadDesc`: 勝敗・スコア・所有権
//!
//! 両ヘッドともトランク出力を入力とし、global pooling の統計量の数は
//! フォーマットバージョンに従う。

use crate::error::DescResult;
use crate::layers::{
    check_eq, ActivationLayerDesc, BatchNormLayerDesc, ConvLayerDesc, MatBiasLayerDesc, MatMulLayerDesc,
};
use crate::reader::TokenReader;
use crate::version::FormatLayout;

/// 方策ヘッド
#[derive(Debug, Default, PartialEq)]
pub struct PolicyHeadDesc {
    pub name: String,
    pub version: i32,
    pub p1_conv: ConvLayerDesc,
    pub g1_conv: ConvLayerDesc,
    pub g1_bn: BatchNormLayerDesc,
    pub g1_activation: ActivationLayerDesc,
    pub gpool_to_bias_mul: MatMulLayerDesc,
    pub p1_bn: BatchNormLayerDesc,
    pub p1_activation: ActivationLayerDesc,
    pub p2_conv: ConvLayerDesc,
    pub gpool_to_pass_mul: MatMulLayerDesc,
}

impl PolicyHeadDesc {
    pub fn read(r: &mut TokenReader<'_>, layout: &FormatLayout, trunk_channels: usize) -> DescResult<Self> {
        let name = r.next_token("policy head name")?.to_string();
        let head = Self {
            version: layout.version,
            p1_conv: ConvLayerDesc::read(r)?,
            g1_conv: ConvLayerDesc::read(r)?,
            g1_bn: BatchNormLayerDesc::read(r)?,
            g1_activation: ActivationLayerDesc::read(r)?,
            gpool_to_bias_mul: MatMulLayerDesc::read(r)?,
            p1_bn: BatchNormLayerDesc::read(r)?,
            p1_activation: ActivationLayerDesc::read(r)?,
            p2_conv: ConvLayerDesc::read(r)?,
            gpool_to_pass_mul: MatMulLayerDesc::read(r)?,
            name,
        };
        head.validate(layout, trunk_channels)?;
        Ok(head)
    }

    fn validate(&self, layout: &FormatLayout, trunk_channels: usize) -> DescResult<()> {
        let n = &self.name;
        let p1 = self.p1_conv.out_channels;
        let pooled = self.g1_conv.out_channels * layout.gpool_stats;
        check_eq(n, "p1Conv.inChannels", self.p1_conv.in_channels, trunk_channels)?;
        check_eq(n, "g1Conv.inChannels", self.g1_conv.in_channels, trunk_channels)?;
        check_eq(n, "g1BN.numChannels", self.g1_bn.num_channels, self.g1_conv.out_channels)?;
        check_eq(n, "gpoolToBiasMul.inChannels", self.gpool_to_bias_mul.in_channels, pooled)?;
        check_eq(n, "gpoolToBiasMul.outChannels", self.gpool_to_bias_mul.out_channels, p1)?;
        check_eq(n, "p1BN.numChannels", self.p1_bn.num_channels, p1)?;
        check_eq(n, "p2Conv.inChannels", self.p2_conv.in_channels, p1)?;
        check_eq(n, "p2Conv.outChannels", self.p2_conv.out_channels, 1)?;
        check_eq(n, "gpoolToPassMul.inChannels", self.gpool_to_pass_mul.in_channels, pooled)?;
        check_eq(n, "gpoolToPassMul.outChannels", self.gpool_to_pass_mul.out_channels, 1)
    }

    /// p1Conv → g1Conv → p2Conv
    pub fn conv_layers(&self) -> impl Iterator<Item = &ConvLayerDesc> + '_ {
        [&self.p1_conv, &self.g1_conv, &self.p2_conv].into_iter()
    }
}

/// 価値ヘッド
#[derive(Debug, Default, PartialEq)]
pub struct ValueHeadDesc {
    pub name: String,
    pub version: i32,
    pub v1_conv: ConvLayerDesc,
    pub v1_bn: BatchNormLayerDesc,
    pub v1_activation: ActivationLayerDesc,
    pub v2_mul: MatMulLayerDesc,
    pub v2_bias: MatBiasLayerDesc,
    pub v2_activation: ActivationLayerDesc,
    pub v3_mul: MatMulLayerDesc,
    pub v3_bias: MatBiasLayerDesc,
    /// スコア出力を持たないバージョンでは空の既定値
    pub sv3_mul: MatMulLayerDesc,
    pub sv3_bias: MatBiasLayerDesc,
    pub v_ownership_conv: ConvLayerDesc,
}

impl ValueHeadDesc {
    pub fn read(r: &mut TokenReader<'_>, layout: &FormatLayout, trunk_channels: usize) -> DescResult<Self> {
        let name = r.next_token("value head name")?.to_string();
        let v1_conv = ConvLayerDesc::read(r)?;
        let v1_bn = BatchNormLayerDesc::read(r)?;
        let v1_activation = ActivationLayerDesc::read(r)?;
        let v2_mul = MatMulLayerDesc::read(r)?;
        let v2_bias = MatBiasLayerDesc::read(r)?;
        let v2_activation = ActivationLayerDesc::read(r)?;
        let v3_mul = MatMulLayerDesc::read(r)?;
        let v3_bias = MatBiasLayerDesc::read(r)?;
        let (sv3_mul, sv3_bias) = if layout.has_score_value() {
            (MatMulLayerDesc::read(r)?, MatBiasLayerDesc::read(r)?)
        } else {
            Default::default()
        };
        let head = Self {
            name,
            version: layout.version,
            v1_conv,
            v1_bn,
            v1_activation,
            v2_mul,
            v2_bias,
            v2_activation,
            v3_mul,
            v3_bias,
            sv3_mul,
            sv3_bias,
            v_ownership_conv: ConvLayerDesc::read(r)?,
        };
        head.validate(layout, trunk_channels)?;
        Ok(head)
    }

    fn validate(&self, layout: &FormatLayout, trunk_channels: usize) -> DescResult<()> {
        let n = &self.name;
        let v1 = self.v1_conv.out_channels;
        let v2 = self.v2_mul.out_channels;
        check_eq(n, "v1Conv.inChannels", self.v1_conv.in_channels, trunk_channels)?;
        check_eq(n, "v1BN.numChannels", self.v1_bn.num_channels, v1)?;
        check_eq(n, "v2Mul.inChannels", self.v2_mul.in_channels, v1 * layout.gpool_stats)?;
        check_eq(n, "v2Bias.numChannels", self.v2_bias.num_channels, v2)?;
        check_eq(n, "v3Mul.inChannels", self.v3_mul.in_channels, v2)?;
        check_eq(n, "v3Mul.outChannels", self.v3_mul.out_channels, layout.num_value_channels)?;
        check_eq(n, "v3Bias.numChannels", self.v3_bias.num_channels, self.v3_mul.out_channels)?;
        if layout.has_score_value() {
            check_eq(n, "sv3Mul.inChannels", self.sv3_mul.in_channels, v2)?;
            check_eq(n, "sv3Mul.outChannels", self.sv3_mul.out_channels, layout.num_score_value_channels)?;
            check_eq(n, "sv3Bias.numChannels", self.sv3_bias.num_channels, self.sv3_mul.out_channels)?;
        }
        check_eq(n, "vOwnershipConv.inChannels", self.v_ownership_conv.in_channels, v1)?;
        check_eq(n, "vOwnershipConv.outChannels", self.v_ownership_conv.out_channels, 1)
    }

    /// v1Conv → vOwnershipConv
    pub fn conv_layers(&self) -> impl Iterator<Item = &ConvLayerDesc> + '_ {
        [&self.v1_conv, &self.v_ownership_conv].into_iter()
    }
}
