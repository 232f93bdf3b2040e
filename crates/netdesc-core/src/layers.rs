//! 葉ノードの層記述子
//!
//! - `ConvLayerDesc`: 畳み込み（カーネルサイズ・入出力チャンネル・dilation・重み）
//! - `BatchNormLayerDesc`: チャンネルごとの正規化パラメータ
//! - `ActivationLayerDesc`: 活性化（名前のみ）
//! - `MatMulLayerDesc`: 全結合の重み行列
//! - `MatBiasLayerDesc`: 全結合のバイアス
//!
//! 各記述子はトークン列から構造体の宣言順にスカラー値を読み、続けて重みを読む。
//! パラメータ配列の長さは常に宣言された形状の積に等しい。
//! 複製は意図しないメモリ消費につながるため `Clone` は実装しない。

use crate::error::{DescError, DescResult};
use crate::reader::TokenReader;

/// 畳み込み層
#[derive(Debug, Default, PartialEq)]
pub struct ConvLayerDesc {
    pub name: String,
    pub conv_y_size: usize,
    pub conv_x_size: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub dilation_y: usize,
    pub dilation_x: usize,
    /// (oc, ic, y, x) 順の重み
    pub weights: Vec<f32>,
}

impl ConvLayerDesc {
    pub fn read(r: &mut TokenReader<'_>) -> DescResult<Self> {
        let name = r.next_token("conv layer name")?.to_string();
        let conv_y_size = r.read_positive(&name, "convYSize")?;
        let conv_x_size = r.read_positive(&name, "convXSize")?;
        let in_channels = r.read_positive(&name, "inChannels")?;
        let out_channels = r.read_positive(&name, "outChannels")?;
        let dilation_y = r.read_positive(&name, "dilationY")?;
        let dilation_x = r.read_positive(&name, "dilationX")?;

        let count = shape_product(&name, &[conv_y_size, conv_x_size, in_channels, out_channels])?;
        let file_order = r.read_floats(count, &name, "conv weights")?;

        // ファイル上は (y, x, ic, oc) 順。バックエンド向けに (oc, ic, y, x) 順へ並べ替える
        let mut weights = vec![0.0f32; count];
        let mut src = file_order.iter();
        for y in 0..conv_y_size {
            for x in 0..conv_x_size {
                for ic in 0..in_channels {
                    for oc in 0..out_channels {
                        let dst = ((oc * in_channels + ic) * conv_y_size + y) * conv_x_size + x;
                        if let Some(&w) = src.next() {
                            weights[dst] = w;
                        }
                    }
                }
            }
        }

        Ok(Self {
            name,
            conv_y_size,
            conv_x_size,
            in_channels,
            out_channels,
            dilation_y,
            dilation_x,
            weights,
        })
    }

    /// (oc, ic, y, x) の重み
    pub fn weight(&self, oc: usize, ic: usize, y: usize, x: usize) -> f32 {
        self.weights[((oc * self.in_channels + ic) * self.conv_y_size + y) * self.conv_x_size + x]
    }
}

/// バッチ正規化層
#[derive(Debug, Default, PartialEq)]
pub struct BatchNormLayerDesc {
    pub name: String,
    pub num_channels: usize,
    pub epsilon: f32,
    pub has_scale: bool,
    pub has_bias: bool,
    pub mean: Vec<f32>,
    pub variance: Vec<f32>,
    /// `has_scale == false` のときは全要素 1
    pub scale: Vec<f32>,
    /// `has_bias == false` のときは全要素 0
    pub bias: Vec<f32>,
}

impl BatchNormLayerDesc {
    pub fn read(r: &mut TokenReader<'_>) -> DescResult<Self> {
        let name = r.next_token("batchnorm layer name")?.to_string();
        let num_channels = r.read_positive(&name, "numChannels")?;
        let epsilon = r.read_float("epsilon")?;
        if !(epsilon > 0.0 && epsilon.is_finite()) {
            return Err(DescError::validation(&name, format!("epsilon must be positive, got {epsilon}")));
        }
        let has_scale = r.read_flag(&name, "hasScale")?;
        let has_bias = r.read_flag(&name, "hasBias")?;

        let mean = r.read_floats(num_channels, &name, "mean")?;
        let variance = r.read_floats(num_channels, &name, "variance")?;
        if let Some(v) = variance.iter().find(|v| **v < 0.0) {
            return Err(DescError::validation(&name, format!("negative variance {v}")));
        }
        let scale = if has_scale {
            r.read_floats(num_channels, &name, "scale")?
        } else {
            vec![1.0; num_channels]
        };
        let bias = if has_bias {
            r.read_floats(num_channels, &name, "bias")?
        } else {
            vec![0.0; num_channels]
        };

        Ok(Self {
            name,
            num_channels,
            epsilon,
            has_scale,
            has_bias,
            mean,
            variance,
            scale,
            bias,
        })
    }
}

/// 活性化層
#[derive(Debug, Default, PartialEq)]
pub struct ActivationLayerDesc {
    pub name: String,
}

impl ActivationLayerDesc {
    pub fn read(r: &mut TokenReader<'_>) -> DescResult<Self> {
        let name = r.next_token("activation layer name")?.to_string();
        Ok(Self { name })
    }
}

/// 全結合の重み行列
#[derive(Debug, Default, PartialEq)]
pub struct MatMulLayerDesc {
    pub name: String,
    pub in_channels: usize,
    pub out_channels: usize,
    /// (ic, oc) 順の重み
    pub weights: Vec<f32>,
}

impl MatMulLayerDesc {
    pub fn read(r: &mut TokenReader<'_>) -> DescResult<Self> {
        let name = r.next_token("matmul layer name")?.to_string();
        let in_channels = r.read_positive(&name, "inChannels")?;
        let out_channels = r.read_positive(&name, "outChannels")?;
        let count = shape_product(&name, &[in_channels, out_channels])?;
        let weights = r.read_floats(count, &name, "matmul weights")?;
        Ok(Self {
            name,
            in_channels,
            out_channels,
            weights,
        })
    }

    /// この層が存在するか（古いバージョンで省略された層は既定値の空記述子になる）
    pub fn is_present(&self) -> bool {
        self.out_channels > 0
    }
}

/// 全結合のバイアス
#[derive(Debug, Default, PartialEq)]
pub struct MatBiasLayerDesc {
    pub name: String,
    pub num_channels: usize,
    pub weights: Vec<f32>,
}

impl MatBiasLayerDesc {
    pub fn read(r: &mut TokenReader<'_>) -> DescResult<Self> {
        let name = r.next_token("matbias layer name")?.to_string();
        let num_channels = r.read_positive(&name, "numChannels")?;
        let weights = r.read_floats(num_channels, &name, "bias weights")?;
        Ok(Self {
            name,
            num_channels,
            weights,
        })
    }

    pub fn is_present(&self) -> bool {
        self.num_channels > 0
    }
}

/// 形状の積（オーバーフローは不正ファイル扱い）
fn shape_product(layer: &str, dims: &[usize]) -> DescResult<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| DescError::validation(layer, format!("parameter count overflows: {dims:?}")))
}

/// 2つの値が一致することを検証する
pub(crate) fn check_eq(layer: &str, what: &str, actual: usize, expected: usize) -> DescResult<()> {
    if actual != expected {
        return Err(DescError::validation(layer, format!("{what} = {actual}, expected {expected}")));
    }
    Ok(())
}
