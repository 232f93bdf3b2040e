//! 空白区切りトークン列の読み取り
//!
//! モデルファイルは「スカラー値1つ = 1トークン」「重み配列 = 浮動小数点トークンの連続」
//! という単純なテキスト形式。改行と空白は区別しない。

use crate::error::{DescError, DescResult};
use std::str::SplitAsciiWhitespace;

/// 宣言された要素数に基づく事前確保の上限
const MAX_PREALLOC: usize = 1 << 20;

/// トークンストリーム
pub struct TokenReader<'a> {
    tokens: SplitAsciiWhitespace<'a>,
    /// 次に読むトークンの番号（エラー位置の報告用）
    position: usize,
}

impl<'a> TokenReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            tokens: text.split_ascii_whitespace(),
            position: 0,
        }
    }

    /// 次に読むトークンの番号
    pub fn position(&self) -> usize {
        self.position
    }

    fn format_error(&self, detail: String) -> DescError {
        DescError::Format {
            position: self.position,
            detail,
        }
    }

    /// 次のトークンをそのまま読む
    pub fn next_token(&mut self, what: &str) -> DescResult<&'a str> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| self.format_error(format!("unexpected end of stream reading {what}")))?;
        self.position += 1;
        Ok(token)
    }

    /// 符号付き整数を読む
    pub fn read_int(&mut self, what: &str) -> DescResult<i64> {
        let token = self.next_token(what)?;
        token.parse::<i64>().map_err(|_| DescError::Format {
            position: self.position - 1,
            detail: format!("{what}: expected integer, got {token:?}"),
        })
    }

    /// 非負整数を読む
    ///
    /// 負値は書式ではなく不変条件違反として扱う。
    pub fn read_count(&mut self, layer: &str, what: &str) -> DescResult<usize> {
        let value = self.read_int(what)?;
        usize::try_from(value)
            .map_err(|_| DescError::validation(layer, format!("{what} must be non-negative, got {value}")))
    }

    /// 正の整数を読む
    pub fn read_positive(&mut self, layer: &str, what: &str) -> DescResult<usize> {
        let value = self.read_count(layer, what)?;
        if value == 0 {
            return Err(DescError::validation(layer, format!("{what} must be positive, got 0")));
        }
        Ok(value)
    }

    /// 0/1 のフラグを読む
    pub fn read_flag(&mut self, layer: &str, what: &str) -> DescResult<bool> {
        match self.read_int(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DescError::validation(layer, format!("{what} must be 0 or 1, got {other}"))),
        }
    }

    /// 浮動小数点数を1つ読む
    pub fn read_float(&mut self, what: &str) -> DescResult<f32> {
        let token = self.next_token(what)?;
        token.parse::<f32>().map_err(|_| DescError::Format {
            position: self.position - 1,
            detail: format!("{what}: expected float, got {token:?}"),
        })
    }

    /// 浮動小数点数を `count` 個読む
    ///
    /// 非有限値（NaN/inf）は学習側の破損とみなして拒否する。
    pub fn read_floats(&mut self, count: usize, layer: &str, what: &str) -> DescResult<Vec<f32>> {
        // 宣言値は信用せず、事前確保は上限付きにする
        let mut values = Vec::with_capacity(count.min(MAX_PREALLOC));
        for i in 0..count {
            let v = self.read_float(what).map_err(|e| match e {
                DescError::Format { position, detail } => DescError::Format {
                    position,
                    detail: format!("{layer}: {detail} ({i} of {count} read)"),
                },
                other => other,
            })?;
            if !v.is_finite() {
                return Err(DescError::validation(layer, format!("{what}[{i}] is not finite: {v}")));
            }
            values.push(v);
        }
        Ok(values)
    }

    /// ストリームが終端していることを確認する
    pub fn expect_end(&mut self) -> DescResult<()> {
        match self.tokens.next() {
            None => Ok(()),
            Some(token) => Err(self.format_error(format!("unexpected trailing token {token:?}"))),
        }
    }
}
