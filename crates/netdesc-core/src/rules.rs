//! 対局ルールの最小表現
//!
//! モデルがどのルール設定を入力として表現できるかを判定するためだけの型。
//! 合法手判定や終局処理などのルール本体はここでは扱わない。

use serde::Serialize;
use std::fmt;

/// コウのルール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KoRule {
    Simple,
    Positional,
    Situational,
    Spight,
}

impl KoRule {
    /// 列挙順（ルール解決時の距離計算にも使う）
    pub const ALL: [Self; 4] = [Self::Simple, Self::Positional, Self::Situational, Self::Spight];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Positional => "positional",
            Self::Situational => "situational",
            Self::Spight => "spight",
        }
    }
}

/// 得点計算のルール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScoringRule {
    Area,
    Territory,
}

impl ScoringRule {
    pub const ALL: [Self; 2] = [Self::Area, Self::Territory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::Territory => "territory",
        }
    }
}

/// 地の数え方（セキ・眼への課税）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaxRule {
    None,
    Seki,
    All,
}

impl TaxRule {
    pub const ALL: [Self; 3] = [Self::None, Self::Seki, Self::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Seki => "seki",
            Self::All => "all",
        }
    }
}

macro_rules! impl_display_from_str {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| format!("unknown {}: {s}", stringify!($ty)))
            }
        }
    )*};
}

impl_display_from_str!(KoRule, ScoringRule, TaxRule);

/// ルール設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rules {
    pub ko_rule: KoRule,
    pub scoring_rule: ScoringRule,
    pub tax_rule: TaxRule,
    pub multi_stone_suicide_legal: bool,
    pub has_button: bool,
    pub komi: f32,
}

impl Rules {
    /// 中国ルール相当（エリア計算・状況的超コウ・自殺手禁止）
    pub const fn chinese() -> Self {
        Self {
            ko_rule: KoRule::Situational,
            scoring_rule: ScoringRule::Area,
            tax_rule: TaxRule::None,
            multi_stone_suicide_legal: false,
            has_button: false,
            komi: 7.5,
        }
    }

    /// 日本ルール相当（地計算・単純コウ・セキ内の地を数えない）
    pub const fn japanese() -> Self {
        Self {
            ko_rule: KoRule::Simple,
            scoring_rule: ScoringRule::Territory,
            tax_rule: TaxRule::Seki,
            multi_stone_suicide_legal: false,
            has_button: false,
            komi: 6.5,
        }
    }

    /// Tromp-Taylor ルール
    pub const fn tromp_taylor() -> Self {
        Self {
            ko_rule: KoRule::Positional,
            scoring_rule: ScoringRule::Area,
            tax_rule: TaxRule::None,
            multi_stone_suicide_legal: true,
            has_button: false,
            komi: 7.5,
        }
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::tromp_taylor()
    }
}

impl fmt::Display for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ko={} scoring={} tax={} suicide={} button={} komi={}",
            self.ko_rule,
            self.scoring_rule,
            self.tax_rule,
            self.multi_stone_suicide_legal,
            self.has_button,
            self.komi
        )
    }
}

/// モデルが表現できるルール値の集合（次元ごと）
///
/// 各次元は独立で、表現可能な組み合わせは各次元の直積になる。
/// スライスの並びは `ALL` の順序に揃えておくこと。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleCapabilities {
    pub ko_rules: &'static [KoRule],
    pub scoring_rules: &'static [ScoringRule],
    pub tax_rules: &'static [TaxRule],
    pub multi_stone_suicide: &'static [bool],
    pub button: &'static [bool],
}

/// ルール次元の共通操作（`ALL` 上の序数で距離を測る）
trait RuleDimension: Copy + PartialEq + 'static {
    fn universe() -> &'static [Self];

    fn ordinal(self) -> usize {
        Self::universe().iter().position(|&v| v == self).unwrap_or(0)
    }
}

impl RuleDimension for KoRule {
    fn universe() -> &'static [Self] {
        &Self::ALL
    }
}

impl RuleDimension for ScoringRule {
    fn universe() -> &'static [Self] {
        &Self::ALL
    }
}

impl RuleDimension for TaxRule {
    fn universe() -> &'static [Self] {
        &Self::ALL
    }
}

impl RuleDimension for bool {
    fn universe() -> &'static [Self] {
        &[false, true]
    }
}

/// `desired` に最も近い表現可能値を返す
///
/// 距離は `ALL` 上の序数差。同距離なら `ALL` で先に来る値を選ぶ。
fn nearest<T: RuleDimension>(desired: T, supported: &[T]) -> T {
    if supported.contains(&desired) {
        return desired;
    }
    let target = desired.ordinal();
    T::universe()
        .iter()
        .copied()
        .filter(|v| supported.contains(v))
        .min_by_key(|v| v.ordinal().abs_diff(target))
        .unwrap_or(desired)
}

impl RuleCapabilities {
    /// ルール設定がそのまま表現可能か
    pub fn supports(&self, rules: &Rules) -> bool {
        self.ko_rules.contains(&rules.ko_rule)
            && self.scoring_rules.contains(&rules.scoring_rule)
            && self.tax_rules.contains(&rules.tax_rule)
            && self.multi_stone_suicide.contains(&rules.multi_stone_suicide_legal)
            && self.button.contains(&rules.has_button)
    }

    /// 最も近い表現可能なルール設定を返す
    ///
    /// ko → scoring → tax → suicide → button の順に次元ごとに独立して解決する。
    /// コミは変更しない。戻り値の bool は無変更なら true（コミが NaN でも同じ）。
    pub fn nearest(&self, desired: &Rules) -> (Rules, bool) {
        let rules = Rules {
            ko_rule: nearest(desired.ko_rule, self.ko_rules),
            scoring_rule: nearest(desired.scoring_rule, self.scoring_rules),
            tax_rule: nearest(desired.tax_rule, self.tax_rules),
            multi_stone_suicide_legal: nearest(
                desired.multi_stone_suicide_legal,
                self.multi_stone_suicide,
            ),
            has_button: nearest(desired.has_button, self.button),
            komi: desired.komi,
        };
        // 表現可能なら各次元はそのまま残る（コミは比較しない）
        (rules, self.supports(desired))
    }

    /// 表現可能な全組み合わせを列挙する（コミは `komi` 固定）
    pub fn combinations(&self, komi: f32) -> impl Iterator<Item = Rules> + '_ {
        self.ko_rules.iter().flat_map(move |&ko_rule| {
            self.scoring_rules.iter().flat_map(move |&scoring_rule| {
                self.tax_rules.iter().flat_map(move |&tax_rule| {
                    self.multi_stone_suicide.iter().flat_map(move |&suicide| {
                        self.button.iter().map(move |&has_button| Rules {
                            ko_rule,
                            scoring_rule,
                            tax_rule,
                            multi_stone_suicide_legal: suicide,
                            has_button,
                            komi,
                        })
                    })
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AREA_ONLY: RuleCapabilities = RuleCapabilities {
        ko_rules: &[KoRule::Situational],
        scoring_rules: &[ScoringRule::Area],
        tax_rules: &[TaxRule::None],
        multi_stone_suicide: &[false, true],
        button: &[false],
    };

    #[test]
    fn test_nearest_ko_prefers_closest_then_earlier() {
        assert_eq!(nearest(KoRule::Spight, &[KoRule::Simple, KoRule::Situational]), KoRule::Situational);
        // Positional は Simple/Situational と等距離 → 先に来る Simple
        assert_eq!(nearest(KoRule::Positional, &[KoRule::Simple, KoRule::Situational]), KoRule::Simple);
        assert_eq!(nearest(KoRule::Simple, &[KoRule::Simple]), KoRule::Simple);
    }

    #[test]
    fn test_nearest_adjusts_every_dimension() {
        let (rules, supported) = AREA_ONLY.nearest(&Rules::japanese());
        assert!(!supported);
        assert_eq!(rules.ko_rule, KoRule::Situational);
        assert_eq!(rules.scoring_rule, ScoringRule::Area);
        assert_eq!(rules.tax_rule, TaxRule::None);
        assert_eq!(rules.komi, 6.5);
    }

    #[test]
    fn test_combinations_are_all_supported() {
        let all: Vec<Rules> = AREA_ONLY.combinations(7.0).collect();
        assert_eq!(all.len(), 2);
        for r in &all {
            assert!(AREA_ONLY.supports(r));
            assert_eq!(AREA_ONLY.nearest(r), (*r, true));
        }
    }

    #[test]
    fn test_nan_komi_does_not_affect_support() {
        let desired = Rules {
            komi: f32::NAN,
            ..Rules::tromp_taylor()
        };
        let (rules, supported) = AREA_ONLY.nearest(&Rules {
            ko_rule: KoRule::Situational,
            ..desired
        });
        assert!(supported);
        assert!(rules.komi.is_nan());
        let (_, supported) = AREA_ONLY.nearest(&desired);
        assert!(!supported);
    }

    #[test]
    fn test_parse_rule_names() {
        assert_eq!("Territory".parse::<ScoringRule>().unwrap(), ScoringRule::Territory);
        assert_eq!("spight".parse::<KoRule>().unwrap(), KoRule::Spight);
        assert!("japanese".parse::<TaxRule>().is_err());
    }
}
