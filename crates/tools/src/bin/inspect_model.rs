//! モデル記述ファイルの検査ツール
//!
//! モデルを読み込んで構成を表示する。`--ko` 等を指定すると、そのルールが
//! モデルでそのまま表現できるか、できない場合はどのルールに寄せられるかも表示する。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use netdesc_core::{KoRule, ModelDesc, ModelSummary, Rules, ScoringRule, TaxRule};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "inspect_model")]
#[command(about = "モデル記述ファイル（gzip 可）を読み込んで構成を表示する")]
struct Cli {
    /// モデルファイル（.txt / .txt.gz / 拡張子なし）
    model: PathBuf,

    /// JSON で出力する
    #[arg(long, default_value_t = false)]
    json: bool,

    /// 追加で最大チャンネル数を表示するカーネルサイズ（例: 5 → 5x5）
    #[arg(long)]
    conv_size: Option<usize>,

    /// コウのルール (simple / positional / situational / spight)
    #[arg(long)]
    ko: Option<KoRule>,

    /// 得点計算 (area / territory)
    #[arg(long)]
    scoring: Option<ScoringRule>,

    /// 課税ルール (none / seki / all)
    #[arg(long)]
    tax: Option<TaxRule>,

    /// 複数石の自殺手を合法とする
    #[arg(long)]
    suicide: Option<bool>,

    /// ボタン碁
    #[arg(long)]
    button: Option<bool>,

    /// コミ
    #[arg(long)]
    komi: Option<f32>,
}

impl Cli {
    /// ルール指定があれば Tromp-Taylor を基準に上書きしたルールを返す
    fn requested_rules(&self) -> Option<Rules> {
        let any = self.ko.is_some()
            || self.scoring.is_some()
            || self.tax.is_some()
            || self.suicide.is_some()
            || self.button.is_some()
            || self.komi.is_some();
        if !any {
            return None;
        }
        let base = Rules::tromp_taylor();
        Some(Rules {
            ko_rule: self.ko.unwrap_or(base.ko_rule),
            scoring_rule: self.scoring.unwrap_or(base.scoring_rule),
            tax_rule: self.tax.unwrap_or(base.tax_rule),
            multi_stone_suicide_legal: self.suicide.unwrap_or(base.multi_stone_suicide_legal),
            has_button: self.button.unwrap_or(base.has_button),
            komi: self.komi.unwrap_or(base.komi),
        })
    }
}

#[derive(Serialize)]
struct RulesReport {
    requested: Rules,
    resolved: Rules,
    supported: bool,
}

#[derive(Serialize)]
struct Report {
    model: ModelSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra_conv: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rules: Option<RulesReport>,
}

fn build_report(model: &ModelDesc, cli: &Cli) -> Report {
    Report {
        model: model.summary(),
        extra_conv: cli.conv_size.map(|k| (k, model.max_conv_channels(k, k))),
        rules: cli.requested_rules().map(|requested| {
            let (resolved, supported) = model.supported_rules(&requested);
            RulesReport {
                requested,
                resolved,
                supported,
            }
        }),
    }
}

fn print_text(report: &Report) {
    let m = &report.model;
    println!("name:            {}", m.name);
    println!("version:         {}", m.version);
    println!(
        "blocks:          {} (ordinary {}, dilated {}, gpool {})",
        m.num_blocks, m.num_ordinary_blocks, m.num_dilated_blocks, m.num_gpool_blocks
    );
    println!(
        "channels:        trunk {} / mid {} / regular {} / dilated {} / gpool {}",
        m.trunk_num_channels,
        m.mid_num_channels,
        m.regular_num_channels,
        m.dilated_num_channels,
        m.gpool_num_channels
    );
    println!("inputs:          spatial {} / global {}", m.num_input_channels, m.num_input_global_channels);
    println!(
        "outputs:         value {} / score {} / ownership {}",
        m.num_value_channels, m.num_score_value_channels, m.num_ownership_channels
    );
    println!("conv layers:     {}", m.num_conv_layers);
    println!("max conv ch 3x3: {}", m.max_conv_channels_3x3);
    println!("max conv ch 1x1: {}", m.max_conv_channels_1x1);
    if let Some((k, c)) = report.extra_conv {
        println!("max conv ch {k}x{k}: {c}");
    }
    if let Some(rules) = &report.rules {
        println!("requested rules: {}", rules.requested);
        if rules.supported {
            println!("rules:           supported as-is");
        } else {
            println!("rules:           not supported, nearest is {}", rules.resolved);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let model = ModelDesc::load_from_file_maybe_gzipped(&cli.model)
        .with_context(|| format!("failed to load {}", cli.model.display()))?;

    let report = build_report(&model, &cli);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }
    Ok(())
}
