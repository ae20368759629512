//! 定向规则
//!
//! 规则种类是封闭集合，统一由 [`evaluate`] 分派。
//! segment / keyword 产生匹配比例，geo / time_window 是准入条件。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetingRule {
    Segment { terms: Vec<String> },
    Keyword { terms: Vec<String> },
    Geo { countries: Vec<String> },
    /// UTC 小时，`[start_hour, end_hour)`，允许跨零点
    TimeWindow { start_hour: u8, end_hour: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Segment,
    Keyword,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleOutcome {
    Match { dimension: Dimension, fraction: f64 },
    Gate(bool),
}

/// 评估规则所需的请求上下文
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    pub segments: BTreeSet<String>,
    /// 已小写化
    pub keywords: BTreeSet<String>,
    pub country: Option<String>,
    pub hour: u8,
}

impl RuleContext {
    pub fn new(
        segments: BTreeSet<String>,
        keywords: &[String],
        country: Option<&str>,
        hour: u8,
    ) -> Self {
        Self {
            segments,
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            country: country.map(|c| c.to_uppercase()),
            hour,
        }
    }
}

pub fn evaluate(rule: &TargetingRule, ctx: &RuleContext) -> RuleOutcome {
    match rule {
        TargetingRule::Segment { terms } => RuleOutcome::Match {
            dimension: Dimension::Segment,
            fraction: fraction_of(terms, |t| ctx.segments.contains(t)),
        },
        TargetingRule::Keyword { terms } => RuleOutcome::Match {
            dimension: Dimension::Keyword,
            fraction: fraction_of(terms, |t| ctx.keywords.contains(&t.to_lowercase())),
        },
        TargetingRule::Geo { countries } => RuleOutcome::Gate(match &ctx.country {
            Some(country) => countries.iter().any(|c| c.eq_ignore_ascii_case(country)),
            // 未知地区不满足地域定向
            None => false,
        }),
        TargetingRule::TimeWindow {
            start_hour,
            end_hour,
        } => RuleOutcome::Gate(hour_in_window(ctx.hour, *start_hour, *end_hour)),
    }
}

fn fraction_of(terms: &[String], hit: impl Fn(&str) -> bool) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let matched = terms.iter().filter(|t| hit(t)).count();
    matched as f64 / terms.len() as f64
}

fn hour_in_window(hour: u8, start: u8, end: u8) -> bool {
    match start.cmp(&end) {
        std::cmp::Ordering::Equal => true,
        std::cmp::Ordering::Less => hour >= start && hour < end,
        std::cmp::Ordering::Greater => hour >= start || hour < end,
    }
}

/// 一个创意所有规则的汇总结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleSummary {
    pub eligible: bool,
    pub segment_match: f64,
    pub keyword_match: f64,
}

/// 同一维度多条规则取平均；没有该维度规则时为 0
pub fn summarize(rules: &[TargetingRule], ctx: &RuleContext) -> RuleSummary {
    let mut eligible = true;
    let (mut seg_sum, mut seg_n) = (0.0, 0u32);
    let (mut kw_sum, mut kw_n) = (0.0, 0u32);

    for rule in rules {
        match evaluate(rule, ctx) {
            RuleOutcome::Gate(pass) => eligible &= pass,
            RuleOutcome::Match {
                dimension: Dimension::Segment,
                fraction,
            } => {
                seg_sum += fraction;
                seg_n += 1;
            }
            RuleOutcome::Match {
                dimension: Dimension::Keyword,
                fraction,
            } => {
                kw_sum += fraction;
                kw_n += 1;
            }
        }
    }

    RuleSummary {
        eligible,
        segment_match: if seg_n == 0 { 0.0 } else { seg_sum / seg_n as f64 },
        keyword_match: if kw_n == 0 { 0.0 } else { kw_sum / kw_n as f64 },
    }
}
