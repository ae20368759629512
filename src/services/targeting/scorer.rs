//! 相关性打分与排序

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const SEGMENT_WEIGHT: f64 = 0.4;
pub const KEYWORD_WEIGHT: f64 = 0.4;
pub const BID_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub segment_match: f64,
    pub keyword_match: f64,
    pub normalized_bid: f64,
    pub frequency_penalty: f64,
    pub score: f64,
}

/// `pool_max_bid` 为当前合格候选中的最高出价
pub fn score(
    segment_match: f64,
    keyword_match: f64,
    bid_cents: i64,
    pool_max_bid: i64,
    frequency_penalty: f64,
) -> ScoreBreakdown {
    let normalized_bid = if pool_max_bid > 0 {
        (bid_cents.max(0) as f64 / pool_max_bid as f64).min(1.0)
    } else {
        0.0
    };
    let score = SEGMENT_WEIGHT * segment_match + KEYWORD_WEIGHT * keyword_match
        + BID_WEIGHT * normalized_bid
        - frequency_penalty;

    ScoreBreakdown {
        segment_match,
        keyword_match,
        normalized_bid,
        frequency_penalty,
        score,
    }
}

/// 最近展示越多越近，惩罚越大：`weight × Σ(1 − age/period) ÷ cap`
pub fn frequency_penalty(ages_secs: &[f64], period_secs: f64, cap: u32, weight: f64) -> f64 {
    if period_secs <= 0.0 || cap == 0 {
        return 0.0;
    }
    let recency: f64 = ages_secs
        .iter()
        .map(|age| (1.0 - age / period_secs).clamp(0.0, 1.0))
        .sum();
    weight * recency / cap as f64
}

#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub creative_id: String,
    pub campaign_id: String,
    pub bid_cents: i64,
    pub created_at: DateTime<Utc>,
    pub breakdown: ScoreBreakdown,
}

/// 分数降序；同分时出价高者优先，再按创建时间早者、创意 id
pub fn compare(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.breakdown
        .score
        .total_cmp(&a.breakdown.score)
        .then_with(|| b.bid_cents.cmp(&a.bid_cents))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.creative_id.cmp(&b.creative_id))
}

pub fn rank(candidates: &mut [RankedCandidate]) {
    candidates.sort_by(compare);
}
