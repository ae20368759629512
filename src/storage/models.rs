use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 短链接：短码 → 目标地址 + 活动信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortLink {
    pub code: String,
    pub destination: String,
    pub campaign_id: String,
    /// 链接归属的推广者（佣金收款方）
    pub earner_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ShortLink {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// 已过期或已停用的链接都不再跳转
    pub fn is_servable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired_at(now)
    }
}

/// 风控状态，只会自动向 Blocked 方向移动
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FraudState {
    #[default]
    Clean,
    Suspect,
    Blocked,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReasonCode {
    VelocityElevated,
    VelocityExcessive,
    ConversionRatioAnomaly,
    SharedDevice,
    SelfReferral,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    Click,
    Impression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub event_id: String,
    pub short_code: String,
    pub campaign_id: String,
    pub actor_id: String,
    pub device_id: Option<String>,
    pub ip_hash: Option<String>,
    pub earner_id: String,
    /// 点击发生时 actor 的风控状态，决定该点击能否参与归因
    pub fraud_state: FraudState,
    pub fraud_score: u32,
    pub clicked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpressionEvent {
    pub event_id: String,
    pub creative_id: String,
    pub campaign_id: String,
    pub viewer_id: String,
    pub thread_id: String,
    pub earner_id: String,
    pub score: f64,
    pub fraud_state: FraudState,
    pub fraud_score: u32,
    pub served_at: DateTime<Utc>,
}

/// 归因候选：点击或曝光的统一视图
#[derive(Debug, Clone, PartialEq)]
pub struct Touch {
    pub event_id: String,
    pub kind: EventKind,
    pub actor_id: String,
    pub earner_id: String,
    pub campaign_id: String,
    pub fraud_state: FraudState,
    pub at: DateTime<Utc>,
    pub row_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub id: String,
    pub conversion_id: String,
    pub credited_event_id: String,
    pub credited_event_kind: EventKind,
    pub credited_actor: String,
    pub earner_id: String,
    pub campaign_id: String,
    pub value_cents: i64,
    pub window_days: u32,
    pub attributed_at: DateTime<Utc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommissionKind {
    Accrual,
    Reversal,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Paid,
    Reversed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: String,
    pub attribution_id: String,
    pub kind: CommissionKind,
    pub earner_id: String,
    pub campaign_id: String,
    pub amount_cents: i64,
    pub rate_applied: String,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 导出游标位置；发布之前为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_position: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudFlag {
    pub actor_id: String,
    pub score: u32,
    pub state: FraudState,
    pub reason_codes: BTreeSet<ReasonCode>,
    pub updated_at: DateTime<Utc>,
}

impl FraudFlag {
    pub fn clean(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            score: 0,
            state: FraudState::Clean,
            reason_codes: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }
}

/// 结算方上报的转化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub conversion_id: String,
    pub campaign_id: String,
    pub buyer_id: String,
    pub value_cents: i64,
}

/// 离线人群包的一次导入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDefinition {
    pub id: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn link(expires_at: Option<DateTime<Utc>>, active: bool) -> ShortLink {
        ShortLink {
            code: "abc123".into(),
            destination: "https://merchant.example/item/9".into(),
            campaign_id: "C1".into(),
            earner_id: "E1".into(),
            created_at: Utc::now(),
            expires_at,
            active,
        }
    }

    #[test]
    fn test_servable_link() {
        let now = Utc::now();
        assert!(link(None, true).is_servable_at(now));
        assert!(link(Some(now + Duration::hours(1)), true).is_servable_at(now));
        assert!(!link(Some(now - Duration::seconds(1)), true).is_servable_at(now));
        assert!(!link(None, false).is_servable_at(now));
    }

    #[test]
    fn test_fraud_state_ordering() {
        assert!(FraudState::Clean < FraudState::Suspect);
        assert!(FraudState::Suspect < FraudState::Blocked);
        assert_eq!(FraudState::Clean.max(FraudState::Blocked), FraudState::Blocked);
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(ReasonCode::SelfReferral.to_string(), "self_referral");
        assert_eq!(
            ReasonCode::from_str("velocity_excessive").unwrap(),
            ReasonCode::VelocityExcessive
        );
        assert_eq!(FraudState::from_str("suspect").unwrap(), FraudState::Suspect);
        assert_eq!(EventKind::Impression.as_ref(), "impression");
        assert_eq!(CommissionStatus::Reversed.to_string(), "reversed");
    }

    #[test]
    fn test_serde_forms() {
        let json = serde_json::to_string(&FraudState::Blocked).unwrap();
        assert_eq!(json, "\"blocked\"");
        let json = serde_json::to_string(&ReasonCode::SharedDevice).unwrap();
        assert_eq!(json, "\"shared_device\"");
    }
}
