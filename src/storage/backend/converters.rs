//! SeaORM Model ⇄ 领域模型转换
//!
//! 枚举列以字符串落库；读回时无法识别的值按最保守的语义处理（风控状态视为 blocked）。

use std::collections::BTreeSet;
use std::str::FromStr;

use sea_orm::ActiveValue::{NotSet, Set};
use tracing::warn;

use crate::storage::models::{
    Attribution, ClickEvent, Commission, CommissionKind, CommissionStatus, EventKind, FraudFlag,
    FraudState, ImpressionEvent, ReasonCode, ShortLink,
};
use migration::entities::{
    attribution, click_event, commission, fraud_flag, impression_event, short_link,
};

pub fn model_to_shortlink(model: short_link::Model) -> ShortLink {
    ShortLink {
        code: model.code,
        destination: model.destination,
        campaign_id: model.campaign_id,
        earner_id: model.earner_id,
        created_at: model.created_at,
        expires_at: model.expires_at,
        active: model.active,
    }
}

pub fn shortlink_to_active_model(link: &ShortLink) -> short_link::ActiveModel {
    short_link::ActiveModel {
        code: Set(link.code.clone()),
        destination: Set(link.destination.clone()),
        campaign_id: Set(link.campaign_id.clone()),
        earner_id: Set(link.earner_id.clone()),
        created_at: Set(link.created_at),
        expires_at: Set(link.expires_at),
        active: Set(link.active),
    }
}

pub fn parse_fraud_state(raw: &str) -> FraudState {
    FraudState::from_str(raw).unwrap_or_else(|_| {
        warn!("Unknown fraud state '{}' in store, treating as blocked", raw);
        FraudState::Blocked
    })
}

pub fn click_to_active_model(event: &ClickEvent) -> click_event::ActiveModel {
    click_event::ActiveModel {
        id: NotSet,
        event_id: Set(event.event_id.clone()),
        short_code: Set(event.short_code.clone()),
        campaign_id: Set(event.campaign_id.clone()),
        actor_id: Set(event.actor_id.clone()),
        device_id: Set(event.device_id.clone()),
        ip_hash: Set(event.ip_hash.clone()),
        earner_id: Set(event.earner_id.clone()),
        fraud_state: Set(event.fraud_state.to_string()),
        fraud_score: Set(event.fraud_score as i32),
        clicked_at: Set(event.clicked_at),
    }
}

pub fn impression_to_active_model(event: &ImpressionEvent) -> impression_event::ActiveModel {
    impression_event::ActiveModel {
        id: NotSet,
        event_id: Set(event.event_id.clone()),
        creative_id: Set(event.creative_id.clone()),
        campaign_id: Set(event.campaign_id.clone()),
        viewer_id: Set(event.viewer_id.clone()),
        thread_id: Set(event.thread_id.clone()),
        earner_id: Set(event.earner_id.clone()),
        score: Set(event.score),
        fraud_state: Set(event.fraud_state.to_string()),
        fraud_score: Set(event.fraud_score as i32),
        served_at: Set(event.served_at),
    }
}

pub fn model_to_click(model: click_event::Model) -> ClickEvent {
    ClickEvent {
        event_id: model.event_id,
        short_code: model.short_code,
        campaign_id: model.campaign_id,
        actor_id: model.actor_id,
        device_id: model.device_id,
        ip_hash: model.ip_hash,
        earner_id: model.earner_id,
        fraud_state: parse_fraud_state(&model.fraud_state),
        fraud_score: model.fraud_score.max(0) as u32,
        clicked_at: model.clicked_at,
    }
}

pub fn model_to_impression(model: impression_event::Model) -> ImpressionEvent {
    ImpressionEvent {
        event_id: model.event_id,
        creative_id: model.creative_id,
        campaign_id: model.campaign_id,
        viewer_id: model.viewer_id,
        thread_id: model.thread_id,
        earner_id: model.earner_id,
        score: model.score,
        fraud_state: parse_fraud_state(&model.fraud_state),
        fraud_score: model.fraud_score.max(0) as u32,
        served_at: model.served_at,
    }
}

pub fn model_to_attribution(model: attribution::Model) -> Attribution {
    Attribution {
        id: model.id,
        conversion_id: model.conversion_id,
        credited_event_id: model.credited_event_id,
        credited_event_kind: EventKind::from_str(&model.credited_event_kind)
            .unwrap_or(EventKind::Click),
        credited_actor: model.credited_actor,
        earner_id: model.earner_id,
        campaign_id: model.campaign_id,
        value_cents: model.value_cents,
        window_days: model.window_days.max(0) as u32,
        attributed_at: model.attributed_at,
    }
}

pub fn attribution_to_active_model(attr: &Attribution) -> attribution::ActiveModel {
    attribution::ActiveModel {
        id: Set(attr.id.clone()),
        conversion_id: Set(attr.conversion_id.clone()),
        credited_event_id: Set(attr.credited_event_id.clone()),
        credited_event_kind: Set(attr.credited_event_kind.to_string()),
        credited_actor: Set(attr.credited_actor.clone()),
        earner_id: Set(attr.earner_id.clone()),
        campaign_id: Set(attr.campaign_id.clone()),
        value_cents: Set(attr.value_cents),
        window_days: Set(attr.window_days as i32),
        attributed_at: Set(attr.attributed_at),
    }
}

pub fn model_to_commission(model: commission::Model) -> Commission {
    Commission {
        id: model.id,
        attribution_id: model.attribution_id,
        kind: CommissionKind::from_str(&model.kind).unwrap_or(CommissionKind::Accrual),
        earner_id: model.earner_id,
        campaign_id: model.campaign_id,
        amount_cents: model.amount_cents,
        rate_applied: model.rate_applied,
        status: CommissionStatus::from_str(&model.status).unwrap_or(CommissionStatus::Pending),
        created_at: model.created_at,
        updated_at: model.updated_at,
        export_position: model.export_seq,
    }
}

pub fn model_to_fraud_flag(model: fraud_flag::Model) -> FraudFlag {
    let reason_codes: BTreeSet<ReasonCode> = serde_json::from_str::<Vec<String>>(&model.reason_codes)
        .unwrap_or_default()
        .iter()
        .filter_map(|code| ReasonCode::from_str(code).ok())
        .collect();

    FraudFlag {
        actor_id: model.actor_id,
        score: model.score.max(0) as u32,
        state: parse_fraud_state(&model.state),
        reason_codes,
        updated_at: model.updated_at,
    }
}

pub fn fraud_flag_to_active_model(flag: &FraudFlag) -> fraud_flag::ActiveModel {
    let codes: Vec<&str> = flag.reason_codes.iter().map(|c| c.as_ref()).collect();
    fraud_flag::ActiveModel {
        actor_id: Set(flag.actor_id.clone()),
        score: Set(flag.score.min(i32::MAX as u32) as i32),
        state: Set(flag.state.to_string()),
        reason_codes: Set(serde_json::to_string(&codes).unwrap_or_else(|_| "[]".to_string())),
        updated_at: Set(flag.updated_at),
    }
}
