//! 请求方身份
//!
//! 有账号时 actor 就是账号，设备指纹另外记录用于共享设备检测；
//! 匿名请求以设备指纹 `d:<xxh64(ip|ua)>` 作为 actor。

use xxhash_rust::xxh64::xxh64;

const FINGERPRINT_SEED: u64 = 0x00c0_ffee;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorIdentity {
    pub actor_id: String,
    /// 仅当 actor 是账号时存在
    pub device_id: Option<String>,
    pub ip_hash: Option<String>,
}

pub fn device_fingerprint(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let raw = format!("{}|{}", ip.unwrap_or(""), user_agent.unwrap_or(""));
    format!("d:{:016x}", xxh64(raw.as_bytes(), FINGERPRINT_SEED))
}

pub fn ip_hash(ip: &str) -> String {
    format!("{:016x}", xxh64(ip.as_bytes(), FINGERPRINT_SEED))
}

impl ActorIdentity {
    pub fn derive(account: Option<&str>, ip: Option<&str>, user_agent: Option<&str>) -> Self {
        let fingerprint = device_fingerprint(ip, user_agent);
        let account = account.map(str::trim).filter(|a| !a.is_empty());
        match account {
            Some(account) => Self {
                actor_id: account.to_string(),
                device_id: Some(fingerprint),
                ip_hash: ip.map(ip_hash),
            },
            None => Self {
                actor_id: fingerprint,
                device_id: None,
                ip_hash: ip.map(ip_hash),
            },
        }
    }
}
