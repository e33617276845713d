use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

// ── Content Reference ──

/// Which storage backend holds a piece of content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Tier {
    #[serde(rename = "remote")]
    Remote,
    #[serde(rename = "local")]
    Local,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Remote => "remote",
            Tier::Local => "local",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(Tier::Remote),
            "local" => Ok(Tier::Local),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Stable reference to stored bytes. Immutable once created.
///
/// For `Tier::Local` the hash is the SHA-256 of the content. For
/// `Tier::Remote` it is whatever root hash the remote service reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContentReference {
    pub hash: String,
    pub tier: Tier,
    pub size_bytes: u64,
    pub media_type: String,
}

// ── Profile Record ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(rename = "walletAddress")]
    pub identity: Identity,
    #[serde(rename = "username", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<ContentReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "tokensCreated", default)]
    pub created_assets: Vec<AssetRef>,
    #[serde(rename = "tradingStats", default)]
    pub stats: TradingStats,
    #[serde(default)]
    pub preferences: Preferences,
}

impl ProfileRecord {
    /// A fresh record with default stats and preferences.
    pub fn new(identity: Identity, now: DateTime<Utc>) -> Self {
        Self {
            display_name: Some(identity.default_display_name()),
            identity,
            bio: None,
            avatar_url: None,
            avatar_ref: None,
            created_at: now,
            updated_at: now,
            created_assets: Vec::new(),
            stats: TradingStats::default(),
            preferences: Preferences::default(),
        }
    }

    /// Apply field-level updates. Fields absent from `update` are untouched,
    /// as are `identity`, `created_at` and `updated_at`.
    pub fn apply(&mut self, update: ProfileUpdate) {
        let ProfileUpdate {
            display_name,
            bio,
            avatar_url,
            avatar_ref,
            created_assets,
            stats,
            preferences,
        } = update;

        if let Some(v) = display_name {
            self.display_name = Some(v);
        }
        if let Some(v) = bio {
            self.bio = Some(v);
        }
        if let Some(v) = avatar_url {
            self.avatar_url = Some(v);
        }
        if let Some(v) = avatar_ref {
            self.avatar_ref = Some(v);
        }
        if let Some(v) = created_assets {
            self.created_assets = v;
        }
        if let Some(v) = stats {
            self.stats = v;
        }
        if let Some(v) = preferences {
            self.preferences = v;
        }
    }

    /// Insert an asset, or replace the entry with the same address
    /// (compared case-insensitively) in place.
    pub fn upsert_asset(&mut self, asset: AssetRef) {
        match self
            .created_assets
            .iter_mut()
            .find(|existing| existing.same_address(&asset.token_address))
        {
            Some(existing) => *existing = asset,
            None => self.created_assets.push(asset),
        }
    }
}

/// Partial profile used by merge updates. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(rename = "username", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<ContentReference>,
    #[serde(rename = "tokensCreated", default, skip_serializing_if = "Option::is_none")]
    pub created_assets: Option<Vec<AssetRef>>,
    #[serde(rename = "tradingStats", default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TradingStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
}

// ── Created Assets ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub token_address: String,
    pub token_name: String,
    pub token_symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Whether a created token can be traded on its bonding curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingStatus {
    pub is_tradable: bool,
    pub is_legacy: bool,
    pub has_curve: bool,
}

impl AssetRef {
    pub fn same_address(&self, address: &str) -> bool {
        self.token_address.eq_ignore_ascii_case(address)
    }

    pub fn trading_status(&self) -> TradingStatus {
        let has_curve = is_set(self.curve_address.as_deref());
        let has_token = is_set(Some(&self.token_address));
        TradingStatus {
            is_tradable: has_curve && has_token,
            is_legacy: !has_curve,
            has_curve,
        }
    }
}

// Older clients serialized missing addresses as the string "undefined".
fn is_set(address: Option<&str>) -> bool {
    matches!(address, Some(a) if !a.is_empty() && a != "undefined")
}

// ── Trading Stats ──

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradingStats {
    #[serde(default)]
    pub total_trades: u64,
    /// Denominated in the chain's native token.
    #[serde(default)]
    pub total_volume: f64,
    #[serde(default)]
    pub tokens_held: u64,
    #[serde(default)]
    pub favorite_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradingStatsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_trades: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_held: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_tokens: Option<Vec<String>>,
}

impl TradingStats {
    /// Overwrite the supplied counters and stamp `last_trade_at`.
    pub fn merge(&mut self, update: TradingStatsUpdate, now: DateTime<Utc>) {
        if let Some(v) = update.total_trades {
            self.total_trades = v;
        }
        if let Some(v) = update.total_volume {
            self.total_volume = v;
        }
        if let Some(v) = update.tokens_held {
            self.tokens_held = v;
        }
        if let Some(v) = update.favorite_tokens {
            self.favorite_tokens = v;
        }
        self.last_trade_at = Some(now);
    }
}

// ── Preferences ──

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Theme {
    #[default]
    #[serde(rename = "light")]
    Light,
    #[serde(rename = "dark")]
    Dark,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default = "default_true")]
    pub public_profile: bool,
    #[serde(default = "default_true")]
    pub show_trading_stats: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            notifications: true,
            public_profile: true,
            show_trading_stats: true,
        }
    }
}
