//! Wire types of the dashboard backend. Field names follow the backend's JSON.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Traits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_cuerpo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tamano_pechos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tamano_culo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_cabello: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piercings: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tatuajes: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    #[serde(rename = "nombre", alias = "modelo")]
    pub name: String,
    #[serde(default)]
    pub telegram_user_id: Option<String>,
    #[serde(default)]
    pub telegram_username: Option<String>,
    /// Free-form publishing schedule stored by the backend.
    #[serde(rename = "configuracion_distribucion", default)]
    pub distribution: Option<serde_json::Value>,
    #[serde(default)]
    pub profile_photo: Option<String>,
    #[serde(rename = "caracteristicas", default)]
    pub traits: Option<Traits>,
    #[serde(default)]
    pub striphours_url: Option<String>,
    #[serde(default)]
    pub striphours_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    #[serde(rename = "nombre")]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub has_worker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlatform {
    #[serde(rename = "nombre")]
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    #[serde(rename = "nombre")]
    pub name: String,
    pub path: String,
    pub size: u64,
    pub lines: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCode {
    #[serde(rename = "nombre")]
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMetric {
    #[serde(rename = "fecha")]
    pub date: String,
    pub best_rank: i64,
    pub avg_rank: i64,
    pub best_gender_rank: i64,
    pub avg_gender_rank: i64,
    pub most_viewers: i64,
    pub avg_viewers: f64,
    pub starting_followers: i64,
    pub ending_followers: i64,
    pub growth: i64,
    pub total_segments: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(rename = "modelo")]
    pub model: String,
    pub total_days: u64,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub daily_metrics: Vec<DailyMetric>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// Status payload returned by mutating endpoints (`delete`, `sync`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}
