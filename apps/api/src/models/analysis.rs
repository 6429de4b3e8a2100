use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Journal tier the model is asked to assess against. Forwarded opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetTier {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl TargetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetTier::Q1 => "Q1",
            TargetTier::Q2 => "Q2",
            TargetTier::Q3 => "Q3",
            TargetTier::Q4 => "Q4",
        }
    }
}

impl fmt::Display for TargetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetTier {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "Q1" => Ok(TargetTier::Q1),
            "Q2" => Ok(TargetTier::Q2),
            "Q3" => Ok(TargetTier::Q3),
            "Q4" => Ok(TargetTier::Q4),
            _ => Err(format!("Unknown target tier '{raw}', expected Q1-Q4")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pdf_file_name: String,
    pub zip_file_name: Option<String>,
    pub target_tier: String,
    pub analysis_text: String,
    pub report_url: Option<String>,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
