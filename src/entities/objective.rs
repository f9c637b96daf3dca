// 🎯 Objective Entity - the "O" in OKR
// Objectives sit somewhere in the org hierarchy: region → sub-region → service line → service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OkrError, OkrResult};

// ============================================================================
// ORG HIERARCHY
// ============================================================================

/// Position of an objective in the organization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl OrgUnit {
    pub fn new(region: &str) -> Self {
        OrgUnit {
            region: region.trim().to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: add sub-region
    pub fn with_sub_region(mut self, sub_region: &str) -> Self {
        self.sub_region = non_blank(sub_region);
        self
    }

    /// Builder pattern: add service line
    pub fn with_service_line(mut self, service_line: &str) -> Self {
        self.service_line = non_blank(service_line);
        self
    }

    /// Builder pattern: add service
    pub fn with_service(mut self, service: &str) -> Self {
        self.service = non_blank(service);
        self
    }

    /// "Sul / RS / Consultoria / Auditoria" for display
    pub fn path(&self) -> String {
        let mut parts = vec![self.region.as_str()];
        parts.extend(self.sub_region.as_deref());
        parts.extend(self.service_line.as_deref());
        parts.extend(self.service.as_deref());
        parts.join(" / ")
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Dashboard filter over the hierarchy. Unset levels match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyFilter {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub sub_region: Option<String>,
    #[serde(default)]
    pub service_line: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

impl HierarchyFilter {
    pub fn is_empty(&self) -> bool {
        [&self.region, &self.sub_region, &self.service_line, &self.service]
            .iter()
            .all(|level| level.as_deref().map(str::trim).unwrap_or("").is_empty())
    }

    /// Case-insensitive match, level by level
    pub fn matches(&self, unit: &OrgUnit) -> bool {
        level_matches(&self.region, Some(unit.region.as_str()))
            && level_matches(&self.sub_region, unit.sub_region.as_deref())
            && level_matches(&self.service_line, unit.service_line.as_deref())
            && level_matches(&self.service, unit.service.as_deref())
    }
}

fn level_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
    match wanted.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(w) => actual
            .map(|a| a.trim().to_lowercase() == w.to_lowercase())
            .unwrap_or(false),
    }
}

// ============================================================================
// OBJECTIVE ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub org_unit: OrgUnit,
    #[serde(default)]
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl Objective {
    pub fn new(title: &str, org_unit: OrgUnit) -> OkrResult<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(OkrError::validation("title", "Required field is empty"));
        }
        if org_unit.region.is_empty() {
            return Err(OkrError::validation("region", "Required field is empty"));
        }

        Ok(Objective {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: String::new(),
            org_unit,
            owner: String::new(),
            created_at: Utc::now(),
        })
    }

    /// Builder pattern: add description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.trim().to_string();
        self
    }

    /// Builder pattern: add owner
    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = owner.trim().to_string();
        self
    }
}
