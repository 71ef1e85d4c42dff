//! Cache domains and their static policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Closed set of cacheable resource families. Each domain carries its default
/// policy as data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDomain {
    Contacts,
    Appointments,
    MedicalRecords,
    Forms,
    Professionals,
    Conversations,
    Messages,
    AiState,
    AiConfig,
    Dashboard,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePriority {
    Normal,
    High,
}

impl CacheDomain {
    pub const ALL: [CacheDomain; 10] = [
        CacheDomain::Contacts,
        CacheDomain::Appointments,
        CacheDomain::MedicalRecords,
        CacheDomain::Forms,
        CacheDomain::Professionals,
        CacheDomain::Conversations,
        CacheDomain::Messages,
        CacheDomain::AiState,
        CacheDomain::AiConfig,
        CacheDomain::Dashboard,
    ];

    /// Name used inside cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDomain::Contacts => "contacts",
            CacheDomain::Appointments => "appointments",
            CacheDomain::MedicalRecords => "medical_records",
            CacheDomain::Forms => "forms",
            CacheDomain::Professionals => "professionals",
            CacheDomain::Conversations => "conversations",
            CacheDomain::Messages => "messages",
            CacheDomain::AiState => "ai_state",
            CacheDomain::AiConfig => "ai_config",
            CacheDomain::Dashboard => "dashboard",
        }
    }

    /// Accepts both the key form (`medical_records`) and the path form (`medical-records`).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|d| d.as_str() == normalized)
    }

    /// Map the first segment of a resource path to its domain.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "contacts" => Some(CacheDomain::Contacts),
            "appointments" => Some(CacheDomain::Appointments),
            "medical-records" => Some(CacheDomain::MedicalRecords),
            "forms" => Some(CacheDomain::Forms),
            "professionals" => Some(CacheDomain::Professionals),
            "conversations" => Some(CacheDomain::Conversations),
            "messages" => Some(CacheDomain::Messages),
            "ai-config" => Some(CacheDomain::AiConfig),
            "dashboard" => Some(CacheDomain::Dashboard),
            _ => None,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            CacheDomain::Contacts => 300,
            CacheDomain::Appointments => 120,
            CacheDomain::MedicalRecords => 600,
            CacheDomain::Forms => 900,
            CacheDomain::Professionals => 1800,
            CacheDomain::Conversations => 60,
            CacheDomain::Messages => 30,
            CacheDomain::AiState => 30,
            CacheDomain::AiConfig => 300,
            CacheDomain::Dashboard => 60,
        };
        Duration::from_secs(secs)
    }

    pub fn priority(&self) -> CachePriority {
        match self {
            CacheDomain::Conversations | CacheDomain::Messages | CacheDomain::AiState => CachePriority::High,
            _ => CachePriority::Normal,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl core::fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy of one domain. Read-only after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachePolicy {
    pub domain: CacheDomain,
    pub ttl: Duration,
    pub enabled: bool,
    pub priority: CachePriority,
}

/// Overrides read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Global kill switch.
    pub enabled: bool,
    pub disabled_domains: Vec<CacheDomain>,
    pub ttl_overrides: Vec<(CacheDomain, Duration)>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled_domains: Vec::new(),
            ttl_overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachePolicyTable {
    policies: [CachePolicy; 10],
}

impl CachePolicyTable {
    pub fn defaults() -> Self {
        Self::from_settings(&CacheSettings::default())
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        let policies = CacheDomain::ALL.map(|domain| {
            let ttl = settings
                .ttl_overrides
                .iter()
                .rev()
                .find(|(d, _)| *d == domain)
                .map(|(_, ttl)| *ttl)
                .unwrap_or_else(|| domain.default_ttl());

            CachePolicy {
                domain,
                ttl,
                enabled: settings.enabled && !settings.disabled_domains.contains(&domain),
                priority: domain.priority(),
            }
        });
        Self { policies }
    }

    pub fn policy(&self, domain: CacheDomain) -> &CachePolicy {
        &self.policies[domain.index()]
    }

    pub fn is_enabled(&self, domain: CacheDomain) -> bool {
        self.policy(domain).enabled
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachePolicy> {
        self.policies.iter()
    }
}

impl Default for CachePolicyTable {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_domain() {
        let table = CachePolicyTable::defaults();
        for domain in CacheDomain::ALL {
            assert_eq!(table.policy(domain).domain, domain);
            assert!(table.is_enabled(domain));
        }
        assert_eq!(table.policy(CacheDomain::Professionals).ttl, Duration::from_secs(1800));
        assert_eq!(table.policy(CacheDomain::AiState).priority, CachePriority::High);
    }

    #[test]
    fn settings_disable_and_override() {
        let table = CachePolicyTable::from_settings(&CacheSettings {
            enabled: true,
            disabled_domains: vec![CacheDomain::Dashboard],
            ttl_overrides: vec![(CacheDomain::Contacts, Duration::from_secs(42))],
        });
        assert!(!table.is_enabled(CacheDomain::Dashboard));
        assert!(table.is_enabled(CacheDomain::Forms));
        assert_eq!(table.policy(CacheDomain::Contacts).ttl, Duration::from_secs(42));
    }

    #[test]
    fn kill_switch_disables_everything() {
        let table = CachePolicyTable::from_settings(&CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        });
        assert!(table.iter().all(|p| !p.enabled));
    }

    #[test]
    fn domain_parsing_accepts_path_and_key_forms() {
        assert_eq!(CacheDomain::parse("medical-records"), Some(CacheDomain::MedicalRecords));
        assert_eq!(CacheDomain::parse("ai_state"), Some(CacheDomain::AiState));
        assert_eq!(CacheDomain::parse("invoices"), None);
        assert_eq!(CacheDomain::from_path_segment("ai-config"), Some(CacheDomain::AiConfig));
        assert_eq!(CacheDomain::from_path_segment("auth"), None);
    }
}
