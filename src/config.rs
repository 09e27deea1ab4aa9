use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use leadsync_core::Tenant;
use leadsync_core::crm::CrmConfig;
use leadsync_core::tenant::CalendarConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds after a successful slot sync during which inbound echoes and
    /// outbound updates for that slot are suppressed.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    #[serde(default)]
    pub crm: CrmConfig,

    /// Tenants seeded at startup.
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

fn default_port() -> u16 {
    4280
}

fn default_cooldown_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize)]
pub struct TenantConfig {
    pub name: String,
    pub location_id: String,
    pub api_key: Option<String>,
    pub timezone: Tz,
    pub appointment_calendar: Option<CalendarConfig>,
    pub install_calendar: Option<CalendarConfig>,
    #[serde(default)]
    pub suspended: bool,
}

impl TenantConfig {
    pub fn into_tenant(self) -> Tenant {
        let mut tenant = Tenant::new(&self.name, &self.location_id, self.timezone);
        tenant.api_key = self.api_key;
        tenant.appointment_calendar = self.appointment_calendar;
        tenant.install_calendar = self.install_calendar;
        tenant.suspended = self.suspended;
        tenant
    }
}

/// Load config from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Config file not found at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.port, 4280);
        assert_eq!(config.cooldown_secs, 120);
        assert!(config.tenants.is_empty());
    }

    #[test]
    fn parses_tenant_with_calendars() {
        let config: Config = toml::from_str(
            r#"
            port = 9000

            [[tenants]]
            name = "Acme Floors"
            location_id = "loc_abc"
            timezone = "America/Chicago"

            [tenants.appointment_calendar]
            calendar_id = "cal_1"
            title_template = "{{full_name}} - Estimate"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        let tenant = &config.tenants[0];
        assert_eq!(tenant.timezone, chrono_tz::America::Chicago);
        assert_eq!(
            tenant
                .appointment_calendar
                .as_ref()
                .unwrap()
                .title_template
                .as_deref(),
            Some("{{full_name}} - Estimate")
        );
    }
}
