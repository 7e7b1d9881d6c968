//! Gateway configuration.
//!
//! The host platform's settings store is modeled as a read-only, typed
//! [`Settings`] value deserialized from TOML (plus a couple of environment
//! overrides applied by the server binary). Capability gating uses the typed
//! [`Capability`] enum rather than string containment, so a typo in
//! configuration fails deserialization instead of silently disabling a
//! feature.

use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

use crate::{
    error::{GatewayError, Result},
    store::OrderStatus,
};

/// Independently toggleable UCP feature surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Agents may submit checkout sessions.
    Checkout,
    /// Agents may browse the product catalog.
    Discovery,
}

/// Gateway settings consumed read-only by the core.
///
/// # Examples
///
/// ```
/// use ucp_gateway::Settings;
///
/// let settings = Settings::from_toml(
///     r#"
///     public_url = "https://shop.example.com"
///     dev_mode = false
///     max_order_total = "250.00"
///     agent_whitelist = ["https://agent.example.com/profile"]
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(settings.agent_whitelist.len(), 1);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Public base URL of this merchant, used to build the discovery
    /// manifest's endpoint URLs.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Enabled capabilities. Both are on by default.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,

    /// Development bypass mode.
    ///
    /// When true, the literal signature `"test"` is accepted without
    /// verification. Off by default; never enable in production.
    #[serde(default)]
    pub dev_mode: bool,

    /// Maximum total for a single agent-initiated order. Zero disables the
    /// cap.
    #[serde(default = "default_max_order_total")]
    pub max_order_total: Decimal,

    /// Agent profile URLs allowed to transact. Empty allows all agents with
    /// a valid signature.
    #[serde(default)]
    pub agent_whitelist: Vec<String>,

    /// Status assigned to orders once payment is confirmed.
    #[serde(default = "default_order_status")]
    pub default_order_status: OrderStatus,
}

fn default_public_url() -> String {
    "https://shop.example.com".to_owned()
}

fn default_capabilities() -> Vec<Capability> {
    vec![Capability::Checkout, Capability::Discovery]
}

fn default_max_order_total() -> Decimal {
    Decimal::from(500)
}

const fn default_order_status() -> OrderStatus {
    OrderStatus::Processing
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
            capabilities: default_capabilities(),
            dev_mode: false,
            max_order_total: default_max_order_total(),
            agent_whitelist: Vec::new(),
            default_order_status: default_order_status(),
        }
    }
}

impl Settings {
    /// Parses settings from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the document is not valid TOML or
    /// holds values of the wrong shape.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| GatewayError::Config(format!("invalid settings: {e}")))
    }

    /// Returns true if `capability` is enabled.
    #[must_use]
    pub fn capability_enabled(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Validates the settings for structural problems.
    ///
    /// Checks that `public_url` and every allow-list entry parse as http(s)
    /// URLs and that the spend cap is not negative.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] naming the offending value.
    pub fn validate(&self) -> Result<()> {
        validate_http_url("public_url", &self.public_url)?;
        for entry in &self.agent_whitelist {
            validate_http_url("agent_whitelist entry", entry)?;
        }
        if self.max_order_total.is_sign_negative() {
            return Err(GatewayError::Config(format!(
                "max_order_total must not be negative, got {}",
                self.max_order_total
            )));
        }
        Ok(())
    }
}

fn validate_http_url(context: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| GatewayError::Config(format!("{context} '{raw}' is not a URL: {e}")))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(GatewayError::Config(format!(
            "{context} '{raw}' must use http or https, got {}",
            url.scheme()
        )));
    }
    Ok(())
}

/// Parses a newline-separated allow-list into profile URLs.
///
/// This is the legacy settings-store form: one URL per line, surrounding
/// whitespace trimmed, blank lines dropped. Used for the
/// `UCP_AGENT_WHITELIST` environment override.
#[must_use]
pub fn parse_allow_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.capability_enabled(Capability::Checkout));
        assert!(settings.capability_enabled(Capability::Discovery));
        assert!(!settings.dev_mode);
        assert_eq!(settings.max_order_total, dec!(500));
        assert!(settings.agent_whitelist.is_empty());
        assert_eq!(settings.default_order_status, OrderStatus::Processing);
    }

    #[test]
    fn test_from_toml_full() {
        let settings = Settings::from_toml(
            r#"
            public_url = "https://store.test"
            capabilities = ["discovery"]
            dev_mode = true
            max_order_total = "100.50"
            agent_whitelist = [
                "https://agent-a.test/profile",
                "https://agent-b.test/profile",
            ]
            default_order_status = "on-hold"
            "#,
        )
        .unwrap();

        assert_eq!(settings.public_url, "https://store.test");
        assert!(!settings.capability_enabled(Capability::Checkout));
        assert!(settings.capability_enabled(Capability::Discovery));
        assert!(settings.dev_mode);
        assert_eq!(settings.max_order_total, dec!(100.50));
        assert_eq!(settings.agent_whitelist.len(), 2);
        assert_eq!(settings.default_order_status, OrderStatus::OnHold);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.max_order_total, dec!(500));
        assert_eq!(settings.capabilities.len(), 2);
    }

    #[test]
    fn test_unknown_capability_is_rejected() {
        let result = Settings::from_toml(r#"capabilities = ["refunds"]"#);
        assert!(result.is_err(), "unknown capability names must fail, not silently disable");
    }

    #[test]
    fn test_validate_rejects_bad_public_url() {
        let settings = Settings { public_url: "not a url".to_owned(), ..Default::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_whitelist_entry() {
        let settings = Settings {
            agent_whitelist: vec!["ftp://agent.test/profile".to_owned()],
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("must use http or https"));
    }

    #[test]
    fn test_validate_rejects_negative_cap() {
        let settings = Settings { max_order_total: dec!(-1), ..Default::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_parse_allow_list_trims_and_drops_blanks() {
        let parsed = parse_allow_list(
            "  https://agent-a.test/profile  \n\n https://agent-b.test/profile\n   \n",
        );
        assert_eq!(
            parsed,
            vec![
                "https://agent-a.test/profile".to_owned(),
                "https://agent-b.test/profile".to_owned()
            ]
        );
    }

    #[test]
    fn test_parse_allow_list_empty_input() {
        assert!(parse_allow_list("").is_empty());
        assert!(parse_allow_list("\n\n  \n").is_empty());
    }
}
