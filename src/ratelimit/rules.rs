//! Route rules configuration and matching.
//!
//! Route rules describe the IP throttles applied to incoming requests. Each
//! rule names the path it protects, the purpose prefix used for its identity
//! keys and the policy to enforce. Rules are checked in configuration order.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::policy::{PolicyConfig, RateLimitPolicy, TimeUnit};
use crate::error::{QuotaError, Result};

/// Configuration for the request gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Only requests whose path starts with this prefix are throttled
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Throttles, checked in order
    #[serde(default = "default_rules")]
    pub rules: Vec<RouteRule>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            rules: default_rules(),
        }
    }
}

fn default_path_prefix() -> String {
    "/api".to_string()
}

fn default_rules() -> Vec<RouteRule> {
    vec![
        RouteRule {
            name: "password_update".to_string(),
            key_prefix: "password_upd".to_string(),
            path_contains: Some("/api/user/update-password".to_string()),
            rate_limit: PolicyConfig::new(7, TimeUnit::Hour, 1),
            enforce: true,
        },
        RouteRule {
            name: "quiz_questions".to_string(),
            key_prefix: "q_limit".to_string(),
            path_contains: Some("/api/quiz/questions".to_string()),
            rate_limit: PolicyConfig::new(50, TimeUnit::Minute, 1),
            enforce: true,
        },
        RouteRule {
            name: "global_api".to_string(),
            key_prefix: "global_api".to_string(),
            path_contains: None,
            rate_limit: PolicyConfig::new(300, TimeUnit::Minute, 1),
            enforce: true,
        },
    ]
}

fn default_enforce() -> bool {
    true
}

/// A single IP throttle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Name used in logs and decisions
    pub name: String,
    /// Purpose part of the identity key (`{key_prefix}_{ip}`)
    pub key_prefix: String,
    /// Substring the request path must contain; matches every path if unset
    #[serde(default)]
    pub path_contains: Option<String>,
    /// Policy to enforce
    pub rate_limit: PolicyConfig,
    /// When false the rule still counts requests but never blocks
    #[serde(default = "default_enforce")]
    pub enforce: bool,
}

impl RouteRule {
    /// Whether this rule applies to `path`.
    pub fn matches(&self, path: &str) -> bool {
        match &self.path_contains {
            Some(fragment) => path.contains(fragment.as_str()),
            None => true,
        }
    }
}

/// A rule paired with its validated policy.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: RouteRule,
    pub policy: RateLimitPolicy,
}

/// Validated, ordered set of route rules.
#[derive(Debug, Clone)]
pub struct RouteRules {
    path_prefix: String,
    rules: Vec<CompiledRule>,
}

impl RouteRules {
    /// Validate every rule's policy.
    pub fn compile(config: &GateConfig) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(|rule| -> Result<CompiledRule> {
                let policy = rule.rate_limit.to_policy().map_err(|e| {
                    QuotaError::Config(format!("rule '{}': {}", rule.name, e))
                })?;
                Ok(CompiledRule {
                    rule: rule.clone(),
                    policy,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            rules = rules.len(),
            path_prefix = %config.path_prefix,
            "Compiled route rules"
        );

        Ok(Self {
            path_prefix: config.path_prefix.clone(),
            rules,
        })
    }

    /// Parse and compile a YAML gate configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| QuotaError::Config(format!("Failed to parse route rules: {}", e)))?;
        Self::compile(&config)
    }

    /// Rules that apply to `path`, in order.
    pub fn matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a CompiledRule> + 'a {
        let in_scope = path.starts_with(self.path_prefix.as_str());
        self.rules
            .iter()
            .filter(move |compiled| in_scope && compiled.rule.matches(path))
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<'a>(rules: &'a RouteRules, path: &'a str) -> Vec<&'a str> {
        rules.matching(path).map(|c| c.rule.name.as_str()).collect()
    }

    #[test]
    fn test_default_rules() {
        let rules = RouteRules::compile(&GateConfig::default()).unwrap();
        assert_eq!(rules.len(), 3);

        let password = &rules.rules()[0];
        assert_eq!(password.policy.limit(), 7);
        assert_eq!(password.policy.window_millis(), 3_600_000);
    }

    #[test]
    fn test_matching_order_and_scope() {
        let rules = RouteRules::compile(&GateConfig::default()).unwrap();

        assert_eq!(
            names(&rules, "/api/user/update-password"),
            vec!["password_update", "global_api"]
        );
        assert_eq!(
            names(&rules, "/api/quiz/questions?module=3"),
            vec!["quiz_questions", "global_api"]
        );
        assert_eq!(names(&rules, "/api/feedback"), vec!["global_api"]);
        assert!(names(&rules, "/dashboard").is_empty());
    }

    #[test]
    fn test_parse_rules_yaml() {
        let yaml = r#"
path_prefix: /v1
rules:
  - name: chat
    key_prefix: chat_ip
    path_contains: /v1/chat
    rate_limit:
      limit: 10
      unit: minute
  - name: baseline
    key_prefix: global
    enforce: false
    rate_limit:
      limit: 100
      unit: second
      units: 30
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.rules()[0].rule.enforce);
        assert!(!rules.rules()[1].rule.enforce);
        assert_eq!(rules.rules()[1].policy.window_millis(), 30_000);
        assert_eq!(names(&rules, "/v1/chat/send"), vec!["chat", "baseline"]);
        assert!(names(&rules, "/api/chat").is_empty());
    }

    #[test]
    fn test_missing_rules_use_defaults() {
        let rules = RouteRules::from_yaml("path_prefix: /api\n").unwrap();
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn test_invalid_rule_policy_rejected() {
        let yaml = r#"
rules:
  - name: broken
    key_prefix: broken
    rate_limit:
      limit: 1
      unit: minute
      units: 0
"#;
        let err = RouteRules::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, QuotaError::Config(msg) if msg.contains("broken")));
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let yaml = r#"
rules:
  - name: r
    key_prefix: r
    rate_limit:
      limit: 1
      unit: fortnight
"#;
        assert!(matches!(RouteRules::from_yaml(yaml), Err(QuotaError::Config(_))));
    }
}
