//! Immutable engine configuration.
//!
//! Everything the engine consults (size budget, bot patterns, link
//! classification tables, keyword vocabularies) is carried here and passed
//! down explicitly. Nothing inside the engine reads the environment;
//! [`EngineConfig::from_env`] is for the binary.
//!
//! Env variables (all optional):
//! - `RCA_MAX_CHARS` (default 30000)
//! - `RCA_MIN_CONVERSATION_CHARS` (default 50)
//! - `RCA_IMAGE_CONTEXT_WINDOW` (default 120)
//! - `RCA_SYNTHESIS_TIMEOUT_SECS` (default 120)
//! - `RCA_REDUCE_WITH_MODEL` (default true)
//! - `RCA_CONSOLE_HOSTS`, `RCA_DASHBOARD_HOSTS`: comma-separated host
//!   fragments checked before the built-in link rules

use std::time::Duration;

use crate::errors::ConfigError;
use crate::model::LinkCategory;

pub const DEFAULT_MAX_CHARS: usize = 30_000;
pub const DEFAULT_MIN_CONVERSATION_CHARS: usize = 50;
pub const DEFAULT_IMAGE_CONTEXT_WINDOW: usize = 120;
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chunk budget in characters of rendered conversation.
    pub max_chars: usize,
    /// Below this many characters of human text, no model call is made.
    pub min_conversation_chars: usize,
    /// Characters scanned on each side of an image for error keywords.
    pub image_context_window: usize,
    /// Upper bound for one completion call.
    pub synthesis_timeout: Duration,
    /// Reduce multi-chunk partials with a model call instead of concatenating.
    pub reduce_with_model: bool,
    pub bots: BotRules,
    pub classify: ClassificationRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            min_conversation_chars: DEFAULT_MIN_CONVERSATION_CHARS,
            image_context_window: DEFAULT_IMAGE_CONTEXT_WINDOW,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            reduce_with_model: true,
            bots: BotRules::default(),
            classify: ClassificationRules::default(),
        }
    }
}

impl EngineConfig {
    /// Reads overrides from `RCA_*` variables on top of [`Default`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = env_usize("RCA_MAX_CHARS")? {
            if v == 0 {
                return Err(ConfigError::Zero {
                    var: "RCA_MAX_CHARS",
                });
            }
            cfg.max_chars = v;
        }
        if let Some(v) = env_usize("RCA_MIN_CONVERSATION_CHARS")? {
            cfg.min_conversation_chars = v;
        }
        if let Some(v) = env_usize("RCA_IMAGE_CONTEXT_WINDOW")? {
            cfg.image_context_window = v;
        }
        if let Some(v) = env_usize("RCA_SYNTHESIS_TIMEOUT_SECS")? {
            if v == 0 {
                return Err(ConfigError::Zero {
                    var: "RCA_SYNTHESIS_TIMEOUT_SECS",
                });
            }
            cfg.synthesis_timeout = Duration::from_secs(v as u64);
        }
        if let Some(v) = env_bool("RCA_REDUCE_WITH_MODEL")? {
            cfg.reduce_with_model = v;
        }

        let mut extra = Vec::new();
        for host in env_list("RCA_CONSOLE_HOSTS") {
            extra.push(LinkRule::host(&host, LinkCategory::Console, "Console"));
        }
        for host in env_list("RCA_DASHBOARD_HOSTS") {
            extra.push(LinkRule::host(&host, LinkCategory::Dashboard, "Dashboard"));
        }
        if !extra.is_empty() {
            extra.append(&mut cfg.classify.link_rules);
            cfg.classify.link_rules = extra;
        }

        Ok(cfg)
    }
}

fn env_usize(var: &'static str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: v }),
        _ => Ok(None),
    }
}

fn env_bool(var: &'static str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidBool { var, value: v }),
        },
        _ => Ok(None),
    }
}

fn env_list(var: &str) -> Vec<String> {
    std::env::var(var)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/* ------------------------------------------------------------------------- */
/* Bot detection                                                             */
/* ------------------------------------------------------------------------- */

/// Patterns identifying automation accounts.
#[derive(Debug, Clone)]
pub struct BotRules {
    /// Matched as lower-case substrings of the author.
    pub author_patterns: Vec<String>,
    /// Matched as lower-case prefixes of the message text.
    pub text_prefixes: Vec<String>,
}

impl Default for BotRules {
    fn default() -> Self {
        Self {
            author_patterns: to_strings(&[
                "clickbot",
                "automation #",
                "webhook",
                "form submission",
                "[bot]",
            ]),
            text_prefixes: to_strings(&[
                "clickbot (automations) set",
                "clickbot (form submission)",
                "clickbot (automations) added tag",
                "clickbot (automations) also added",
                "[bot]:",
                "[automation]:",
                "[system]:",
                "[webhook]:",
            ]),
        }
    }
}

impl BotRules {
    pub fn is_bot(&self, author: &str, text: &str) -> bool {
        let author = author.to_lowercase();
        if self.author_patterns.iter().any(|p| author.contains(p.as_str())) {
            return true;
        }
        let text = text.trim_start().to_lowercase();
        self.text_prefixes.iter().any(|p| text.starts_with(p.as_str()))
    }
}

/* ------------------------------------------------------------------------- */
/* Media classification tables                                               */
/* ------------------------------------------------------------------------- */

/// Which part of a URL a [`LinkRule`] inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    Host,
    /// Host plus path, lower-cased.
    HostAndPath,
}

/// One ordered link classification rule; first match wins.
#[derive(Debug, Clone)]
pub struct LinkRule {
    pub needle: String,
    pub scope: MatchScope,
    pub category: LinkCategory,
    pub label: String,
}

impl LinkRule {
    pub fn host(needle: &str, category: LinkCategory, label: &str) -> Self {
        Self {
            needle: needle.to_ascii_lowercase(),
            scope: MatchScope::Host,
            category,
            label: label.to_string(),
        }
    }

    pub fn path(needle: &str, category: LinkCategory, label: &str) -> Self {
        Self {
            needle: needle.to_ascii_lowercase(),
            scope: MatchScope::HostAndPath,
            category,
            label: label.to_string(),
        }
    }

    pub fn matches(&self, host: &str, host_and_path: &str) -> bool {
        match self.scope {
            MatchScope::Host => host.contains(self.needle.as_str()),
            MatchScope::HostAndPath => host_and_path.contains(self.needle.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationRules {
    pub link_rules: Vec<LinkRule>,
    /// Case-insensitive vocabulary marking an image as an error capture.
    pub error_keywords: Vec<String>,
    /// Case-insensitive fragments of screenshot file names.
    pub screenshot_patterns: Vec<String>,
    pub image_extensions: Vec<String>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        use LinkCategory::{Console, Dashboard};
        Self {
            link_rules: vec![
                LinkRule::host("console.aws.amazon.com", Console, "AWS Console"),
                LinkRule::host("console.cloud.google.com", Console, "GCP Console"),
                LinkRule::host("portal.azure.com", Console, "Azure Portal"),
                LinkRule::path("kubernetes-dashboard", Dashboard, "Kubernetes Dashboard"),
                LinkRule::host("grafana", Dashboard, "Grafana"),
                LinkRule::host("datadoghq", Dashboard, "Datadog"),
                LinkRule::host("newrelic", Dashboard, "New Relic"),
                LinkRule::host("kibana", Dashboard, "Kibana"),
                LinkRule::host("splunk", Dashboard, "Splunk"),
                LinkRule::host("console", Console, "Console"),
                LinkRule::host("portal", Console, "Portal"),
                LinkRule::host("admin", Console, "Admin"),
                LinkRule::host("dashboard", Dashboard, "Dashboard"),
                LinkRule::host("monitor", Dashboard, "Monitoring"),
            ],
            error_keywords: to_strings(&[
                "error",
                "exception",
                "fail",
                "stack trace",
                "traceback",
                "panic",
                "fatal",
                "crash",
            ]),
            screenshot_patterns: to_strings(&[
                "screenshot",
                "screen shot",
                "screen_shot",
                "screen-shot",
                "screen-capture",
                "capture",
                "snip",
                "cleanshot",
                "img_",
            ]),
            image_extensions: to_strings(&["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"]),
        }
    }
}

impl ClassificationRules {
    pub fn classify_link(&self, host: &str, host_and_path: &str) -> (LinkCategory, Option<&str>) {
        self.link_rules
            .iter()
            .find(|r| r.matches(host, host_and_path))
            .map(|r| (r.category, Some(r.label.as_str())))
            .unwrap_or((LinkCategory::Other, None))
    }

    pub fn has_error_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.error_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    pub fn looks_like_screenshot(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.screenshot_patterns.iter().any(|p| lower.contains(p.as_str()))
    }

    /// True when the path (query and fragment ignored) ends in an image extension.
    pub fn has_image_extension(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        match path.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_ascii_lowercase();
                self.image_extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_by_author_or_prefix() {
        let bots = BotRules::default();
        assert!(bots.is_bot("ClickBot", "anything"));
        assert!(bots.is_bot("Automation #12", ""));
        assert!(bots.is_bot("jane", "ClickBot (automations) set status to done"));
        assert!(bots.is_bot("relay", "[webhook]: deploy finished"));
        assert!(!bots.is_bot("jane", "I restarted the pod"));
    }

    #[test]
    fn link_rules_are_ordered() {
        let rules = ClassificationRules::default();
        let cases = [
            ("console.aws.amazon.com", "console.aws.amazon.com/ec2", LinkCategory::Console, Some("AWS Console")),
            ("grafana.acme.io", "grafana.acme.io/d/abc", LinkCategory::Dashboard, Some("Grafana")),
            ("k8s.acme.io", "k8s.acme.io/kubernetes-dashboard/pods", LinkCategory::Dashboard, Some("Kubernetes Dashboard")),
            ("admin.acme.io", "admin.acme.io/users", LinkCategory::Console, Some("Admin")),
            ("status.monitor.io", "status.monitor.io", LinkCategory::Dashboard, Some("Monitoring")),
            ("github.com", "github.com/acme/repo", LinkCategory::Other, None),
        ];
        for (host, full, cat, label) in cases {
            assert_eq!(rules.classify_link(host, full), (cat, label), "{full}");
        }
    }

    #[test]
    fn image_extension_ignores_query() {
        let rules = ClassificationRules::default();
        assert!(rules.has_image_extension("/a/b/Shot.PNG?x=1"));
        assert!(!rules.has_image_extension("/a/b/report.pdf"));
        assert!(!rules.has_image_extension("/no-extension"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_chars, 30_000);
        assert_eq!(cfg.min_conversation_chars, 50);
        assert!(cfg.reduce_with_model);
    }
}
