//! OpenVPN configuration sanitizer
//!
//! Imported configuration text is attacker controlled. Several directives
//! let the OpenVPN runtime run external programs or take credentials from a
//! source the helper does not manage, so every line starting with one of
//! them is dropped before the configuration is written.
//!
//! Matching is deliberately narrow: the trimmed line must start with the
//! literal prefix, compared case-sensitively. A keyword that only appears
//! mid-line, or in a different case, is kept.

use tracing::debug;

/// Why a directive is forbidden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Caller-supplied credential source; the helper appends its own
    Credentials,
    /// Relaxes the external-program execution policy
    ScriptSecurity,
    /// Runs a program before or after the tunnel comes up
    ScriptHook,
    /// Loads a shared object into the daemon
    Plugin,
    /// Exposes the management interface
    Management,
    /// Added through configuration
    Custom,
}

/// How a rule is compared against a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Literal, case-sensitive prefix of the whitespace-trimmed line
    LinePrefix,
}

/// One forbidden-directive rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveRule {
    pub prefix: String,
    pub kind: DirectiveKind,
    pub strategy: MatchStrategy,
}

impl DirectiveRule {
    pub fn new(prefix: impl Into<String>, kind: DirectiveKind) -> Self {
        Self {
            prefix: prefix.into(),
            kind,
            strategy: MatchStrategy::LinePrefix,
        }
    }

    /// Whether `line` is caught by this rule
    pub fn matches(&self, line: &str) -> bool {
        match self.strategy {
            MatchStrategy::LinePrefix => line.trim().starts_with(self.prefix.as_str()),
        }
    }
}

/// Built-in forbidden prefixes
const DEFAULT_RULES: &[(&str, DirectiveKind)] = &[
    ("auth-user-pass", DirectiveKind::Credentials),
    ("script-security", DirectiveKind::ScriptSecurity),
    ("up ", DirectiveKind::ScriptHook),
    ("down ", DirectiveKind::ScriptHook),
    ("plugin ", DirectiveKind::Plugin),
    ("management ", DirectiveKind::Management),
];

/// Set of forbidden-directive rules applied to imported configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectivePolicy {
    rules: Vec<DirectiveRule>,
}

impl Default for DirectivePolicy {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES
                .iter()
                .map(|(prefix, kind)| DirectiveRule::new(*prefix, *kind))
                .collect(),
        }
    }
}

impl DirectivePolicy {
    /// Default rules plus extra literal prefixes
    pub fn with_extra_prefixes<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut policy = Self::default();
        for prefix in extra {
            let prefix = prefix.into();
            // An empty prefix would match every line
            if !prefix.is_empty() {
                policy.rules.push(DirectiveRule::new(prefix, DirectiveKind::Custom));
            }
        }
        policy
    }

    pub fn rules(&self) -> &[DirectiveRule] {
        &self.rules
    }

    /// First rule that forbids `line`, if any
    pub fn violation(&self, line: &str) -> Option<&DirectiveRule> {
        self.rules.iter().find(|rule| rule.matches(line))
    }

    /// Drop every forbidden line, keeping the rest verbatim and in order
    ///
    /// The output always ends with a newline.
    pub fn sanitize(&self, raw: &str) -> String {
        let mut kept = Vec::new();

        // Lines end at `\n` or `\r\n` only. A lone `\r`, `\x0b` or `\x0c` stays
        // inside its line, where OpenVPN also reads it as whitespace.
        for (index, line) in raw.lines().enumerate() {
            if let Some(rule) = self.violation(line) {
                debug!("Stripped line {} ({:?} directive)", index + 1, rule.kind);
                continue;
            }
            kept.push(line);
        }

        let mut cleaned = kept.join("\n");
        cleaned.push('\n');
        cleaned
    }
}

/// Sanitize with the built-in rules
pub fn sanitize(raw: &str) -> String {
    DirectivePolicy::default().sanitize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_forbidden_directives() {
        let raw = "client\n\
                   remote vpn.example.com 1194\n\
                   auth-user-pass\n\
                   script-security 2\n\
                   up /tmp/evil.sh\n\
                   down /tmp/evil.sh\n\
                   plugin /tmp/evil.so\n\
                   management 0.0.0.0 7505\n\
                   dev tun\n";

        assert_eq!(sanitize(raw), "client\nremote vpn.example.com 1194\ndev tun\n");
    }

    #[test]
    fn test_leading_whitespace_is_trimmed_for_matching() {
        let raw = "  auth-user-pass /root/creds\n\tscript-security 3\ncipher AES-256-GCM  \n";
        assert_eq!(sanitize(raw), "cipher AES-256-GCM  \n");
    }

    #[test]
    fn test_kept_lines_are_verbatim() {
        let raw = "\n  remote a 1194\n\n# comment\n\tproto udp";
        assert_eq!(sanitize(raw), "\n  remote a 1194\n\n# comment\n\tproto udp\n");
    }

    #[test]
    fn test_trailing_newline_guaranteed() {
        assert_eq!(sanitize(""), "\n");
        assert_eq!(sanitize("client"), "client\n");
        assert_eq!(sanitize("client\n"), "client\n");
        assert_eq!(sanitize("auth-user-pass\n"), "\n");
    }

    #[test]
    fn test_crlf_input() {
        assert_eq!(sanitize("client\r\nup /x\r\ndev tun\r\n"), "client\ndev tun\n");
    }

    #[test]
    fn test_lone_carriage_return_does_not_split_lines() {
        assert_eq!(sanitize("client\rup /x\n"), "client\rup /x\n");
        assert_eq!(sanitize("client\x0bup /x\x0cdown /y\n"), "client\x0bup /x\x0cdown /y\n");
        // A line that starts with the directive is still caught
        assert_eq!(sanitize("client\r\nup /x\rdev tun\n"), "client\n");
    }

    #[test]
    fn test_prefix_family_is_caught() {
        // Anything starting with the credential prefix goes, including verify hooks
        assert_eq!(sanitize("auth-user-pass-verify /x via-env\n"), "\n");
    }

    #[test]
    fn test_known_bypass_surface_is_preserved() {
        // Case variants are not matched
        assert_eq!(sanitize("Auth-User-Pass\n"), "Auth-User-Pass\n");
        // Mid-line occurrences are not matched
        assert_eq!(sanitize("# up /bin/sh\n"), "# up /bin/sh\n");
        assert_eq!(sanitize("setenv X auth-user-pass\n"), "setenv X auth-user-pass\n");
        // Hook prefixes require a trailing space
        assert_eq!(sanitize("up\t/bin/sh\n"), "up\t/bin/sh\n");
        assert_eq!(sanitize("upload-thing\n"), "upload-thing\n");
        // Directives not in the list are kept
        assert_eq!(sanitize("route-up /bin/sh\n"), "route-up /bin/sh\n");
    }

    #[test]
    fn test_no_forbidden_line_survives() {
        let policy = DirectivePolicy::default();
        let raw = "remote a\n up x\nplugin y\n   management z 1\nproto tcp\nscript-security 2\n";
        let cleaned = policy.sanitize(raw);

        for line in cleaned.lines() {
            assert!(policy.violation(line).is_none(), "survived: {:?}", line);
        }
        assert_eq!(cleaned, "remote a\nproto tcp\n");
    }

    #[test]
    fn test_extra_prefixes() {
        let policy = DirectivePolicy::with_extra_prefixes(["route-up ", ""]);
        assert_eq!(policy.rules().len(), DEFAULT_RULES.len() + 1);
        assert_eq!(
            policy.violation("route-up /bin/sh").map(|r| r.kind),
            Some(DirectiveKind::Custom)
        );
        assert_eq!(policy.sanitize("route-up /x\nclient\n"), "client\n");
    }
}
