//! robots.txt compliance and the per-host policy cache.
//!
//! Policies are resolved once per host, cached with a TTL, and consulted
//! before any network call for the target URL. A robots.txt that cannot be
//! fetched or parsed is treated as allow-all, matching the courteous-crawler
//! convention: absence of a policy is not a prohibition.
//!
//! The cache also keeps per-host last-request times so the client can space
//! requests by a minimum delay. Writes are idempotent, so concurrent workers
//! racing to populate a host entry are harmless.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Parsed `Disallow`/`Allow` rule groups from one robots.txt.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    groups: Vec<Group>,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    path: String,
}

impl RobotsPolicy {
    /// Line-based parse of a robots.txt body. Unknown directives and
    /// comments are skipped.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_rules = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            if key.eq_ignore_ascii_case("user-agent") {
                // A user-agent line after rules starts a new group.
                if in_rules {
                    groups.push(std::mem::take(&mut current));
                    in_rules = false;
                }
                current.agents.push(value.to_ascii_lowercase());
            } else if key.eq_ignore_ascii_case("disallow") || key.eq_ignore_ascii_case("allow") {
                if current.agents.is_empty() {
                    continue;
                }
                in_rules = true;
                // An empty Disallow means "allow everything"; it carries no rule.
                if !value.is_empty() {
                    current.rules.push(Rule {
                        allow: key.eq_ignore_ascii_case("allow"),
                        path: value.to_owned(),
                    });
                }
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self { groups }
    }

    /// Whether `user_agent` may fetch `path`.
    ///
    /// Group selection: the group whose agent token is the longest substring
    /// match of the user agent wins; `*` is the fallback. Within a group the
    /// longest matching path rule wins, with `Allow` breaking ties. No
    /// matching rule means allowed.
    #[must_use]
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let ua = user_agent.to_ascii_lowercase();

        let group = self
            .groups
            .iter()
            .filter_map(|g| {
                g.agents
                    .iter()
                    .filter(|agent| *agent == "*" || ua.contains(agent.as_str()))
                    .map(|agent| if agent == "*" { 0 } else { agent.len() })
                    .max()
                    .map(|specificity| (specificity, g))
            })
            .max_by_key(|(specificity, _)| *specificity)
            .map(|(_, g)| g);

        let Some(group) = group else {
            return true;
        };

        group
            .rules
            .iter()
            .filter(|rule| path.starts_with(rule.path.as_str()))
            .max_by_key(|rule| (rule.path.len(), rule.allow))
            .is_none_or(|rule| rule.allow)
    }
}

struct HostState {
    /// `None` means robots.txt was unreachable: allow-all.
    policy: Option<RobotsPolicy>,
    /// `None` until the policy has been resolved at least once.
    fetched_at: Option<Instant>,
    last_request_at: Option<Instant>,
}

/// Bounded per-host policy cache with TTL, shared by fetch workers.
pub struct PolicyCache {
    hosts: Mutex<HashMap<String, HostState>>,
    ttl: Duration,
    max_hosts: usize,
}

impl PolicyCache {
    #[must_use]
    pub fn new(ttl: Duration, max_hosts: usize) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            ttl,
            max_hosts: max_hosts.max(1),
        }
    }

    /// Whether `url` may be fetched, resolving and caching the host policy
    /// as needed. The policy fetch itself happens at most once per host per
    /// TTL window.
    pub async fn is_allowed(
        &self,
        http: &reqwest::Client,
        user_agent: &str,
        url: &reqwest::Url,
    ) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        let host = host.to_owned();

        {
            let hosts = self.hosts.lock().await;
            if let Some(state) = hosts.get(&host) {
                if state
                    .fetched_at
                    .is_some_and(|at| at.elapsed() < self.ttl)
                {
                    return Self::check(state, user_agent, url.path());
                }
            }
        }

        // Resolve outside the lock; concurrent resolvers for the same host
        // just overwrite each other with equivalent data.
        let policy = Self::resolve(http, url).await;

        let mut hosts = self.hosts.lock().await;
        if hosts.len() >= self.max_hosts && !hosts.contains_key(&host) {
            evict_oldest(&mut hosts);
        }
        let last_request_at = hosts.get(&host).and_then(|s| s.last_request_at);
        let state = HostState {
            policy,
            fetched_at: Some(Instant::now()),
            last_request_at,
        };
        let allowed = Self::check(&state, user_agent, url.path());
        hosts.insert(host, state);
        allowed
    }

    fn check(state: &HostState, user_agent: &str, path: &str) -> bool {
        state
            .policy
            .as_ref()
            .is_none_or(|p| p.is_allowed(user_agent, path))
    }

    async fn resolve(http: &reqwest::Client, url: &reqwest::Url) -> Option<RobotsPolicy> {
        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);

        match http.get(robots_url.clone()).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => Some(RobotsPolicy::parse(&body)),
                Err(e) => {
                    tracing::warn!(url = %robots_url, error = %e, "robots.txt body unreadable, assuming allow-all");
                    None
                }
            },
            Ok(response) => {
                tracing::debug!(url = %robots_url, status = %response.status(), "no robots.txt, assuming allow-all");
                None
            }
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "robots.txt fetch failed, assuming allow-all");
                None
            }
        }
    }

    /// Sleep until `min_delay` has passed since the last request to `host`,
    /// then record the new request time.
    pub async fn wait_turn(&self, host: &str, min_delay: Duration) {
        loop {
            let wait = {
                let mut hosts = self.hosts.lock().await;
                let state = hosts.entry(host.to_owned()).or_insert_with(|| HostState {
                    policy: None,
                    fetched_at: None,
                    last_request_at: None,
                });
                match state.last_request_at {
                    Some(last) if last.elapsed() < min_delay => min_delay - last.elapsed(),
                    _ => {
                        state.last_request_at = Some(Instant::now());
                        Duration::ZERO
                    }
                }
            };
            if wait.is_zero() {
                return;
            }
            tokio::time::sleep(wait).await;
        }
    }
}

fn evict_oldest(hosts: &mut HashMap<String, HostState>) {
    if let Some(oldest) = hosts
        .iter()
        .min_by_key(|(_, state)| state.fetched_at)
        .map(|(host, _)| host.clone())
    {
        hosts.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "\
# research crawler rules
User-agent: *
Disallow: /private/
Allow: /private/press/

User-agent: showpulse
Disallow: /internal/
";

    #[test]
    fn wildcard_group_blocks_prefixed_paths() {
        let policy = RobotsPolicy::parse(BODY);
        assert!(!policy.is_allowed("SomeBot/1.0", "/private/profile"));
        assert!(policy.is_allowed("SomeBot/1.0", "/public/feed"));
    }

    #[test]
    fn longest_rule_wins_allow_over_disallow() {
        let policy = RobotsPolicy::parse(BODY);
        assert!(policy.is_allowed("SomeBot/1.0", "/private/press/2024"));
    }

    #[test]
    fn specific_agent_group_overrides_wildcard() {
        let policy = RobotsPolicy::parse(BODY);
        // The showpulse group has no /private rule, so it falls to allowed.
        assert!(policy.is_allowed("showpulse/0.1", "/private/profile"));
        assert!(!policy.is_allowed("showpulse/0.1", "/internal/x"));
    }

    #[test]
    fn empty_robots_allows_everything() {
        let policy = RobotsPolicy::parse("");
        assert!(policy.is_allowed("anything", "/any/path"));
    }

    #[test]
    fn empty_disallow_value_carries_no_rule() {
        let policy = RobotsPolicy::parse("User-agent: *\nDisallow:\n");
        assert!(policy.is_allowed("bot", "/whatever"));
    }

    #[tokio::test]
    async fn wait_turn_spaces_same_host_requests() {
        let cache = PolicyCache::new(Duration::from_secs(60), 8);
        let start = Instant::now();
        cache.wait_turn("example.com", Duration::from_millis(30)).await;
        cache.wait_turn("example.com", Duration::from_millis(30)).await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn wait_turn_is_independent_across_hosts() {
        let cache = PolicyCache::new(Duration::from_secs(60), 8);
        let start = Instant::now();
        cache.wait_turn("a.example.com", Duration::from_millis(50)).await;
        cache.wait_turn("b.example.com", Duration::from_millis(50)).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
