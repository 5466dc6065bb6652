//! Strips volatile details from error messages so equal failures compare
//! equal.

use regex::Regex;

struct Rule {
    re: Regex,
    placeholder: &'static str,
}

pub struct Sanitizer {
    rules: Vec<Rule>,
    collapse_spaces: bool,
}

pub struct WithCollapseSpaces(pub bool);

/// Ordered most specific first: URLs before hosts, hosts before bare numbers.
const RULES: &[(&str, &str)] = &[
    (r"\bhttps?://[^\s]+", "<url>"),
    (
        r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-5][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}\b",
        "<uuid>",
    ),
    (r"\b(?:\d{1,3}\.){3}\d{1,3}(?::\d{1,5})?\b", "<ip4>"),
    (r"\[?(?:[A-Fa-f0-9]{1,4}:){2,7}[A-Fa-f0-9]{1,4}\]?(?::\d{1,5})?", "<ip6>"),
    (r"\b(?:[A-Za-z0-9-]{1,63}\.)+[A-Za-z]{2,}(?::\d{1,5})?\b", "<host>"),
    (r"\b[0-9a-fA-F]{16,64}\b", "<hex>"),
    (r"\b\d+ ?(?:ms|us|s)\b", "<duration>"),
];

impl Sanitizer {
    pub fn new(opts: WithCollapseSpaces) -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(pattern, placeholder)| {
                Regex::new(pattern).ok().map(|re| Rule { re, placeholder })
            })
            .collect();
        Self {
            rules,
            collapse_spaces: opts.0,
        }
    }

    pub fn sanitize(&self, msg: &str) -> String {
        let mut out = msg.to_string();
        for rule in &self.rules {
            out = rule.re.replace_all(&out, rule.placeholder).into_owned();
        }
        if self.collapse_spaces {
            out = out.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_failures_collapse() {
        let s = Sanitizer::new(WithCollapseSpaces(true));
        let a = s.sanitize("connect to 10.0.0.1:80 refused after 300ms");
        let b = s.sanitize("connect to 10.0.0.7:8080   refused after 12ms");
        assert_eq!(a, b);
        assert_eq!(a, "connect to <ip4> refused after <duration>");
    }

    #[test]
    fn test_urls_and_hosts() {
        let s = Sanitizer::new(WithCollapseSpaces(false));
        assert_eq!(
            s.sanitize("GET http://www.example.com/a?b=1 failed"),
            "GET <url> failed"
        );
        assert_eq!(s.sanitize("dns error for cdn.example.org"), "dns error for <host>");
    }
}
