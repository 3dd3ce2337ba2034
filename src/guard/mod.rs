//! Link-preview detection.
//!
//! Chat and social apps fetch a URL as soon as it is pasted in order to render
//! a preview. Without this check that fetch would burn the single read of a
//! note before the recipient ever clicks it. Matching is a static substring
//! list, so unknown crawlers still get through.

/// User-Agent fragments of known link unfurlers, lowercase.
pub const AUTOMATED_FETCHER_SIGNATURES: [&str; 6] = [
    "slackbot",
    "twitterbot",
    "facebookexternalhit",
    "discordbot",
    "whatsapp",
    "telegrambot",
];

/// What the classifier gets to look at.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestMeta<'a> {
    pub user_agent: Option<&'a str>,
}

impl<'a> RequestMeta<'a> {
    pub const fn with_user_agent(user_agent: &'a str) -> Self {
        Self {
            user_agent: Some(user_agent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Automated,
    Human,
}

pub trait RequestClassifier: Send + Sync {
    fn classify(&self, meta: &RequestMeta<'_>) -> Access;
}

/// `signatures` must already be lowercase.
fn matches_signature<'a>(user_agent: &str, signatures: impl IntoIterator<Item = &'a str>) -> bool {
    let user_agent = user_agent.to_lowercase();
    signatures.into_iter().any(|sig| user_agent.contains(sig))
}

/// Case-insensitive match against [`AUTOMATED_FETCHER_SIGNATURES`].
pub fn is_automated_fetch(user_agent: &str) -> bool {
    matches_signature(user_agent, AUTOMATED_FETCHER_SIGNATURES)
}

/// [`RequestClassifier`] over the User-Agent header: [`is_automated_fetch`]
/// plus deployment-specific signatures.
#[derive(Debug, Clone, Default)]
pub struct UserAgentGuard {
    extra_signatures: Vec<String>,
}

impl UserAgentGuard {
    pub fn new(extra_signatures: &[String]) -> Self {
        let extra_signatures = extra_signatures
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self { extra_signatures }
    }
}

impl RequestClassifier for UserAgentGuard {
    fn classify(&self, meta: &RequestMeta<'_>) -> Access {
        let Some(user_agent) = meta.user_agent else {
            return Access::Human;
        };

        if is_automated_fetch(user_agent)
            || matches_signature(user_agent, self.extra_signatures.iter().map(String::as_str))
        {
            Access::Automated
        } else {
            Access::Human
        }
    }
}
