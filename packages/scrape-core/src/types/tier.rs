//! Fetch strategy tiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseEnumError;

/// A fetch strategy, ordered by cost and anti-blocking capability.
///
/// The derived `Ord` follows declaration order, so `PlainRequest` is the
/// cheapest tier and `ResidentialProxy` the most capable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Plain HTTP request, no rendering.
    PlainRequest,
    /// Headless browser render.
    RenderedBrowser,
    /// Headless browser routed through a residential proxy.
    ResidentialProxy,
}

impl Tier {
    pub const ALL: [Tier; 3] = [
        Tier::PlainRequest,
        Tier::RenderedBrowser,
        Tier::ResidentialProxy,
    ];

    pub fn cheapest() -> Self {
        Tier::PlainRequest
    }

    pub fn most_capable() -> Self {
        Tier::ResidentialProxy
    }

    /// The next more capable tier, or `None` at the top.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::PlainRequest => Some(Tier::RenderedBrowser),
            Tier::RenderedBrowser => Some(Tier::ResidentialProxy),
            Tier::ResidentialProxy => None,
        }
    }

    pub fn is_most_capable(self) -> bool {
        self == Tier::ResidentialProxy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::PlainRequest => "plain_request",
            Tier::RenderedBrowser => "rendered_browser",
            Tier::ResidentialProxy => "residential_proxy",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain_request" => Ok(Tier::PlainRequest),
            "rendered_browser" => Ok(Tier::RenderedBrowser),
            "residential_proxy" => Ok(Tier::ResidentialProxy),
            other => Err(ParseEnumError::new("tier", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_are_ordered_by_capability() {
        assert!(Tier::PlainRequest < Tier::RenderedBrowser);
        assert!(Tier::RenderedBrowser < Tier::ResidentialProxy);
        assert_eq!(Tier::PlainRequest.next(), Some(Tier::RenderedBrowser));
        assert_eq!(Tier::ResidentialProxy.next(), None);
    }

    #[test]
    fn test_parse_rejects_unknown_tier() {
        assert_eq!("rendered_browser".parse::<Tier>().unwrap(), Tier::RenderedBrowser);
        assert!("stealth".parse::<Tier>().is_err());
    }
}
