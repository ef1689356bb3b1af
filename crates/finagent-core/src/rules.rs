//! Keyword rules selecting campaign format and audience for marketing queries

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignFormat {
    Email,
    SocialMedia,
    Sms,
    Poster,
    Blog,
}

impl CampaignFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignFormat::Email => "email",
            CampaignFormat::SocialMedia => "social_media",
            CampaignFormat::Sms => "sms",
            CampaignFormat::Poster => "poster",
            CampaignFormat::Blog => "blog",
        }
    }
}

impl fmt::Display for CampaignFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Salaried,
    SelfEmployed,
    YoungProfessionals,
    Families,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Salaried => "salaried",
            Audience::SelfEmployed => "self_employed",
            Audience::YoungProfessionals => "young_professionals",
            Audience::Families => "families",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects `value` when the lowercased query contains any keyword
pub struct KeywordRule<T: 'static> {
    pub value: T,
    pub keywords: &'static [&'static str],
}

pub const DEFAULT_FORMAT: CampaignFormat = CampaignFormat::SocialMedia;
pub const DEFAULT_AUDIENCE: Audience = Audience::Salaried;

/// Evaluated in order; first match wins
pub const CAMPAIGN_FORMAT_RULES: &[KeywordRule<CampaignFormat>] = &[
    KeywordRule {
        value: CampaignFormat::Email,
        keywords: &["email"],
    },
    KeywordRule {
        value: CampaignFormat::Sms,
        keywords: &["sms"],
    },
    KeywordRule {
        value: CampaignFormat::Blog,
        keywords: &["blog"],
    },
    KeywordRule {
        value: CampaignFormat::Poster,
        keywords: &["poster"],
    },
];

/// Evaluated in order; first match wins
pub const AUDIENCE_RULES: &[KeywordRule<Audience>] = &[
    KeywordRule {
        value: Audience::SelfEmployed,
        keywords: &["self-employed", "self employed"],
    },
    KeywordRule {
        value: Audience::YoungProfessionals,
        keywords: &["young"],
    },
    KeywordRule {
        value: Audience::Families,
        keywords: &["family", "families"],
    },
];

pub fn first_match<T: Copy>(rules: &[KeywordRule<T>], query: &str, default: T) -> T {
    let lowered = query.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lowered.contains(k)))
        .map(|rule| rule.value)
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignParams {
    pub format: CampaignFormat,
    pub audience: Audience,
}

pub fn campaign_params(query: &str) -> CampaignParams {
    CampaignParams {
        format: first_match(CAMPAIGN_FORMAT_RULES, query, DEFAULT_FORMAT),
        audience: first_match(AUDIENCE_RULES, query, DEFAULT_AUDIENCE),
    }
}
