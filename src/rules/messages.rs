use std::collections::BTreeMap;

use crate::i18n::{I18nManager, format_template};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MessageKey {
    Required,
    Gt,
    Gte,
    Lt,
    Lte,
    Positive,
    NonNegative,
    Negative,
    NonPositive,
    MultipleOf,
    Trimmed,
    Uuid,
    Ipv4,
    Ipv6,
    Email,
    E164PhoneNumber,
    Regex,
    Equals,
    MinLength,
    MaxLength,
    Length,
    Integer,
    Decimal,
}

impl MessageKey {
    pub const ALL: [MessageKey; 23] = [
        MessageKey::Required,
        MessageKey::Gt,
        MessageKey::Gte,
        MessageKey::Lt,
        MessageKey::Lte,
        MessageKey::Positive,
        MessageKey::NonNegative,
        MessageKey::Negative,
        MessageKey::NonPositive,
        MessageKey::MultipleOf,
        MessageKey::Trimmed,
        MessageKey::Uuid,
        MessageKey::Ipv4,
        MessageKey::Ipv6,
        MessageKey::Email,
        MessageKey::E164PhoneNumber,
        MessageKey::Regex,
        MessageKey::Equals,
        MessageKey::MinLength,
        MessageKey::MaxLength,
        MessageKey::Length,
        MessageKey::Integer,
        MessageKey::Decimal,
    ];

    pub const fn catalog_key(self) -> &'static str {
        match self {
            MessageKey::Required => "rules.required",
            MessageKey::Gt => "rules.gt",
            MessageKey::Gte => "rules.gte",
            MessageKey::Lt => "rules.lt",
            MessageKey::Lte => "rules.lte",
            MessageKey::Positive => "rules.positive",
            MessageKey::NonNegative => "rules.non_negative",
            MessageKey::Negative => "rules.negative",
            MessageKey::NonPositive => "rules.non_positive",
            MessageKey::MultipleOf => "rules.multiple_of",
            MessageKey::Trimmed => "rules.trimmed",
            MessageKey::Uuid => "rules.uuid",
            MessageKey::Ipv4 => "rules.ipv4",
            MessageKey::Ipv6 => "rules.ipv6",
            MessageKey::Email => "rules.email",
            MessageKey::E164PhoneNumber => "rules.e164_phone_number",
            MessageKey::Regex => "rules.regex",
            MessageKey::Equals => "rules.equals",
            MessageKey::MinLength => "rules.min_length",
            MessageKey::MaxLength => "rules.max_length",
            MessageKey::Length => "rules.length",
            MessageKey::Integer => "rules.integer",
            MessageKey::Decimal => "rules.decimal",
        }
    }
}

/// Message templates used by the rule builders. Templates may reference
/// `{value}`, which is replaced by the rule's parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Messages {
    templates: BTreeMap<MessageKey, String>,
}

impl Default for Messages {
    fn default() -> Self {
        Self::from_i18n(&I18nManager::new())
    }
}

impl Messages {
    pub fn from_i18n(i18n: &I18nManager) -> Self {
        let templates = MessageKey::ALL
            .into_iter()
            .map(|key| (key, i18n.t(key.catalog_key())))
            .collect();
        Self { templates }
    }

    pub fn set(mut self, key: MessageKey, template: impl Into<String>) -> Self {
        self.templates.insert(key, template.into());
        self
    }

    pub fn template(&self, key: MessageKey) -> &str {
        self.templates
            .get(&key)
            .map(String::as_str)
            .unwrap_or(key.catalog_key())
    }

    pub fn render(&self, key: MessageKey) -> String {
        self.template(key).to_string()
    }

    pub fn render_with(&self, key: MessageKey, value: &str) -> String {
        format_template(self.template(key), &[("value", value)])
    }
}
