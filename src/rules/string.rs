use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_decimal::Decimal;

use super::{MessageKey, Messages, NumberRules, Outcome, RuleChain};

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";
const E164_PATTERN: &str = r"^\+[1-9][0-9]{1,14}$";

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("email pattern must compile"));
static E164: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(E164_PATTERN).expect("e164 pattern must compile"));

pub struct StringRules<V> {
    chain: RuleChain<V, String>,
    messages: Arc<Messages>,
}

impl<V> Clone for StringRules<V> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            messages: self.messages.clone(),
        }
    }
}

impl<V> StringRules<V>
where
    V: Send + 'static,
{
    pub(crate) fn new(chain: RuleChain<V, String>, messages: Arc<Messages>) -> Self {
        Self { chain, messages }
    }

    pub fn build(self) -> RuleChain<V, String> {
        self.chain
    }

    fn check<F>(self, message: String, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            chain: self.chain.check(move |value: &String| predicate(value), message),
            messages: self.messages,
        }
    }

    pub fn not_empty(self) -> Self {
        let message = self.messages.render(MessageKey::Required);
        self.check(message, |value| !value.is_empty())
    }

    /// Strips leading and trailing whitespace before the following steps.
    pub fn trim(self) -> Self {
        Self {
            chain: self.chain.map(|value: String| value.trim().to_string()),
            messages: self.messages,
        }
    }

    pub fn trimmed(self) -> Self {
        let message = self.messages.render(MessageKey::Trimmed);
        self.check(message, |value| value.trim() == value)
    }

    pub fn email(self) -> Self {
        let message = self.messages.render(MessageKey::Email);
        self.check(message, |value| EMAIL.is_match(value))
    }

    pub fn e164_phone_number(self) -> Self {
        let message = self.messages.render(MessageKey::E164PhoneNumber);
        self.check(message, |value| E164.is_match(value))
    }

    pub fn uuid(self) -> Self {
        let message = self.messages.render(MessageKey::Uuid);
        self.check(message, |value| uuid::Uuid::parse_str(value).is_ok())
    }

    pub fn ipv4(self) -> Self {
        let message = self.messages.render(MessageKey::Ipv4);
        self.check(message, |value| Ipv4Addr::from_str(value).is_ok())
    }

    pub fn ipv6(self) -> Self {
        let message = self.messages.render(MessageKey::Ipv6);
        self.check(message, |value| Ipv6Addr::from_str(value).is_ok())
    }

    pub fn regex(self, pattern: Regex) -> Self {
        let message = self.messages.render(MessageKey::Regex);
        self.check(message, move |value| pattern.is_match(value))
    }

    pub fn equals(self, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        let message = self.messages.render_with(MessageKey::Equals, &expected);
        self.check(message, move |value| value == expected)
    }

    pub fn min_length(self, min: usize) -> Self {
        let message = self
            .messages
            .render_with(MessageKey::MinLength, &min.to_string());
        self.check(message, move |value| value.chars().count() >= min)
    }

    pub fn max_length(self, max: usize) -> Self {
        let message = self
            .messages
            .render_with(MessageKey::MaxLength, &max.to_string());
        self.check(message, move |value| value.chars().count() <= max)
    }

    pub fn length(self, exact: usize) -> Self {
        let message = self
            .messages
            .render_with(MessageKey::Length, &exact.to_string());
        self.check(message, move |value| value.chars().count() == exact)
    }

    /// Parses the trimmed text as a whole number; later steps see the `i64`.
    pub fn parse_integer(self) -> NumberRules<V, i64> {
        let message = self.messages.render(MessageKey::Integer);
        let chain = self.chain.try_map(move |value: String| {
            match value.trim().parse::<i64>() {
                Ok(parsed) => Outcome::Success(parsed),
                Err(_) => Outcome::failure(message.clone()),
            }
        });
        NumberRules::new(chain, self.messages)
    }

    pub fn parse_decimal(self) -> NumberRules<V, Decimal> {
        let message = self.messages.render(MessageKey::Decimal);
        let chain = self.chain.try_map(move |value: String| {
            match Decimal::from_str(value.trim()) {
                Ok(parsed) => Outcome::Success(parsed),
                Err(_) => Outcome::failure(message.clone()),
            }
        });
        NumberRules::new(chain, self.messages)
    }
}

impl<V> From<StringRules<V>> for RuleChain<V, String>
where
    V: Send + 'static,
{
    fn from(value: StringRules<V>) -> Self {
        value.build()
    }
}
