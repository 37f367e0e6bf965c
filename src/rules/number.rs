use std::fmt::Display;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::{MessageKey, Messages, RuleChain};

pub trait Number: Copy + PartialOrd + Display + Send + Sync + 'static {
    const ZERO: Self;

    /// `false` for a zero divisor.
    fn is_multiple(self, divisor: Self) -> bool;
}

impl Number for i64 {
    const ZERO: Self = 0;

    fn is_multiple(self, divisor: Self) -> bool {
        divisor != 0 && self.wrapping_rem(divisor) == 0
    }
}

impl Number for Decimal {
    const ZERO: Self = Decimal::ZERO;

    fn is_multiple(self, divisor: Self) -> bool {
        !divisor.is_zero()
            && self
                .checked_rem(divisor)
                .is_some_and(|remainder| remainder.is_zero())
    }
}

pub type IntegerRules<V> = NumberRules<V, i64>;
pub type DecimalRules<V> = NumberRules<V, Decimal>;

pub struct NumberRules<V, N> {
    chain: RuleChain<V, N>,
    messages: Arc<Messages>,
}

impl<V, N> Clone for NumberRules<V, N> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            messages: self.messages.clone(),
        }
    }
}

impl<V, N> NumberRules<V, N>
where
    V: Send + 'static,
    N: Number,
{
    pub(crate) fn new(chain: RuleChain<V, N>, messages: Arc<Messages>) -> Self {
        Self { chain, messages }
    }

    pub fn build(self) -> RuleChain<V, N> {
        self.chain
    }

    fn bounded(self, key: MessageKey, bound: N, predicate: fn(N, N) -> bool) -> Self {
        let message = self.messages.render_with(key, &bound.to_string());
        Self {
            chain: self
                .chain
                .check(move |value: &N| predicate(*value, bound), message),
            messages: self.messages,
        }
    }

    fn signed(self, key: MessageKey, predicate: fn(N) -> bool) -> Self {
        let message = self.messages.render(key);
        Self {
            chain: self.chain.check(move |value: &N| predicate(*value), message),
            messages: self.messages,
        }
    }

    pub fn gt(self, bound: N) -> Self {
        self.bounded(MessageKey::Gt, bound, |value, bound| value > bound)
    }

    pub fn gte(self, bound: N) -> Self {
        self.bounded(MessageKey::Gte, bound, |value, bound| value >= bound)
    }

    pub fn lt(self, bound: N) -> Self {
        self.bounded(MessageKey::Lt, bound, |value, bound| value < bound)
    }

    pub fn lte(self, bound: N) -> Self {
        self.bounded(MessageKey::Lte, bound, |value, bound| value <= bound)
    }

    pub fn multiple_of(self, divisor: N) -> Self {
        self.bounded(MessageKey::MultipleOf, divisor, N::is_multiple)
    }

    pub fn positive(self) -> Self {
        self.signed(MessageKey::Positive, |value| value > N::ZERO)
    }

    pub fn non_negative(self) -> Self {
        self.signed(MessageKey::NonNegative, |value| value >= N::ZERO)
    }

    pub fn negative(self) -> Self {
        self.signed(MessageKey::Negative, |value| value < N::ZERO)
    }

    pub fn non_positive(self) -> Self {
        self.signed(MessageKey::NonPositive, |value| value <= N::ZERO)
    }
}

impl<V, N> From<NumberRules<V, N>> for RuleChain<V, N>
where
    V: Send + 'static,
    N: Number,
{
    fn from(value: NumberRules<V, N>) -> Self {
        value.build()
    }
}
