use std::sync::Arc;

use super::{MessageKey, Messages, RuleChain};

pub struct BooleanRules<V> {
    chain: RuleChain<V, bool>,
    messages: Arc<Messages>,
}

impl<V> BooleanRules<V>
where
    V: Send + 'static,
{
    pub(crate) fn new(chain: RuleChain<V, bool>, messages: Arc<Messages>) -> Self {
        Self { chain, messages }
    }

    pub fn build(self) -> RuleChain<V, bool> {
        self.chain
    }

    /// Requires the value to be `true`, e.g. an accepted terms checkbox.
    pub fn is_true(self) -> Self {
        let message = self.messages.render(MessageKey::Required);
        Self {
            chain: self.chain.check(|value: &bool| *value, message),
            messages: self.messages,
        }
    }
}

impl<V> From<BooleanRules<V>> for RuleChain<V, bool>
where
    V: Send + 'static,
{
    fn from(value: BooleanRules<V>) -> Self {
        value.build()
    }
}
