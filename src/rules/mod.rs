//! Composable, asynchronous validation rules.
//!
//! A [`RuleChain`] is an ordered sequence of steps. Each step receives the
//! output of the previous one and either passes a (possibly transformed)
//! value on or stops the chain with a [`Failure`].

mod boolean;
mod messages;
mod number;
mod string;
mod union;

#[cfg(test)]
mod tests;

use std::any::{Any, type_name};
use std::fmt::{Display, Formatter};
use std::future::{Future, ready};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

pub use boolean::BooleanRules;
pub use messages::{MessageKey, Messages};
pub use number::{DecimalRules, IntegerRules, Number, NumberRules};
pub use string::StringRules;
pub use union::{union2, union3, union4};

/// Type-erased value shared between the engine and rules that accept
/// arbitrary input.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

pub type BoxedRuleFuture<R> = BoxFuture<'static, Outcome<R>>;

type RuleFn<V, R> = Arc<dyn Fn(V) -> BoxedRuleFuture<R> + Send + Sync>;

const MISSING_VALUE_MESSAGE: &str = "Value required";
const INVALID_VALUE_MESSAGE: &str = "Invalid value";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailureKind {
    /// A rule step rejected a value of the right shape.
    Rule,
    /// The raw input did not have the type the chain expects.
    TypeMismatch,
    /// No raw input was provided.
    Missing,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Failure {
    kind: FailureKind,
    messages: Vec<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Rule,
            messages: vec![message.into()],
        }
    }

    /// Builds a failure from several messages. An empty list falls back to a
    /// generic message so a failure always has something to show.
    pub fn with_messages<I, M>(messages: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let mut messages = messages.into_iter().map(Into::into).collect::<Vec<String>>();
        if messages.is_empty() {
            messages.push(INVALID_VALUE_MESSAGE.to_string());
        }
        Self {
            kind: FailureKind::Rule,
            messages,
        }
    }

    pub fn type_mismatch(expected: &'static str) -> Self {
        Self {
            kind: FailureKind::TypeMismatch,
            messages: vec![format!("Invalid type: expected {expected}")],
        }
    }

    pub fn missing() -> Self {
        Self {
            kind: FailureKind::Missing,
            messages: vec![MISSING_VALUE_MESSAGE.to_string()],
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.messages.join("; "))
    }
}

impl std::error::Error for Failure {}

/// Result of one rule evaluation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome<R> {
    Success(R),
    Failure(Failure),
}

impl<R> Outcome<R> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn value(&self) -> Option<&R> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn errors(&self) -> Option<&[String]> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure.messages()),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure.kind()),
        }
    }

    pub fn map<S>(self, f: impl FnOnce(R) -> S) -> Outcome<S> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }

    pub fn into_result(self) -> Result<R, Failure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl<R> From<Result<R, Failure>> for Outcome<R> {
    fn from(value: Result<R, Failure>) -> Self {
        match value {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure(failure),
        }
    }
}

pub struct RuleChain<V, R> {
    run: RuleFn<V, R>,
    steps: usize,
}

impl<V, R> Clone for RuleChain<V, R> {
    fn clone(&self) -> Self {
        Self {
            run: self.run.clone(),
            steps: self.steps,
        }
    }
}

impl<V> RuleChain<V, V>
where
    V: Send + 'static,
{
    /// An empty chain that accepts every value unchanged.
    pub fn new() -> Self {
        Self {
            run: Arc::new(|value: V| ready(Outcome::Success(value)).boxed()),
            steps: 0,
        }
    }
}

impl<V> Default for RuleChain<V, V>
where
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, R> RuleChain<V, R>
where
    V: Send + 'static,
    R: Send + 'static,
{
    pub fn from_fn<F, Fut>(rule: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<R>> + Send + 'static,
    {
        Self {
            run: Arc::new(move |value: V| rule(value).boxed()),
            steps: 1,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Appends an async step. The step only runs when every earlier step
    /// succeeded.
    pub fn then<S, F, Fut>(self, step: F) -> RuleChain<V, S>
    where
        S: Send + 'static,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<S>> + Send + 'static,
    {
        let previous = self.run;
        let step = Arc::new(step);
        RuleChain {
            run: Arc::new(move |value: V| {
                let previous = previous(value);
                let step = step.clone();
                async move {
                    match previous.await {
                        Outcome::Success(value) => step(value).await,
                        Outcome::Failure(failure) => Outcome::Failure(failure),
                    }
                }
                .boxed()
            }),
            steps: self.steps + 1,
        }
    }

    pub fn try_map<S, F>(self, step: F) -> RuleChain<V, S>
    where
        S: Send + 'static,
        F: Fn(R) -> Outcome<S> + Send + Sync + 'static,
    {
        self.then(move |value| ready(step(value)))
    }

    pub fn map<S, F>(self, transform: F) -> RuleChain<V, S>
    where
        S: Send + 'static,
        F: Fn(R) -> S + Send + Sync + 'static,
    {
        self.try_map(move |value| Outcome::Success(transform(value)))
    }

    pub fn check<F>(self, predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        let message = message.into();
        self.try_map(move |value| {
            if predicate(&value) {
                Outcome::Success(value)
            } else {
                Outcome::failure(message.clone())
            }
        })
    }

    /// Like [`check`](Self::check) with an async predicate, e.g. a lookup
    /// against a remote service.
    pub fn check_async<F, Fut>(self, predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let message = message.into();
        self.then(move |value: R| {
            let accepted = predicate(&value);
            let message = message.clone();
            async move {
                if accepted.await {
                    Outcome::Success(value)
                } else {
                    Outcome::failure(message)
                }
            }
        })
    }

    pub fn validate(&self, value: V) -> BoxedRuleFuture<R> {
        (self.run)(value)
    }

    /// Lifts the chain over optional input. `None` succeeds without running
    /// any step.
    pub fn optional(self) -> RuleChain<Option<V>, Option<R>> {
        let base = self.run;
        RuleChain {
            run: Arc::new(move |value: Option<V>| match value {
                Some(value) => base(value).map(|outcome| outcome.map(Some)).boxed(),
                None => ready(Outcome::Success(None)).boxed(),
            }),
            steps: self.steps,
        }
    }
}

impl<V, R> RuleChain<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    /// Entry point for untyped input. Absence and a wrong type are reported
    /// with their own [`FailureKind`] instead of running the chain.
    pub fn validate_raw(&self, raw: Option<&(dyn Any + Send + Sync)>) -> BoxedRuleFuture<R> {
        let Some(raw) = raw else {
            return ready(Outcome::Failure(Failure::missing())).boxed();
        };
        match raw.downcast_ref::<V>() {
            Some(value) => self.validate(value.clone()),
            None => ready(Outcome::Failure(Failure::type_mismatch(type_name::<V>()))).boxed(),
        }
    }
}

/// Entry point for the rule builders. Every builder created from the same
/// `Rules` shares its [`Messages`].
#[derive(Clone, Default)]
pub struct Rules {
    messages: Arc<Messages>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Messages) -> Self {
        Self {
            messages: Arc::new(messages),
        }
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn string(&self) -> StringRules<String> {
        StringRules::new(RuleChain::new(), self.messages.clone())
    }

    pub fn integer(&self) -> IntegerRules<i64> {
        NumberRules::new(RuleChain::new(), self.messages.clone())
    }

    pub fn decimal(&self) -> DecimalRules<rust_decimal::Decimal> {
        NumberRules::new(RuleChain::new(), self.messages.clone())
    }

    pub fn boolean(&self) -> BooleanRules<bool> {
        BooleanRules::new(RuleChain::new(), self.messages.clone())
    }

    pub fn custom<T>(&self) -> RuleChain<T, T>
    where
        T: Send + 'static,
    {
        RuleChain::new()
    }
}
