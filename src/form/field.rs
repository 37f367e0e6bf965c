use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::rules::{AnyValue, BoxedRuleFuture, Outcome, RuleChain};

use super::controller::FieldKey;

/// A [`FieldKey`] that remembers the field's raw value type `V` and the
/// validated type `R` its rule produces.
pub struct TypedKey<V, R> {
    key: FieldKey,
    _types: PhantomData<fn() -> (V, R)>,
}

impl<V, R> TypedKey<V, R> {
    pub const fn new(key: &'static str) -> Self {
        Self {
            key: FieldKey::new(key),
            _types: PhantomData,
        }
    }

    pub const fn key(self) -> FieldKey {
        self.key
    }
}

impl<V, R> Clone for TypedKey<V, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V, R> Copy for TypedKey<V, R> {}

impl<V, R> Debug for TypedKey<V, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypedKey").field(&self.key).finish()
    }
}

impl<V, R> From<TypedKey<V, R>> for FieldKey {
    fn from(value: TypedKey<V, R>) -> Self {
        value.key
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Debounce {
    #[default]
    Immediate,
    Fast,
    Medium,
    Slow,
    Custom(Duration),
}

impl Debounce {
    pub const fn duration(self) -> Duration {
        match self {
            Debounce::Immediate => Duration::ZERO,
            Debounce::Fast => Duration::from_millis(200),
            Debounce::Medium => Duration::from_millis(500),
            Debounce::Slow => Duration::from_secs(1),
            Debounce::Custom(duration) => duration,
        }
    }
}

/// One field descriptor: display name, current value, rule and debounce.
pub struct Field<V, R> {
    name: String,
    value: V,
    debounce: Debounce,
    rule: RuleChain<V, R>,
}

impl<V: Clone, R> Clone for Field<V, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            value: self.value.clone(),
            debounce: self.debounce,
            rule: self.rule.clone(),
        }
    }
}

impl<V, R> Field<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, value: V, rule: impl Into<RuleChain<V, R>>) -> Self {
        Self {
            name: name.into(),
            value,
            debounce: Debounce::Immediate,
            rule: rule.into(),
        }
    }

    pub fn debounce(mut self, debounce: Debounce) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn debounce_delay(&self) -> Duration {
        self.debounce.duration()
    }

    pub fn rule(&self) -> &RuleChain<V, R> {
        &self.rule
    }

    /// Runs the rule against the current value.
    pub fn validate(&self) -> BoxedRuleFuture<R> {
        self.rule.validate(self.value.clone())
    }
}

/// Exposes the value and validated types of a field member, for code that
/// only sees the member's declared type.
pub trait FieldSpec {
    type Value;
    type Validated;
}

impl<V, R> FieldSpec for Field<V, R> {
    type Value = V;
    type Validated = R;
}

pub(super) trait ErasedField: Send + Sync {
    fn name(&self) -> &str;
    fn debounce(&self) -> Duration;
    fn value_type(&self) -> &'static str;
    fn current_value(&self) -> AnyValue;
    fn accepts(&self, value: &(dyn Any + Send + Sync)) -> bool;
    /// Returns `false` without writing when the value has the wrong type.
    fn assign(&mut self, value: &(dyn Any + Send + Sync)) -> bool;
    fn validate(&self) -> BoxFuture<'static, Outcome<AnyValue>>;
    fn boxed_clone(&self) -> Box<dyn ErasedField>;
}

impl<V, R> ErasedField for Field<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn debounce(&self) -> Duration {
        self.debounce.duration()
    }

    fn value_type(&self) -> &'static str {
        type_name::<V>()
    }

    fn current_value(&self) -> AnyValue {
        Arc::new(self.value.clone())
    }

    fn accepts(&self, value: &(dyn Any + Send + Sync)) -> bool {
        value.is::<V>()
    }

    fn assign(&mut self, value: &(dyn Any + Send + Sync)) -> bool {
        match value.downcast_ref::<V>() {
            Some(value) => {
                self.value = value.clone();
                true
            }
            None => false,
        }
    }

    fn validate(&self) -> BoxFuture<'static, Outcome<AnyValue>> {
        Field::validate(self)
            .map(|outcome| outcome.map(|value| Arc::new(value) as AnyValue))
            .boxed()
    }

    fn boxed_clone(&self) -> Box<dyn ErasedField> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ErasedField> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// The heterogeneous field collection a form is built from.
#[derive(Clone, Default)]
pub struct FormFields {
    entries: BTreeMap<FieldKey, Box<dyn ErasedField>>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<V, R>(&mut self, key: TypedKey<V, R>, field: Field<V, R>) -> &mut Self
    where
        V: Clone + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        self.entries.insert(key.key(), Box::new(field));
        self
    }

    pub fn with<V, R>(mut self, key: TypedKey<V, R>, field: Field<V, R>) -> Self
    where
        V: Clone + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        self.insert(key, field);
        self
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(super) fn get(&self, key: FieldKey) -> Option<&dyn ErasedField> {
        self.entries.get(&key).map(|field| &**field)
    }

    pub(super) fn get_mut(&mut self, key: FieldKey) -> Option<&mut Box<dyn ErasedField>> {
        self.entries.get_mut(&key)
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = (FieldKey, &dyn ErasedField)> + '_ {
        self.entries
            .iter()
            .map(|(key, field)| (*key, &**field))
    }
}

impl Debug for FormFields {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, field)| (key, field.name())))
            .finish()
    }
}

/// A struct of [`Field`] members that can seed a form.
///
/// Usually derived with `#[derive(FormSchema)]`, which also generates a
/// `<Name>Keys` type with one [`TypedKey`] accessor per member.
pub trait FormSchema {
    type Keys;

    fn keys() -> Self::Keys;
    fn into_fields(self) -> FormFields;
}
