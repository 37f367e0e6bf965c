use std::any::{Any, type_name};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{AbortHandle, Shared};
use futures::task::{Spawn, SpawnExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::rules::AnyValue;

use super::field::{FormFields, FormSchema, TypedKey};
use super::validation::Refinement;

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

/// Stable identifier of one field, usually its path in the schema
/// (`"address.city"`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl From<&'static str> for FieldKey {
    fn from(value: &'static str) -> Self {
        Self(value)
    }
}

/// Generation counter per key. Only the task holding the latest ticket may
/// write results.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    #[default]
    OnSubmit,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SetValueConfig {
    /// Validate after the write even when the form's mode would not.
    pub should_validate: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ValidationPhase {
    #[default]
    Idle,
    /// Waiting for the field's debounce to elapse.
    Scheduled,
    Running,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    Committed,
    Cancelled,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldState {
    pub name: Option<String>,
    pub errors: Vec<String>,
    pub validating: bool,
    pub phase: ValidationPhase,
    pub focused: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormSnapshot {
    pub id: FormId,
    pub registered: Vec<String>,
    pub errors: BTreeMap<String, Vec<String>>,
    pub validating: BTreeSet<FieldKey>,
    pub focused: BTreeSet<String>,
    pub submitting: bool,
    pub submit_count: u32,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("form has no field `{0}`")]
    UnknownField(FieldKey),
    #[error("field `{key}` expects a value of type {expected}")]
    TypeMismatch { key: FieldKey, expected: &'static str },
    #[error("field `{0}` has no validated value")]
    MissingValidatedValue(FieldKey),
    #[error("failed to spawn form task: {0}")]
    Spawn(String),
}

pub type FormResult<T> = Result<T, FormError>;

pub(super) type SettledSignal = Shared<oneshot::Receiver<()>>;

pub(super) struct InFlight {
    pub(super) ticket: ValidationTicket,
    pub(super) phase: ValidationPhase,
    pub(super) abort: AbortHandle,
    /// Resolves once this entry leaves the in-flight map.
    pub(super) settled: SettledSignal,
    _settle: oneshot::Sender<()>,
}

impl InFlight {
    pub(super) fn new(ticket: ValidationTicket, abort: AbortHandle) -> Self {
        let (settle, settled) = oneshot::channel();
        Self {
            ticket,
            phase: ValidationPhase::Scheduled,
            abort,
            settled: settled.shared(),
            _settle: settle,
        }
    }
}

pub(super) struct FormState {
    pub(super) id: FormId,
    pub(super) initial_fields: FormFields,
    pub(super) fields: FormFields,
    pub(super) registered: Vec<String>,
    pub(super) bindings: BTreeMap<FieldKey, String>,
    pub(super) focused: BTreeSet<String>,
    pub(super) errors: BTreeMap<String, Vec<String>>,
    pub(super) in_flight: BTreeMap<FieldKey, InFlight>,
    pub(super) tickets: BTreeMap<FieldKey, ValidationTicket>,
    pub(super) validated: BTreeMap<FieldKey, AnyValue>,
    pub(super) submitting: bool,
    pub(super) submit_count: u32,
}

impl FormState {
    fn new(fields: FormFields) -> Self {
        Self {
            id: FormId::next(),
            initial_fields: fields.clone(),
            fields,
            registered: Vec::new(),
            bindings: BTreeMap::new(),
            focused: BTreeSet::new(),
            errors: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            tickets: BTreeMap::new(),
            validated: BTreeMap::new(),
            submitting: false,
            submit_count: 0,
        }
    }

    pub(super) fn name_of(&self, key: FieldKey) -> Option<&str> {
        self.bindings.get(&key).map(String::as_str)
    }

    /// Records messages under `name` and drops validated values of every key
    /// bound to it. Empty messages clear the entry instead.
    pub(super) fn write_error(&mut self, name: &str, messages: Vec<String>) {
        if messages.is_empty() {
            self.errors.remove(name);
            return;
        }
        self.insert_errors(name, messages);
    }

    /// Stores `messages` for `name` and drops validated values of every key
    /// bound to it. Never clears.
    pub(super) fn insert_errors(&mut self, name: &str, messages: Vec<String>) {
        let keys = self
            .bindings
            .iter()
            .filter_map(|(key, bound)| (bound == name).then_some(*key))
            .collect::<Vec<_>>();
        for key in keys {
            self.validated.remove(&key);
        }
        self.errors.insert(name.to_string(), messages);
    }

    pub(super) fn next_ticket(&mut self, key: FieldKey) -> ValidationTicket {
        let next = self
            .tickets
            .get(&key)
            .map_or(ValidationTicket(1), |ticket| {
                ValidationTicket(ticket.0.wrapping_add(1))
            });
        self.tickets.insert(key, next);
        next
    }

    pub(super) fn is_current(&self, key: FieldKey, ticket: ValidationTicket) -> bool {
        self.tickets.get(&key).copied() == Some(ticket)
    }

    /// Aborts the key's task and invalidates its ticket so a task already
    /// past its last await cannot commit either.
    pub(super) fn cancel_in_flight(&mut self, key: FieldKey) -> bool {
        let Some(in_flight) = self.in_flight.remove(&key) else {
            return false;
        };
        in_flight.abort.abort();
        self.next_ticket(key);
        true
    }

    fn field_state(&self, key: FieldKey) -> FieldState {
        let name = self.name_of(key).map(str::to_owned);
        let errors = name
            .as_deref()
            .and_then(|name| self.errors.get(name))
            .cloned()
            .unwrap_or_default();
        let focused = name
            .as_deref()
            .is_some_and(|name| self.focused.contains(name));
        let phase = self
            .in_flight
            .get(&key)
            .map_or(ValidationPhase::Idle, |in_flight| in_flight.phase);
        FieldState {
            name,
            errors,
            validating: phase != ValidationPhase::Idle,
            phase,
            focused,
        }
    }
}

/// Owner of one form's state. Clones share the same form.
#[derive(Clone)]
pub struct FormController {
    pub(super) options: FormOptions,
    pub(super) state: Arc<RwLock<FormState>>,
    pub(super) refinements: Arc<RwLock<Vec<Refinement>>>,
    pub(super) spawner: Arc<dyn Spawn + Send + Sync>,
}

impl FormController {
    /// `spawner` runs the validation and submit tasks that are not awaited
    /// by the caller.
    pub fn new(
        fields: FormFields,
        options: FormOptions,
        spawner: impl Spawn + Send + Sync + 'static,
    ) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(FormState::new(fields))),
            refinements: Arc::new(RwLock::new(Vec::new())),
            spawner: Arc::new(spawner),
        }
    }

    pub fn from_schema<S: FormSchema>(
        schema: S,
        options: FormOptions,
        spawner: impl Spawn + Send + Sync + 'static,
    ) -> Self {
        Self::new(schema.into_fields(), options, spawner)
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    /// Binds `key` to `name`. Registering a name twice keeps one entry; the
    /// binding always moves to the latest key.
    pub fn register_field(
        &self,
        key: impl Into<FieldKey>,
        name: impl Into<String>,
    ) -> FormResult<()> {
        let key = key.into();
        let name = name.into();
        let mut state = write_lock(&self.state, "registering field")?;
        if !state.fields.contains(key) {
            warn!(%key, "registering a key without a field descriptor");
            return Err(FormError::UnknownField(key));
        }
        if !state.registered.contains(&name) {
            state.registered.push(name.clone());
        }
        debug!(%key, %name, "field registered");
        state.bindings.insert(key, name);
        Ok(())
    }

    /// Registers `key` under its descriptor's own name.
    pub fn register(&self, key: impl Into<FieldKey>) -> FormResult<()> {
        let key = key.into();
        let name = read_lock(&self.state, "reading field name")?
            .fields
            .get(key)
            .map(|field| field.name().to_string())
            .ok_or(FormError::UnknownField(key))?;
        self.register_field(key, name)
    }

    pub fn register_all(&self) -> FormResult<()> {
        let keys = read_lock(&self.state, "listing fields")?
            .fields
            .keys()
            .collect::<Vec<_>>();
        for key in keys {
            self.register(key)?;
        }
        Ok(())
    }

    /// Removes the binding and cancels the key's in-flight validation. The
    /// name stays registered while another key is bound to it.
    pub fn unregister_field(&self, key: impl Into<FieldKey>) -> FormResult<()> {
        let key = key.into();
        let mut state = write_lock(&self.state, "unregistering field")?;
        if state.cancel_in_flight(key) {
            debug!(%key, "in-flight validation cancelled by unregister");
        }
        let Some(name) = state.bindings.remove(&key) else {
            return Ok(());
        };
        if !state.bindings.values().any(|bound| *bound == name) {
            state.registered.retain(|registered| *registered != name);
        }
        debug!(%key, %name, "field unregistered");
        Ok(())
    }

    pub fn set_error<I, M>(&self, key: impl Into<FieldKey>, messages: I) -> FormResult<()>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let key = key.into();
        let messages = messages.into_iter().map(Into::into).collect::<Vec<_>>();
        let mut state = write_lock(&self.state, "setting field error")?;
        let Some(name) = state.name_of(key).map(str::to_owned) else {
            debug!(%key, "ignoring error for unbound field");
            return Ok(());
        };
        state.write_error(&name, messages);
        Ok(())
    }

    pub fn set_errors<I>(&self, errors: I) -> FormResult<()>
    where
        I: IntoIterator<Item = (FieldKey, Vec<String>)>,
    {
        let mut state = write_lock(&self.state, "setting field errors")?;
        for (key, messages) in errors {
            if let Some(name) = state.name_of(key).map(str::to_owned) {
                state.write_error(&name, messages);
            }
        }
        Ok(())
    }

    /// Replaces the whole error map.
    pub fn set_errors_by_name(&self, errors: BTreeMap<String, Vec<String>>) -> FormResult<()> {
        let mut state = write_lock(&self.state, "replacing field errors")?;
        state.errors.clear();
        for (name, messages) in errors {
            state.write_error(&name, messages);
        }
        Ok(())
    }

    pub fn clear_error(&self, key: impl Into<FieldKey>) -> FormResult<()> {
        let key = key.into();
        let mut state = write_lock(&self.state, "clearing field error")?;
        if let Some(name) = state.name_of(key).map(str::to_owned) {
            state.errors.remove(&name);
        }
        Ok(())
    }

    pub fn clear_errors(&self) -> FormResult<()> {
        write_lock(&self.state, "clearing all field errors")?
            .errors
            .clear();
        Ok(())
    }

    pub fn focus(&self, key: impl Into<FieldKey>) -> FormResult<()> {
        let key = key.into();
        let mut state = write_lock(&self.state, "focusing field")?;
        if let Some(name) = state.name_of(key).map(str::to_owned) {
            state.focused.insert(name);
        }
        Ok(())
    }

    /// Drops focus; in [`ValidationMode::OnBlur`] this also starts validation.
    pub fn blur(&self, key: impl Into<FieldKey>) -> FormResult<()> {
        let key = key.into();
        {
            let mut state = write_lock(&self.state, "blurring field")?;
            let Some(name) = state.name_of(key).map(str::to_owned) else {
                return Ok(());
            };
            state.focused.remove(&name);
        }
        if self.options.validate_mode == ValidationMode::OnBlur {
            self.spawn_validation(key)?;
        }
        Ok(())
    }

    pub fn value<V, R>(&self, key: TypedKey<V, R>) -> FormResult<V>
    where
        V: Clone + 'static,
    {
        let raw = self.raw_value(key)?;
        raw.downcast_ref::<V>()
            .cloned()
            .ok_or(FormError::TypeMismatch {
                key: key.key(),
                expected: type_name::<V>(),
            })
    }

    pub fn raw_value(&self, key: impl Into<FieldKey>) -> FormResult<AnyValue> {
        let key = key.into();
        read_lock(&self.state, "reading field value")?
            .fields
            .get(key)
            .map(|field| field.current_value())
            .ok_or(FormError::UnknownField(key))
    }

    pub fn set_value<V, R>(&self, key: TypedKey<V, R>, value: V) -> FormResult<()>
    where
        V: Send + Sync + 'static,
    {
        self.set_value_with(key, value, SetValueConfig::default())
    }

    pub fn set_value_with<V, R>(
        &self,
        key: TypedKey<V, R>,
        value: V,
        config: SetValueConfig,
    ) -> FormResult<()>
    where
        V: Send + Sync + 'static,
    {
        self.write_value(key.key(), &value, config)
    }

    pub fn set_value_raw(&self, key: impl Into<FieldKey>, value: AnyValue) -> FormResult<()> {
        self.write_value(key.into(), &*value, SetValueConfig::default())
    }

    pub fn set_value_raw_with(
        &self,
        key: impl Into<FieldKey>,
        value: AnyValue,
        config: SetValueConfig,
    ) -> FormResult<()> {
        self.write_value(key.into(), &*value, config)
    }

    /// Writes a batch of same-typed values without validating. Nothing is
    /// written when any key is unknown.
    pub fn set_values<V, R, I>(&self, values: I) -> FormResult<()>
    where
        V: Send + Sync + 'static,
        I: IntoIterator<Item = (TypedKey<V, R>, V)>,
    {
        self.set_values_raw(
            values
                .into_iter()
                .map(|(key, value)| (key.key(), Arc::new(value) as AnyValue)),
        )
    }

    /// Like [`set_values`](Self::set_values) for mixed types. The whole batch
    /// is type-checked before the first write.
    pub fn set_values_raw<I>(&self, values: I) -> FormResult<()>
    where
        I: IntoIterator<Item = (FieldKey, AnyValue)>,
    {
        let values = values.into_iter().collect::<Vec<_>>();
        let mut state = write_lock(&self.state, "writing field values")?;
        for (key, value) in &values {
            let field = state.fields.get(*key).ok_or(FormError::UnknownField(*key))?;
            if !field.accepts(&**value) {
                return Err(FormError::TypeMismatch {
                    key: *key,
                    expected: field.value_type(),
                });
            }
        }
        for (key, value) in &values {
            if let Some(field) = state.fields.get_mut(*key) {
                field.assign(&**value);
            }
        }
        debug!(count = values.len(), "field values written");
        Ok(())
    }

    pub fn errors(&self, key: impl Into<FieldKey>) -> FormResult<Vec<String>> {
        let key = key.into();
        let state = read_lock(&self.state, "reading field errors")?;
        Ok(state
            .name_of(key)
            .and_then(|name| state.errors.get(name))
            .cloned()
            .unwrap_or_default())
    }

    pub fn errors_by_name(&self) -> FormResult<BTreeMap<String, Vec<String>>> {
        Ok(read_lock(&self.state, "reading form errors")?.errors.clone())
    }

    pub fn field_state(&self, key: impl Into<FieldKey>) -> FormResult<FieldState> {
        Ok(read_lock(&self.state, "reading field state")?.field_state(key.into()))
    }

    pub fn is_validating(&self, key: impl Into<FieldKey>) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading in-flight validations")?
            .in_flight
            .contains_key(&key.into()))
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submit state")?.submitting)
    }

    pub fn submit_count(&self) -> FormResult<u32> {
        Ok(read_lock(&self.state, "reading submit count")?.submit_count)
    }

    /// The value the key's rule produced in its last committed validation,
    /// if that validation succeeded and no error was recorded since.
    pub fn validated_value<V, R>(&self, key: TypedKey<V, R>) -> FormResult<Option<Arc<R>>>
    where
        R: Send + Sync + 'static,
    {
        let validated = read_lock(&self.state, "reading validated value")?
            .validated
            .get(&key.key())
            .cloned();
        let Some(validated) = validated else {
            return Ok(None);
        };
        validated
            .downcast::<R>()
            .map(Some)
            .map_err(|_| FormError::TypeMismatch {
                key: key.key(),
                expected: type_name::<R>(),
            })
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        Ok(FormSnapshot {
            id: state.id,
            registered: state.registered.clone(),
            errors: state.errors.clone(),
            validating: state.in_flight.keys().copied().collect(),
            focused: state.focused.clone(),
            submitting: state.submitting,
            submit_count: state.submit_count,
            is_valid: state.errors.is_empty(),
        })
    }

    /// Restores initial values and clears errors, validated values and
    /// submit state. Registrations survive; in-flight work is cancelled.
    pub fn reset(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "resetting form")?;
        let keys = state.in_flight.keys().copied().collect::<Vec<_>>();
        for key in keys {
            state.cancel_in_flight(key);
        }
        state.fields = state.initial_fields.clone();
        state.errors.clear();
        state.validated.clear();
        state.focused.clear();
        state.submitting = false;
        state.submit_count = 0;
        debug!(form = state.id.0, "form reset");
        Ok(())
    }

    fn write_value(
        &self,
        key: FieldKey,
        value: &(dyn Any + Send + Sync),
        config: SetValueConfig,
    ) -> FormResult<()> {
        let bound = {
            let mut state = write_lock(&self.state, "writing field value")?;
            let field = state
                .fields
                .get_mut(key)
                .ok_or(FormError::UnknownField(key))?;
            if !field.assign(value) {
                return Err(FormError::TypeMismatch {
                    key,
                    expected: field.value_type(),
                });
            }
            state.bindings.contains_key(&key)
        };
        let validate =
            config.should_validate || self.options.validate_mode == ValidationMode::OnChange;
        if bound && validate {
            self.spawn_validation(key)?;
        }
        Ok(())
    }

    pub(super) fn spawn_task<F>(&self, context: &'static str, task: F) -> FormResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.spawner.spawn(task).map_err(|error| {
            warn!(%error, context, "failed to spawn form task");
            FormError::Spawn(error.to_string())
        })
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
