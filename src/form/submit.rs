use std::any::type_name;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::rules::AnyValue;

use super::controller::{FieldKey, FormController, FormError, FormResult, read_lock, write_lock};
use super::field::TypedKey;

/// Validated values of every bound field, handed to the submit callback.
#[derive(Clone, Default)]
pub struct ValidatedSnapshot {
    validated: BTreeMap<FieldKey, AnyValue>,
    values: BTreeMap<FieldKey, AnyValue>,
}

impl ValidatedSnapshot {
    /// The value the field's rule produced, e.g. the `i64` parsed from a
    /// text input.
    pub fn get<V, R: 'static>(&self, key: TypedKey<V, R>) -> FormResult<&R> {
        let key = key.key();
        let validated = self
            .validated
            .get(&key)
            .ok_or(FormError::MissingValidatedValue(key))?;
        validated
            .downcast_ref::<R>()
            .ok_or(FormError::TypeMismatch {
                key,
                expected: type_name::<R>(),
            })
    }

    pub fn get_raw(&self, key: impl Into<FieldKey>) -> Option<&AnyValue> {
        self.validated.get(&key.into())
    }

    /// The field's value as entered, before the rule ran.
    pub fn value<V: 'static, R>(&self, key: TypedKey<V, R>) -> FormResult<&V> {
        let key = key.key();
        let value = self.values.get(&key).ok_or(FormError::UnknownField(key))?;
        value.downcast_ref::<V>().ok_or(FormError::TypeMismatch {
            key,
            expected: type_name::<V>(),
        })
    }

    pub fn contains(&self, key: impl Into<FieldKey>) -> bool {
        self.validated.contains_key(&key.into())
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.validated.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.validated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validated.is_empty()
    }
}

impl FormController {
    /// Returns a trigger for UI submit actions. Each call marks the form as
    /// submitting and spawns an independent pass that validates every bound
    /// field and calls `on_success` only when the form is valid.
    pub fn handle_submit<F, Fut>(&self, on_success: F) -> impl Fn() + Clone + Send + Sync + 'static
    where
        F: Fn(ValidatedSnapshot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let controller = self.clone();
        let on_success = Arc::new(on_success);
        move || {
            if let Err(error) = controller.begin_submit() {
                warn!(%error, "submit trigger ignored");
                return;
            }
            let pass_controller = controller.clone();
            let on_success = on_success.clone();
            let pass = async move {
                if let Err(error) = pass_controller
                    .run_submit_pass(move |snapshot| on_success(snapshot))
                    .await
                {
                    warn!(%error, "submit pass failed");
                }
            };
            if controller.spawn_task("spawning submit pass", pass).is_err()
                && let Err(error) = controller.end_submit()
            {
                warn!(%error, "failed to clear submitting flag");
            }
        }
    }

    /// Runs one submit pass inline and returns whether the form was valid.
    pub async fn submit<F, Fut>(&self, on_success: F) -> FormResult<bool>
    where
        F: FnOnce(ValidatedSnapshot) -> Fut,
        Fut: Future<Output = ()>,
    {
        self.begin_submit()?;
        self.run_submit_pass(on_success).await
    }

    /// Validated values of the bound fields as of now.
    pub fn validated_snapshot(&self) -> FormResult<ValidatedSnapshot> {
        let state = read_lock(&self.state, "creating validated snapshot")?;
        let mut snapshot = ValidatedSnapshot::default();
        for key in state.bindings.keys().copied() {
            if let Some(validated) = state.validated.get(&key) {
                snapshot.validated.insert(key, validated.clone());
            }
            if let Some(field) = state.fields.get(key) {
                snapshot.values.insert(key, field.current_value());
            }
        }
        Ok(snapshot)
    }

    fn begin_submit(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "starting submit")?;
        state.submitting = true;
        state.submit_count = state.submit_count.saturating_add(1);
        Ok(())
    }

    fn end_submit(&self) -> FormResult<()> {
        write_lock(&self.state, "finishing submit")?.submitting = false;
        Ok(())
    }

    async fn run_submit_pass<F, Fut>(&self, on_success: F) -> FormResult<bool>
    where
        F: FnOnce(ValidatedSnapshot) -> Fut,
        Fut: Future<Output = ()>,
    {
        let result = self.submit_pass(on_success).await;
        self.end_submit()?;
        result
    }

    async fn submit_pass<F, Fut>(&self, on_success: F) -> FormResult<bool>
    where
        F: FnOnce(ValidatedSnapshot) -> Fut,
        Fut: Future<Output = ()>,
    {
        let form = self.form_id()?.0;
        if !self.validate_all_fields().await? {
            let errors = read_lock(&self.state, "reading submit errors")?.errors.len();
            info!(form, errors, "submit blocked by validation errors");
            return Ok(false);
        }
        let snapshot = self.validated_snapshot()?;
        info!(form, fields = snapshot.len(), "submitting validated form");
        on_success(snapshot).await;
        Ok(true)
    }
}
