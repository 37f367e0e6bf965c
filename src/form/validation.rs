use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{AbortHandle, Abortable, BoxFuture, join, join_all};
use futures_timer::Delay;
use tracing::{debug, warn};

use crate::rules::{AnyValue, Outcome};

use super::controller::{
    FieldKey, FormController, FormError, FormResult, FormState, InFlight, TaskStatus,
    ValidationPhase, ValidationTicket, read_lock, write_lock,
};
use super::field::TypedKey;

pub type RefinementFuture = BoxFuture<'static, RefinementResult>;

pub(super) type Refinement = Arc<dyn Fn(FormView) -> RefinementFuture + Send + Sync>;

/// Read-only copy of the form taken when a field validation starts running.
#[derive(Clone)]
pub struct FormView {
    values: BTreeMap<FieldKey, AnyValue>,
    bindings: BTreeMap<FieldKey, String>,
    errors: BTreeMap<String, Vec<String>>,
}

impl FormView {
    fn capture(state: &FormState) -> Self {
        Self {
            values: state
                .fields
                .iter()
                .map(|(key, field)| (key, field.current_value()))
                .collect(),
            bindings: state.bindings.clone(),
            errors: state.errors.clone(),
        }
    }

    /// Current value of the field, or `None` for an unknown key.
    pub fn value<V: 'static, R>(&self, key: TypedKey<V, R>) -> Option<&V> {
        self.values
            .get(&key.key())
            .and_then(|value| value.downcast_ref::<V>())
    }

    pub fn raw_value(&self, key: impl Into<FieldKey>) -> Option<&AnyValue> {
        self.values.get(&key.into())
    }

    pub fn name(&self, key: impl Into<FieldKey>) -> Option<&str> {
        self.bindings.get(&key.into()).map(String::as_str)
    }

    pub fn is_registered(&self, key: impl Into<FieldKey>) -> bool {
        self.bindings.contains_key(&key.into())
    }

    pub fn errors(&self, key: impl Into<FieldKey>) -> &[String] {
        self.name(key)
            .and_then(|name| self.errors.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Per-key messages produced by a form-level refinement. `None` or an empty
/// list leaves the key untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RefinementResult {
    entries: BTreeMap<FieldKey, Option<Vec<String>>>,
}

impl RefinementResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail<I, M>(mut self, key: impl Into<FieldKey>, messages: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.insert(
            key,
            Some(messages.into_iter().map(Into::into).collect()),
        );
        self
    }

    pub fn pass(mut self, key: impl Into<FieldKey>) -> Self {
        self.insert(key, None);
        self
    }

    pub fn insert(&mut self, key: impl Into<FieldKey>, messages: Option<Vec<String>>) {
        self.entries.insert(key.into(), messages);
    }

    /// Entries of `other` replace entries for the same key.
    pub fn merge(&mut self, other: RefinementResult) {
        self.entries.extend(other.entries);
    }

    pub fn messages(&self, key: impl Into<FieldKey>) -> Option<&[String]> {
        self.entries
            .get(&key.into())
            .and_then(|messages| messages.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_failures(self) -> impl Iterator<Item = (FieldKey, Vec<String>)> {
        self.entries.into_iter().filter_map(|(key, messages)| {
            messages
                .filter(|messages| !messages.is_empty())
                .map(|messages| (key, messages))
        })
    }
}

/// A validation task for one key, created by
/// [`FormController::schedule_validation`].
///
/// Resolves to [`TaskStatus::Cancelled`] when a newer task for the same key,
/// an unregister or a reset superseded it. Dropping it before completion
/// releases the key's in-flight entry.
#[must_use = "a scheduled validation does nothing until it is awaited or spawned"]
pub struct ScheduledValidation {
    key: FieldKey,
    ticket: ValidationTicket,
    task: Abortable<BoxFuture<'static, FormResult<TaskStatus>>>,
    guard: InFlightGuard,
}

impl ScheduledValidation {
    pub fn key(&self) -> FieldKey {
        self.key
    }

    pub fn ticket(&self) -> ValidationTicket {
        self.ticket
    }
}

impl Future for ScheduledValidation {
    type Output = FormResult<TaskStatus>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let key = self.key;
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => {
                self.guard.release();
                Poll::Ready(result)
            }
            Poll::Ready(Err(_aborted)) => {
                debug!(%key, "validation aborted");
                self.guard.release();
                Poll::Ready(Ok(TaskStatus::Cancelled))
            }
        }
    }
}

struct InFlightGuard {
    state: Arc<RwLock<FormState>>,
    key: FieldKey,
    ticket: ValidationTicket,
    released: bool,
}

impl InFlightGuard {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let Ok(mut state) = self.state.write() else {
            return;
        };
        let owned = state
            .in_flight
            .get(&self.key)
            .is_some_and(|in_flight| in_flight.ticket == self.ticket);
        if owned {
            state.in_flight.remove(&self.key);
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl FormController {
    /// Adds a form-level check that runs alongside every field validation.
    /// Results of later refinements win for the same key.
    pub fn register_refinement<F, Fut>(&self, refinement: F) -> FormResult<()>
    where
        F: Fn(FormView) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RefinementResult> + Send + 'static,
    {
        let refinement: Refinement = Arc::new(move |view: FormView| refinement(view).boxed());
        write_lock(&self.refinements, "registering refinement")?.push(refinement);
        Ok(())
    }

    /// Supersedes any validation of `key` and returns the new task. The task
    /// waits the field's debounce, then runs the field rule and every
    /// refinement concurrently and merges the results into the form.
    pub fn schedule_validation(
        &self,
        key: impl Into<FieldKey>,
    ) -> FormResult<ScheduledValidation> {
        let key = key.into();
        let (abort, registration) = AbortHandle::new_pair();
        let (ticket, debounce) = {
            let mut state = write_lock(&self.state, "scheduling validation")?;
            let debounce = state
                .fields
                .get(key)
                .map(|field| field.debounce())
                .ok_or(FormError::UnknownField(key))?;
            if let Some(previous) = state.in_flight.remove(&key) {
                previous.abort.abort();
                debug!(%key, ticket = previous.ticket.0, "superseded in-flight validation");
            }
            let ticket = state.next_ticket(key);
            state.in_flight.insert(key, InFlight::new(ticket, abort));
            (ticket, debounce)
        };
        debug!(%key, ticket = ticket.0, ?debounce, "validation scheduled");

        let controller = self.clone();
        let task = async move { controller.run_validation(key, ticket, debounce).await }.boxed();
        Ok(ScheduledValidation {
            key,
            ticket,
            task: Abortable::new(task, registration),
            guard: InFlightGuard {
                state: self.state.clone(),
                key,
                ticket,
                released: false,
            },
        })
    }

    pub async fn validate_field(&self, key: impl Into<FieldKey>) -> FormResult<TaskStatus> {
        self.schedule_validation(key)?.await
    }

    /// Validates every key bound when the call starts and reports whether
    /// the form has no errors afterwards.
    pub async fn validate_all_fields(&self) -> FormResult<bool> {
        let keys = read_lock(&self.state, "reading registered fields")?
            .bindings
            .keys()
            .copied()
            .collect::<Vec<_>>();
        let tasks = keys
            .iter()
            .map(|key| self.schedule_validation(*key))
            .collect::<FormResult<Vec<_>>>()?;
        let mut superseded = Vec::new();
        for (key, status) in keys.into_iter().zip(join_all(tasks).await) {
            if status? == TaskStatus::Cancelled {
                superseded.push(key);
            }
        }
        for key in superseded {
            self.wait_until_settled(key).await?;
        }
        Ok(read_lock(&self.state, "reading form errors")?.errors.is_empty())
    }

    /// Waits until no validation of `key` is in flight. A task that
    /// supersedes ours may itself be superseded, so this loops until the
    /// entry is gone.
    async fn wait_until_settled(&self, key: FieldKey) -> FormResult<()> {
        loop {
            let settled = {
                let state = read_lock(&self.state, "waiting for in-flight validation")?;
                state.in_flight.get(&key).map(|in_flight| in_flight.settled.clone())
            };
            let Some(settled) = settled else {
                return Ok(());
            };
            debug!(%key, "waiting for superseding validation");
            // The sender never fires; dropping the entry resolves the signal.
            let _ = settled.await;
        }
    }

    /// Schedules a validation of `key` on the form's spawner without waiting
    /// for it.
    pub fn spawn_validation(&self, key: impl Into<FieldKey>) -> FormResult<()> {
        let task = self.schedule_validation(key)?;
        let key = task.key();
        self.spawn_task("spawning field validation", async move {
            match task.await {
                Ok(status) => debug!(%key, ?status, "background validation finished"),
                Err(error) => warn!(%key, %error, "background validation failed"),
            }
        })
    }

    async fn run_validation(
        &self,
        key: FieldKey,
        ticket: ValidationTicket,
        debounce: Duration,
    ) -> FormResult<TaskStatus> {
        if !debounce.is_zero() {
            Delay::new(debounce).await;
        }

        let refinements = read_lock(&self.refinements, "reading refinements")?.clone();
        let (own, view) = {
            let mut state = write_lock(&self.state, "starting validation")?;
            if !state.is_current(key, ticket) {
                debug!(%key, ticket = ticket.0, "validation stale after debounce");
                return Ok(TaskStatus::Cancelled);
            }
            if let Some(in_flight) = state.in_flight.get_mut(&key) {
                in_flight.phase = ValidationPhase::Running;
            }
            let Some(field) = state.fields.get(key) else {
                return Err(FormError::UnknownField(key));
            };
            (field.validate(), FormView::capture(&state))
        };

        let (own, refinement) = join(own, run_refinements(refinements, view)).await;
        self.commit(key, ticket, own, refinement)
    }

    fn commit(
        &self,
        key: FieldKey,
        ticket: ValidationTicket,
        own: Outcome<AnyValue>,
        refinement: RefinementResult,
    ) -> FormResult<TaskStatus> {
        let mut state = write_lock(&self.state, "committing validation")?;
        if !state.is_current(key, ticket) {
            debug!(%key, ticket = ticket.0, "validation stale after rule evaluation");
            return Ok(TaskStatus::Cancelled);
        }

        let own_name = state.name_of(key).map(str::to_owned);
        let own_failed = match own {
            Outcome::Success(value) => {
                state.validated.insert(key, value);
                if let Some(name) = &own_name {
                    state.errors.remove(name);
                }
                false
            }
            Outcome::Failure(failure) => {
                state.validated.remove(&key);
                if let Some(name) = &own_name {
                    state.insert_errors(name, failure.into_messages());
                }
                true
            }
        };

        for (target, messages) in refinement.into_failures() {
            if own_failed && target == key {
                continue;
            }
            let Some(name) = state.name_of(target).map(str::to_owned) else {
                continue;
            };
            state.insert_errors(&name, messages);
        }

        state.in_flight.remove(&key);
        debug!(%key, ticket = ticket.0, own_failed, "validation committed");
        Ok(TaskStatus::Committed)
    }
}

async fn run_refinements(refinements: Vec<Refinement>, view: FormView) -> RefinementResult {
    let results = join_all(
        refinements
            .iter()
            .map(|refinement| refinement(view.clone())),
    )
    .await;
    let mut merged = RefinementResult::new();
    for result in results {
        merged.merge(result);
    }
    merged
}
