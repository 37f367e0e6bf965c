//! Form state with asynchronous, cancellable, debounced field validation.
//!
//! A [`FormController`] owns a set of [`Field`] descriptors. Writing a value
//! can schedule a validation task for its key; a newer task for the same key
//! always supersedes the older one, so only the latest result is committed.

mod controller;
mod field;
mod submit;
mod validation;


pub use calmform_derive::FormSchema;
pub use controller::{
    FieldKey, FieldState, FormController, FormError, FormId, FormOptions, FormResult,
    FormSnapshot, SetValueConfig, TaskStatus, ValidationMode, ValidationPhase, ValidationTicket,
};
pub use field::{Debounce, Field, FieldSpec, FormFields, FormSchema, TypedKey};
pub use submit::ValidatedSnapshot;
pub use validation::{FormView, RefinementFuture, RefinementResult, ScheduledValidation};
