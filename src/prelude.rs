pub use crate::form::{
    Debounce, Field, FieldKey, FormController, FormError, FormFields, FormOptions, FormResult,
    FormSchema, FormView, RefinementResult, SetValueConfig, TaskStatus, TypedKey,
    ValidatedSnapshot, ValidationMode,
};
pub use crate::rules::{Outcome, RuleChain, Rules, union2, union3, union4};
pub use crate::{I18nManager, Locale};
