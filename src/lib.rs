//! Client-side form state with composable async validation rules.

pub mod form;
pub mod i18n;
pub mod prelude;
pub mod rules;

pub use i18n::{I18nManager, Locale};
