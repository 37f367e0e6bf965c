use super::{AnyValue, Failure, Outcome, RuleChain};

const NO_BRANCH_MESSAGE: &str = "Unexpected error";

// Branches run in declaration order against the same raw input. The first
// success fills its slot and returns; if all fail, the last failure is kept.
macro_rules! define_union {
    ($(#[$meta:meta])* $name:ident { $($idx:tt: $rule:ident<$v:ident, $r:ident>),+ $(,)? }) => {
        $(#[$meta])*
        pub fn $name<$($v, $r),+>($($rule: RuleChain<$v, $r>),+) -> RuleChain<AnyValue, ($(Option<$r>,)+)>
        where
            $($v: Clone + Send + Sync + 'static, $r: Send + 'static,)+
        {
            RuleChain::from_fn(move |raw: AnyValue| {
                $(let $rule = $rule.clone();)+
                async move {
                    let mut slots: ($(Option<$r>,)+) = ($(None::<$r>,)+);
                    let mut last_failure = None;
                    $(
                        match $rule.validate_raw(Some(&*raw)).await {
                            Outcome::Success(value) => {
                                slots.$idx = Some(value);
                                return Outcome::Success(slots);
                            }
                            Outcome::Failure(failure) => last_failure = Some(failure),
                        }
                    )+
                    Outcome::Failure(last_failure.unwrap_or_else(|| Failure::new(NO_BRANCH_MESSAGE)))
                }
            })
        }
    };
}

define_union!(
    /// Accepts input matching either rule. Exactly one slot of a successful
    /// result is `Some`.
    union2 { 0: first<A, RA>, 1: second<B, RB> }
);

define_union!(
    union3 { 0: first<A, RA>, 1: second<B, RB>, 2: third<C, RC> }
);

define_union!(
    union4 { 0: first<A, RA>, 1: second<B, RB>, 2: third<C, RC>, 3: fourth<D, RD> }
);
