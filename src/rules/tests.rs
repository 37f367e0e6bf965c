use super::*;
use futures::executor::block_on;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn rules() -> Rules {
    Rules::with_messages(Messages::from_i18n(&{
        let i18n = crate::I18nManager::new();
        i18n.set_locale("en-US");
        i18n
    }))
}

#[test]
fn chain_stops_at_first_failing_step() {
    let later_calls = Arc::new(AtomicUsize::new(0));
    let counter = later_calls.clone();
    let chain = RuleChain::<i64, i64>::new()
        .check(|value| *value > 0, "must be positive")
        .check(|value| *value < 100, "must be small")
        .check(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
            "never fails",
        );

    let outcome = block_on(chain.validate(-3));
    assert_eq!(outcome.errors(), Some(&["must be positive".to_string()][..]));
    assert_eq!(later_calls.load(Ordering::SeqCst), 0);

    let outcome = block_on(chain.validate(7));
    assert_eq!(outcome, Outcome::Success(7));
    assert_eq!(later_calls.load(Ordering::SeqCst), 1);
    assert_eq!(chain.steps(), 3);
}

#[test]
fn steps_receive_previous_output() {
    let chain = RuleChain::<String, String>::new()
        .map(|value| value.trim().to_string())
        .then(|value: String| async move {
            match value.parse::<i64>() {
                Ok(parsed) => Outcome::Success(parsed),
                Err(_) => Outcome::failure("not a number"),
            }
        })
        .map(|value| value * 2);

    assert_eq!(block_on(chain.validate("  21 ".into())), Outcome::Success(42));
    assert_eq!(
        block_on(chain.validate("abc".into())).errors(),
        Some(&["not a number".to_string()][..])
    );
}

#[test]
fn optional_skips_base_rule_for_none() {
    let base_calls = Arc::new(AtomicUsize::new(0));
    let counter = base_calls.clone();
    let chain = rules()
        .string()
        .min_length(3)
        .build()
        .map(move |value| {
            counter.fetch_add(1, Ordering::SeqCst);
            value
        })
        .optional();

    assert_eq!(block_on(chain.validate(None)), Outcome::Success(None));
    assert_eq!(base_calls.load(Ordering::SeqCst), 0);

    assert_eq!(
        block_on(chain.validate(Some("abcd".into()))),
        Outcome::Success(Some("abcd".to_string()))
    );
    assert!(!block_on(chain.validate(Some("ab".into()))).is_success());
    assert_eq!(base_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn raw_input_distinguishes_missing_and_wrong_type() {
    let chain = rules().integer().gt(5).build();

    let missing = block_on(chain.validate_raw(None));
    assert_eq!(missing.failure_kind(), Some(FailureKind::Missing));

    let wrong: AnyValue = Arc::new("ten".to_string());
    let mismatch = block_on(chain.validate_raw(Some(&*wrong)));
    assert_eq!(mismatch.failure_kind(), Some(FailureKind::TypeMismatch));

    let small: AnyValue = Arc::new(2_i64);
    let rejected = block_on(chain.validate_raw(Some(&*small)));
    assert_eq!(rejected.failure_kind(), Some(FailureKind::Rule));

    let large: AnyValue = Arc::new(10_i64);
    assert_eq!(block_on(chain.validate_raw(Some(&*large))), Outcome::Success(10));
}

#[test]
fn union_reports_first_matching_branch() {
    let rules = rules();
    let union = union2(rules.integer().gt(0).build(), rules.string().email().build());

    let number: AnyValue = Arc::new(5_i64);
    assert_eq!(
        block_on(union.validate(number)),
        Outcome::Success((Some(5), None))
    );

    let email: AnyValue = Arc::new("user@example.com".to_string());
    assert_eq!(
        block_on(union.validate(email)),
        Outcome::Success((None, Some("user@example.com".to_string())))
    );
}

#[test]
fn failure_always_carries_a_message() {
    let empty = Failure::with_messages(Vec::<String>::new());
    assert_eq!(empty.messages(), ["Invalid value".to_string()]);
    assert_eq!(empty.kind(), FailureKind::Rule);

    let several = Failure::with_messages(["too short", "no digits"]);
    assert_eq!(several.messages().len(), 2);
}

#[test]
fn union_exhaustion_reports_last_branch_message() {
    let union = union2(
        RuleChain::<i64, i64>::new().check(|_| false, "first branch"),
        RuleChain::<i64, i64>::new().check(|_| false, "second branch"),
    );

    let input: AnyValue = Arc::new(1_i64);
    let outcome = block_on(union.validate(input));
    assert_eq!(outcome.errors(), Some(&["second branch".to_string()][..]));
}

#[test]
fn union_exhaustion_keeps_type_mismatch_kind_of_last_branch() {
    let union = union3(
        rules().boolean().is_true().build(),
        RuleChain::<i64, i64>::new().check(|_| false, "never"),
        rules().string().build(),
    );

    let input: AnyValue = Arc::new(1.5_f64);
    let outcome = block_on(union.validate(input));
    assert_eq!(outcome.failure_kind(), Some(FailureKind::TypeMismatch));
}

#[test]
fn string_rules_use_catalog_messages() {
    let chain = rules().string().not_empty().min_length(3).build();
    assert_eq!(
        block_on(chain.validate(String::new())).errors(),
        Some(&["Value required".to_string()][..])
    );
    assert_eq!(
        block_on(chain.validate("ab".into())).errors(),
        Some(&["Value must be at least 3 characters".to_string()][..])
    );
}

#[test]
fn string_format_rules() {
    let rules = rules();
    let email = rules.string().email().build();
    assert!(block_on(email.validate("a.b@example.org".into())).is_success());
    assert!(!block_on(email.validate("not-an-email".into())).is_success());

    let phone = rules.string().e164_phone_number().build();
    assert!(block_on(phone.validate("+14155552671".into())).is_success());
    assert!(!block_on(phone.validate("0123".into())).is_success());

    let uuid = rules.string().uuid().build();
    assert!(block_on(uuid.validate("67e55044-10b1-426f-9247-bb680e5fe0c8".into())).is_success());
    assert!(!block_on(uuid.validate("67e55044".into())).is_success());

    let ip = rules.string().ipv4().build();
    assert!(block_on(ip.validate("10.0.0.1".into())).is_success());
    assert!(!block_on(ip.validate("::1".into())).is_success());
    assert!(block_on(rules.string().ipv6().build().validate("::1".into())).is_success());

    let code = rules
        .string()
        .regex(regex::Regex::new("^[A-Z]{3}$").expect("pattern"))
        .build();
    assert!(block_on(code.validate("ABC".into())).is_success());
    assert!(!block_on(code.validate("abc".into())).is_success());

    let trimmed = rules.string().trimmed().build();
    assert!(!block_on(trimmed.validate(" padded ".into())).is_success());
    assert_eq!(
        block_on(rules.string().trim().length(6).build().validate(" padded ".into())),
        Outcome::Success("padded".to_string())
    );
}

#[test]
fn parse_integer_exposes_number_to_later_steps() {
    let chain = rules().string().not_empty().parse_integer().gte(18).build();

    assert_eq!(block_on(chain.validate("42".into())), Outcome::Success(42));
    assert_eq!(
        block_on(chain.validate("17".into())).errors(),
        Some(&["Value must be at least 18".to_string()][..])
    );
    assert_eq!(
        block_on(chain.validate("4.2".into())).errors(),
        Some(&["Value must be a whole number".to_string()][..])
    );
}

#[test]
fn number_rules_cover_bounds_and_signs() {
    let rules = rules();
    let cases: Vec<(RuleChain<i64, i64>, i64, bool)> = vec![
        (rules.integer().gt(5).build(), 5, false),
        (rules.integer().gte(5).build(), 5, true),
        (rules.integer().lt(5).build(), 5, false),
        (rules.integer().lte(5).build(), 5, true),
        (rules.integer().positive().build(), 0, false),
        (rules.integer().non_negative().build(), 0, true),
        (rules.integer().negative().build(), -1, true),
        (rules.integer().non_positive().build(), 1, false),
        (rules.integer().multiple_of(3).build(), 9, true),
        (rules.integer().multiple_of(0).build(), 9, false),
        (rules.integer().multiple_of(-1).build(), i64::MIN, true),
    ];
    for (chain, input, expected) in cases {
        assert_eq!(block_on(chain.validate(input)).is_success(), expected, "input {input}");
    }
}

#[test]
fn decimal_rules_parse_and_compare() {
    let chain = rules()
        .string()
        .parse_decimal()
        .gt(Decimal::new(1, 1))
        .multiple_of(Decimal::new(5, 2))
        .build();

    assert_eq!(
        block_on(chain.validate("0.25".into())),
        Outcome::Success(Decimal::new(25, 2))
    );
    assert_eq!(
        block_on(chain.validate("0.1".into())).errors(),
        Some(&["Value must be greater than 0.1".to_string()][..])
    );
    assert!(!block_on(chain.validate("0.27".into())).is_success());
}

#[test]
fn boolean_is_true() {
    let chain = rules().boolean().is_true().build();
    assert!(block_on(chain.validate(true)).is_success());
    assert_eq!(
        block_on(chain.validate(false)).errors(),
        Some(&["Value required".to_string()][..])
    );
}

#[test]
fn overridden_message_template_is_used() {
    let messages = Messages::default().set(MessageKey::Gt, "more than {value}, please");
    let chain = Rules::with_messages(messages).integer().gt(5).build();
    assert_eq!(
        block_on(chain.validate(2)).errors(),
        Some(&["more than 5, please".to_string()][..])
    );
}
