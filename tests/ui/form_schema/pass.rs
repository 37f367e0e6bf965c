use calmform::form::{Debounce, Field, FieldKey, FormSchema};
use calmform::rules::Rules;

#[derive(calmform::form::FormSchema)]
struct SignupForm {
    email: Field<String, String>,
    age: Field<String, i64>,
}

fn main() {
    let rules = Rules::new();
    let form = SignupForm {
        email: Field::new("Email", String::new(), rules.string().email())
            .debounce(Debounce::Fast),
        age: Field::new("Age", "18".to_string(), rules.string().parse_integer().gte(18)),
    };

    let keys = SignupForm::keys();
    let age: FieldKey = keys.age().into();
    assert_eq!(keys.email().key().as_str(), "email");
    assert_eq!(age.as_str(), "age");

    let fields = form.into_fields();
    assert_eq!(fields.len(), 2);
    assert!(fields.contains(keys.email().key()));
}
