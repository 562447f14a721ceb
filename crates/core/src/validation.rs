use crate::record::Record;
use crate::schema::EntityType;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// The value must not be blank.
    Presence,
    /// With `only_integer`, the value must be an integer (or integer text);
    /// otherwise any integer, real, or numeric text.
    Numericality { only_integer: bool },
    /// No stored row may hold the same value in this column.
    Uniqueness,
    Length { minimum: usize },
    /// The value must equal the `<field>_confirmation` attribute.
    Confirmation,
}

/// The database read that `Rule::Uniqueness` needs.
pub trait UniquenessProbe {
    type Error;

    fn value_taken(
        &mut self,
        entity: &EntityType,
        column: &str,
        value: &Value,
    ) -> Result<bool, Self::Error>;
}

/// Applies every rule declared on each of `columns`, in declaration order,
/// and returns one message per failing rule.
pub fn validate_columns<P: UniquenessProbe>(
    record: &Record,
    columns: &[String],
    probe: &mut P,
) -> Result<Vec<String>, P::Error> {
    let entity = record.entity();
    let mut errors = Vec::new();
    for column in columns {
        for rule in entity.rules_for(column) {
            if let Some(message) = check(record, column, rule, probe)? {
                errors.push(message);
            }
        }
    }
    Ok(errors)
}

fn check<P: UniquenessProbe>(
    record: &Record,
    column: &str,
    rule: &Rule,
    probe: &mut P,
) -> Result<Option<String>, P::Error> {
    let value = record.value(column);
    let failed = match rule {
        Rule::Presence => value.is_blank().then(|| format!("{column} can't be blank.")),
        Rule::Numericality { only_integer: true } => {
            (!is_integer(value)).then(|| format!("{column} must be an integer."))
        }
        Rule::Numericality { only_integer: false } => {
            (!is_numeric(value)).then(|| format!("{column} is not a number."))
        }
        Rule::Uniqueness => {
            if probe.value_taken(record.entity(), column, value)? {
                Some(format!("{column} '{value}' already exists."))
            } else {
                None
            }
        }
        Rule::Length { minimum } => (length(value) < *minimum).then(|| {
            format!("{column} is too short (minimum length: {minimum} characters).")
        }),
        Rule::Confirmation => {
            let shadow = format!("{column}_confirmation");
            (record.value(&shadow) != value)
                .then(|| format!("{column} and {shadow} do not match."))
        }
    };
    Ok(failed)
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Integer(_) => true,
        Value::Text(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Integer(_) => true,
        Value::Real(x) => x.is_finite(),
        Value::Text(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
        _ => false,
    }
}

fn length(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Text(s) => s.chars().count(),
        Value::Blob(b) => b.len(),
        Value::Array(items) => items.len(),
        other => other.to_string().chars().count(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::convert::Infallible;
    use std::sync::Arc;

    use super::*;

    /// Pretends `taken` values already exist in storage.
    struct Taken(BTreeSet<String>);

    impl UniquenessProbe for Taken {
        type Error = Infallible;

        fn value_taken(&mut self, _: &EntityType, _: &str, value: &Value) -> Result<bool, Infallible> {
            Ok(self.0.contains(&value.to_string()))
        }
    }

    fn users() -> Arc<EntityType> {
        EntityType::builder("User")
            .field("email")
            .field("password")
            .field("age")
            .validates("email", Rule::Presence)
            .validates("email", Rule::Uniqueness)
            .validates("password", Rule::Length { minimum: 8 })
            .validates("password", Rule::Confirmation)
            .validates("age", Rule::Numericality { only_integer: true })
            .build()
            .unwrap()
    }

    fn run(record: &Record, columns: &[&str], taken: &[&str]) -> Vec<String> {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let mut probe = Taken(taken.iter().map(|t| t.to_string()).collect());
        validate_columns(record, &columns, &mut probe).unwrap()
    }

    #[test]
    fn collects_every_failing_rule_per_column() {
        let mut record = Record::new(&users());
        record
            .assign_attributes([("password", "short"), ("password_confirmation", "other")])
            .unwrap();
        let errors = run(&record, &["password"], &[]);
        assert_eq!(
            errors,
            vec![
                "password is too short (minimum length: 8 characters).".to_string(),
                "password and password_confirmation do not match.".to_string(),
            ]
        );
    }

    #[test]
    fn only_checks_requested_columns() {
        let record = Record::new(&users());
        assert!(run(&record, &["age"], &[]).contains(&"age must be an integer.".to_string()));
        assert!(run(&record, &[], &[]).is_empty());
    }

    #[test]
    fn presence_and_uniqueness() {
        let mut record = Record::new(&users());
        record.assign_attribute("email", "").unwrap();
        assert_eq!(run(&record, &["email"], &[]), vec!["email can't be blank.".to_string()]);

        record.assign_attribute("email", "a@b.c").unwrap();
        assert_eq!(
            run(&record, &["email"], &["a@b.c"]),
            vec!["email 'a@b.c' already exists.".to_string()]
        );
        assert!(run(&record, &["email"], &["x@y.z"]).is_empty());
    }

    #[test]
    fn numericality_accepts_integer_text() {
        let mut record = Record::new(&users());
        record.assign_attribute("age", "42").unwrap();
        assert!(run(&record, &["age"], &[]).is_empty());
        record.assign_attribute("age", 4.5).unwrap();
        assert_eq!(run(&record, &["age"], &[]), vec!["age must be an integer.".to_string()]);
    }
}
