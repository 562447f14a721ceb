use rowforge_core::validation::validate_columns;
use rowforge_core::{Action, Criterion, EntityType, Hook, Record, UniquenessProbe, Value};
use rowforge_storage::Database;
use tracing::debug;

use crate::{Engine, EngineError};

/// Answers uniqueness lookups through the engine's read path.
struct StoredValues<'a, D: Database> {
    engine: &'a Engine<D>,
}

impl<D: Database> UniquenessProbe for StoredValues<'_, D> {
    type Error = EngineError;

    fn value_taken(&mut self, entity: &EntityType, column: &str, value: &Value) -> Result<bool, EngineError> {
        if value.is_null() {
            return Ok(false);
        }
        let filters = [(column.to_string(), Criterion::Is(value.clone()))];
        Ok(self.engine.first_row(entity, &filters)?.is_some())
    }
}

impl<D: Database> Engine<D> {
    /// The validation phases. Field rules always run after `before_validate`;
    /// the `validate` hook runs only when the rules pass. Errors from any
    /// phase are checked once, before `after_validate`.
    pub(crate) fn run_validation(
        &self,
        record: &mut Record,
        columns: &[String],
        action: Action,
    ) -> Result<bool, EngineError> {
        self.run_hook(Hook::BeforeValidate, action, record)?;

        let mut probe = StoredValues { engine: self };
        let messages = validate_columns(record, columns, &mut probe)?;
        let rules_passed = messages.is_empty();
        for message in messages {
            record.add_error(message);
        }
        if rules_passed {
            self.run_hook(Hook::Validate, action, record)?;
        }
        if record.has_errors() {
            debug!(table = record.entity().table(), errors = record.errors().len(), "validation failed");
            return Ok(false);
        }

        self.run_hook(Hook::AfterValidate, action, record)?;
        Ok(true)
    }
}
