use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;
use crate::record::Record;

/// A lifecycle callback. Callbacks may reassign attributes and add errors.
pub type Callback = fn(&mut Record) -> Result<(), CoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Hook {
    BeforeValidate,
    Validate,
    AfterValidate,
    BeforeSave,
    AfterSave,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDestroy,
    AfterDestroy,
}

impl Hook {
    pub const ALL: [Hook; 11] = [
        Hook::BeforeValidate,
        Hook::Validate,
        Hook::AfterValidate,
        Hook::BeforeSave,
        Hook::AfterSave,
        Hook::BeforeCreate,
        Hook::AfterCreate,
        Hook::BeforeUpdate,
        Hook::AfterUpdate,
        Hook::BeforeDestroy,
        Hook::AfterDestroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeValidate => "before_validate",
            Self::Validate => "validate",
            Self::AfterValidate => "after_validate",
            Self::BeforeSave => "before_save",
            Self::AfterSave => "after_save",
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDestroy => "before_destroy",
            Self::AfterDestroy => "after_destroy",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persistence operation a hook runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    UpdateColumn,
    Destroy,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateColumn => "update_column",
            Self::Destroy => "destroy",
        }
    }
}

/// Which actions a registration (or a skip registration) covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Applicability {
    #[default]
    Always,
    Only(Vec<Action>),
    Except(Vec<Action>),
}

impl Applicability {
    pub fn only(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::Only(actions.into_iter().collect())
    }

    pub fn except(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::Except(actions.into_iter().collect())
    }

    pub fn applies_to(&self, action: Action) -> bool {
        match self {
            Self::Always => true,
            Self::Only(actions) => actions.contains(&action),
            Self::Except(actions) => !actions.contains(&action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub applicability: Applicability,
}

/// Callback declarations made at one level of an entity hierarchy.
///
/// A shared base set is declared once and handed to every concrete entity
/// builder through `EntityTypeBuilder::inherit`.
#[derive(Debug, Clone, Default)]
pub struct CallbackSet {
    functions: Vec<(String, Callback)>,
    registrations: BTreeMap<Hook, Vec<Registration>>,
    skips: BTreeMap<Hook, Vec<Registration>>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `callback` resolvable under `name`. A later definition of the
    /// same name replaces an earlier one.
    pub fn define(mut self, name: &str, callback: Callback) -> Self {
        self.functions.retain(|(existing, _)| existing != name);
        self.functions.push((name.to_string(), callback));
        self
    }

    pub fn on(self, hook: Hook, name: &str) -> Self {
        self.on_with(hook, name, Applicability::Always)
    }

    pub fn on_with(mut self, hook: Hook, name: &str, applicability: Applicability) -> Self {
        self.registrations.entry(hook).or_default().push(Registration {
            name: name.to_string(),
            applicability,
        });
        self
    }

    pub fn skip(self, hook: Hook, name: &str) -> Self {
        self.skip_with(hook, name, Applicability::Always)
    }

    pub fn skip_with(mut self, hook: Hook, name: &str, applicability: Applicability) -> Self {
        self.skips.entry(hook).or_default().push(Registration {
            name: name.to_string(),
            applicability,
        });
        self
    }

    pub(crate) fn function(&self, name: &str) -> Option<Callback> {
        self.functions
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, callback)| *callback)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCallback {
    registration: Registration,
    callback: Callback,
}

impl ResolvedCallback {
    pub fn name(&self) -> &str {
        &self.registration.name
    }

    pub fn applicability(&self) -> &Applicability {
        &self.registration.applicability
    }
}

/// What a single hook invocation did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HookReport {
    pub invoked: Vec<String>,
    pub suppressed: Vec<String>,
}

/// The merged, resolved callback table of one entity type. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct CallbackRegistry {
    hooks: BTreeMap<Hook, Vec<ResolvedCallback>>,
    skips: BTreeMap<Hook, Vec<Registration>>,
}

impl CallbackRegistry {
    /// Merges `levels` in order (root first, concrete last). Registrations
    /// are deduplicated by name keeping the first occurrence. Every
    /// registered or skipped name must resolve to a defined callback.
    pub fn resolve(entity: &str, levels: &[&CallbackSet]) -> Result<Self, CoreError> {
        let mut table = CallbackSet::new();
        for level in levels {
            for (name, callback) in &level.functions {
                table = table.define(name, *callback);
            }
        }

        let mut registry = CallbackRegistry::default();
        for hook in Hook::ALL {
            let merged = merge(levels.iter().map(|level| level.registrations.get(&hook)));
            let mut resolved = Vec::with_capacity(merged.len());
            for registration in merged {
                let callback = table.function(&registration.name).ok_or_else(|| {
                    CoreError::UnknownCallback {
                        entity: entity.to_string(),
                        hook: hook.to_string(),
                        name: registration.name.clone(),
                    }
                })?;
                resolved.push(ResolvedCallback {
                    registration,
                    callback,
                });
            }
            if !resolved.is_empty() {
                registry.hooks.insert(hook, resolved);
            }

            let skips = merge(levels.iter().map(|level| level.skips.get(&hook)));
            if let Some(unknown) = skips.iter().find(|s| table.function(&s.name).is_none()) {
                return Err(CoreError::UnknownCallback {
                    entity: entity.to_string(),
                    hook: format!("skip_{hook}"),
                    name: unknown.name.clone(),
                });
            }
            if !skips.is_empty() {
                registry.skips.insert(hook, skips);
            }
        }
        Ok(registry)
    }

    pub fn resolved(&self, hook: Hook) -> &[ResolvedCallback] {
        self.hooks.get(&hook).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_skipped(&self, hook: Hook, name: &str, action: Action) -> bool {
        self.skips.get(&hook).is_some_and(|skips| {
            skips
                .iter()
                .any(|skip| skip.name == name && skip.applicability.applies_to(action))
        })
    }

    /// Runs every callback registered on `hook` that applies to `action` and
    /// is not suppressed by a skip registration. An error returned by a
    /// callback aborts the remaining callbacks of this hook.
    pub fn run(&self, hook: Hook, action: Action, record: &mut Record) -> Result<HookReport, CoreError> {
        let mut report = HookReport::default();
        for entry in self.resolved(hook) {
            if !entry.registration.applicability.applies_to(action) {
                continue;
            }
            if self.is_skipped(hook, entry.name(), action) {
                report.suppressed.push(entry.name().to_string());
                continue;
            }
            (entry.callback)(record)?;
            report.invoked.push(entry.name().to_string());
        }
        Ok(report)
    }
}

fn merge<'a>(lists: impl Iterator<Item = Option<&'a Vec<Registration>>>) -> Vec<Registration> {
    let mut merged: Vec<Registration> = Vec::new();
    for registration in lists.flatten().flatten() {
        if merged.iter().all(|existing| existing.name != registration.name) {
            merged.push(registration.clone());
        }
    }
    merged
}
