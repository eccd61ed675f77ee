use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::{PinRule, RuleFields};
use crate::error::RuleError;

/// In-memory rule list, insertion ordered. Lost when the process exits.
#[derive(Default)]
pub struct RuleStore {
    rules: Mutex<Vec<PinRule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, fields: RuleFields) -> PinRule {
        let rule = PinRule::new(Uuid::new_v4().to_string(), fields);
        self.lock().push(rule.clone());
        rule
    }

    /// Replace the rule in place, keeping its id and position.
    pub fn update(&self, id: &str, fields: RuleFields) -> Result<PinRule, RuleError> {
        let mut rules = self.lock();
        let slot = rules
            .iter_mut()
            .find(|rule| rule.id == id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        *slot = PinRule::new(id.to_string(), fields);
        Ok(slot.clone())
    }

    /// Returns whether a rule was removed.
    pub fn delete(&self, id: &str) -> bool {
        let mut rules = self.lock();
        let before = rules.len();
        rules.retain(|rule| rule.id != id);
        rules.len() != before
    }

    pub fn get(&self, id: &str) -> Option<PinRule> {
        self.lock().iter().find(|rule| rule.id == id).cloned()
    }

    pub fn rules(&self) -> Vec<PinRule> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PinRule>> {
        self.rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
