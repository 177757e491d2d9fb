use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

/// A wholesale-replaced snapshot. `None` means the snapshot was never loaded
/// (or was invalidated), which callers treat differently from an empty value.
#[derive(Debug)]
pub struct SnapshotCache<T> {
    name: &'static str,
    value: Mutex<Option<T>>,
}

impl<T: Clone> SnapshotCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Mutex::new(None),
        }
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Option<T>>, InfraError> {
        self.value
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("{} cache lock poisoned: {error}", self.name)))
    }

    pub fn get(&self) -> Result<Option<T>, InfraError> {
        Ok(self.guard()?.clone())
    }

    pub fn is_loaded(&self) -> Result<bool, InfraError> {
        Ok(self.guard()?.is_some())
    }

    pub fn replace(&self, value: T) -> Result<(), InfraError> {
        *self.guard()? = Some(value);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), InfraError> {
        *self.guard()? = None;
        Ok(())
    }
}
