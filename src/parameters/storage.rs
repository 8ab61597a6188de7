//! Parameter Storage Types
//!
//! Provides core parameter types and the `ParameterStore` for configuration
//! management. Persistence is handled by the platform layer.

use super::error::ParameterError;
use bitflags::bitflags;
use heapless::index_map::FnvIndexMap;
use heapless::String;

/// Maximum parameter name length
pub const PARAM_NAME_LEN: usize = 16;

/// Maximum number of parameters
pub const MAX_PARAMS: usize = 32;

bitflags! {
    /// Parameter flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamFlags: u8 {
        /// Parameter is read-only (cannot be modified at runtime)
        const READ_ONLY = 0b00000001;
    }
}

/// Parameter value types
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamValue {
    /// Boolean parameter
    Bool(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit floating point
    Float(f32),
}

/// Parameter store for configuration management
///
/// Stores parameters as key-value pairs with metadata (flags).
pub struct ParameterStore {
    /// Parameter values
    parameters: FnvIndexMap<String<PARAM_NAME_LEN>, ParamValue, MAX_PARAMS>,
    /// Parameter flags
    flags: FnvIndexMap<String<PARAM_NAME_LEN>, ParamFlags, MAX_PARAMS>,
    /// Dirty flag (needs persisting)
    dirty: bool,
}

impl ParameterStore {
    /// Create a new empty parameter store
    pub fn new() -> Self {
        Self {
            parameters: FnvIndexMap::new(),
            flags: FnvIndexMap::new(),
            dirty: false,
        }
    }

    /// Get parameter value
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        let mut key = String::<PARAM_NAME_LEN>::new();
        key.push_str(name).ok()?;
        self.parameters.get(&key)
    }

    /// Set parameter value
    ///
    /// Marks the store as dirty (needs persisting).
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        let mut key = String::<PARAM_NAME_LEN>::new();
        key.push_str(name)
            .map_err(|_| ParameterError::InvalidConfig)?;

        // Check if parameter exists
        if !self.parameters.contains_key(&key) {
            return Err(ParameterError::InvalidConfig);
        }

        // Check if read-only
        if let Some(flags) = self.flags.get(&key) {
            if flags.contains(ParamFlags::READ_ONLY) {
                return Err(ParameterError::ReadOnly);
            }
        }

        self.parameters.insert(key, value).ok();
        self.dirty = true;
        Ok(())
    }

    /// Register a new parameter with default value and flags
    ///
    /// If the parameter already exists, this is a no-op (idempotent).
    pub fn register(
        &mut self,
        name: &str,
        default_value: ParamValue,
        flags: ParamFlags,
    ) -> Result<(), ParameterError> {
        let mut key = String::<PARAM_NAME_LEN>::new();
        key.push_str(name)
            .map_err(|_| ParameterError::InvalidConfig)?;

        if self.parameters.contains_key(&key) {
            // Already exists, don't overwrite
            return Ok(());
        }

        self.parameters
            .insert(key.clone(), default_value)
            .map_err(|_| ParameterError::StoreFull)?;
        self.flags
            .insert(key, flags)
            .map_err(|_| ParameterError::StoreFull)?;
        self.dirty = true;
        Ok(())
    }

    /// Check if store has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear dirty flag (called after a successful save)
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Get total parameter count
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Iterate over all parameters as (name, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String<PARAM_NAME_LEN>, &ParamValue)> {
        self.parameters.iter()
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_store_new() {
        let store = ParameterStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_parameter_store_register_and_get() {
        let mut store = ParameterStore::new();
        store
            .register("TEST", ParamValue::Int(42), ParamFlags::empty())
            .unwrap();
        assert_eq!(store.get("TEST"), Some(&ParamValue::Int(42)));
    }

    #[test]
    fn test_parameter_store_set() {
        let mut store = ParameterStore::new();
        store
            .register("TEST", ParamValue::Int(42), ParamFlags::empty())
            .unwrap();
        store.set("TEST", ParamValue::Int(100)).unwrap();
        assert_eq!(store.get("TEST"), Some(&ParamValue::Int(100)));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_parameter_store_set_unknown() {
        let mut store = ParameterStore::new();
        assert!(store.set("UNKNOWN", ParamValue::Int(1)).is_err());
    }

    #[test]
    fn test_parameter_store_register_idempotent() {
        let mut store = ParameterStore::new();
        store
            .register("TEST", ParamValue::Int(42), ParamFlags::empty())
            .unwrap();
        store.set("TEST", ParamValue::Int(100)).unwrap();
        // Re-register should not overwrite
        store
            .register("TEST", ParamValue::Int(42), ParamFlags::empty())
            .unwrap();
        assert_eq!(store.get("TEST"), Some(&ParamValue::Int(100)));
    }

    #[test]
    fn test_parameter_store_dirty() {
        let mut store = ParameterStore::new();
        store
            .register("TEST", ParamValue::Int(42), ParamFlags::empty())
            .unwrap();
        assert!(store.is_dirty());
        store.clear_dirty();
        assert!(!store.is_dirty());
        store.set("TEST", ParamValue::Int(100)).unwrap();
        assert!(store.is_dirty());
    }

    #[test]
    fn test_parameter_read_only() {
        let mut store = ParameterStore::new();
        store
            .register("READONLY", ParamValue::Int(42), ParamFlags::READ_ONLY)
            .unwrap();
        assert!(store.set("READONLY", ParamValue::Int(100)).is_err());
    }

    #[test]
    fn test_parameter_store_iter() {
        let mut store = ParameterStore::new();
        store
            .register("A", ParamValue::Float(1.0), ParamFlags::empty())
            .unwrap();
        store
            .register("B", ParamValue::Bool(true), ParamFlags::empty())
            .unwrap();
        assert_eq!(store.iter().count(), 2);
    }

    #[test]
    fn test_param_value_equality() {
        assert_eq!(ParamValue::Float(1.0), ParamValue::Float(1.0));
        assert_eq!(ParamValue::Int(42), ParamValue::Int(42));
        assert_eq!(ParamValue::Bool(true), ParamValue::Bool(true));

        assert_ne!(ParamValue::Int(1), ParamValue::Int(2));
        assert_ne!(ParamValue::Int(1), ParamValue::Float(1.0));
    }
}
