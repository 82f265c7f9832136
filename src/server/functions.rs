//! Business functions
//!
//! Named server functions the transport invokes with opaque parameters. A
//! function sees the unit it runs under through its [`RequestContext`].

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::tid::UnitIdentifier;
use crate::unit::{ServerHandle, UnitCallType, UnitError};

/// Opaque key/value parameters and results
pub type Params = Map<String, Value>;

/// Call context handed to a server function
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub handle: ServerHandle,
    /// `None` for plain (non-unit) calls
    pub unit: Option<UnitIdentifier>,
    pub call_type: UnitCallType,
}

impl RequestContext {
    pub fn plain(handle: ServerHandle) -> Self {
        Self {
            handle,
            unit: None,
            call_type: UnitCallType::Synchronous,
        }
    }

    pub fn for_unit(handle: ServerHandle, unit: UnitIdentifier, call_type: UnitCallType) -> Self {
        Self {
            handle,
            unit: Some(unit),
            call_type,
        }
    }

    /// True when the sender does not wait for the outcome
    pub fn is_async(&self) -> bool {
        self.call_type == UnitCallType::Asynchronous
    }
}

/// A business function
///
/// Errors are reported as text and surface to the transport as
/// `FunctionFailed`.
pub trait ServerFunction: Send + Sync {
    fn call(&self, ctx: &RequestContext, params: Params) -> Result<Params, String>;
}

impl<F> ServerFunction for F
where
    F: Fn(&RequestContext, Params) -> Result<Params, String> + Send + Sync,
{
    fn call(&self, ctx: &RequestContext, params: Params) -> Result<Params, String> {
        self(ctx, params)
    }
}

/// Installed functions by name
#[derive(Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Arc<dyn ServerFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        name: impl Into<String>,
        function: Arc<dyn ServerFunction>,
    ) -> Result<(), UnitError> {
        let name = name.into();
        match self.functions.entry(name.clone()) {
            Entry::Occupied(_) => Err(UnitError::FunctionAlreadyRegistered(name)),
            Entry::Vacant(slot) => {
                slot.insert(function);
                tracing::debug!(function = %name, "Server function installed");
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ServerFunction>, UnitError> {
        self.functions
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| UnitError::FunctionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Installed names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Arc<dyn ServerFunction> {
        Arc::new(|_ctx: &RequestContext, params: Params| -> Result<Params, String> { Ok(params) })
    }

    #[test]
    fn test_add_and_call() {
        let registry = FunctionRegistry::new();
        registry.add("STFC_CONNECTION", echo()).unwrap();

        let mut params = Params::new();
        params.insert("REQUTEXT".into(), json!("Hello"));

        let ctx = RequestContext::plain(ServerHandle::new(1, "MME"));
        let result = registry
            .get("STFC_CONNECTION")
            .unwrap()
            .call(&ctx, params.clone())
            .unwrap();
        assert_eq!(result, params);
    }

    #[test]
    fn test_duplicate_and_missing() {
        let registry = FunctionRegistry::new();
        registry.add("STFC_CONNECTION", echo()).unwrap();
        assert!(matches!(
            registry.add("STFC_CONNECTION", echo()),
            Err(UnitError::FunctionAlreadyRegistered(_))
        ));
        assert!(matches!(
            registry.get("BAPI_USER_GET_DETAIL"),
            Err(UnitError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_names_sorted() {
        let registry = FunctionRegistry::new();
        registry.add("Z_B", echo()).unwrap();
        registry.add("Z_A", echo()).unwrap();
        assert_eq!(registry.names(), vec!["Z_A", "Z_B"]);
    }

    #[test]
    fn test_context_call_type() {
        let handle = ServerHandle::new(3, "MME");
        assert!(!RequestContext::plain(handle.clone()).is_async());

        let unit = UnitIdentifier::new(crate::tid::Tid::generate(true), crate::tid::UnitType::Queued);
        let ctx = RequestContext::for_unit(handle, unit, UnitCallType::Asynchronous);
        assert!(ctx.is_async());
    }
}
