//! Tool validation, execution, and built-in tool implementations.
//!
//! The executor is the only component that invokes tool bodies. It validates
//! and sanitizes arguments against the tool's schema first, then runs the
//! body as an isolated task with a deadline and panic containment.
//!
//! Built-in tools: calculator, text processor, JSON processor, HTTP GET/POST.

pub mod calculator;
pub mod executor;
pub mod http;
pub mod json_processor;
pub mod text_processor;
pub mod validate;

pub use executor::Executor;
pub use validate::{sanitize_input, validate_input};

use agentry_core::error::RegistryError;
use agentry_core::tool::ToolRegistry;

/// Create a registry populated with all built-in tools.
///
/// Called once during startup wiring; the returned registry is then shared
/// read-only for the lifetime of the process.
pub fn builtin_registry() -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(calculator::CalculatorTool))?;
    registry.register(Box::new(text_processor::TextProcessorTool))?;
    registry.register(Box::new(json_processor::JsonProcessorTool))?;
    registry.register(Box::new(http::HttpGetTool::new()))?;
    registry.register(Box::new(http::HttpPostTool::new()))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_all_tools() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.count(), 5);
        for name in ["calculator", "text_processor", "json_processor", "http_get", "http_post"] {
            assert!(registry.get(name).is_some(), "missing builtin: {name}");
        }
    }

    #[test]
    fn builtin_names_are_sorted() {
        let registry = builtin_registry().unwrap();
        let names = registry.list();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
