//! Operation reference rendering
//!
//! `groupd operations` prints this document so clients can be generated or
//! checked against the daemon they talk to.

use super::error::ErrorKind;
use super::registry::Registry;
use serde_json::{json, Map, Value};

/// Every registered operation as JSON, keyed by name.
pub fn render(registry: &Registry) -> Value {
    let operations: Map<String, Value> = registry
        .schemas()
        .map(|schema| {
            (
                schema.name.to_string(),
                json!({
                    "description": schema.description,
                    "fields": schema.fields,
                    "result": schema.result,
                    "errors": schema.errors,
                }),
            )
        })
        .collect();

    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "operations": operations,
        "error_kinds": ErrorKind::ALL,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_every_operation() {
        let registry = Registry::new();
        let doc = render(&registry);

        let operations = doc["operations"].as_object().unwrap();
        assert_eq!(operations.len(), registry.names().len());

        let trust = &doc["operations"]["trust"];
        assert_eq!(trust["result"], "Empty");
        assert_eq!(trust["fields"][0]["name"], "account");
        assert_eq!(trust["fields"][0]["required"], true);
        assert_eq!(doc["error_kinds"].as_array().unwrap().len(), ErrorKind::ALL.len());
    }
}
