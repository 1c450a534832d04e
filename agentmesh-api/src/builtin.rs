//! Agent kinds every node can host out of the box.
//!
//! Application nodes extend the catalog with their own kinds; these exist so
//! a bare `agentmesh-node` can take deployments and answer health probes
//! end to end.

use agentmesh_protocol::{Agent, AgentCatalog, AgentError};
use async_trait::async_trait;

/// `json -> json`, returns its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    type Input = serde_json::Value;
    type Output = serde_json::Value;

    fn kind(&self) -> &str {
        "echo"
    }

    async fn process(&self, input: serde_json::Value) -> Result<serde_json::Value, AgentError> {
        Ok(input)
    }
}

/// `string -> string`, upper-cases its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseAgent;

#[async_trait]
impl Agent for UppercaseAgent {
    type Input = String;
    type Output = String;

    fn kind(&self) -> &str {
        "uppercase"
    }

    async fn process(&self, input: String) -> Result<String, AgentError> {
        Ok(input.to_uppercase())
    }
}

/// Catalog holding the built-in kinds.
pub fn builtin_catalog() -> AgentCatalog {
    let catalog = AgentCatalog::new();
    catalog.register_default::<EchoAgent>("echo");
    catalog.register_default::<UppercaseAgent>("uppercase");
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_protocol::{AgentDescriptor, ErasedAgent, TypedAgent};

    #[test]
    fn test_builtin_kinds() {
        assert_eq!(builtin_catalog().kinds(), vec!["echo", "uppercase"]);
    }

    #[test]
    fn test_builtin_descriptors_rebuild() -> Result<(), AgentError> {
        let catalog = builtin_catalog();
        for descriptor in [
            TypedAgent::erase(EchoAgent).descriptor(),
            TypedAgent::erase(UppercaseAgent).descriptor(),
        ] {
            let rebuilt = catalog.instantiate(&descriptor)?;
            assert_eq!(rebuilt.descriptor(), descriptor);
        }
        let unknown = AgentDescriptor {
            kind: "translate".to_string(),
            input_type: "string".to_string(),
            output_type: "string".to_string(),
            config: serde_json::Value::Null,
        };
        assert!(catalog.instantiate(&unknown).is_err());
        Ok(())
    }
}
