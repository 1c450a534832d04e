//! Agents, type erasure and the agent catalog.
//!
//! Authors implement the statically typed [`Agent`] trait. The protocol and
//! host only see [`ErasedAgent`], which works on encoded payloads. An agent
//! is shipped to another node as an [`AgentDescriptor`]: its kind, declared
//! type tags and construction config. The destination rebuilds it from its
//! [`AgentCatalog`].

use crate::codec::{self, MeshType};
use agentmesh_core::SerializationError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an agent's own logic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AgentError {
    pub message: String,
}

impl AgentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An addressable unit of behavior with declared input and output types.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    type Input: MeshType;
    type Output: MeshType;

    /// Catalog key used to rebuild this agent at its destination.
    fn kind(&self) -> &str;

    /// Construction parameters shipped with the agent.
    fn config(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    async fn process(&self, input: Self::Input) -> Result<Self::Output, AgentError>;
}

/// Why an erased call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("agent failed: {0}")]
    Agent(#[from] AgentError),
}

/// Serialized form of an agent: enough to rebuild it elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub kind: String,
    pub input_type: String,
    pub output_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl AgentDescriptor {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(self).map_err(|e| SerializationError::Encode {
            type_tag: "agent".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        serde_json::from_slice(bytes).map_err(|e| SerializationError::Decode {
            type_tag: "agent".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type-erased agent driven by the host.
#[async_trait]
pub trait ErasedAgent: Send + Sync {
    fn descriptor(&self) -> AgentDescriptor;

    fn input_type(&self) -> String;

    fn output_type(&self) -> String;

    /// Decode `input`, run the agent, encode its output.
    async fn process_bytes(&self, input: &[u8]) -> Result<Vec<u8>, ProcessError>;

    /// Access to the concrete agent for in-process handles.
    fn as_any(&self) -> &dyn Any;
}

/// Adapter from a typed [`Agent`] to [`ErasedAgent`].
pub struct TypedAgent<A: Agent> {
    inner: A,
}

impl<A: Agent> TypedAgent<A> {
    pub fn new(agent: A) -> Self {
        Self { inner: agent }
    }

    /// Erase `agent` behind a shared pointer.
    pub fn erase(agent: A) -> Arc<dyn ErasedAgent> {
        Arc::new(Self::new(agent))
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: Agent> fmt::Debug for TypedAgent<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedAgent")
            .field("kind", &self.inner.kind())
            .field("input_type", &A::Input::type_tag())
            .field("output_type", &A::Output::type_tag())
            .finish()
    }
}

#[async_trait]
impl<A: Agent> ErasedAgent for TypedAgent<A> {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            kind: self.inner.kind().to_string(),
            input_type: A::Input::type_tag(),
            output_type: A::Output::type_tag(),
            config: self.inner.config(),
        }
    }

    fn input_type(&self) -> String {
        A::Input::type_tag()
    }

    fn output_type(&self) -> String {
        A::Output::type_tag()
    }

    async fn process_bytes(&self, input: &[u8]) -> Result<Vec<u8>, ProcessError> {
        let input: A::Input = codec::decode(input)?;
        let output = self.inner.process(input).await?;
        Ok(codec::encode(&output)?)
    }

    fn as_any(&self) -> &dyn Any {
        &self.inner
    }
}

type Factory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn ErasedAgent>, AgentError> + Send + Sync>;

/// Agent kinds a node knows how to build.
#[derive(Clone, Default)]
pub struct AgentCatalog {
    factories: Arc<DashMap<String, Factory>>,
}

impl fmt::Debug for AgentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `kind`; `build` receives the shipped config.
    pub fn register<A, F>(&self, kind: impl Into<String>, build: F)
    where
        A: Agent,
        F: Fn(&serde_json::Value) -> Result<A, AgentError> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(
            move |config: &serde_json::Value| -> Result<Arc<dyn ErasedAgent>, AgentError> {
                Ok(TypedAgent::erase(build(config)?))
            },
        );
        self.factories.insert(kind.into(), factory);
    }

    /// Register a kind built with `Default`, ignoring config.
    pub fn register_default<A>(&self, kind: impl Into<String>)
    where
        A: Agent + Default,
    {
        self.register(kind, |_| Ok(A::default()));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }

    /// Rebuild an agent and check it declares the descriptor's type tags.
    pub fn instantiate(
        &self,
        descriptor: &AgentDescriptor,
    ) -> Result<Arc<dyn ErasedAgent>, AgentError> {
        let factory = self
            .factories
            .get(&descriptor.kind)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| AgentError::new(format!("unknown agent kind '{}'", descriptor.kind)))?;
        let agent = factory(&descriptor.config)?;
        if agent.input_type() != descriptor.input_type
            || agent.output_type() != descriptor.output_type
        {
            return Err(AgentError::new(format!(
                "agent kind '{}' is {} -> {}, descriptor declares {} -> {}",
                descriptor.kind,
                agent.input_type(),
                agent.output_type(),
                descriptor.input_type,
                descriptor.output_type
            )));
        }
        Ok(agent)
    }
}
