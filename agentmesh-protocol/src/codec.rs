//! Payload codec and runtime type tags.
//!
//! In-process code stays statically typed. A type tag only matters where a
//! value crosses a process boundary: the tag travels in the envelope
//! metadata and in every [`RemoteAgentRef`](agentmesh_core::RemoteAgentRef),
//! and typed calls check it before sending.

use agentmesh_core::SerializationError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can cross the mesh.
pub trait MeshType: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable, language-neutral name of this type on the wire.
    fn type_tag() -> String;
}

macro_rules! impl_mesh_type {
    ($($ty:ty => $tag:expr),* $(,)?) => {
        $(
            impl MeshType for $ty {
                fn type_tag() -> String {
                    $tag.to_string()
                }
            }
        )*
    };
}

impl_mesh_type! {
    String => "string",
    bool => "bool",
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
    f32 => "f32",
    f64 => "f64",
    () => "unit",
    serde_json::Value => "json",
}

impl<T: MeshType> MeshType for Vec<T> {
    fn type_tag() -> String {
        format!("list<{}>", T::type_tag())
    }
}

impl<T: MeshType> MeshType for Option<T> {
    fn type_tag() -> String {
        format!("option<{}>", T::type_tag())
    }
}

/// Encode a value as a JSON payload.
pub fn encode<T: MeshType>(value: &T) -> Result<Vec<u8>, SerializationError> {
    serde_json::to_vec(value).map_err(|e| SerializationError::Encode {
        type_tag: T::type_tag(),
        reason: e.to_string(),
    })
}

/// Decode a JSON payload.
pub fn decode<T: MeshType>(bytes: &[u8]) -> Result<T, SerializationError> {
    serde_json::from_slice(bytes).map_err(|e| SerializationError::Decode {
        type_tag: T::type_tag(),
        reason: e.to_string(),
    })
}

/// Fail with `TypeMismatch` unless `got` equals `expected`.
pub fn check_type_tag(expected: &str, got: &str) -> Result<(), SerializationError> {
    if expected != got {
        return Err(SerializationError::TypeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        });
    }
    Ok(())
}
