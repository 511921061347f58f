//! The ABI section of a manifest.

use crate::{ContractError, ContractResult};
use serde::{Deserialize, Serialize};

/// Parameter and return types of the contract interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractParameterType {
    Any,
    Boolean,
    Integer,
    ByteArray,
    String,
    Hash160,
    Hash256,
    PublicKey,
    Signature,
    Array,
    Map,
    InteropInterface,
    Void,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub parameter_type: ContractParameterType,
}

/// One callable method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMethod {
    pub name: String,
    pub parameters: Vec<ContractParameter>,
    #[serde(rename = "returntype")]
    pub return_type: ContractParameterType,
    /// Entry offset inside the NEF script.
    pub offset: u32,
    /// Safe methods cannot change state and may be called without side
    /// effects being trusted.
    pub safe: bool,
}

/// One declared event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    pub parameters: Vec<ContractParameter>,
}

/// The methods and events a contract exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAbi {
    pub methods: Vec<ContractMethod>,
    pub events: Vec<ContractEvent>,
}

impl ContractAbi {
    /// Looks up a method by name and parameter count.
    pub fn get_method(&self, name: &str, parameter_count: usize) -> Option<&ContractMethod> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.parameters.len() == parameter_count)
    }

    /// Looks up a method by name alone, preferring the smallest arity.
    pub fn get_method_by_name(&self, name: &str) -> Option<&ContractMethod> {
        self.methods
            .iter()
            .filter(|method| method.name == name)
            .min_by_key(|method| method.parameters.len())
    }

    pub(crate) fn validate(&self) -> ContractResult<()> {
        if self.methods.is_empty() {
            return Err(ContractError::InvalidManifest("ABI without methods".into()));
        }
        for (i, method) in self.methods.iter().enumerate() {
            if method.name.is_empty() {
                return Err(ContractError::InvalidManifest("unnamed method".into()));
            }
            if self.methods[..i].iter().any(|other| {
                other.name == method.name && other.parameters.len() == method.parameters.len()
            }) {
                return Err(ContractError::InvalidManifest(format!(
                    "duplicate method {} with {} parameters",
                    method.name,
                    method.parameters.len()
                )));
            }
        }
        for event in &self.events {
            if event.name.is_empty() {
                return Err(ContractError::InvalidManifest("unnamed event".into()));
            }
        }
        Ok(())
    }

    /// Checks every method offset against the script length.
    pub fn validate_offsets(&self, script_length: usize) -> ContractResult<()> {
        for method in &self.methods {
            if method.offset as usize >= script_length {
                return Err(ContractError::InvalidManifest(format!(
                    "method {} offset {} outside script of {script_length}",
                    method.name, method.offset
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abi_with(methods: Vec<ContractMethod>) -> ContractAbi {
        ContractAbi {
            methods,
            events: Vec::new(),
        }
    }

    fn method(name: &str, parameters: usize, offset: u32) -> ContractMethod {
        ContractMethod {
            name: name.into(),
            parameters: (0..parameters)
                .map(|i| ContractParameter {
                    name: format!("arg{i}"),
                    parameter_type: ContractParameterType::Any,
                })
                .collect(),
            return_type: ContractParameterType::Any,
            offset,
            safe: false,
        }
    }

    #[test]
    fn lookup_by_name_and_arity() {
        let abi = abi_with(vec![method("transfer", 4, 0), method("transfer", 3, 10)]);
        assert_eq!(abi.get_method("transfer", 3).unwrap().offset, 10);
        assert!(abi.get_method("transfer", 2).is_none());
    }

    #[test]
    fn offsets_must_fall_inside_the_script() {
        let abi = abi_with(vec![method("main", 0, 5)]);
        assert!(abi.validate_offsets(6).is_ok());
        assert!(abi.validate_offsets(5).is_err());
    }
}
