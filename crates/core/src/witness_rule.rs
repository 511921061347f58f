//! Witness rules: a bounded condition tree refining a signer's scope.

use crate::{UInt160, CoreError, CoreResult};
use neo3_crypto::ECPoint;
use neo3_io::{helper, var_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Maximum nesting depth of composite conditions, enforced at decode.
pub const MAX_CONDITION_NESTING_DEPTH: usize = 2;

/// Maximum number of children of an `And`/`Or` condition.
const MAX_SUBITEMS: usize = 16;

/// Whether a matching rule admits or rejects the witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessRuleAction {
    Deny = 0,
    Allow = 1,
}

impl WitnessRuleAction {
    fn from_byte(value: u8) -> CoreResult<Self> {
        match value {
            0 => Ok(WitnessRuleAction::Deny),
            1 => Ok(WitnessRuleAction::Allow),
            other => Err(CoreError::invalid_format(format!(
                "unknown witness rule action {other:#04x}"
            ))),
        }
    }
}

/// A predicate over the current call context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WitnessCondition {
    /// A constant truth value.
    Boolean(bool),
    /// Negation of the child condition.
    Not(Box<WitnessCondition>),
    /// All children must hold.
    And(Vec<WitnessCondition>),
    /// At least one child must hold.
    Or(Vec<WitnessCondition>),
    /// The executing contract has the given script hash.
    ScriptHash(UInt160),
    /// The executing contract belongs to the given group.
    Group(ECPoint),
    /// The executing contract was called by the entry script.
    CalledByEntry,
    /// The calling contract has the given script hash.
    CalledByContract(UInt160),
    /// The calling contract belongs to the given group.
    CalledByGroup(ECPoint),
}

impl WitnessCondition {
    const TYPE_BOOLEAN: u8 = 0x00;
    const TYPE_NOT: u8 = 0x01;
    const TYPE_AND: u8 = 0x02;
    const TYPE_OR: u8 = 0x03;
    const TYPE_SCRIPT_HASH: u8 = 0x18;
    const TYPE_GROUP: u8 = 0x19;
    const TYPE_CALLED_BY_ENTRY: u8 = 0x20;
    const TYPE_CALLED_BY_CONTRACT: u8 = 0x28;
    const TYPE_CALLED_BY_GROUP: u8 = 0x29;

    /// The wire type byte of the condition.
    pub fn type_byte(&self) -> u8 {
        match self {
            WitnessCondition::Boolean(_) => Self::TYPE_BOOLEAN,
            WitnessCondition::Not(_) => Self::TYPE_NOT,
            WitnessCondition::And(_) => Self::TYPE_AND,
            WitnessCondition::Or(_) => Self::TYPE_OR,
            WitnessCondition::ScriptHash(_) => Self::TYPE_SCRIPT_HASH,
            WitnessCondition::Group(_) => Self::TYPE_GROUP,
            WitnessCondition::CalledByEntry => Self::TYPE_CALLED_BY_ENTRY,
            WitnessCondition::CalledByContract(_) => Self::TYPE_CALLED_BY_CONTRACT,
            WitnessCondition::CalledByGroup(_) => Self::TYPE_CALLED_BY_GROUP,
        }
    }

    fn serialize_inner(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.type_byte())?;
        match self {
            WitnessCondition::Boolean(value) => writer.write_bool(*value),
            WitnessCondition::Not(inner) => inner.serialize_inner(writer),
            WitnessCondition::And(children) | WitnessCondition::Or(children) => {
                writer.write_var_int(children.len() as u64)?;
                for child in children {
                    child.serialize_inner(writer)?;
                }
                Ok(())
            }
            WitnessCondition::ScriptHash(hash) | WitnessCondition::CalledByContract(hash) => {
                hash.serialize(writer)
            }
            WitnessCondition::Group(group) | WitnessCondition::CalledByGroup(group) => {
                writer.write_bytes(group.as_bytes())
            }
            WitnessCondition::CalledByEntry => Ok(()),
        }
    }

    fn deserialize_inner(reader: &mut MemoryReader<'_>, max_depth: usize) -> IoResult<Self> {
        let type_byte = reader.read_u8()?;
        match type_byte {
            Self::TYPE_BOOLEAN => Ok(WitnessCondition::Boolean(reader.read_bool()?)),
            Self::TYPE_NOT => {
                if max_depth == 0 {
                    return Err(IoError::invalid_format("witness condition nested too deep"));
                }
                Ok(WitnessCondition::Not(Box::new(Self::deserialize_inner(
                    reader,
                    max_depth - 1,
                )?)))
            }
            Self::TYPE_AND | Self::TYPE_OR => {
                if max_depth == 0 {
                    return Err(IoError::invalid_format("witness condition nested too deep"));
                }
                let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
                if count == 0 {
                    return Err(IoError::invalid_format("empty composite witness condition"));
                }
                let mut children = Vec::with_capacity(count);
                for _ in 0..count {
                    children.push(Self::deserialize_inner(reader, max_depth - 1)?);
                }
                if type_byte == Self::TYPE_AND {
                    Ok(WitnessCondition::And(children))
                } else {
                    Ok(WitnessCondition::Or(children))
                }
            }
            Self::TYPE_SCRIPT_HASH => Ok(WitnessCondition::ScriptHash(UInt160::deserialize(reader)?)),
            Self::TYPE_CALLED_BY_CONTRACT => {
                Ok(WitnessCondition::CalledByContract(UInt160::deserialize(reader)?))
            }
            Self::TYPE_GROUP | Self::TYPE_CALLED_BY_GROUP => {
                let bytes = reader.read_bytes(33)?;
                let point = ECPoint::from_bytes(&bytes)
                    .map_err(|_| IoError::invalid_format("invalid group key in condition"))?;
                if type_byte == Self::TYPE_GROUP {
                    Ok(WitnessCondition::Group(point))
                } else {
                    Ok(WitnessCondition::CalledByGroup(point))
                }
            }
            Self::TYPE_CALLED_BY_ENTRY => Ok(WitnessCondition::CalledByEntry),
            other => Err(IoError::invalid_format(format!(
                "unknown witness condition type {other:#04x}"
            ))),
        }
    }
}

impl Serializable for WitnessCondition {
    fn size(&self) -> usize {
        1 + match self {
            WitnessCondition::Boolean(_) => 1,
            WitnessCondition::Not(inner) => inner.size(),
            WitnessCondition::And(children) | WitnessCondition::Or(children) => {
                var_size(children.len() as u64)
                    + children.iter().map(Serializable::size).sum::<usize>()
            }
            WitnessCondition::ScriptHash(_) | WitnessCondition::CalledByContract(_) => 20,
            WitnessCondition::Group(_) | WitnessCondition::CalledByGroup(_) => 33,
            WitnessCondition::CalledByEntry => 0,
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_inner(writer)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Self::deserialize_inner(reader, MAX_CONDITION_NESTING_DEPTH)
    }
}

/// A rule: an action applied when its condition matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessRule {
    pub action: WitnessRuleAction,
    pub condition: WitnessCondition,
}

impl WitnessRule {
    pub fn new(action: WitnessRuleAction, condition: WitnessCondition) -> Self {
        Self { action, condition }
    }
}

impl Serializable for WitnessRule {
    fn size(&self) -> usize {
        1 + self.condition.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.action as u8)?;
        self.condition.serialize(writer)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let action = WitnessRuleAction::from_byte(reader.read_u8()?)
            .map_err(|e| IoError::invalid_format(e.to_string()))?;
        let condition = WitnessCondition::deserialize(reader)?;
        Ok(Self { action, condition })
    }
}

/// Reads a rule list with the standard subitem cap.
pub fn deserialize_rules(reader: &mut MemoryReader<'_>) -> IoResult<Vec<WitnessRule>> {
    helper::deserialize_list(reader, MAX_SUBITEMS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn simple_rule_round_trips() {
        let rule = WitnessRule::new(
            WitnessRuleAction::Allow,
            WitnessCondition::ScriptHash(UInt160::from_script(b"\x51")),
        );
        assert_eq!(WitnessRule::from_array(&rule.to_array()).unwrap(), rule);
    }

    #[test]
    fn composite_rule_round_trips_within_depth() {
        let rule = WitnessRule::new(
            WitnessRuleAction::Deny,
            WitnessCondition::And(vec![
                WitnessCondition::CalledByEntry,
                WitnessCondition::Boolean(true),
            ]),
        );
        assert_eq!(WitnessRule::from_array(&rule.to_array()).unwrap(), rule);
    }

    #[test]
    fn over_deep_nesting_is_rejected() {
        // Not(Not(Not(true))) exceeds the depth bound of 2.
        let condition = WitnessCondition::Not(Box::new(WitnessCondition::Not(Box::new(
            WitnessCondition::Not(Box::new(WitnessCondition::Boolean(true))),
        ))));
        let rule = WitnessRule::new(WitnessRuleAction::Allow, condition);
        assert!(WitnessRule::from_array(&rule.to_array()).is_err());
    }

    #[test]
    fn empty_composite_is_rejected() {
        // Hand-build And with zero children.
        let bytes = vec![0x01, 0x02, 0x00];
        assert!(WitnessRule::from_array(&bytes).is_err());
    }
}
