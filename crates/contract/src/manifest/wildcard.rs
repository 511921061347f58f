//! Wildcard-or-list containers used by permissions and trusts.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Either everything (`"*"` in JSON) or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardContainer<T> {
    Wildcard,
    List(Vec<T>),
}

impl<T: PartialEq> WildcardContainer<T> {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, WildcardContainer::Wildcard)
    }

    pub fn contains(&self, value: &T) -> bool {
        match self {
            WildcardContainer::Wildcard => true,
            WildcardContainer::List(values) => values.contains(value),
        }
    }
}

impl<T: Serialize> Serialize for WildcardContainer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WildcardContainer::Wildcard => serializer.serialize_str("*"),
            WildcardContainer::List(values) => values.serialize(serializer),
        }
    }
}

impl<'de, T: serde::de::DeserializeOwned> Deserialize<'de> for WildcardContainer<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) if s == "*" => Ok(WildcardContainer::Wildcard),
            other => {
                let values: Vec<T> =
                    serde_json::from_value(other).map_err(serde::de::Error::custom)?;
                Ok(WildcardContainer::List(values))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_round_trips() {
        let container: WildcardContainer<String> = WildcardContainer::Wildcard;
        let json = serde_json::to_string(&container).unwrap();
        assert_eq!(json, "\"*\"");
        let decoded: WildcardContainer<String> = serde_json::from_str(&json).unwrap();
        assert!(decoded.is_wildcard());
    }

    #[test]
    fn list_round_trips() {
        let container = WildcardContainer::List(vec!["a".to_string(), "b".to_string()]);
        let json = serde_json::to_string(&container).unwrap();
        let decoded: WildcardContainer<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, container);
        assert!(decoded.contains(&"a".to_string()));
        assert!(!decoded.contains(&"c".to_string()));
    }
}
