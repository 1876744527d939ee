//! ConfigNode - the structural surface of a config tree.
//!
//! Every type that can appear in a config implements [`ConfigNode`]; the
//! update engine drives the whole tree through this one object-safe
//! trait. Scalars, `Vec`, the map types, `Option` and `Box` are covered
//! here; record types get their impl from `#[derive(Config)]`.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};

use lattice_eventbus::Topic;

use crate::error::ConfigError;
use crate::paths;
use crate::rollback::{RollbackJournal, RollbackOp};

/// The value published for a registrable subtree: a clone of the subtree
/// behind an erased `Arc`, downcast by subscribers.
pub type ConfigPayload = Arc<dyn Any + Send + Sync>;

/// A subtree that knows how to check its own consistency. Validation
/// runs on every update that touches the subtree.
pub trait Validatable {
    fn validate(&self) -> anyhow::Result<()>;
}

/// A subtree that participates in change notifications: its new value is
/// published under `topic()` after every successful update touching it.
pub trait Registrable {
    fn topic(&self) -> Topic;
}

/// The root capability: a config tree with a name, used as the first
/// dotted-path segment.
pub trait Config: ConfigNode + Clone + Send + 'static {
    fn name(&self) -> &str;
}

/// One node of a config tree.
///
/// `enter` descends a dotted-path segment, creating the slot where the
/// structure allows it and recording the reversal in the journal;
/// `lookup` is the non-creating twin used during rollback replay. The
/// reversal primitives (`remove_entry`, `truncate_to`, `clear_slot`)
/// only mean something on containers and default to no-ops.
pub trait ConfigNode: Send {
    /// Serialize this subtree; records are keyed by their tags.
    fn to_value(&self) -> Value;

    /// Emit `dotted_key → leaf` pairs for every leaf below this node.
    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, Value>);

    /// Replace this subtree from a runtime value, converting types.
    fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError>;

    /// Whether this node is a leaf the traversal must never descend
    /// into. True for scalars and raw blobs; raw blobs are how a leaf
    /// can legitimately hold structured data.
    fn is_leaf(&self) -> bool {
        false
    }

    /// Descend one segment, creating the slot if the structure allows.
    ///
    /// `child_path` is the dotted path of the child, used in error
    /// messages and journal entries.
    fn enter(
        &mut self,
        segment: &str,
        child_path: &str,
        journal: &mut RollbackJournal,
    ) -> Result<&mut dyn ConfigNode, ConfigError>;

    /// Descend one segment without creating anything.
    fn lookup(&mut self, segment: &str) -> Option<&mut dyn ConfigNode>;

    /// Remove a mapping entry (rollback of a created key).
    fn remove_entry(&mut self, _key: &str) {}

    /// Shrink a sequence (rollback of an append).
    fn truncate_to(&mut self, _len: usize) {}

    /// Empty an optional slot (rollback of an allocation).
    fn clear_slot(&mut self) {}

    /// Post-order walk over every subtree, with dotted paths.
    fn visit(
        &self,
        path: &str,
        f: &mut dyn FnMut(&str, &dyn ConfigNode) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError>;

    /// Validation capability; the derive forwards this to [`Validatable`]
    /// when declared.
    fn validate_node(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Notification capability; the derive forwards this to
    /// [`Registrable`] when declared.
    fn topic(&self) -> Option<Topic> {
        None
    }

    /// The value published alongside [`topic`](ConfigNode::topic).
    fn payload(&self) -> Option<ConfigPayload> {
        None
    }
}

fn json_int(value: &Value) -> Option<i128> {
    if let Some(i) = value.as_i64() {
        Some(i as i128)
    } else if let Some(u) = value.as_u64() {
        Some(u as i128)
    } else {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i128)
    }
}

macro_rules! leaf_common {
    () => {
        fn is_leaf(&self) -> bool {
            true
        }

        fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, Value>) {
            out.insert(prefix.to_string(), self.to_value());
        }

        fn enter(
            &mut self,
            _segment: &str,
            child_path: &str,
            _journal: &mut RollbackJournal,
        ) -> Result<&mut dyn ConfigNode, ConfigError> {
            Err(ConfigError::no_such_field(child_path))
        }

        fn lookup(&mut self, _segment: &str) -> Option<&mut dyn ConfigNode> {
            None
        }

        fn visit(
            &self,
            path: &str,
            f: &mut dyn FnMut(&str, &dyn ConfigNode) -> Result<(), ConfigError>,
        ) -> Result<(), ConfigError> {
            f(path, self)
        }
    };
}

macro_rules! int_node {
    ($($t:ty),* $(,)?) => {
        $(
            impl ConfigNode for $t {
                fn to_value(&self) -> Value {
                    Value::from(*self)
                }

                fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError> {
                    let converted = json_int(value)
                        .and_then(|n| <$t>::try_from(n).ok())
                        .ok_or_else(|| ConfigError::type_mismatch(path, stringify!($t), value))?;
                    *self = converted;
                    Ok(())
                }

                leaf_common!();
            }
        )*
    };
}

int_node!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! float_node {
    ($($t:ty),* $(,)?) => {
        $(
            impl ConfigNode for $t {
                fn to_value(&self) -> Value {
                    Value::from(*self as f64)
                }

                fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError> {
                    let converted = value
                        .as_f64()
                        .ok_or_else(|| ConfigError::type_mismatch(path, stringify!($t), value))?;
                    *self = converted as $t;
                    Ok(())
                }

                leaf_common!();
            }
        )*
    };
}

float_node!(f32, f64);

impl ConfigNode for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError> {
        *self = value
            .as_bool()
            .ok_or_else(|| ConfigError::type_mismatch(path, "bool", value))?;
        Ok(())
    }

    leaf_common!();
}

impl ConfigNode for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError> {
        *self = value
            .as_str()
            .ok_or_else(|| ConfigError::type_mismatch(path, "string", value))?
            .to_string();
        Ok(())
    }

    leaf_common!();
}

/// A raw, pre-serialized blob: treated as an opaque leaf, never descended
/// into.
impl ConfigNode for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn assign(&mut self, value: &Value, _path: &str) -> Result<(), ConfigError> {
        *self = value.clone();
        Ok(())
    }

    leaf_common!();
}

impl<T: ConfigNode + Default> ConfigNode for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(|element| element.to_value()).collect())
    }

    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, Value>) {
        for (index, element) in self.iter().enumerate() {
            element.flatten_into(&paths::join(prefix, &index.to_string()), out);
        }
    }

    fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError> {
        let Some(items) = value.as_array() else {
            return Err(ConfigError::type_mismatch(path, "array", value));
        };
        let mut next = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut element = T::default();
            element.assign(item, &paths::join(path, &index.to_string()))?;
            next.push(element);
        }
        *self = next;
        Ok(())
    }

    fn enter(
        &mut self,
        segment: &str,
        child_path: &str,
        journal: &mut RollbackJournal,
    ) -> Result<&mut dyn ConfigNode, ConfigError> {
        let index: usize = segment
            .parse()
            .map_err(|_| ConfigError::no_such_field(child_path))?;
        let len = self.len();
        if index > len {
            return Err(ConfigError::IndexOutOfRange {
                path: child_path.to_string(),
                index,
                len,
            });
        }
        if index == len {
            // Only appending at the current end is allowed to grow the
            // sequence; the journal undoes it by truncating.
            self.push(T::default());
            journal.record(RollbackOp::Truncate {
                path: paths::parent(child_path).to_string(),
                len,
            });
        }
        Ok(&mut self[index] as &mut dyn ConfigNode)
    }

    fn lookup(&mut self, segment: &str) -> Option<&mut dyn ConfigNode> {
        let index: usize = segment.parse().ok()?;
        self.get_mut(index).map(|e| e as &mut dyn ConfigNode)
    }

    fn truncate_to(&mut self, len: usize) {
        self.truncate(len);
    }

    fn visit(
        &self,
        path: &str,
        f: &mut dyn FnMut(&str, &dyn ConfigNode) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        for (index, element) in self.iter().enumerate() {
            element.visit(&paths::join(path, &index.to_string()), f)?;
        }
        f(path, self)
    }
}

macro_rules! map_node {
    ($map:ident, $($bounds:tt)*) => {
        impl<K, V> ConfigNode for $map<K, V>
        where
            K: $($bounds)* + FromStr + Display + Clone + Send + 'static,
            V: ConfigNode + Default,
        {
            fn to_value(&self) -> Value {
                let mut entries: Vec<(String, &V)> =
                    self.iter().map(|(k, v)| (k.to_string(), v)).collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(key, value.to_value());
                }
                Value::Object(object)
            }

            fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, Value>) {
                let mut entries: Vec<(String, &V)> =
                    self.iter().map(|(k, v)| (k.to_string(), v)).collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                for (key, value) in entries {
                    value.flatten_into(&paths::join(prefix, &key), out);
                }
            }

            fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError> {
                let Some(object) = value.as_object() else {
                    return Err(ConfigError::type_mismatch(path, "map", value));
                };
                let mut next = Self::new();
                for (key, item) in object {
                    let child_path = paths::join(path, key);
                    let parsed = K::from_str(key)
                        .map_err(|_| ConfigError::no_such_field(&child_path))?;
                    let mut entry = V::default();
                    entry.assign(item, &child_path)?;
                    next.insert(parsed, entry);
                }
                *self = next;
                Ok(())
            }

            fn enter(
                &mut self,
                segment: &str,
                child_path: &str,
                journal: &mut RollbackJournal,
            ) -> Result<&mut dyn ConfigNode, ConfigError> {
                let key = K::from_str(segment)
                    .map_err(|_| ConfigError::no_such_field(child_path))?;
                if !self.contains_key(&key) {
                    // Absent keys are created on the way down; the journal
                    // removes them again on rollback.
                    self.insert(key.clone(), V::default());
                    journal.record(RollbackOp::RemoveEntry {
                        path: paths::parent(child_path).to_string(),
                        key: segment.to_string(),
                    });
                }
                // The entry exists now, one way or the other.
                self.get_mut(&key)
                    .map(|v| v as &mut dyn ConfigNode)
                    .ok_or_else(|| ConfigError::no_such_field(child_path))
            }

            fn lookup(&mut self, segment: &str) -> Option<&mut dyn ConfigNode> {
                let key = K::from_str(segment).ok()?;
                self.get_mut(&key).map(|v| v as &mut dyn ConfigNode)
            }

            fn remove_entry(&mut self, key: &str) {
                if let Ok(key) = K::from_str(key) {
                    self.remove(&key);
                }
            }

            fn visit(
                &self,
                path: &str,
                f: &mut dyn FnMut(&str, &dyn ConfigNode) -> Result<(), ConfigError>,
            ) -> Result<(), ConfigError> {
                let mut entries: Vec<(String, &V)> =
                    self.iter().map(|(k, v)| (k.to_string(), v)).collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                for (key, value) in entries {
                    value.visit(&paths::join(path, &key), f)?;
                }
                f(path, self)
            }
        }
    };
}

map_node!(HashMap, Eq + Hash);
map_node!(BTreeMap, Ord);

/// Empty-reference semantics: descending through `None` allocates a
/// default value first; the journal empties the slot again on rollback.
impl<T: ConfigNode + Default> ConfigNode for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, Value>) {
        // An empty slot has no leaves; absence in the flattened form is
        // what distinguishes it from an allocated default.
        if let Some(inner) = self {
            inner.flatten_into(prefix, out);
        }
    }

    fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError> {
        if value.is_null() {
            *self = None;
            return Ok(());
        }
        self.get_or_insert_with(T::default).assign(value, path)
    }

    fn enter(
        &mut self,
        segment: &str,
        child_path: &str,
        journal: &mut RollbackJournal,
    ) -> Result<&mut dyn ConfigNode, ConfigError> {
        if self.is_none() {
            journal.record(RollbackOp::ClearSlot {
                path: paths::parent(child_path).to_string(),
            });
        }
        self.get_or_insert_with(T::default)
            .enter(segment, child_path, journal)
    }

    fn lookup(&mut self, segment: &str) -> Option<&mut dyn ConfigNode> {
        self.as_mut()?.lookup(segment)
    }

    fn is_leaf(&self) -> bool {
        self.as_ref().is_some_and(|inner| inner.is_leaf())
    }

    fn clear_slot(&mut self) {
        *self = None;
    }

    fn visit(
        &self,
        path: &str,
        f: &mut dyn FnMut(&str, &dyn ConfigNode) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        match self {
            Some(inner) => inner.visit(path, f),
            None => Ok(()),
        }
    }

    fn validate_node(&self) -> anyhow::Result<()> {
        match self {
            Some(inner) => inner.validate_node(),
            None => Ok(()),
        }
    }

    fn topic(&self) -> Option<Topic> {
        self.as_ref().and_then(|inner| inner.topic())
    }

    fn payload(&self) -> Option<ConfigPayload> {
        self.as_ref().and_then(|inner| inner.payload())
    }
}

impl<T: ConfigNode> ConfigNode for Box<T> {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, Value>) {
        (**self).flatten_into(prefix, out)
    }

    fn assign(&mut self, value: &Value, path: &str) -> Result<(), ConfigError> {
        (**self).assign(value, path)
    }

    fn enter(
        &mut self,
        segment: &str,
        child_path: &str,
        journal: &mut RollbackJournal,
    ) -> Result<&mut dyn ConfigNode, ConfigError> {
        (**self).enter(segment, child_path, journal)
    }

    fn lookup(&mut self, segment: &str) -> Option<&mut dyn ConfigNode> {
        (**self).lookup(segment)
    }

    fn is_leaf(&self) -> bool {
        (**self).is_leaf()
    }

    fn remove_entry(&mut self, key: &str) {
        (**self).remove_entry(key)
    }

    fn truncate_to(&mut self, len: usize) {
        (**self).truncate_to(len)
    }

    fn clear_slot(&mut self) {
        (**self).clear_slot()
    }

    fn visit(
        &self,
        path: &str,
        f: &mut dyn FnMut(&str, &dyn ConfigNode) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        (**self).visit(path, f)
    }

    fn validate_node(&self) -> anyhow::Result<()> {
        (**self).validate_node()
    }

    fn topic(&self) -> Option<Topic> {
        (**self).topic()
    }

    fn payload(&self) -> Option<ConfigPayload> {
        (**self).payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_conversion() {
        let mut n = 0i64;
        n.assign(&json!(456), "t.n").unwrap();
        assert_eq!(n, 456);

        // Whole floats convert; fractional ones do not.
        n.assign(&json!(7.0), "t.n").unwrap();
        assert_eq!(n, 7);
        let err = n.assign(&json!(7.5), "t.n").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));

        let mut small = 0u8;
        let err = small.assign(&json!(300), "t.small").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_string_and_bool_are_strict() {
        let mut s = String::new();
        s.assign(&json!("hello"), "t.s").unwrap();
        assert_eq!(s, "hello");
        assert!(s.assign(&json!(5), "t.s").is_err());

        let mut b = false;
        b.assign(&json!(true), "t.b").unwrap();
        assert!(b);
        assert!(b.assign(&json!("true"), "t.b").is_err());
    }

    #[test]
    fn test_vec_enter_appends_only_at_end() {
        let mut journal = RollbackJournal::new();
        let mut v = vec!["str1".to_string()];

        // Existing slot.
        assert!(v.enter("0", "t.array.0", &mut journal).is_ok());
        assert!(journal.is_empty());

        // Appending slot.
        v.enter("1", "t.array.1", &mut journal).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(journal.len(), 1);

        // Beyond the end.
        match v.enter("5", "t.array.5", &mut journal) {
            Err(err) => assert!(matches!(
                err,
                ConfigError::IndexOutOfRange { index: 5, len: 2, .. }
            )),
            Ok(_) => panic!("expected IndexOutOfRange error"),
        }
    }

    #[test]
    fn test_map_enter_creates_absent_keys() {
        let mut journal = RollbackJournal::new();
        let mut m: HashMap<String, String> = HashMap::new();

        let node = m.enter("key1", "t.map.key1", &mut journal).unwrap();
        node.assign(&json!("v"), "t.map.key1").unwrap();
        assert_eq!(m["key1"], "v");
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_option_allocates_on_enter() {
        let mut journal = RollbackJournal::new();
        let mut opt: Option<HashMap<String, i64>> = None;

        let node = opt.enter("a", "t.opt.a", &mut journal).unwrap();
        node.assign(&json!(1), "t.opt.a").unwrap();
        assert_eq!(opt.as_ref().unwrap()["a"], 1);
        // Two entries: the slot allocation and the created map key.
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn test_flatten_is_sorted_and_prefixed() {
        let mut m: HashMap<String, Vec<i64>> = HashMap::new();
        m.insert("b".to_string(), vec![3]);
        m.insert("a".to_string(), vec![1, 2]);

        let mut out = BTreeMap::new();
        m.flatten_into("root.m", &mut out);

        let keys: Vec<&String> = out.keys().collect();
        assert_eq!(keys, vec!["root.m.a.0", "root.m.a.1", "root.m.b.0"]);
        assert_eq!(out["root.m.b.0"], json!(3));
    }
}
