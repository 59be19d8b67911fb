//! JSON codec: ValueCell ⇄ JSON text
//!
//! JSON has no references, no byte strings and only string object keys, so
//! three kinds of values travel as tagged strings:
//!
//! | Sentinel | Meaning |
//! |---|---|
//! | `^T^<slot>` | back-reference to the table that got `<slot>` |
//! | `^R^<name>` | named resource, resolved by name on read |
//! | `^E^<id>` | world element, resolved by id on read |
//!
//! A user string that looks like a sentinel has its third character replaced
//! by `~` on write, and `^T~`, `^R~`, `^E~` are turned back into `^T^`,
//! `^R^`, `^E^` on read. A user string that genuinely starts with `^R~`
//! therefore reads back as `^R^`.
//!
//! ## Tables
//!
//! A table whose keys are exactly the numbers `1..=n` is written as an array
//! ordered by key. Any other table is an object; its keys are rendered as
//! text and must be distinct. Tables get slots in document order starting
//! at 0, which is also the order a reader meets them in.
//!
//! ## Modes
//!
//! [`JsonMode::Durable`] output is meant to be stored and read back later,
//! so anything that cannot be restored is an error. [`JsonMode::Transient`]
//! output is for display and tooling; such values are downgraded (`false`
//! for references, `null` for non-finite numbers, lossy UTF-8).

use crate::error::JsonError;
use scriptval_core::{
    ExternalRegistry, GraphTracker, JsonConfig, LiveObject, RefId, ReferenceTracker, SlotTracker,
    TableBuilder, TableGraph, TableId, ValueCell, ValueList,
};
use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};

/// First slot number handed to a table in a JSON document
pub const JSON_SLOT_BASE: u32 = 0;

const TABLE_SENTINEL: u8 = b'T';
const RESOURCE_SENTINEL: u8 = b'R';
const ELEMENT_SENTINEL: u8 = b'E';

/// Whether the output must be restorable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonMode {
    /// Display and tooling; unrestorable values are downgraded
    #[default]
    Transient,
    /// Persistence; unrestorable values are errors
    Durable,
}

fn is_sentinel_kind(kind: u8) -> bool {
    matches!(kind, TABLE_SENTINEL | RESOURCE_SENTINEL | ELEMENT_SENTINEL)
}

/// Sentinel kind of `s` when its third byte is `marker`
fn prefix_kind(s: &[u8], marker: u8) -> Option<u8> {
    if s.len() > 3 && s[0] == b'^' && s[2] == marker && is_sentinel_kind(s[1]) {
        Some(s[1])
    } else {
        None
    }
}

fn sentinel(kind: u8, payload: impl std::fmt::Display) -> String {
    format!("^{}^{}", kind as char, payload)
}

/// Replace byte 2 of `s`, which is always ASCII in a sentinel prefix
fn swap_marker(s: &str, marker: char) -> String {
    let mut out = String::with_capacity(s.len());
    out.push_str(&s[..2]);
    out.push(marker);
    out.push_str(&s[3..]);
    out
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// How a table will be emitted, decided before anything is written
enum TableShape {
    /// Pair indices ordered by key `1..=n`
    Array(Vec<usize>),
    /// Rendered key per pair, in pair order
    Object(Vec<String>),
}

/// Encoder state for one document
struct JsonWriter<'a> {
    mode: JsonMode,
    registry: &'a dyn ExternalRegistry,
    config: &'a JsonConfig,
    tracker: SlotTracker,
    depth: usize,
}

impl<'a> JsonWriter<'a> {
    fn new(mode: JsonMode, registry: &'a dyn ExternalRegistry, config: &'a JsonConfig) -> Self {
        JsonWriter {
            mode,
            registry,
            config,
            tracker: ReferenceTracker::with_base(JSON_SLOT_BASE),
            depth: 0,
        }
    }

    fn durable(&self) -> bool {
        self.mode == JsonMode::Durable
    }

    fn write_list(&mut self, list: &ValueList) -> Result<Value, JsonError> {
        list.iter()
            .map(|cell| self.write_cell(cell))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn write_cell(&mut self, cell: &ValueCell) -> Result<Value, JsonError> {
        Ok(match cell {
            ValueCell::Nil => Value::Null,
            ValueCell::Bool(b) => Value::Bool(*b),
            ValueCell::Number(n) => self.number(*n)?,
            ValueCell::String(bytes) => Value::String(self.string(bytes)?),
            ValueCell::ExternalRef(id) => match self.reference(*id)? {
                Some(text) => Value::String(text),
                None => Value::Bool(false),
            },
            ValueCell::Table(graph) => self.write_table(graph)?,
            ValueCell::TableRef(weak) => match weak.upgrade() {
                Some(graph) => self.write_table(&graph)?,
                None => {
                    debug!("Dangling table reference, writing null");
                    Value::Null
                }
            },
        })
    }

    fn number(&self, n: f64) -> Result<Value, JsonError> {
        if !n.is_finite() {
            if self.durable() {
                return Err(JsonError::NonFiniteNumber(n));
            }
            debug!("Writing non-finite number {} as null", n);
            return Ok(Value::Null);
        }
        if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
            return Ok(Value::from(n as i32));
        }
        Ok(Number::from_f64(n).map_or(Value::Null, Value::Number))
    }

    fn string(&self, bytes: &[u8]) -> Result<String, JsonError> {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) if self.durable() => return Err(JsonError::InvalidUtf8),
            Err(_) => String::from_utf8_lossy(bytes),
        };
        if prefix_kind(text.as_bytes(), b'^').is_some() {
            return Ok(swap_marker(&text, '~'));
        }
        Ok(text.into_owned())
    }

    /// Sentinel for `id`, or `None` when it is written as `false`
    fn reference(&self, id: RefId) -> Result<Option<String>, JsonError> {
        match self.registry.resolve(id) {
            Some(LiveObject::Resource { name }) => Ok(Some(sentinel(RESOURCE_SENTINEL, name))),
            Some(LiveObject::Element) => Ok(Some(sentinel(ELEMENT_SENTINEL, id))),
            Some(LiveObject::Object) | None => {
                if self.durable() {
                    return Err(JsonError::UnserializableReference(id));
                }
                warn!("Reference {} cannot be persisted, writing false", id);
                Ok(None)
            }
        }
    }

    fn key_text(&self, key: &ValueCell) -> Result<String, JsonError> {
        match key {
            ValueCell::Number(n) if n.fract() == 0.0 && n.abs() < 9.2e18 => {
                Ok((*n as i64).to_string())
            }
            ValueCell::Number(n) if !n.is_finite() && self.durable() => {
                Err(JsonError::NonFiniteNumber(*n))
            }
            ValueCell::Number(n) => Ok(n.to_string()),
            ValueCell::Bool(b) => Ok(b.to_string()),
            ValueCell::String(bytes) => self.string(bytes),
            ValueCell::ExternalRef(id) => Ok(self
                .reference(*id)?
                .unwrap_or_else(|| "false".to_string())),
            ValueCell::Nil | ValueCell::Table(_) | ValueCell::TableRef(_) => {
                Err(JsonError::InvalidKey(key.type_name()))
            }
        }
    }

    fn shape(&self, graph: &TableGraph) -> Result<TableShape, JsonError> {
        let n = graph.len();
        let mut order = vec![usize::MAX; n];
        let is_array = graph.pairs().iter().enumerate().all(|(i, (key, _))| {
            let Some(k) = key.as_number() else {
                return false;
            };
            if k.fract() != 0.0 || k < 1.0 || k > n as f64 {
                return false;
            }
            let slot = &mut order[k as usize - 1];
            let fresh = *slot == usize::MAX;
            *slot = i;
            fresh
        });
        if is_array {
            return Ok(TableShape::Array(order));
        }

        let mut keys = Vec::with_capacity(n);
        for (key, _) in graph.pairs() {
            let text = self.key_text(key)?;
            if keys.contains(&text) {
                return Err(JsonError::DuplicateKey(text));
            }
            keys.push(text);
        }
        Ok(TableShape::Object(keys))
    }

    fn write_table(&mut self, graph: &Arc<TableGraph>) -> Result<Value, JsonError> {
        let id = TableId::of(graph);
        if let Some(&slot) = self.tracker.lookup(&id) {
            return Ok(Value::String(sentinel(TABLE_SENTINEL, slot)));
        }
        if self.depth >= self.config.max_depth {
            return Err(JsonError::DepthExceeded(self.config.max_depth));
        }

        let shape = self.shape(graph)?;
        self.tracker.assign_slot(id);

        self.depth += 1;
        let pairs = graph.pairs();
        let value = match shape {
            TableShape::Array(order) => {
                let mut items = Vec::with_capacity(order.len());
                for i in order {
                    items.push(self.write_cell(&pairs[i].1)?);
                }
                Value::Array(items)
            }
            TableShape::Object(keys) => {
                let mut map = Map::with_capacity(keys.len());
                for (key, (_, value)) in keys.into_iter().zip(pairs) {
                    let value = self.write_cell(value)?;
                    map.insert(key, value);
                }
                Value::Object(map)
            }
        };
        self.depth -= 1;
        Ok(value)
    }
}

/// Decoder state for one document
struct JsonReader<'a> {
    registry: &'a dyn ExternalRegistry,
    config: &'a JsonConfig,
    tracker: GraphTracker,
    depth: usize,
}

impl<'a> JsonReader<'a> {
    fn new(registry: &'a dyn ExternalRegistry, config: &'a JsonConfig) -> Self {
        JsonReader {
            registry,
            config,
            tracker: ReferenceTracker::with_base(JSON_SLOT_BASE),
            depth: 0,
        }
    }

    fn read_top(&mut self, value: &Value) -> Result<ValueList, JsonError> {
        match value {
            Value::Array(items) => items.iter().map(|item| self.read_value(item)).collect(),
            Value::Object(_) => Ok(vec![self.read_value(value)?].into()),
            other => Err(JsonError::TopLevel(json_type_name(other))),
        }
    }

    fn read_value(&mut self, value: &Value) -> Result<ValueCell, JsonError> {
        Ok(match value {
            Value::Null => ValueCell::Nil,
            Value::Bool(b) => ValueCell::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(ValueCell::Nil, ValueCell::Number),
            Value::String(s) => self.read_string(s)?,
            Value::Array(items) => {
                let mut builder = self.open_table(items.len())?;
                for (i, item) in items.iter().enumerate() {
                    let value = self.read_value(item)?;
                    builder.push(ValueCell::Number((i + 1) as f64), value);
                }
                self.depth -= 1;
                ValueCell::Table(builder.finish())
            }
            Value::Object(map) => {
                let mut builder = self.open_table(map.len())?;
                for (key, item) in map {
                    let key = self.read_key(key)?;
                    let value = self.read_value(item)?;
                    builder.push(key, value);
                }
                self.depth -= 1;
                ValueCell::Table(builder.finish())
            }
        })
    }

    /// Start a table, registering its slot and entering one nesting level
    fn open_table(&mut self, pairs: usize) -> Result<TableBuilder, JsonError> {
        if self.depth >= self.config.max_depth {
            return Err(JsonError::DepthExceeded(self.config.max_depth));
        }
        let builder = TableBuilder::with_capacity(pairs);
        self.tracker.register(Arc::clone(builder.graph()));
        self.depth += 1;
        Ok(builder)
    }

    fn read_string(&self, s: &str) -> Result<ValueCell, JsonError> {
        let bytes = s.as_bytes();
        if let Some(kind) = prefix_kind(bytes, b'^') {
            let payload = &s[3..];
            return match kind {
                TABLE_SENTINEL => payload
                    .parse::<u32>()
                    .ok()
                    .and_then(|slot| self.tracker.lookup(&slot))
                    .map(ValueCell::back_ref)
                    .ok_or_else(|| JsonError::UnknownTableRef(s.to_string())),
                ELEMENT_SENTINEL => Ok(self.element(payload)),
                _ => Ok(self.resource(payload)),
            };
        }
        if prefix_kind(bytes, b'~').is_some() {
            return Ok(ValueCell::from(swap_marker(s, '^')));
        }
        Ok(ValueCell::from(s))
    }

    /// Object keys decode like strings, except that a table cannot be a key
    fn read_key(&self, s: &str) -> Result<ValueCell, JsonError> {
        if prefix_kind(s.as_bytes(), b'^') == Some(TABLE_SENTINEL) {
            return Err(JsonError::InvalidKey("table reference"));
        }
        self.read_string(s)
    }

    fn element(&self, payload: &str) -> ValueCell {
        match payload.parse::<RefId>() {
            Ok(id) if self.registry.resolve(id) == Some(LiveObject::Element) => {
                ValueCell::ExternalRef(id)
            }
            _ => {
                debug!("Element {} is gone, reading false", payload);
                ValueCell::Bool(false)
            }
        }
    }

    fn resource(&self, name: &str) -> ValueCell {
        match self.registry.resolve_name(name) {
            Some(id) => ValueCell::ExternalRef(id),
            None => {
                debug!("Resource {} is gone, reading false", name);
                ValueCell::Bool(false)
            }
        }
    }
}

fn render(value: &Value, config: &JsonConfig) -> Result<String, JsonError> {
    Ok(if config.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

/// JSON encoding for values and lists
pub trait JsonCodec: Sized {
    fn from_json_with_config(
        text: &str,
        registry: &dyn ExternalRegistry,
        config: &JsonConfig,
    ) -> Result<Self, JsonError>;

    fn to_json_with_config(
        &self,
        mode: JsonMode,
        registry: &dyn ExternalRegistry,
        config: &JsonConfig,
    ) -> Result<String, JsonError>;

    fn from_json(text: &str, registry: &dyn ExternalRegistry) -> Result<Self, JsonError> {
        Self::from_json_with_config(text, registry, &JsonConfig::default())
    }

    fn to_json(
        &self,
        mode: JsonMode,
        registry: &dyn ExternalRegistry,
    ) -> Result<String, JsonError> {
        self.to_json_with_config(mode, registry, &JsonConfig::default())
    }
}

/// A list is a top-level array; a top-level object reads as a one-table list
impl JsonCodec for ValueList {
    fn from_json_with_config(
        text: &str,
        registry: &dyn ExternalRegistry,
        config: &JsonConfig,
    ) -> Result<Self, JsonError> {
        let document: Value = serde_json::from_str(text)?;
        let mut reader = JsonReader::new(registry, config);
        let list = reader.read_top(&document)?;
        debug!(
            "Read {} values ({} tables) from JSON",
            list.len(),
            reader.tracker.len()
        );
        Ok(list)
    }

    fn to_json_with_config(
        &self,
        mode: JsonMode,
        registry: &dyn ExternalRegistry,
        config: &JsonConfig,
    ) -> Result<String, JsonError> {
        let mut writer = JsonWriter::new(mode, registry, config);
        let document = writer.write_list(self)?;
        debug!(
            "Wrote {} values ({} tables) as {:?} JSON",
            self.len(),
            writer.tracker.len(),
            mode
        );
        render(&document, config)
    }
}

/// A single value may be any JSON value
impl JsonCodec for ValueCell {
    fn from_json_with_config(
        text: &str,
        registry: &dyn ExternalRegistry,
        config: &JsonConfig,
    ) -> Result<Self, JsonError> {
        let document: Value = serde_json::from_str(text)?;
        JsonReader::new(registry, config).read_value(&document)
    }

    fn to_json_with_config(
        &self,
        mode: JsonMode,
        registry: &dyn ExternalRegistry,
        config: &JsonConfig,
    ) -> Result<String, JsonError> {
        let document = JsonWriter::new(mode, registry, config).write_cell(self)?;
        render(&document, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptval_core::{EmptyRegistry, StaticRegistry};

    fn registry() -> StaticRegistry {
        let mut registry = StaticRegistry::new();
        registry.insert_resource(17, "race");
        registry.insert_element(42);
        registry.insert_object(99);
        registry
    }

    fn durable(list: &ValueList) -> String {
        list.to_json(JsonMode::Durable, &registry()).unwrap()
    }

    fn numbers(keys: &[f64]) -> ValueCell {
        ValueCell::table(
            keys.iter()
                .map(|&k| (ValueCell::Number(k), ValueCell::from("v")))
                .collect(),
        )
    }

    #[test]
    fn test_scalars() {
        let list: ValueList = vec![
            ValueCell::Nil,
            ValueCell::Bool(true),
            ValueCell::Number(3.0),
            ValueCell::Number(-0.5),
            ValueCell::Number(0.25),
            ValueCell::from("plain"),
        ]
        .into();
        assert_eq!(durable(&list), r#"[null,true,3,-0.5,0.25,"plain"]"#);
    }

    #[test]
    fn test_array_heuristic() {
        let list: ValueList = vec![
            numbers(&[1.0, 2.0, 3.0]),
            numbers(&[1.0, 2.0, 4.0]),
            numbers(&[1.5]),
            numbers(&[3.0, 1.0, 2.0]),
            ValueCell::array(vec![]),
        ]
        .into();
        assert_eq!(
            durable(&list),
            r#"[["v","v","v"],{"1":"v","2":"v","4":"v"},{"1.5":"v"},["v","v","v"],[]]"#
        );
    }

    #[test]
    fn test_array_ordered_by_key() {
        let cell = ValueCell::table(vec![
            (ValueCell::Number(2.0), ValueCell::from("b")),
            (ValueCell::Number(1.0), ValueCell::from("a")),
        ]);
        let json = cell.to_json(JsonMode::Durable, &EmptyRegistry).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
    }

    #[test]
    fn test_object_keys() {
        let cell = ValueCell::table(vec![
            (ValueCell::Bool(true), ValueCell::Number(1.0)),
            (ValueCell::from("name"), ValueCell::Number(2.0)),
            (ValueCell::ExternalRef(17), ValueCell::Number(3.0)),
            (ValueCell::Number(-7.0), ValueCell::Number(4.0)),
        ]);
        let json = cell.to_json(JsonMode::Durable, &registry()).unwrap();
        assert_eq!(json, r#"{"true":1,"name":2,"^R^race":3,"-7":4}"#);
    }

    #[test]
    fn test_invalid_and_duplicate_keys() {
        let nil_key = ValueCell::table(vec![(ValueCell::Nil, ValueCell::Number(1.0))]);
        assert!(matches!(
            nil_key.to_json(JsonMode::Transient, &EmptyRegistry),
            Err(JsonError::InvalidKey("nil"))
        ));

        let table_key = ValueCell::table(vec![(ValueCell::array(vec![]), ValueCell::Nil)]);
        assert!(matches!(
            table_key.to_json(JsonMode::Transient, &EmptyRegistry),
            Err(JsonError::InvalidKey("table"))
        ));

        let clash = ValueCell::table(vec![
            (ValueCell::Number(5.0), ValueCell::Nil),
            (ValueCell::from("5"), ValueCell::Nil),
        ]);
        match clash.to_json(JsonMode::Transient, &EmptyRegistry) {
            Err(JsonError::DuplicateKey(key)) => assert_eq!(key, "5"),
            other => panic!("Expected DuplicateKey, got {:?}", other),
        }
    }

    #[test]
    fn test_aliasing_uses_back_reference() {
        let t = ValueCell::table(vec![(ValueCell::from("k"), ValueCell::Number(1.0))]);
        let list: ValueList = vec![t.clone(), t].into();
        let json = durable(&list);
        assert_eq!(json, r#"[{"k":1},"^T^0"]"#);

        let back = ValueList::from_json(&json, &registry()).unwrap();
        assert!(matches!(back[1], ValueCell::TableRef(_)));
        assert_eq!(back[0].table_id(), back[1].table_id());
        assert!(back.equivalent(&list));
    }

    #[test]
    fn test_slots_follow_document_order() {
        let a = ValueCell::array(vec![ValueCell::from("a")]);
        let b = ValueCell::array(vec![ValueCell::from("b")]);
        // Pair order puts b first, but the array is emitted by key.
        let outer = ValueCell::table(vec![
            (ValueCell::Number(2.0), b.clone()),
            (ValueCell::Number(1.0), a.clone()),
        ]);
        let list: ValueList = vec![outer, b, a].into();
        let json = durable(&list);
        assert_eq!(json, r#"[[["a"],["b"]],"^T^2","^T^1"]"#);

        let back = ValueList::from_json(&json, &EmptyRegistry).unwrap();
        let outer = back[0].as_table().unwrap();
        let first = outer.get(&ValueCell::Number(1.0)).unwrap();
        assert_eq!(first.table_id(), back[2].table_id());
    }

    #[test]
    fn test_self_reference() {
        let mut builder = TableBuilder::with_capacity(1);
        let back_ref = builder.downgrade();
        builder.push(ValueCell::from("me"), ValueCell::TableRef(back_ref));
        let cell = ValueCell::Table(builder.finish());

        let json = cell.to_json(JsonMode::Durable, &EmptyRegistry).unwrap();
        assert_eq!(json, r#"{"me":"^T^0"}"#);

        let list = ValueList::from_json(&json, &EmptyRegistry).unwrap();
        let graph = list[0].as_table().unwrap();
        let inner = graph.get(&ValueCell::from("me")).unwrap().as_table().unwrap();
        assert!(Arc::ptr_eq(&inner, &graph));
    }

    #[test]
    fn test_sentinel_collision_escaped() {
        let list: ValueList = vec![
            ValueCell::from("^R^anything"),
            ValueCell::from("^T^0"),
            ValueCell::from("^X^other"),
            ValueCell::from("^R^"),
        ]
        .into();
        let json = durable(&list);
        assert_eq!(json, r#"["^R~anything","^T~0","^X^other","^R^"]"#);

        let back = ValueList::from_json(&json, &registry()).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn test_references() {
        let list: ValueList = vec![ValueCell::ExternalRef(17), ValueCell::ExternalRef(42)].into();
        let json = durable(&list);
        assert_eq!(json, r#"["^R^race","^E^42"]"#);
        assert_eq!(ValueList::from_json(&json, &registry()).unwrap(), list);
    }

    #[test]
    fn test_unpersistable_references() {
        let list: ValueList = vec![ValueCell::ExternalRef(99), ValueCell::ExternalRef(5)].into();
        assert_eq!(
            list.to_json(JsonMode::Transient, &registry()).unwrap(),
            "[false,false]"
        );
        assert!(matches!(
            list.to_json(JsonMode::Durable, &registry()),
            Err(JsonError::UnserializableReference(99))
        ));
    }

    #[test]
    fn test_vanished_references_read_false() {
        let json = r#"["^E^7","^E^99","^R^gone","^E^x"]"#;
        let list = ValueList::from_json(json, &registry()).unwrap();
        assert!(list.iter().all(|cell| *cell == ValueCell::Bool(false)));
    }

    #[test]
    fn test_unknown_table_ref() {
        for json in [r#"["^T^0"]"#, r#"[{}, "^T^1"]"#, r#"["^T^zero"]"#] {
            assert!(
                matches!(
                    ValueList::from_json(json, &EmptyRegistry),
                    Err(JsonError::UnknownTableRef(_))
                ),
                "{}",
                json
            );
        }
    }

    #[test]
    fn test_table_ref_key_rejected() {
        let json = r#"[{"a":1},{"^T^0":2}]"#;
        assert!(matches!(
            ValueList::from_json(json, &registry()),
            Err(JsonError::InvalidKey("table reference"))
        ));

        // Reference keys still resolve and escaped keys are restored.
        let list = ValueList::from_json(r#"[{"^R^race":1,"^T~0":2}]"#, &registry()).unwrap();
        let table = list[0].as_table().unwrap();
        assert_eq!(table.pairs()[0].0, ValueCell::ExternalRef(17));
        assert_eq!(table.pairs()[1].0, ValueCell::from("^T^0"));
        assert!(durable(&list).contains(r#""^T~0":2"#));
    }

    #[test]
    fn test_non_finite_keys() {
        let list: ValueList =
            vec![ValueCell::table(vec![(ValueCell::Number(f64::NAN), ValueCell::Number(1.0))])]
                .into();
        assert!(matches!(
            list.to_json(JsonMode::Durable, &EmptyRegistry),
            Err(JsonError::NonFiniteNumber(_))
        ));
        assert_eq!(
            list.to_json(JsonMode::Transient, &EmptyRegistry).unwrap(),
            r#"[{"NaN":1}]"#
        );
    }

    #[test]
    fn test_non_finite_numbers() {
        let list: ValueList =
            vec![ValueCell::Number(f64::NAN), ValueCell::Number(f64::INFINITY)].into();
        assert_eq!(
            list.to_json(JsonMode::Transient, &EmptyRegistry).unwrap(),
            "[null,null]"
        );
        assert!(matches!(
            list.to_json(JsonMode::Durable, &EmptyRegistry),
            Err(JsonError::NonFiniteNumber(_))
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let list: ValueList = vec![ValueCell::string(vec![b'a', 0xff])].into();
        assert_eq!(
            list.to_json(JsonMode::Transient, &EmptyRegistry).unwrap(),
            "[\"a\u{fffd}\"]"
        );
        assert!(matches!(
            list.to_json(JsonMode::Durable, &EmptyRegistry),
            Err(JsonError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_top_level() {
        let list = ValueList::from_json(r#"{"a":1}"#, &EmptyRegistry).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(
            list[0].as_table().unwrap().get(&ValueCell::from("a")),
            Some(&ValueCell::Number(1.0))
        );

        assert!(matches!(
            ValueList::from_json("42", &EmptyRegistry),
            Err(JsonError::TopLevel("number"))
        ));
        assert!(matches!(
            ValueList::from_json("[1,", &EmptyRegistry),
            Err(JsonError::Syntax(_))
        ));
        assert_eq!(
            ValueCell::from_json("42", &EmptyRegistry).unwrap(),
            ValueCell::Number(42.0)
        );
    }

    #[test]
    fn test_arrays_read_with_number_keys() {
        let list = ValueList::from_json(r#"[["x", null, true]]"#, &EmptyRegistry).unwrap();
        let graph = list[0].as_table().unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.pairs()[0].0, ValueCell::Number(1.0));
        assert_eq!(graph.pairs()[1].1, ValueCell::Nil);
        assert_eq!(graph.pairs()[2].0, ValueCell::Number(3.0));
    }

    #[test]
    fn test_depth_limit() {
        let config = JsonConfig {
            max_depth: 2,
            pretty: false,
        };
        assert!(matches!(
            ValueList::from_json_with_config("[[[[1]]]]", &EmptyRegistry, &config),
            Err(JsonError::DepthExceeded(2))
        ));
        // The outer array is the list itself, not a table.
        assert!(ValueList::from_json_with_config("[[[1]]]", &EmptyRegistry, &config).is_ok());

        let nested = ValueCell::array(vec![ValueCell::array(vec![ValueCell::array(vec![])])]);
        assert!(matches!(
            nested.to_json_with_config(JsonMode::Transient, &EmptyRegistry, &config),
            Err(JsonError::DepthExceeded(2))
        ));
    }

    #[test]
    fn test_pretty() {
        let config = JsonConfig {
            pretty: true,
            ..JsonConfig::default()
        };
        let list: ValueList = vec![ValueCell::Number(1.0)].into();
        let json = list
            .to_json_with_config(JsonMode::Transient, &EmptyRegistry, &config)
            .unwrap();
        assert_eq!(json, "[\n  1\n]");
    }
}
