//! 内存记录存储
//!
//! 以 JSON 对象保存记录，在实体主键字段下分配递增的整数 ID。

use std::collections::BTreeMap;

use domain::{DomainError, DomainResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::catalog::ResourceCommands;

type Validator = fn(&Value) -> DomainResult<()>;

#[derive(Debug, Default)]
struct StoreState {
    last_id: i64,
    records: BTreeMap<i64, Map<String, Value>>,
}

/// 单个资源的内存存储
#[derive(Debug)]
pub struct RecordStore {
    singular: String,
    plural: String,
    key: String,
    validator: Option<Validator>,
    state: RwLock<StoreState>,
}

impl RecordStore {
    pub fn new(
        singular: impl Into<String>,
        plural: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
            key: key.into(),
            validator: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    pub fn for_resource(resource: &ResourceCommands) -> Self {
        Self::new(resource.singular, resource.plural, resource.key)
    }

    /// 创建记录前对负载执行的校验
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn singular(&self) -> &str {
        &self.singular
    }

    pub fn plural(&self) -> &str {
        &self.plural
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn list(&self) -> Vec<Value> {
        self.state
            .read()
            .records
            .values()
            .cloned()
            .map(Value::Object)
            .collect()
    }

    /// 保存新记录，返回带主键的完整表示
    pub fn insert(&self, payload: Value) -> DomainResult<Value> {
        if let Some(validate) = self.validator {
            validate(&payload)?;
        }
        let mut fields = into_object(payload)?;

        let mut state = self.state.write();
        state.last_id += 1;
        let id = state.last_id;
        fields.insert(self.key.clone(), Value::from(id));
        state.records.insert(id, fields.clone());
        Ok(Value::Object(fields))
    }

    pub fn get(&self, id: i64) -> DomainResult<Value> {
        self.state
            .read()
            .records
            .get(&id)
            .cloned()
            .map(Value::Object)
            .ok_or_else(|| self.not_found(id))
    }

    /// 合并更新字段（主键不可修改）
    pub fn update(&self, id: i64, changes: Value) -> DomainResult<Value> {
        let changes = into_object(changes)?;

        let mut state = self.state.write();
        let record = state.records.get_mut(&id).ok_or_else(|| self.not_found(id))?;
        for (field, value) in changes {
            if field != self.key {
                record.insert(field, value);
            }
        }
        Ok(Value::Object(record.clone()))
    }

    /// 删除记录，返回被删除的记录
    pub fn remove(&self, id: i64) -> DomainResult<Value> {
        self.state
            .write()
            .records
            .remove(&id)
            .map(Value::Object)
            .ok_or_else(|| self.not_found(id))
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    fn not_found(&self, id: i64) -> DomainError {
        DomainError::resource_not_found(self.singular.clone(), id.to_string())
    }
}

fn into_object(payload: Value) -> DomainResult<Map<String, Value>> {
    match payload {
        Value::Object(fields) => Ok(fields),
        other => Err(DomainError::invalid_payload(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 解析记录 ID：数字、数字字符串或 `{"id": ...}`
pub fn parse_id(payload: &Value) -> DomainResult<i64> {
    match payload {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| DomainError::invalid_payload(format!("invalid id `{}`", number))),
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| DomainError::invalid_payload(format!("invalid id `{}`", text))),
        Value::Object(fields) => fields
            .get("id")
            .ok_or_else(|| DomainError::invalid_payload("missing field `id`"))
            .and_then(parse_id),
        other => Err(DomainError::invalid_payload(format!(
            "expected an id, got {}",
            json_type(other)
        ))),
    }
}

/// 解析更新负载 `{id, changes}`
pub fn parse_update(payload: Value) -> DomainResult<(i64, Value)> {
    let mut fields = into_object(payload)?;
    let id = fields
        .get("id")
        .ok_or_else(|| DomainError::invalid_payload("missing field `id`"))
        .and_then(parse_id)?;
    let changes = fields
        .remove("changes")
        .ok_or_else(|| DomainError::invalid_payload("missing field `changes`"))?;
    Ok((id, changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> RecordStore {
        RecordStore::new("Ordonnance", "Ordonnances", "id")
    }

    #[test]
    fn assigns_sequential_ids_under_the_key() {
        let store = store();
        let first = store.insert(json!({"medicament": "paracetamol"})).unwrap();
        let second = store.insert(json!({"medicament": "ibuprofene"})).unwrap();

        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let store = store();
        store.insert(json!({})).unwrap();
        store.remove(1).unwrap();
        assert_eq!(store.insert(json!({})).unwrap()["id"], 2);
    }

    #[test]
    fn update_merges_and_protects_key() {
        let store = store();
        store.insert(json!({"a": 1, "b": 2})).unwrap();

        let updated = store.update(1, json!({"b": 3, "id": 99})).unwrap();
        assert_eq!(updated, json!({"a": 1, "b": 3, "id": 1}));
    }

    #[test]
    fn missing_records_are_not_found() {
        let store = store();
        let err = store.get(7).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Ordonnance 7 not found");
        assert!(store.remove(7).unwrap_err().is_not_found());
        assert!(store.update(7, json!({})).unwrap_err().is_not_found());
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(matches!(
            store().insert(json!([1, 2])),
            Err(DomainError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn parses_ids_and_updates() {
        assert_eq!(parse_id(&json!(4)).unwrap(), 4);
        assert_eq!(parse_id(&json!("12")).unwrap(), 12);
        assert_eq!(parse_id(&json!({"id": 3})).unwrap(), 3);
        assert!(parse_id(&json!("abc")).is_err());
        assert!(parse_id(&Value::Null).is_err());

        let (id, changes) = parse_update(json!({"id": 5, "changes": {"x": true}})).unwrap();
        assert_eq!(id, 5);
        assert_eq!(changes, json!({"x": true}));
        assert!(parse_update(json!({"id": 5})).is_err());
    }
}
