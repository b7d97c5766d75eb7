use std::fmt::{Display, Formatter};
use std::sync::Arc;

use glam::{DVec3, Vec4};
use serde::{Deserialize, Serialize};

use common::EPSILON;

/// Semantic type carried by a socket.
#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    // wildcard, resolved from whatever gets connected
    #[default]
    Variable,
    Float,
    Int,
    Bool,
    String,
    Vector,
    Color,
    Polygon,
    Shader,
    List(Box<DataType>),
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<u32>,
}

/// Opaque handle of a compiled shader program, owned by the renderer.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderHandle(pub u32);

/// Shared, copy-on-write list value.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListValue {
    element_type: DataType,
    items: Arc<Vec<Value>>,
}

#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    // empty/undefined, what every failed evaluation degrades to
    #[default]
    None,
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
    Vector(DVec3),
    Color(Vec4),
    Polygon(Polygon),
    Shader(ShaderHandle),
    List(ListValue),
}

impl DataType {
    pub fn list_of(element_type: DataType) -> DataType {
        DataType::List(Box::new(element_type))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, DataType::Variable)
    }
    pub fn is_list(&self) -> bool {
        matches!(self, DataType::List(_))
    }
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Float | DataType::Int | DataType::Bool)
    }

    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            DataType::List(element_type) => Some(element_type),
            _ => None,
        }
    }

    /// Whether a value of `self` may flow into a socket of type `other`.
    pub fn is_compatible(&self, other: &DataType) -> bool {
        match (self, other) {
            (DataType::Variable, _) | (_, DataType::Variable) => true,
            (DataType::List(a), DataType::List(b)) => a.is_compatible(b),
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (DataType::Float | DataType::Int, DataType::Vector) => true,
            (a, b) => a == b,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Variable => write!(f, "VARIABLE"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Int => write!(f, "INTEGER"),
            DataType::Bool => write!(f, "BOOL"),
            DataType::String => write!(f, "STRING"),
            DataType::Vector => write!(f, "VECTOR"),
            DataType::Color => write!(f, "COLOR"),
            DataType::Polygon => write!(f, "POLYGON"),
            DataType::Shader => write!(f, "SHADER"),
            DataType::List(element_type) => write!(f, "LIST:{}", element_type),
        }
    }
}

impl ListValue {
    pub fn new(element_type: DataType, items: Vec<Value>) -> Self {
        ListValue {
            element_type,
            items: Arc::new(items),
        }
    }

    pub fn empty(element_type: DataType) -> Self {
        Self::new(element_type, Vec::new())
    }

    pub fn filled(element_type: DataType, len: usize, value: Value) -> Self {
        Self::new(element_type, vec![value; len])
    }

    pub fn element_type(&self) -> &DataType {
        &self.element_type
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }
    pub fn items(&self) -> &[Value] {
        self.items.as_slice()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Writes `value` at `index`, growing the list with empty values if needed.
    pub fn set(&mut self, index: usize, value: Value) {
        let items = Arc::make_mut(&mut self.items);
        if items.len() <= index {
            items.resize(index + 1, Value::None);
        }
        items[index] = value;
    }

    pub fn push(&mut self, value: Value) {
        Arc::make_mut(&mut self.items).push(value);
    }

    /// Number of handles sharing the item storage.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.items)
    }
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::None => DataType::Variable,
            Value::Float(_) => DataType::Float,
            Value::Int(_) => DataType::Int,
            Value::Bool(_) => DataType::Bool,
            Value::String(_) => DataType::String,
            Value::Vector(_) => DataType::Vector,
            Value::Color(_) => DataType::Color,
            Value::Polygon(_) => DataType::Polygon,
            Value::Shader(_) => DataType::Shader,
            Value::List(list) => DataType::list_of(list.element_type.clone()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            Value::Bool(value) => Some(*value as i64 as f64),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Float(value) => Some(*value as i64),
            Value::Bool(value) => Some(*value as i64),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(value) => Some(*value != 0),
            Value::Float(value) => Some(value.abs() > EPSILON),
            _ => None,
        }
    }
    pub fn as_vector(&self) -> Option<DVec3> {
        match self {
            Value::Vector(value) => Some(*value),
            Value::Float(_) | Value::Int(_) => self.as_f64().map(DVec3::splat),
            _ => None,
        }
    }
    pub fn as_color(&self) -> Option<Vec4> {
        match self {
            Value::Color(value) => Some(*value),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }
    pub fn as_polygon(&self) -> Option<&Polygon> {
        match self {
            Value::Polygon(value) => Some(value),
            _ => None,
        }
    }
    pub fn as_shader(&self) -> Option<ShaderHandle> {
        match self {
            Value::Shader(value) => Some(*value),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&ListValue> {
        match self {
            Value::List(value) => Some(value),
            _ => None,
        }
    }
    pub fn into_list(self) -> Option<ListValue> {
        match self {
            Value::List(value) => Some(value),
            _ => None,
        }
    }

    /// Converts into `dst_data_type`, or `Value::None` when no conversion exists.
    pub fn convert_type(self, dst_data_type: &DataType) -> Value {
        if self.is_none() || dst_data_type.is_variable() {
            return self;
        }

        match dst_data_type {
            DataType::Float => self.as_f64().map_or(Value::None, Value::Float),
            DataType::Int => self.as_i64().map_or(Value::None, Value::Int),
            DataType::Bool => self.as_bool().map_or(Value::None, Value::Bool),
            DataType::Vector => self.as_vector().map_or(Value::None, Value::Vector),
            DataType::String => match self {
                Value::String(value) => Value::String(value),
                Value::Float(value) => Value::String(value.to_string()),
                Value::Int(value) => Value::String(value.to_string()),
                Value::Bool(value) => Value::String(value.to_string()),
                _ => Value::None,
            },
            DataType::List(element_type) => match self {
                Value::List(list) if list.element_type.is_compatible(element_type) => {
                    Value::List(list)
                }
                _ => Value::None,
            },
            dst => {
                if self.data_type() == *dst {
                    self
                } else {
                    Value::None
                }
            }
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}
impl From<DVec3> for Value {
    fn from(value: DVec3) -> Self {
        Value::Vector(value)
    }
}
impl From<Vec4> for Value {
    fn from(value: Vec4) -> Self {
        Value::Color(value)
    }
}
impl From<Polygon> for Value {
    fn from(value: Polygon) -> Self {
        Value::Polygon(value)
    }
}
impl From<ShaderHandle> for Value {
    fn from(value: ShaderHandle) -> Self {
        Value::Shader(value)
    }
}
impl From<ListValue> for Value {
    fn from(value: ListValue) -> Self {
        Value::List(value)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use crate::data::{DataType, ListValue, Value};

    #[test]
    fn numeric_conversions() {
        assert_eq!(Value::Int(3).convert_type(&DataType::Float), Value::Float(3.0));
        assert_eq!(Value::Float(2.9).convert_type(&DataType::Int), Value::Int(2));
        assert_eq!(Value::Float(0.0).convert_type(&DataType::Bool), Value::Bool(false));
        assert_eq!(
            Value::Int(2).convert_type(&DataType::Vector),
            Value::Vector(DVec3::splat(2.0))
        );
        assert_eq!(Value::from("x").convert_type(&DataType::Float), Value::None);
        assert_eq!(Value::Int(5).convert_type(&DataType::Variable), Value::Int(5));
    }

    #[test]
    fn list_is_copy_on_write() {
        let mut list = ListValue::new(DataType::Int, vec![Value::Int(1), Value::Int(2)]);
        let shared = list.clone();
        assert_eq!(list.share_count(), 2);

        list.set(3, Value::Int(4));

        assert_eq!(shared.len(), 2);
        assert_eq!(list.len(), 4);
        assert_eq!(list.get(2), Some(&Value::None));
        assert_eq!(list.share_count(), 1);
    }

    #[test]
    fn type_compatibility() {
        assert!(DataType::Variable.is_compatible(&DataType::Polygon));
        assert!(DataType::Int.is_compatible(&DataType::Float));
        assert!(DataType::list_of(DataType::Int).is_compatible(&DataType::list_of(DataType::Variable)));
        assert!(!DataType::Polygon.is_compatible(&DataType::Shader));
        assert!(!DataType::list_of(DataType::Int).is_compatible(&DataType::Int));
        assert_eq!(DataType::list_of(DataType::Vector).to_string(), "LIST:VECTOR");
    }
}
