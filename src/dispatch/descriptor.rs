//! 类型描述：可调度对象向调度器登记的操作表
//!
//! 一个类型由名称、父类型、实现的接口与有序操作列表描述。没有 invoker 的操作是抽象声明
//! （通常出现在接口上），只参与规范化，不能被调用。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 操作实现：接收目标对象与位置参数，返回任意类型的结果
pub type Invoker =
    Arc<dyn Fn(&dyn Any, Vec<Value>) -> Result<Box<dyn Any + Send>, BoxError> + Send + Sync>;

/// 可被反射调度的对象
pub trait Dispatch: Send + Sync {
    /// 已登记的类型名
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// 实参的运行时类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Integer,
            Value::Number(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        };
        f.write_str(s)
    }
}

/// 形参声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Any,
    Bool,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl ParamType {
    /// 实参类别是否可赋给该形参：null 总是可赋值，整数可赋给浮点
    pub fn accepts(&self, kind: ValueKind) -> bool {
        match (self, kind) {
            (_, ValueKind::Null) => true,
            (ParamType::Any, _) => true,
            (ParamType::Bool, ValueKind::Bool) => true,
            (ParamType::Integer, ValueKind::Integer) => true,
            (ParamType::Float, ValueKind::Float | ValueKind::Integer) => true,
            (ParamType::String, ValueKind::String) => true,
            (ParamType::Array, ValueKind::Array) => true,
            (ParamType::Object, ValueKind::Object) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// 单个操作声明
#[derive(Clone)]
pub struct OperationDef {
    pub name: String,
    pub params: Vec<ParamType>,
    pub visibility: Visibility,
    pub invoker: Option<Invoker>,
}

impl OperationDef {
    /// 公开且有实现的操作
    pub fn public<F>(name: impl Into<String>, params: Vec<ParamType>, f: F) -> Self
    where
        F: Fn(&dyn Any, Vec<Value>) -> Result<Box<dyn Any + Send>, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            visibility: Visibility::Public,
            invoker: Some(Arc::new(f)),
        }
    }

    /// 抽象声明（无实现）
    pub fn declare(name: impl Into<String>, params: Vec<ParamType>) -> Self {
        Self {
            name: name.into(),
            params,
            visibility: Visibility::Public,
            invoker: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub(crate) fn same_signature(&self, other: &OperationDef) -> bool {
        self.name == other.name && self.params == other.params
    }
}

impl fmt::Debug for OperationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("visibility", &self.visibility)
            .field("abstract", &self.invoker.is_none())
            .finish()
    }
}

/// 类型描述
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub operations: Vec<OperationDef>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            interfaces: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn operation(mut self, op: OperationDef) -> Self {
        self.operations.push(op);
        self
    }

    pub(crate) fn declared(&self, op: &OperationDef) -> Option<&OperationDef> {
        self.operations.iter().find(|o| o.same_signature(op))
    }
}

/// 将 invoker 收到的目标对象还原为具体类型
pub fn downcast_target<T: 'static>(target: &dyn Any) -> Result<&T, BoxError> {
    target.downcast_ref::<T>().ok_or_else(|| {
        format!("target is not a {}", std::any::type_name::<T>()).into()
    })
}
