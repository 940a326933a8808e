//! 反射调度：类型描述登记、按实参类别解析操作并调用

pub mod descriptor;
pub mod dispatcher;

pub use descriptor::{
    downcast_target, BoxError, Dispatch, Invoker, OperationDef, ParamType, TypeDescriptor,
    ValueKind, Visibility,
};
pub use dispatcher::{DispatchError, Dispatcher, OperationId, ResolvedOperation};
