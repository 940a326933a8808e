//! 反射调度器：按名称与实参类别在已登记类型上解析并调用操作
//!
//! 解析规则：
//! - 无实参：目标类型上唯一的同名零参公开操作；不存在或不唯一都算找不到
//! - 有实参：按声明顺序找第一个同名、同元数且每个形参都接受对应实参类别的公开操作
//!
//! 每个类型的有效操作表（含继承来的操作与规范化 ID）在登记类型时计算并缓存，调用时不再计算；
//! 父类型尚未登记的类型在其类型图完整后的下一次登记时补建。
//! 解析结果按 (类型, 操作名, 实参类别) 记忆。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;

use super::descriptor::{
    BoxError, Dispatch, Invoker, OperationDef, ParamType, TypeDescriptor, ValueKind, Visibility,
};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Operation {operation}({args}) not found on {target}")]
    OperationNotFound {
        operation: String,
        args: String,
        target: String,
    },

    #[error("Type {0} is not registered")]
    UnknownType(String),

    #[error("Invocation of {operation} on {target} failed: {source}")]
    Invocation {
        operation: String,
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("Operation {operation} on {target} did not return {expected}")]
    ReturnType {
        operation: String,
        target: String,
        expected: &'static str,
    },
}

/// 操作的规范化标识：最通用的那一处声明
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId {
    pub declaring_type: String,
    pub name: String,
    pub params: Vec<ParamType>,
}

/// 解析完成、可直接调用的操作
pub struct ResolvedOperation {
    /// 实现所在的类型
    pub declaring_type: String,
    pub canonical: OperationId,
    invoker: Invoker,
}

impl std::fmt::Debug for ResolvedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedOperation")
            .field("declaring_type", &self.declaring_type)
            .field("canonical", &self.canonical)
            .finish()
    }
}

struct TableEntry {
    name: String,
    params: Vec<ParamType>,
    visibility: Visibility,
    resolved: Arc<ResolvedOperation>,
}

/// 某个类型的有效操作表（自身声明在前，继承来的在后）
struct TypeTable {
    entries: Vec<TableEntry>,
}

type CacheKey = (String, String, Vec<ValueKind>);

#[derive(Default)]
pub struct Dispatcher {
    types: RwLock<HashMap<String, TypeDescriptor>>,
    tables: RwLock<HashMap<String, Arc<TypeTable>>>,
    resolutions: RwLock<HashMap<CacheKey, Arc<ResolvedOperation>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记（或替换）类型描述，并为所有类型图完整的类型重建操作表；已记忆的解析结果失效
    pub fn register_type(&self, descriptor: TypeDescriptor) {
        tracing::debug!(type_name = %descriptor.name, "Registering type descriptor");
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        types.insert(descriptor.name.clone(), descriptor);

        // 新类型可能改变其他类型的规范化结果
        let tables: HashMap<String, Arc<TypeTable>> = types
            .keys()
            .filter_map(|name| {
                build_table(&types, name)
                    .ok()
                    .map(|table| (name.clone(), Arc::new(table)))
            })
            .collect();
        *self.tables.write().unwrap_or_else(PoisonError::into_inner) = tables;
        drop(types);

        self.resolutions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_name)
    }

    /// 按名称与实参类别解析操作（结果被记忆）
    pub fn resolve(
        &self,
        type_name: &str,
        operation: &str,
        kinds: &[ValueKind],
    ) -> Result<Arc<ResolvedOperation>, DispatchError> {
        let key = (type_name.to_string(), operation.to_string(), kinds.to_vec());
        if let Some(hit) = self
            .resolutions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        let table = self.table_for(type_name)?;
        let mut candidates = table.entries.iter().filter(|e| {
            e.visibility == Visibility::Public && e.name == operation && e.params.len() == kinds.len()
        });

        let found = if kinds.is_empty() {
            match (candidates.next(), candidates.next()) {
                (Some(only), None) => Some(only),
                _ => None,
            }
        } else {
            candidates.find(|e| e.params.iter().zip(kinds).all(|(p, k)| p.accepts(*k)))
        };

        let entry = found.ok_or_else(|| DispatchError::OperationNotFound {
            operation: operation.to_string(),
            args: kinds.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            target: type_name.to_string(),
        })?;

        let resolved = Arc::clone(&entry.resolved);
        self.resolutions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// 在目标对象上调用操作，并把结果还原为 R
    pub fn invoke<R, T>(&self, target: &T, operation: &str, args: Vec<Value>) -> Result<R, DispatchError>
    where
        R: 'static,
        T: Dispatch + ?Sized,
    {
        let kinds: Vec<ValueKind> = args.iter().map(ValueKind::of).collect();
        let resolved = self.resolve(target.type_name(), operation, &kinds)?;
        let output = (resolved.invoker)(target.as_any(), args).map_err(|source| {
            DispatchError::Invocation {
                operation: operation.to_string(),
                target: target.type_name().to_string(),
                source,
            }
        })?;
        output
            .downcast::<R>()
            .map(|boxed| *boxed)
            .map_err(|_| DispatchError::ReturnType {
                operation: operation.to_string(),
                target: target.type_name().to_string(),
                expected: std::any::type_name::<R>(),
            })
    }

    fn table_for(&self, type_name: &str) -> Result<Arc<TypeTable>, DispatchError> {
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
        {
            return Ok(Arc::clone(table));
        }
        let table = {
            let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
            Arc::new(build_table(&types, type_name)?)
        };
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name.to_string(), Arc::clone(&table));
        Ok(table)
    }
}

/// 自身与父类型链上的类型名（自身在前）
fn lineage<'a>(
    types: &'a HashMap<String, TypeDescriptor>,
    type_name: &'a str,
) -> Result<Vec<&'a TypeDescriptor>, DispatchError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(type_name);
    while let Some(name) = current {
        if !seen.insert(name) {
            break;
        }
        let desc = types
            .get(name)
            .ok_or_else(|| DispatchError::UnknownType(name.to_string()))?;
        chain.push(desc);
        current = desc.parent.as_deref();
    }
    Ok(chain)
}

fn build_table(
    types: &HashMap<String, TypeDescriptor>,
    type_name: &str,
) -> Result<TypeTable, DispatchError> {
    let chain = lineage(types, type_name)?;
    let interfaces = interface_closure(types, &chain);
    let mut entries: Vec<TableEntry> = Vec::new();

    for (depth, desc) in chain.iter().enumerate() {
        let own_count = entries.len();
        for op in &desc.operations {
            let Some(invoker) = op.invoker.as_ref() else {
                continue;
            };
            if depth > 0 {
                if op.visibility == Visibility::Private {
                    continue;
                }
                // 子类型已覆盖
                let overridden = entries[..own_count]
                    .iter()
                    .any(|e| e.name == op.name && e.params == op.params);
                if overridden {
                    continue;
                }
            }
            let canonical = canonicalize(types, &interfaces, &desc.name, op);
            entries.push(TableEntry {
                name: op.name.clone(),
                params: op.params.clone(),
                visibility: op.visibility,
                resolved: Arc::new(ResolvedOperation {
                    declaring_type: desc.name.clone(),
                    canonical,
                    invoker: Arc::clone(invoker),
                }),
            });
        }
    }

    Ok(TypeTable { entries })
}

/// 目标类型（含父类型链）实现的全部接口，广度优先，具体的在前
fn interface_closure(
    types: &HashMap<String, TypeDescriptor>,
    chain: &[&TypeDescriptor],
) -> Vec<String> {
    let mut queue: VecDeque<String> = chain
        .iter()
        .flat_map(|d| d.interfaces.iter().cloned())
        .collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(desc) = types.get(&name) {
            queue.extend(desc.interfaces.iter().cloned());
        }
        out.push(name);
    }
    out
}

/// `to` 是否可以由 `from` 赋值（from 即 to，或 from 的父类型/接口闭包包含 to）
fn is_assignable(types: &HashMap<String, TypeDescriptor>, to: &str, from: &str) -> bool {
    let mut queue = VecDeque::from([from.to_string()]);
    let mut seen = HashSet::new();
    while let Some(name) = queue.pop_front() {
        if name == to {
            return true;
        }
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(desc) = types.get(&name) {
            queue.extend(desc.parent.iter().cloned());
            queue.extend(desc.interfaces.iter().cloned());
        }
    }
    false
}

/// 规范化：沿父类型链向上替换为同签名声明（可见性变化即停止），再在接口闭包中查找
fn canonicalize(
    types: &HashMap<String, TypeDescriptor>,
    interfaces: &[String],
    declaring: &str,
    op: &OperationDef,
) -> OperationId {
    let mut root = declaring.to_string();

    let mut current = types.get(declaring).and_then(|d| d.parent.clone());
    let mut seen = HashSet::new();
    while let Some(name) = current {
        if !seen.insert(name.clone()) {
            break;
        }
        let Some(desc) = types.get(&name) else {
            break;
        };
        if let Some(decl) = desc.declared(op) {
            if decl.visibility != op.visibility {
                break;
            }
            root = name.clone();
        }
        current = desc.parent.clone();
    }

    for iface in interfaces {
        let declares = types.get(iface).and_then(|d| d.declared(op)).is_some();
        if declares && is_assignable(types, iface, &root) {
            root = iface.clone();
        }
    }

    OperationId {
        declaring_type: root,
        name: op.name.clone(),
        params: op.params.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::dispatch::descriptor::downcast_target;

    struct Widget {
        type_name: &'static str,
        label: String,
    }

    impl Dispatch for Widget {
        fn type_name(&self) -> &str {
            self.type_name
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn widget(type_name: &'static str) -> Widget {
        Widget {
            type_name,
            label: "w".to_string(),
        }
    }

    fn returns(
        tag: &'static str,
    ) -> impl Fn(&dyn Any, Vec<Value>) -> Result<Box<dyn Any + Send>, BoxError> + Send + Sync + 'static
    {
        move |_, _| Ok(Box::new(tag.to_string()))
    }

    #[test]
    fn test_zero_arg_unique() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Widget")
                .operation(OperationDef::public("label", vec![], |target, _| {
                    let w = downcast_target::<Widget>(target)?;
                    Ok(Box::new(w.label.clone()))
                }))
                .operation(OperationDef::public("label", vec![ParamType::String], returns("one"))),
        );
        let out: String = d.invoke(&widget("Widget"), "label", vec![]).unwrap();
        assert_eq!(out, "w");
    }

    #[test]
    fn test_zero_arg_none_or_ambiguous() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Widget")
                .operation(OperationDef::public("get", vec![], returns("a")))
                .operation(OperationDef::public("get", vec![], returns("b")))
                .operation(OperationDef::public("only_one_arg", vec![ParamType::Any], returns("c"))),
        );
        let w = widget("Widget");
        assert!(matches!(
            d.invoke::<String, _>(&w, "get", vec![]),
            Err(DispatchError::OperationNotFound { .. })
        ));
        assert!(matches!(
            d.invoke::<String, _>(&w, "only_one_arg", vec![]),
            Err(DispatchError::OperationNotFound { .. })
        ));
        assert!(matches!(
            d.invoke::<String, _>(&w, "missing", vec![]),
            Err(DispatchError::OperationNotFound { .. })
        ));
    }

    #[test]
    fn test_first_assignable_overload_wins() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Widget")
                .operation(OperationDef::public(
                    "f",
                    vec![ParamType::Integer, ParamType::String],
                    returns("int,string"),
                ))
                .operation(OperationDef::public(
                    "f",
                    vec![ParamType::String, ParamType::String],
                    returns("string,string"),
                )),
        );
        let w = widget("Widget");
        let out: String = d.invoke(&w, "f", vec![json!(5), json!("x")]).unwrap();
        assert_eq!(out, "int,string");
        let out: String = d.invoke(&w, "f", vec![json!("5"), json!("x")]).unwrap();
        assert_eq!(out, "string,string");
        let out: String = d.invoke(&w, "f", vec![Value::Null, json!("x")]).unwrap();
        assert_eq!(out, "int,string");
    }

    #[test]
    fn test_not_found_names_operation_kinds_and_target() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Widget")
                .operation(OperationDef::public("f", vec![ParamType::Integer], returns("x"))),
        );
        let err = d
            .invoke::<String, _>(&widget("Widget"), "f", vec![json!(true)])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("f(bool)"), "{msg}");
        assert!(msg.contains("Widget"), "{msg}");
    }

    #[test]
    fn test_integer_widens_to_float() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Widget")
                .operation(OperationDef::public("scale", vec![ParamType::Float], |_, args| {
                    Ok(Box::new(args[0].as_f64().unwrap_or_default() * 2.0))
                })),
        );
        let out: f64 = d.invoke(&widget("Widget"), "scale", vec![json!(2)]).unwrap();
        assert_eq!(out, 4.0);
    }

    #[test]
    fn test_private_operations_not_dispatched() {
        let d = Dispatcher::new();
        d.register_type(TypeDescriptor::new("Widget").operation(
            OperationDef::public("secret", vec![], returns("x")).with_visibility(Visibility::Private),
        ));
        assert!(d
            .invoke::<String, _>(&widget("Widget"), "secret", vec![])
            .is_err());
    }

    #[test]
    fn test_inherited_and_overridden_operations() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Base")
                .operation(OperationDef::public("name", vec![], returns("base")))
                .operation(OperationDef::public("kind", vec![], returns("base-kind"))),
        );
        d.register_type(
            TypeDescriptor::new("Child")
                .extends("Base")
                .operation(OperationDef::public("name", vec![], returns("child"))),
        );
        let c = widget("Child");
        let name: String = d.invoke(&c, "name", vec![]).unwrap();
        let kind: String = d.invoke(&c, "kind", vec![]).unwrap();
        assert_eq!(name, "child");
        assert_eq!(kind, "base-kind");
    }

    #[test]
    fn test_subtypes_share_canonical_id() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Greeter").operation(OperationDef::declare("greet", vec![ParamType::String])),
        );
        d.register_type(
            TypeDescriptor::new("English")
                .implements("Greeter")
                .operation(OperationDef::public("greet", vec![ParamType::String], returns("hello"))),
        );
        d.register_type(
            TypeDescriptor::new("French")
                .implements("Greeter")
                .operation(OperationDef::public("greet", vec![ParamType::String], returns("bonjour"))),
        );

        let en = d.resolve("English", "greet", &[ValueKind::String]).unwrap();
        let fr = d.resolve("French", "greet", &[ValueKind::String]).unwrap();
        assert_eq!(en.canonical, fr.canonical);
        assert_eq!(en.canonical.declaring_type, "Greeter");
        assert_ne!(en.declaring_type, fr.declaring_type);

        let out: String = d.invoke(&widget("French"), "greet", vec![json!("x")]).unwrap();
        assert_eq!(out, "bonjour");
    }

    #[test]
    fn test_canonical_walk_stops_at_visibility_change() {
        let d = Dispatcher::new();
        d.register_type(TypeDescriptor::new("Root").operation(
            OperationDef::public("run", vec![], returns("root")).with_visibility(Visibility::Protected),
        ));
        d.register_type(
            TypeDescriptor::new("Middle")
                .extends("Root")
                .operation(OperationDef::public("run", vec![], returns("middle"))),
        );
        d.register_type(
            TypeDescriptor::new("Leaf")
                .extends("Middle")
                .operation(OperationDef::public("run", vec![], returns("leaf"))),
        );
        let resolved = d.resolve("Leaf", "run", &[]).unwrap();
        assert_eq!(resolved.canonical.declaring_type, "Middle");
        assert_eq!(resolved.declaring_type, "Leaf");
    }

    #[test]
    fn test_invocation_failure_preserves_cause() {
        let d = Dispatcher::new();
        d.register_type(TypeDescriptor::new("Widget").operation(OperationDef::public(
            "boom",
            vec![],
            |_, _| Err(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"))),
        )));
        let err = d.invoke::<String, _>(&widget("Widget"), "boom", vec![]).unwrap_err();
        match err {
            DispatchError::Invocation { source, .. } => {
                assert!(source.downcast_ref::<std::io::Error>().is_some());
                assert_eq!(source.to_string(), "disk on fire");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_return_type() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Widget").operation(OperationDef::public("label", vec![], returns("x"))),
        );
        assert!(matches!(
            d.invoke::<u64, _>(&widget("Widget"), "label", vec![]),
            Err(DispatchError::ReturnType { .. })
        ));
    }

    #[test]
    fn test_unknown_type() {
        let d = Dispatcher::new();
        assert!(matches!(
            d.invoke::<String, _>(&widget("Nope"), "x", vec![]),
            Err(DispatchError::UnknownType(_))
        ));
    }

    #[test]
    fn test_tables_built_at_registration() {
        let d = Dispatcher::new();
        d.register_type(
            TypeDescriptor::new("Child")
                .extends("Base")
                .operation(OperationDef::public("name", vec![], returns("child"))),
        );
        // 父类型未登记，暂不建表
        assert!(!d.tables.read().unwrap().contains_key("Child"));

        d.register_type(
            TypeDescriptor::new("Base").operation(OperationDef::public("name", vec![], returns("base"))),
        );
        let tables = d.tables.read().unwrap();
        let child = tables.get("Child").expect("child table built");
        assert_eq!(child.entries.len(), 1);
        assert_eq!(child.entries[0].resolved.canonical.declaring_type, "Base");
        assert!(tables.contains_key("Base"));
    }

    #[test]
    fn test_resolution_is_memoized() {
        let d = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        d.register_type(TypeDescriptor::new("Widget").operation(OperationDef::public(
            "tick",
            vec![ParamType::Integer],
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(()))
            },
        )));
        let a = d.resolve("Widget", "tick", &[ValueKind::Integer]).unwrap();
        let b = d.resolve("Widget", "tick", &[ValueKind::Integer]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        d.invoke::<(), _>(&widget("Widget"), "tick", vec![json!(1)]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
