//! 参数模板：将 `{$Context.key}` 占位符替换为上下文中的值

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::context::ContextStore;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\$([A-Za-z0-9_\-]+)\.([A-Za-z0-9_\-]+)\}").expect("valid placeholder regex")
    })
}

/// 无法解析的占位符（原样返回，例如 `{$Test.key}`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedPlaceholder(pub String);

/// 值在模板中的文本形式：字符串不带引号，其余按 JSON 输出
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 是否包含占位符
pub fn has_placeholders(template: &str) -> bool {
    placeholder_regex().is_match(template)
}

/// 替换模板中的全部占位符；任一占位符无法解析时返回第一个失败的占位符
pub fn resolve_template(store: &ContextStore, template: &str) -> Result<String, UnresolvedPlaceholder> {
    let re = placeholder_regex();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let whole = caps.get(0).map(|m| (m.start(), m.end(), m.as_str()));
        let (start, end, raw) = match whole {
            Some(w) => w,
            None => continue,
        };
        let context = &caps[1];
        let key = &caps[2];
        let value = store
            .get_value(context, key)
            .ok_or_else(|| UnresolvedPlaceholder(raw.to_string()))?;
        out.push_str(&template[last..start]);
        out.push_str(&value_to_text(value));
        last = end;
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_single_placeholder() {
        let mut store = ContextStore::new(5);
        store.set_value_with_ttl("Test", 5, "key", "value");
        assert_eq!(resolve_template(&store, "hi {$Test.key}").unwrap(), "hi value");
    }

    #[test]
    fn test_resolve_several_and_non_string_values() {
        let mut store = ContextStore::new(5);
        store.set_value("User", "name", "Ada");
        store.set_value("User", "age", 36);
        assert_eq!(
            resolve_template(&store, "{$User.name} is {$User.age}").unwrap(),
            "Ada is 36"
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        let store = ContextStore::new(5);
        assert_eq!(resolve_template(&store, "no variables {here}").unwrap(), "no variables {here}");
        assert!(!has_placeholders("no variables {here}"));
    }

    #[test]
    fn test_unresolved_placeholder_reported() {
        let store = ContextStore::new(5);
        let err = resolve_template(&store, "hi {$Test.key}").unwrap_err();
        assert_eq!(err, UnresolvedPlaceholder("{$Test.key}".to_string()));
    }

    #[test]
    fn test_expired_value_is_unresolved() {
        let mut store = ContextStore::new(1);
        store.set_value("Test", "key", "value");
        store.next_turn();
        store.next_turn();
        assert!(resolve_template(&store, "{$Test.key}").is_err());
    }
}
