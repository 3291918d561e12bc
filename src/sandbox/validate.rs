//! Pre-execution code validation.
//!
//! Every snippet is screened against a deny-list before it reaches the
//! interpreter. A match is a non-fatal result: the agent engine
//! observes the violation string and may try again with different
//! code.

use std::sync::LazyLock;

use regex::Regex;

/// One deny-list entry: the pattern and the violation label reported
/// back to the model.
struct DenyRule {
    pattern: Regex,
    label: &'static str,
}

#[allow(clippy::unwrap_used)]
fn deny(pattern: &str, label: &'static str) -> DenyRule {
    DenyRule {
        pattern: Regex::new(pattern).unwrap(),
        label,
    }
}

static DENY_LIST: LazyLock<Vec<DenyRule>> = LazyLock::new(|| {
    vec![
        // Module loading and dynamic import
        deny(r"\brequire\s*\(", "module loading via require()"),
        deny(r"\bimport\s*\(", "dynamic import()"),
        deny(r"(?m)^\s*import\s", "module import"),
        // Code generation
        deny(r"\beval\s*\(", "eval()"),
        deny(r"\bnew\s+Function\b|\bFunction\s*\(", "Function constructor"),
        // Host runtime access
        deny(r"\bprocess\b", "process access"),
        deny(r"\bglobalThis\b", "globalThis access"),
        deny(r"\bglobal\b", "global access"),
        // Filesystem and subprocess identifiers
        deny(r"\bchild_process\b", "child_process access"),
        deny(r"\bfs\s*\.", "filesystem access"),
        deny(r#"['"]fs['"]"#, "filesystem module"),
        deny(r"\bexecSync\b|\bspawnSync\b|\bexec\s*\(|\bspawn\s*\(", "subprocess invocation"),
        // Timers
        deny(r"\bsetTimeout\b", "setTimeout"),
        deny(r"\bsetInterval\b", "setInterval"),
        deny(r"\bsetImmediate\b", "setImmediate"),
        // Buffers
        deny(r"\bBuffer\b", "Buffer constructor"),
        // Prototype / reflection mutation
        deny(r"\b__proto__\b", "__proto__ access"),
        deny(r"\bprototype\b", "prototype mutation"),
        deny(r"\bconstructor\s*\[|\bconstructor\s*\(", "constructor invocation"),
        deny(r"\bReflect\s*\.\s*set\b", "Reflect.set"),
        deny(r"\bnew\s+Proxy\b", "new Proxy"),
        deny(r"\bObject\s*\.\s*(defineProperty|setPrototypeOf)\b", "object meta-mutation"),
        // Node environment leakage
        deny(r"\b__dirname\b", "__dirname access"),
        deny(r"\b__filename\b", "__filename access"),
        deny(r"\bmodule\s*\.", "module access"),
        deny(r"\bexports\b", "exports access"),
    ]
});

/// Screens `code` against the deny-list.
///
/// Returns one violation string per matched rule; an empty list means
/// the code may proceed to the interpreter.
#[must_use]
pub fn validate_code(code: &str) -> Vec<String> {
    DENY_LIST
        .iter()
        .filter(|rule| rule.pattern.is_match(code))
        .map(|rule| rule.label.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("require('fs')"; "require")]
    #[test_case("const m = await import('path')"; "dynamic import")]
    #[test_case("import fs from 'fs'"; "static import")]
    #[test_case("eval('1+1')"; "eval")]
    #[test_case("new Function('return 1')()"; "function constructor")]
    #[test_case("process.env.HOME"; "process")]
    #[test_case("globalThis.x = 1"; "globalThis")]
    #[test_case("global.leak = true"; "global")]
    #[test_case("child_process.execSync('ls')"; "child process")]
    #[test_case("fs.readFileSync('/etc/passwd')"; "fs call")]
    #[test_case("setTimeout(cb, 0)"; "setTimeout")]
    #[test_case("setInterval(cb, 1)"; "setInterval")]
    #[test_case("setImmediate(cb)"; "setImmediate")]
    #[test_case("Buffer.alloc(10)"; "buffer")]
    #[test_case("x.__proto__.polluted = 1"; "proto")]
    #[test_case("Array.prototype.push = nop"; "prototype")]
    #[test_case("Reflect.set(obj, 'k', 1)"; "reflect set")]
    #[test_case("new Proxy({}, {})"; "proxy")]
    #[test_case("__dirname + '/x'"; "dirname")]
    #[test_case("__filename"; "filename")]
    #[test_case("module.exports = {}"; "module")]
    #[test_case("exports.thing = 1"; "exports")]
    #[test_case("Object.defineProperty(o, 'x', {})"; "defineProperty")]
    fn test_deny_list_rejects(code: &str) {
        let violations = validate_code(code);
        assert!(!violations.is_empty(), "expected violation for {code:?}");
    }

    #[test_case("return ctx.length()"; "query call")]
    #[test_case("let n = ctx.grep('TODO')"; "grep")]
    #[test_case("const s = ctx.slice(0, 100); print(s)"; "slice and print")]
    #[test_case("JSON.stringify(ctx.getOutline())"; "json stringify")]
    #[test_case("Math.min(1, 2)"; "math")]
    fn test_deny_list_allows(code: &str) {
        let violations = validate_code(code);
        assert!(violations.is_empty(), "unexpected violations {violations:?} for {code:?}");
    }

    #[test]
    fn test_multiple_violations_reported() {
        let violations = validate_code("require('fs'); process.exit(1)");
        assert!(violations.len() >= 2);
        assert!(violations.iter().any(|v| v.contains("require")));
        assert!(violations.iter().any(|v| v.contains("process")));
    }
}
