/// Language detection for snippets without a hint
///
/// Ordered substring rules; the first match wins and Python is the
/// fallback, so detection never fails.
use crate::config::types::Language;

/// Infer the language of `code`.
pub fn detect(code: &str) -> Language {
    if code.contains("<?php") {
        return Language::Php;
    }

    if code.contains("public static void main") || code.contains("System.out.") {
        return Language::Java;
    }

    // C snippets land here too and compile fine as C++.
    if code.contains("#include")
        || code.contains("std::")
        || code.contains("printf(")
        || code.contains("cout <<")
    {
        return Language::Cpp;
    }

    if looks_like_javascript(code) {
        return Language::Javascript;
    }

    Language::Python
}

fn looks_like_javascript(code: &str) -> bool {
    code.contains("console.log")
        || code.contains("require(")
        || code.contains("function ")
        || (code.contains("=>") && (code.contains("const ") || code.contains("let ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn php_prologue() {
        assert_eq!(detect("<?php echo 'hi';"), Language::Php);
    }

    #[test]
    fn java_markers() {
        let code = "public class Main { public static void main(String[] a) { System.out.println(1); } }";
        assert_eq!(detect(code), Language::Java);
        assert_eq!(detect("System.out.println(2);"), Language::Java);
    }

    #[test]
    fn c_family_markers() {
        assert_eq!(detect("#include <stdio.h>\nint main(){}"), Language::Cpp);
        assert_eq!(detect("std::vector<int> v;"), Language::Cpp);
        assert_eq!(detect("printf(\"%d\", 1);"), Language::Cpp);
        assert_eq!(detect("cout << 1;"), Language::Cpp);
    }

    #[test]
    fn javascript_markers() {
        assert_eq!(detect("console.log('x')"), Language::Javascript);
        assert_eq!(detect("const fs = require('fs')"), Language::Javascript);
        assert_eq!(detect("const f = (x) => x * 2"), Language::Javascript);
        assert_eq!(detect("function add(a, b) { return a + b }"), Language::Javascript);
    }

    #[test]
    fn arrow_without_binding_is_not_javascript() {
        assert_eq!(detect("x => y"), Language::Python);
    }

    #[test]
    fn earlier_rule_wins() {
        // Java mentioning a C-style call is still Java.
        assert_eq!(
            detect("public static void main(String[] a) { printf(\"x\"); }"),
            Language::Java
        );
        // PHP with a JS-looking function keyword is still PHP.
        assert_eq!(detect("<?php function f() {}"), Language::Php);
    }

    #[test]
    fn fallback_is_python() {
        assert_eq!(detect("print('hello')"), Language::Python);
        assert_eq!(detect(""), Language::Python);
        assert_eq!(detect("   \n\t"), Language::Python);
    }
}
