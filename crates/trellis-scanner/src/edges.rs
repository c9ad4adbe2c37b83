//! Per-file call, import, and export detection
//!
//! Runs over the same tree the element extractor uses and emits the three
//! edge streams the graph builder consumes. Caller attribution climbs the
//! enclosing declarations: the nearest named function, bound arrow, or
//! method, plus its enclosing class when there is one.

use tree_sitter::{Node, Tree};
use trellis_core::model::{
    CallInfo, CallType, ExportInfo, ImportInfo, ModuleSystem, NAMESPACE_SPECIFIER,
};

use crate::ast;

/// The three streams extracted from one file.
#[derive(Debug, Clone, Default)]
pub struct EdgeStreams {
    pub calls: Vec<CallInfo>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
}

pub fn extract_edges(tree: &Tree, source: &str) -> EdgeStreams {
    let mut streams = EdgeStreams::default();
    walk(tree.root_node(), source, &mut streams);
    streams
}

fn walk(node: Node, source: &str, streams: &mut EdgeStreams) {
    match node.kind() {
        "call_expression" => visit_call(node, source, streams),
        "new_expression" => visit_new(node, source, streams),
        "import_statement" => visit_import(node, source, streams),
        "export_statement" => visit_export(node, source, streams),
        "assignment_expression" => visit_commonjs_export(node, source, streams),
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, streams);
    }
}

fn visit_call(node: Node, source: &str, streams: &mut EdgeStreams) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };

    match function.kind() {
        "identifier" => {
            let name = ast::text(function, source);
            // `require` is module plumbing, not a call edge.
            if name == "require" {
                if let Some(source_module) = require_argument(node, source) {
                    streams.imports.push(ImportInfo {
                        source: source_module,
                        specifiers: vec![NAMESPACE_SPECIFIER.to_string()],
                        is_default: false,
                        import_type: ModuleSystem::CommonJs,
                    });
                }
                return;
            }
            let (caller_function, caller_class) = attribute_caller(node, source);
            streams.calls.push(CallInfo {
                callee_function: name,
                callee_object: None,
                call_type: CallType::Function,
                caller_function,
                caller_class,
                line: ast::line(node),
            });
        }
        "member_expression" => {
            let Some(property) = ast::field_text(function, "property", source) else {
                return;
            };
            let object = function
                .child_by_field_name("object")
                .map(|o| ast::text(o, source));
            let (caller_function, caller_class) = attribute_caller(node, source);
            streams.calls.push(CallInfo {
                callee_function: property,
                callee_object: object,
                call_type: CallType::Method,
                caller_function,
                caller_class,
                line: ast::line(node),
            });
        }
        _ => {}
    }
}

fn visit_new(node: Node, source: &str, streams: &mut EdgeStreams) {
    let Some(constructor) = node.child_by_field_name("constructor") else {
        return;
    };
    let (callee_function, callee_object) = match constructor.kind() {
        "member_expression" => {
            let Some(property) = ast::field_text(constructor, "property", source) else {
                return;
            };
            let object = constructor
                .child_by_field_name("object")
                .map(|o| ast::text(o, source));
            (property, object)
        }
        _ => (ast::text(constructor, source), None),
    };
    let (caller_function, caller_class) = attribute_caller(node, source);
    streams.calls.push(CallInfo {
        callee_function,
        callee_object,
        call_type: CallType::Constructor,
        caller_function,
        caller_class,
        line: ast::line(node),
    });
}

fn require_argument(call: Node, source: &str) -> Option<String> {
    let arguments = call.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    for child in arguments.named_children(&mut cursor) {
        if child.kind() == "string" {
            return Some(unquote(&ast::text(child, source)));
        }
    }
    None
}

fn visit_import(node: Node, source: &str, streams: &mut EdgeStreams) {
    let Some(source_module) = ast::field_text(node, "source", source) else {
        return;
    };
    let mut specifiers = Vec::new();
    let mut is_default = false;

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "import_clause" {
            continue;
        }
        let mut clause_cursor = child.walk();
        for part in child.named_children(&mut clause_cursor) {
            match part.kind() {
                "identifier" => {
                    is_default = true;
                    specifiers.push(ast::text(part, source));
                }
                "namespace_import" => {
                    specifiers.push(NAMESPACE_SPECIFIER.to_string());
                }
                "named_imports" => {
                    let mut name_cursor = part.walk();
                    for specifier in part.named_children(&mut name_cursor) {
                        if specifier.kind() == "import_specifier" {
                            // The local binding is the alias when present.
                            let local = ast::field_text(specifier, "alias", source)
                                .or_else(|| ast::field_text(specifier, "name", source));
                            if let Some(local) = local {
                                specifiers.push(local);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    streams.imports.push(ImportInfo {
        source: unquote(&source_module),
        specifiers,
        is_default,
        import_type: ModuleSystem::Esm,
    });
}

fn visit_export(node: Node, source: &str, streams: &mut EdgeStreams) {
    let mut specifiers = Vec::new();
    let mut is_default = false;

    if let Some(declaration) = node.child_by_field_name("declaration") {
        collect_declaration_names(declaration, source, &mut specifiers);
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "default" => is_default = true,
            "identifier" => specifiers.push(ast::text(child, source)),
            "export_clause" => {
                let mut spec_cursor = child.walk();
                for specifier in child.named_children(&mut spec_cursor) {
                    if specifier.kind() == "export_specifier" {
                        // The public surface name is the alias when present.
                        let name = ast::field_text(specifier, "alias", source)
                            .or_else(|| ast::field_text(specifier, "name", source));
                        if let Some(name) = name {
                            specifiers.push(name);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    streams.exports.push(ExportInfo {
        specifiers,
        is_default,
        export_type: ModuleSystem::Esm,
    });
}

fn collect_declaration_names(declaration: Node, source: &str, out: &mut Vec<String>) {
    match declaration.kind() {
        "function_declaration"
        | "generator_function_declaration"
        | "function_signature"
        | "class_declaration"
        | "abstract_class_declaration"
        | "interface_declaration"
        | "enum_declaration"
        | "type_alias_declaration" => {
            if let Some(name) = ast::field_text(declaration, "name", source) {
                out.push(name);
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = declaration.walk();
            for declarator in declaration.named_children(&mut cursor) {
                if declarator.kind() == "variable_declarator" {
                    if let Some(pattern) = declarator.child_by_field_name("name") {
                        ast::collect_bound_identifiers(pattern, source, out);
                    }
                }
            }
        }
        _ => {}
    }
}

fn visit_commonjs_export(node: Node, source: &str, streams: &mut EdgeStreams) {
    let Some(left) = node.child_by_field_name("left") else {
        return;
    };
    if left.kind() != "member_expression" {
        return;
    }
    let left_text = ast::text(left, source);

    if left_text == "module.exports" {
        let mut specifiers = Vec::new();
        if let Some(right) = node.child_by_field_name("right") {
            match right.kind() {
                "identifier" => specifiers.push(ast::text(right, source)),
                "object" => {
                    let mut cursor = right.walk();
                    for member in right.named_children(&mut cursor) {
                        match member.kind() {
                            "shorthand_property_identifier" => {
                                specifiers.push(ast::text(member, source));
                            }
                            "pair" => {
                                if let Some(key) = ast::field_text(member, "key", source) {
                                    specifiers.push(key);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        streams.exports.push(ExportInfo {
            specifiers,
            is_default: true,
            export_type: ModuleSystem::CommonJs,
        });
        return;
    }

    let object_text = ast::field_text(left, "object", source).unwrap_or_default();
    if object_text == "exports" || object_text == "module.exports" {
        if let Some(property) = ast::field_text(left, "property", source) {
            streams.exports.push(ExportInfo {
                specifiers: vec![property],
                is_default: false,
                export_type: ModuleSystem::CommonJs,
            });
        }
    }
}

/// Nearest enclosing named function / bound arrow / method, plus its class.
fn attribute_caller(node: Node, source: &str) -> (Option<String>, Option<String>) {
    let mut current = node;
    while let Some(parent) = current.parent() {
        match parent.kind() {
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = ast::field_text(parent, "name", source) {
                    return (Some(name), enclosing_class(parent, source));
                }
            }
            "method_definition" => {
                if let Some(name) = parent.child_by_field_name("name") {
                    if matches!(
                        name.kind(),
                        "property_identifier" | "private_property_identifier"
                    ) {
                        return (
                            Some(ast::text(name, source)),
                            enclosing_class(parent, source),
                        );
                    }
                }
            }
            "arrow_function" | "function_expression" | "function" => {
                // Only a bound arrow/function has an attributable name;
                // anonymous callbacks fall through to their enclosure.
                if let Some(grandparent) = parent.parent() {
                    match grandparent.kind() {
                        "variable_declarator" => {
                            if let Some(name_node) = grandparent.child_by_field_name("name") {
                                if name_node.kind() == "identifier" {
                                    return (
                                        Some(ast::text(name_node, source)),
                                        enclosing_class(grandparent, source),
                                    );
                                }
                            }
                        }
                        "public_field_definition" | "field_definition" => {
                            if let Some(name) = ast::field_text(grandparent, "name", source) {
                                return (Some(name), enclosing_class(grandparent, source));
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        current = parent;
    }
    (None, None)
}

fn enclosing_class(node: Node, source: &str) -> Option<String> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        if matches!(
            parent.kind(),
            "class_declaration" | "abstract_class_declaration" | "class"
        ) {
            return ast::field_text(parent, "name", source);
        }
        current = parent;
    }
    None
}

fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::SourceLanguage;

    fn streams(source: &str, language: SourceLanguage) -> EdgeStreams {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&language.grammar().expect("grammar"))
            .expect("set_language");
        let tree = parser.parse(source, None).expect("parse");
        extract_edges(&tree, source)
    }

    fn ts(source: &str) -> EdgeStreams {
        streams(source, SourceLanguage::Ts)
    }

    #[test]
    fn function_call_with_caller_attribution() {
        let s = ts("function caller() { helper(1); }");
        assert_eq!(s.calls.len(), 1);
        let call = &s.calls[0];
        assert_eq!(call.callee_function, "helper");
        assert_eq!(call.call_type, CallType::Function);
        assert_eq!(call.caller_function.as_deref(), Some("caller"));
        assert!(call.caller_class.is_none());
    }

    #[test]
    fn method_call_records_receiver() {
        let s = ts("class Svc { run() { this.helper(); } helper() { super.init(); } }");
        let this_call = s.calls.iter().find(|c| c.callee_function == "helper").unwrap();
        assert_eq!(this_call.call_type, CallType::Method);
        assert_eq!(this_call.callee_object.as_deref(), Some("this"));
        assert_eq!(this_call.caller_function.as_deref(), Some("run"));
        assert_eq!(this_call.caller_class.as_deref(), Some("Svc"));

        let super_call = s.calls.iter().find(|c| c.callee_function == "init").unwrap();
        assert_eq!(super_call.callee_object.as_deref(), Some("super"));
    }

    #[test]
    fn constructor_calls_are_new_expressions() {
        let s = ts("function build() { return new Widget(1); }");
        let call = &s.calls[0];
        assert_eq!(call.call_type, CallType::Constructor);
        assert_eq!(call.callee_function, "Widget");
    }

    #[test]
    fn bound_arrow_attributes_to_binding() {
        let s = ts("const worker = () => { helper(); };");
        assert_eq!(s.calls[0].caller_function.as_deref(), Some("worker"));
    }

    #[test]
    fn anonymous_callback_attributes_to_enclosure() {
        let s = ts("function outer(xs) { xs.map(x => inner(x)); }");
        let call = s.calls.iter().find(|c| c.callee_function == "inner").unwrap();
        assert_eq!(call.caller_function.as_deref(), Some("outer"));
    }

    #[test]
    fn top_level_call_has_no_caller() {
        let s = ts("boot();");
        assert!(s.calls[0].caller_function.is_none());
    }

    #[test]
    fn esm_import_variants() {
        let s = ts(r#"
import def from './a';
import { one, two as alias } from './b';
import * as ns from './c';
"#);
        assert_eq!(s.imports.len(), 3);
        assert!(s.imports[0].is_default);
        assert_eq!(s.imports[0].specifiers, vec!["def"]);
        assert_eq!(s.imports[0].source, "./a");
        assert_eq!(s.imports[1].specifiers, vec!["one", "alias"]);
        assert!(!s.imports[1].is_default);
        assert_eq!(s.imports[2].specifiers, vec![NAMESPACE_SPECIFIER]);
        assert!(s.imports.iter().all(|i| i.import_type == ModuleSystem::Esm));
    }

    #[test]
    fn require_is_a_commonjs_import_not_a_call() {
        let s = streams("const fs = require('fs');", SourceLanguage::Js);
        assert!(s.calls.is_empty());
        assert_eq!(s.imports.len(), 1);
        assert_eq!(s.imports[0].source, "fs");
        assert_eq!(s.imports[0].specifiers, vec![NAMESPACE_SPECIFIER]);
        assert_eq!(s.imports[0].import_type, ModuleSystem::CommonJs);
    }

    #[test]
    fn esm_export_forms() {
        let s = ts(r#"
export function visible() {}
export { a, b as renamed };
export default visible;
"#);
        assert_eq!(s.exports.len(), 3);
        assert_eq!(s.exports[0].specifiers, vec!["visible"]);
        assert_eq!(s.exports[1].specifiers, vec!["a", "renamed"]);
        assert!(s.exports[2].is_default);
        assert_eq!(s.exports[2].specifiers, vec!["visible"]);
    }

    #[test]
    fn commonjs_export_forms() {
        let s = streams(
            "module.exports = { alpha, beta: impl };\nexports.gamma = gammaImpl;",
            SourceLanguage::Js,
        );
        assert_eq!(s.exports.len(), 2);
        assert!(s.exports[0].is_default);
        assert_eq!(s.exports[0].specifiers, vec!["alpha", "beta"]);
        assert_eq!(s.exports[0].export_type, ModuleSystem::CommonJs);
        assert!(!s.exports[1].is_default);
        assert_eq!(s.exports[1].specifiers, vec!["gamma"]);
    }
}
