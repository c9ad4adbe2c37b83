//! AST element extraction
//!
//! Walks a parsed tree and emits the elements declared in the file, in
//! source order, with `exported` resolved against an export table built in
//! a pre-pass. Extraction is syntax-driven throughout: control-flow
//! keywords can never surface as element names, and methods are only
//! reported for syntactic class-body members.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::{Node, Tree};
use trellis_core::model::{Element, ElementKind, Parameter};

use crate::ast;

static HOOK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^use[A-Z]").unwrap());

/// Extract all elements of one file. `jsx` enables component
/// classification for the JSX-flavored extensions.
pub fn extract_elements(tree: &Tree, source: &str, file: &str, jsx: bool) -> Vec<Element> {
    let exports = ExportTable::build(tree.root_node(), source);
    let mut collector = ElementCollector {
        source,
        file,
        jsx,
        exports,
        elements: Vec::new(),
    };
    collector.walk(tree.root_node(), None);
    collector.elements
}

/// Names reachable through any export path of the file.
pub struct ExportTable {
    names: HashSet<String>,
}

impl ExportTable {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Single pass over the tree collecting every exported binding name:
    /// direct export markers, export lists, default-exported identifiers,
    /// and the commonjs `module.exports` / `exports.x` forms.
    pub fn build(root: Node, source: &str) -> Self {
        let mut names = HashSet::new();
        collect_exports(root, source, &mut names);
        ExportTable { names }
    }
}

fn collect_exports(node: Node, source: &str, names: &mut HashSet<String>) {
    match node.kind() {
        "export_statement" => {
            if let Some(declaration) = node.child_by_field_name("declaration") {
                collect_declared_names(declaration, source, names);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "export_clause" => {
                        let mut spec_cursor = child.walk();
                        for specifier in child.named_children(&mut spec_cursor) {
                            if specifier.kind() == "export_specifier" {
                                if let Some(name) = ast::field_text(specifier, "name", source) {
                                    names.insert(name);
                                }
                            }
                        }
                    }
                    // `export default someIdentifier`
                    "identifier" => {
                        names.insert(ast::text(child, source));
                    }
                    _ => {}
                }
            }
        }
        "assignment_expression" => {
            collect_commonjs_exports(node, source, names);
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_exports(child, source, names);
    }
}

/// Names declared by a statement nested under an export marker.
fn collect_declared_names(declaration: Node, source: &str, names: &mut HashSet<String>) {
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
                names.insert(name);
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = declaration.walk();
            for declarator in declaration.named_children(&mut cursor) {
                if declarator.kind() == "variable_declarator" {
                    if let Some(pattern) = declarator.child_by_field_name("name") {
                        let mut bound = Vec::new();
                        ast::collect_bound_identifiers(pattern, source, &mut bound);
                        names.extend(bound);
                    }
                }
            }
        }
        _ => {}
    }
}

fn collect_commonjs_exports(node: Node, source: &str, names: &mut HashSet<String>) {
    let Some(left) = node.child_by_field_name("left") else {
        return;
    };
    if left.kind() != "member_expression" {
        return;
    }
    let left_text = ast::text(left, source);
    let right = node.child_by_field_name("right");

    if left_text == "module.exports" {
        if let Some(right) = right {
            match right.kind() {
                "identifier" => {
                    names.insert(ast::text(right, source));
                }
                "object" => {
                    let mut cursor = right.walk();
                    for member in right.named_children(&mut cursor) {
                        match member.kind() {
                            "shorthand_property_identifier" => {
                                names.insert(ast::text(member, source));
                            }
                            "pair" => {
                                if let Some(value) = member.child_by_field_name("value") {
                                    if value.kind() == "identifier" {
                                        names.insert(ast::text(value, source));
                                    }
                                }
                                if let Some(key) = member.child_by_field_name("key") {
                                    names.insert(ast::text(key, source));
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        return;
    }

    // `exports.foo = ...` and `module.exports.foo = ...`
    let object_text = ast::field_text(left, "object", source).unwrap_or_default();
    if object_text == "exports" || object_text == "module.exports" {
        if let Some(property) = ast::field_text(left, "property", source) {
            names.insert(property);
        }
        if let Some(right) = right {
            if right.kind() == "identifier" {
                names.insert(ast::text(right, source));
            }
        }
    }
}

struct ElementCollector<'a> {
    source: &'a str,
    file: &'a str,
    jsx: bool,
    exports: ExportTable,
    elements: Vec<Element>,
}

impl<'a> ElementCollector<'a> {
    /// Recursive walk. `class_name` is set while inside a class body so
    /// methods get qualified names; everything else ignores it.
    fn walk(&mut self, node: Node, class_name: Option<&str>) {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                if let Some(name) = ast::field_text(node, "name", self.source) {
                    self.push_function(node, name);
                }
            }
            "class_declaration" | "abstract_class_declaration" => {
                if let Some(name) = ast::field_text(node, "name", self.source) {
                    let exported = self.exports.contains(&name);
                    self.push_element(ElementKind::Class, name.clone(), node, exported, Vec::new(), None);
                    if let Some(body) = node.child_by_field_name("body") {
                        let mut cursor = body.walk();
                        for member in body.named_children(&mut cursor) {
                            self.walk(member, Some(&name));
                        }
                    }
                    return;
                }
            }
            "method_definition" => {
                // Only syntactic class-body members count as methods;
                // object-literal methods share the node kind but not the
                // parent.
                let in_class_body = node.parent().is_some_and(|p| p.kind() == "class_body");
                if let (true, Some(class)) = (in_class_body, class_name) {
                    if let Some(method) = self.method_name(node) {
                        let qualified = format!("{class}.{method}");
                        let exported = self.exports.contains(class);
                        let parameters = self.parameters_of(node);
                        let complexity = Some(cyclomatic(node, self.source));
                        self.push_element(
                            ElementKind::Method,
                            qualified,
                            node,
                            exported,
                            parameters,
                            complexity,
                        );
                    }
                }
            }
            "public_field_definition" | "field_definition" => {
                // A field holding a function value is a method in all but
                // syntax.
                if let Some(class) = class_name {
                    if let Some(value) = node.child_by_field_name("value") {
                        if ast::is_function_value(value.kind()) {
                            if let Some(field) = self.property_name(node) {
                                let qualified = format!("{class}.{field}");
                                let exported = self.exports.contains(class);
                                let parameters = self.parameters_of(value);
                                let complexity = Some(cyclomatic(value, self.source));
                                self.push_element(
                                    ElementKind::Method,
                                    qualified,
                                    node,
                                    exported,
                                    parameters,
                                    complexity,
                                );
                            }
                        }
                    }
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = node.walk();
                for declarator in node.named_children(&mut cursor) {
                    if declarator.kind() == "variable_declarator" {
                        self.visit_declarator(declarator);
                    }
                }
            }
            "interface_declaration" => {
                if let Some(name) = ast::field_text(node, "name", self.source) {
                    let exported = self.exports.contains(&name);
                    self.push_element(ElementKind::Interface, name, node, exported, Vec::new(), None);
                }
                return; // interface members are not elements
            }
            "enum_declaration" => {
                if let Some(name) = ast::field_text(node, "name", self.source) {
                    let exported = self.exports.contains(&name);
                    self.push_element(ElementKind::Enum, name, node, exported, Vec::new(), None);
                }
                return;
            }
            "type_alias_declaration" => {
                if let Some(name) = ast::field_text(node, "name", self.source) {
                    let exported = self.exports.contains(&name);
                    self.push_element(ElementKind::TypeAlias, name, node, exported, Vec::new(), None);
                }
                return;
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, class_name);
        }
    }

    /// A variable binding whose initializer is a function expression or
    /// arrow is a function element named after the binding; an ALL_CAPS
    /// binding with a non-function initializer is a constant.
    fn visit_declarator(&mut self, declarator: Node) {
        let Some(name_node) = declarator.child_by_field_name("name") else {
            return;
        };
        if name_node.kind() != "identifier" {
            return;
        }
        let name = ast::text(name_node, self.source);
        let value = declarator.child_by_field_name("value");

        match value {
            Some(value) if ast::is_function_value(value.kind()) => {
                let kind = self.classify_function(&name);
                let exported = self.exports.contains(&name);
                let parameters = self.parameters_of(value);
                let complexity = Some(cyclomatic(value, self.source));
                self.push_element(kind, name, declarator, exported, parameters, complexity);
            }
            _ => {
                if is_constant_name(&name) {
                    let exported = self.exports.contains(&name);
                    self.push_element(ElementKind::Constant, name, declarator, exported, Vec::new(), None);
                }
            }
        }
    }

    fn push_function(&mut self, node: Node, name: String) {
        let kind = self.classify_function(&name);
        let exported = self.exports.contains(&name);
        let parameters = self.parameters_of(node);
        let complexity = Some(cyclomatic(node, self.source));
        self.push_element(kind, name, node, exported, parameters, complexity);
    }

    fn classify_function(&self, name: &str) -> ElementKind {
        if HOOK_RE.is_match(name) {
            ElementKind::Hook
        } else if self.jsx && is_pascal_case(name) {
            ElementKind::Component
        } else {
            ElementKind::Function
        }
    }

    fn method_name(&self, node: Node) -> Option<String> {
        let name = node.child_by_field_name("name")?;
        match name.kind() {
            "property_identifier" | "private_property_identifier" => {
                Some(ast::text(name, self.source))
            }
            // Computed names are not stable identifiers.
            _ => None,
        }
    }

    fn property_name(&self, node: Node) -> Option<String> {
        let name = node.child_by_field_name("name")?;
        matches!(
            name.kind(),
            "property_identifier" | "private_property_identifier"
        )
        .then(|| ast::text(name, self.source))
    }

    /// Ordered parameters of a function-shaped node, with default/rest/
    /// destructuring flags. Destructured parameters record the identifiers
    /// they bind.
    fn parameters_of(&self, func: Node) -> Vec<Parameter> {
        let Some(params) = func
            .child_by_field_name("parameters")
            .or_else(|| func.child_by_field_name("parameter"))
        else {
            return Vec::new();
        };

        // A bare arrow parameter has no surrounding formal_parameters.
        if params.kind() == "identifier" {
            return vec![Parameter::plain(ast::text(params, self.source))];
        }

        let mut out = Vec::new();
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            let (pattern, has_default) = match child.kind() {
                // TS wraps each parameter; the default value is its field.
                "required_parameter" | "optional_parameter" => {
                    let Some(pattern) = child.child_by_field_name("pattern") else {
                        continue;
                    };
                    (pattern, child.child_by_field_name("value").is_some())
                }
                _ => (child, false),
            };
            if let Some(parameter) = self.parameter_from_pattern(pattern, has_default) {
                out.push(parameter);
            }
        }
        out
    }

    fn parameter_from_pattern(&self, pattern: Node, has_default: bool) -> Option<Parameter> {
        match pattern.kind() {
            "identifier" => Some(Parameter {
                name: ast::text(pattern, self.source),
                has_default,
                is_rest: false,
                is_destructured: false,
            }),
            "assignment_pattern" => {
                let left = pattern.child_by_field_name("left")?;
                let mut parameter = self.parameter_from_pattern(left, true)?;
                parameter.has_default = true;
                Some(parameter)
            }
            "rest_pattern" => {
                let mut bound = Vec::new();
                ast::collect_bound_identifiers(pattern, self.source, &mut bound);
                (!bound.is_empty()).then(|| Parameter {
                    is_destructured: bound.len() > 1,
                    name: bound.join(","),
                    has_default,
                    is_rest: true,
                })
            }
            "object_pattern" | "array_pattern" => {
                let mut bound = Vec::new();
                ast::collect_bound_identifiers(pattern, self.source, &mut bound);
                (!bound.is_empty()).then(|| Parameter {
                    name: bound.join(","),
                    has_default,
                    is_rest: false,
                    is_destructured: true,
                })
            }
            "this" => None,
            _ => None,
        }
    }

    fn push_element(
        &mut self,
        kind: ElementKind,
        name: String,
        node: Node,
        exported: bool,
        parameters: Vec<Parameter>,
        complexity: Option<f32>,
    ) {
        self.elements.push(Element {
            kind,
            name,
            file: self.file.to_string(),
            line: ast::line(node),
            exported,
            parameters,
            calls: Vec::new(),
            complexity,
        });
    }
}

fn is_pascal_case(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_uppercase()
        && name.chars().any(|c| c.is_ascii_lowercase())
        && !name.contains('_')
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Cyclomatic complexity: 1 + decision points in the subtree.
pub fn cyclomatic(node: Node, source: &str) -> f32 {
    1.0 + count_decision_points(node, source) as f32
}

fn count_decision_points(node: Node, source: &str) -> usize {
    let mut count = match node.kind() {
        "if_statement" | "while_statement" | "do_statement" | "for_statement"
        | "for_in_statement" | "switch_statement" | "catch_clause" | "ternary_expression" => 1,
        _ => 0,
    };

    if node.kind() == "binary_expression" {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if matches!(child.kind(), "&&" | "||" | "??") {
                count += 1;
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count += count_decision_points(child, source);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::SourceLanguage;

    fn parse(source: &str, language: SourceLanguage) -> Tree {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&language.grammar().expect("grammar"))
            .expect("set_language");
        parser.parse(source, None).expect("parse")
    }

    fn elements(source: &str, file: &str) -> Vec<Element> {
        let language = SourceLanguage::from_path(std::path::Path::new(file));
        let tree = parse(source, language);
        extract_elements(&tree, source, file, language.jsx())
    }

    #[test]
    fn single_function_declaration() {
        let found = elements("function myFunction() { return 42; }", "test.ts");
        assert_eq!(found.len(), 1);
        let e = &found[0];
        assert_eq!(e.kind, ElementKind::Function);
        assert_eq!(e.name, "myFunction");
        assert_eq!(e.line, 1);
        assert!(!e.exported);
    }

    #[test]
    fn exported_arrow_hook() {
        let found = elements(
            "export const useArrowHook = () => useMemo(() => 'v', []);",
            "h.ts",
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ElementKind::Hook);
        assert_eq!(found[0].name, "useArrowHook");
        assert!(found[0].exported);
    }

    #[test]
    fn class_with_methods_and_control_flow_bodies() {
        let source = r#"
class DataProcessor {
    process(items) {
        for (const item of items) {
            if (item.ok) { continue; }
            while (item.busy) { item.tick(); }
        }
        switch (items.length) { case 0: return null; }
    }
    handle(err) {
        try { this.process([]); } catch (e) { return e; }
    }
}
"#;
        let mut names: Vec<String> = elements(source, "p.ts").iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["DataProcessor", "DataProcessor.handle", "DataProcessor.process"]
        );
    }

    #[test]
    fn control_flow_keywords_never_become_elements() {
        let source = r#"
function outer(flag) {
    if (flag) { for (let i = 0; i < 3; i++) { } }
    while (flag) { break; }
    do { flag = false; } while (flag);
    switch (flag) { case true: break; default: break; }
    try { return 1; } catch (err) { } finally { }
}
"#;
        let found = elements(source, "cf.ts");
        let banned = [
            "if", "for", "while", "do", "switch", "case", "catch", "try", "return", "break",
            "continue",
        ];
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|e| !banned.contains(&e.name.as_str())));
    }

    #[test]
    fn constructor_is_a_qualified_method() {
        let source = "class Store { constructor(size) {} get(k) { return k; } }";
        let found = elements(source, "s.ts");
        let names: Vec<&str> = found.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Store.constructor"));
        assert!(names.contains(&"Store.get"));
    }

    #[test]
    fn class_field_arrow_counts_as_method() {
        let source = "class Api { fetchAll = async () => { return []; }; }";
        let found = elements(source, "a.ts");
        assert!(found.iter().any(|e| e.name == "Api.fetchAll" && e.kind == ElementKind::Method));
    }

    #[test]
    fn all_caps_binding_is_constant_unless_function() {
        let source = "const MAX_RETRIES = 5;\nconst DO_WORK = () => 1;\nconst lower = 2;";
        let found = elements(source, "c.ts");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, ElementKind::Constant);
        assert_eq!(found[0].name, "MAX_RETRIES");
        assert_eq!(found[1].kind, ElementKind::Function);
        assert_eq!(found[1].name, "DO_WORK");
    }

    #[test]
    fn typescript_declarations_extracted() {
        let source = r#"
export interface Shape { area(): number; }
enum Color { Red, Green }
type Alias = Shape | null;
"#;
        let found = elements(source, "t.ts");
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].kind, ElementKind::Interface);
        assert!(found[0].exported);
        assert_eq!(found[1].kind, ElementKind::Enum);
        assert!(!found[1].exported);
        assert_eq!(found[2].kind, ElementKind::TypeAlias);
        assert_eq!(found[2].name, "Alias");
    }

    #[test]
    fn interface_members_are_not_methods() {
        let found = elements("interface S { area(): number; grow(by: number): void; }", "i.ts");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ElementKind::Interface);
    }

    #[test]
    fn pascal_case_function_in_tsx_is_component() {
        let source = "export function Button(props) { return <button>{props.label}</button>; }";
        let found = elements(source, "Button.tsx");
        assert_eq!(found[0].kind, ElementKind::Component);
        // Same name in a plain .ts file stays a function.
        let plain = elements("function Button(props) { return null; }", "b.ts");
        assert_eq!(plain[0].kind, ElementKind::Function);
    }

    #[test]
    fn nested_functions_are_extracted_in_source_order() {
        let source = r#"
function outer() {
    function inner() { return 1; }
    const bound = function () { return 2; };
    return inner() + bound();
}
"#;
        let found = elements(source, "n.ts");
        let names: Vec<&str> = found.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["outer", "inner", "bound"]);
    }

    #[test]
    fn parameters_record_defaults_rest_and_destructuring() {
        let source = "function f(a, b = 2, { c, d }, ...rest) {}";
        let found = elements(source, "params.js");
        let params = &found[0].parameters;
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].name, "a");
        assert!(!params[0].has_default);
        assert!(params[1].has_default);
        assert_eq!(params[2].name, "c,d");
        assert!(params[2].is_destructured);
        assert!(params[3].is_rest);
        assert_eq!(params[3].name, "rest");
    }

    #[test]
    fn typescript_default_parameter() {
        let source = "function greet(name: string = 'x', count?: number) {}";
        let found = elements(source, "g.ts");
        let params = &found[0].parameters;
        assert_eq!(params.len(), 2);
        assert!(params[0].has_default);
        assert!(!params[1].has_default);
    }

    #[test]
    fn export_list_and_default_mark_exported() {
        let source = r#"
function first() {}
function second() {}
function third() {}
export { first };
export default second;
"#;
        let found = elements(source, "e.ts");
        let by_name = |n: &str| found.iter().find(|e| e.name == n).unwrap();
        assert!(by_name("first").exported);
        assert!(by_name("second").exported);
        assert!(!by_name("third").exported);
    }

    #[test]
    fn commonjs_exports_mark_exported() {
        let source = r#"
function alpha() {}
function beta() {}
function gamma() {}
function hidden() {}
module.exports = { alpha, renamed: beta };
exports.gamma = gamma;
"#;
        let found = elements(source, "cjs.js");
        let by_name = |n: &str| found.iter().find(|e| e.name == n).unwrap();
        assert!(by_name("alpha").exported);
        assert!(by_name("beta").exported);
        assert!(by_name("gamma").exported);
        assert!(!by_name("hidden").exported);
    }

    #[test]
    fn methods_of_exported_class_are_exported() {
        let source = "export class Svc { run() {} }";
        let found = elements(source, "svc.ts");
        assert!(found.iter().all(|e| e.exported));
    }

    #[test]
    fn object_literal_methods_are_not_class_methods() {
        let source = "class A { run() { const o = { helper() {} }; return o; } }";
        let found = elements(source, "o.ts");
        let names: Vec<&str> = found.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "A.run"]);
    }

    #[test]
    fn complexity_counts_decision_points() {
        let simple = elements("function s() { return 1; }", "x.ts");
        assert_eq!(simple[0].complexity, Some(1.0));
        let branchy = elements(
            "function b(x) { if (x) { return 1; } for (;;) { if (x > 2) break; } return x ? 2 : 3; }",
            "y.ts",
        );
        assert_eq!(branchy[0].complexity, Some(5.0));
    }
}
