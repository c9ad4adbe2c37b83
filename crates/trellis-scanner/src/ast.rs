//! Small tree-sitter node helpers shared by the extractors

use tree_sitter::Node;

/// UTF-8 text of a node, empty on encoding failure.
pub fn text(node: Node, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or("").to_string()
}

/// 1-based line of the node start.
pub fn line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

/// Text of a named field child, when present.
pub fn field_text(node: Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field).map(|n| text(n, source))
}

/// True for the function-shaped expression kinds.
pub fn is_function_value(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

/// Identifiers bound by a parameter or destructuring pattern, in source
/// order. Walks only binding positions, so identifiers inside default-value
/// expressions or property keys are not picked up.
pub fn collect_bound_identifiers(node: Node, source: &str, out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            out.push(text(node, source));
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = node.child_by_field_name("left") {
                collect_bound_identifiers(left, source, out);
            }
        }
        "pair_pattern" => {
            if let Some(value) = node.child_by_field_name("value") {
                collect_bound_identifiers(value, source, out);
            }
        }
        "rest_pattern" | "object_pattern" | "array_pattern" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_bound_identifiers(child, source, out);
            }
        }
        "required_parameter" | "optional_parameter" => {
            if let Some(pattern) = node.child_by_field_name("pattern") {
                collect_bound_identifiers(pattern, source, out);
            }
        }
        _ => {}
    }
}
