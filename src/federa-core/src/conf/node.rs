//! Configuration tree nodes.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;

use common_error::{FederaError, FederaResult};

use super::parser;

/// A node in a configuration tree.
///
/// A leaf holds a string value as its name. `KEY "value"` parses to a node
/// named `KEY` with a single leaf child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigNode {
    name: String,
    children: Vec<ConfigNode>,
}

impl ConfigNode {
    /// Create a node without children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Create a node with children.
    pub fn with_children(name: impl Into<String>, children: Vec<ConfigNode>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    /// Parse configuration text. `%include` paths resolve against the
    /// current directory.
    pub fn parse(name: &str, text: &str) -> FederaResult<Self> {
        parser::parse_str(name, text, None)
    }

    /// Parse a configuration file. `%include` paths resolve against the
    /// file's directory.
    pub fn from_file(path: &Path) -> FederaResult<Self> {
        let text = std::fs::read_to_string(path)?;
        parser::parse_str(&path.display().to_string(), &text, path.parent())
    }

    /// Node name (the value, for leaves).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct children.
    pub fn children(&self) -> &[ConfigNode] {
        &self.children
    }

    /// Number of direct children.
    pub fn count(&self) -> usize {
        self.children.len()
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterate over direct children.
    pub fn iter(&self) -> std::slice::Iter<'_, ConfigNode> {
        self.children.iter()
    }

    /// Append a child named `name` and return it.
    pub fn add(&mut self, name: impl Into<String>) -> &mut ConfigNode {
        self.children.push(ConfigNode::new(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append an existing node as child.
    pub fn add_child(&mut self, child: ConfigNode) {
        self.children.push(child);
    }

    /// First child.
    pub fn first_child(&self) -> FederaResult<&ConfigNode> {
        self.children
            .first()
            .ok_or_else(|| FederaError::node_not_found(format!("\"{}\" has no children", self.name)))
    }

    /// Last child.
    pub fn last_child(&self) -> FederaResult<&ConfigNode> {
        self.children
            .last()
            .ok_or_else(|| FederaError::node_not_found(format!("\"{}\" has no children", self.name)))
    }

    /// All descendants named `name` on the shallowest level that has any.
    pub fn query(&self, name: &str) -> Vec<&ConfigNode> {
        let mut level: Vec<&ConfigNode> = self.children.iter().collect();
        while !level.is_empty() {
            let found: Vec<&ConfigNode> = level.iter().copied().filter(|n| n.name == name).collect();
            if !found.is_empty() {
                return found;
            }
            level = level.iter().flat_map(|n| n.children.iter()).collect();
        }
        Vec::new()
    }

    /// First descendant named `name`, breadth-first.
    pub fn get(&self, name: &str) -> FederaResult<&ConfigNode> {
        let mut queue: VecDeque<&ConfigNode> = self.children.iter().collect();
        while let Some(node) = queue.pop_front() {
            if node.name == name {
                return Ok(node);
            }
            queue.extend(node.children.iter());
        }
        Err(FederaError::node_not_found(format!(
            "\"{}\" has no descendant \"{name}\"",
            self.name
        )))
    }

    /// The leaf text of descendant `name`, if present.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).ok().map(ToString::to_string)
    }

    /// Re-parsable text form of this node's children.
    pub fn to_conf_string(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(&mut out, child, 0);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ConfigNode {
    /// Concatenation of all leaf values below this node.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.children.is_empty() {
            return f.write_str(&self.name);
        }
        for child in &self.children {
            write!(f, "{child}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ConfigNode {
    type Item = &'a ConfigNode;
    type IntoIter = std::slice::Iter<'a, ConfigNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

fn quote(out: &mut String, value: &str) {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '%' => out.push_str("%%"),
            '\n' => out.push_str("%n"),
            '\r' => out.push_str("%u000D"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_node(out: &mut String, node: &ConfigNode, indent: usize) {
    if node.is_leaf() {
        quote(out, &node.name);
        return;
    }
    if !node.name.is_empty() && node.children.len() == 1 && node.children[0].is_leaf() {
        out.push_str(&node.name);
        out.push(' ');
        quote(out, &node.children[0].name);
        return;
    }
    out.push_str(&node.name);
    out.push('(');
    if node.children.iter().all(ConfigNode::is_leaf) {
        for (i, child) in node.children.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            quote(out, &child.name);
        }
        out.push(')');
        return;
    }
    let pad = "  ".repeat(indent + 1);
    for child in &node.children {
        out.push('\n');
        out.push_str(&pad);
        write_node(out, child, indent + 1);
    }
    out.push('\n');
    out.push_str(&"  ".repeat(indent));
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigNode {
        ConfigNode::parse(
            "sample",
            r#"
            A(NAME "outer" B(NAME "inner"))
            NAME "top"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_get_prefers_shallowest() {
        let conf = sample();
        assert_eq!(conf.get("NAME").unwrap().to_string(), "top");
        assert_eq!(conf.get("A").unwrap().get("NAME").unwrap().to_string(), "outer");
        assert!(matches!(conf.get("MISSING"), Err(FederaError::NodeNotFound(_))));
    }

    #[test]
    fn test_query_returns_one_level() {
        let conf = sample();
        let found = conf.query("NAME");
        assert_eq!(found.len(), 1);
        assert!(conf.query("MISSING").is_empty());
        assert_eq!(conf.get("A").unwrap().query("NAME").len(), 1);
    }

    #[test]
    fn test_display_concatenates_leaves() {
        let conf = ConfigNode::parse("x", r#"L("a" "b" X "c")"#).unwrap();
        assert_eq!(conf.get("L").unwrap().to_string(), "abc");
    }

    #[test]
    fn test_builder_and_serialization() {
        let mut root = ConfigNode::new("root");
        root.add("Schema").add("id");
        let daten = root.add("Daten");
        let rec = daten.add("");
        rec.add("Key").add("a\"b%c\nd");
        rec.add("Override");

        let text = root.to_conf_string();
        let reparsed = ConfigNode::parse("root", &text).unwrap();
        assert_eq!(reparsed, root);
    }
}
