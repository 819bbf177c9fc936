use std::fmt;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::errors::CollectError;
use crate::template::check_template;

/// Dotted chain of source names from the tree root down to a leaf.
///
/// Doubles as the `COLLECTOR` environment value and as the relative
/// filesystem path of the source under the run's root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectorPath(Vec<String>);

impl CollectorPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// First path segment, exposed to commands as `SOURCE`.
    pub fn source(&self) -> &str {
        &self.0[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Full dotted path, exposed to commands as `COLLECTOR`.
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    /// Persistent directory of this source under `root`.
    pub fn dir_under(&self, root: &Path) -> PathBuf {
        let mut dir = root.to_path_buf();
        for segment in &self.0 {
            dir.push(segment);
        }
        dir
    }
}

impl fmt::Display for CollectorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

/// Leaf source: carries the commands, never children.
#[derive(Debug, Clone, Default)]
pub struct SourceLeaf {
    /// Command acquiring files into the temporary workspace. Absent for
    /// manual-drop sources whose files arrive by external means.
    pub collect: Option<String>,
    /// Ingestion commands run in order against each collected file.
    pub postcollect: Vec<String>,
    /// Optional acknowledgment command run once per source after a chained
    /// collect+postcollect cycle.
    pub collectack: Option<String>,
}

/// A node of the validated source tree.
///
/// Grouping and leaf shapes are separate variants so that the invalid
/// "children and commands on the same node" state is unrepresentable once
/// validation has run.
#[derive(Debug, Clone)]
pub enum SourceNode {
    Group { children: Vec<(String, SourceNode)> },
    Leaf(SourceLeaf),
}

/// The whole validated source definition tree, in configuration order.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub roots: Vec<(String, SourceNode)>,
}

const LEAF_KEYS: [&str; 3] = ["collect", "postcollect", "collectack"];

impl SourceTree {
    /// Build and validate the tree from the raw `sources` YAML mapping.
    ///
    /// Fail-fast: any shape problem anywhere in the tree aborts before any
    /// command execution with [`CollectError::Config`].
    pub fn from_value(value: &Value) -> Result<Self, CollectError> {
        let mapping = value.as_mapping().ok_or_else(|| {
            CollectError::Config("'sources' must be a mapping of source names".to_string())
        })?;
        if mapping.is_empty() {
            return Err(CollectError::Config("'sources' is empty".to_string()));
        }
        let mut roots = Vec::new();
        for (key, child) in mapping {
            let name = node_name(key, "sources")?;
            let path = vec![name.clone()];
            roots.push((name, parse_node(child, &path)?));
        }
        Ok(Self { roots })
    }

    /// All leaves with their collector paths, depth-first in
    /// configuration order.
    pub fn leaves(&self) -> Vec<(CollectorPath, &SourceLeaf)> {
        let mut out = Vec::new();
        for (name, node) in &self.roots {
            push_leaves(node, CollectorPath::new(vec![name.clone()]), &mut out);
        }
        out
    }

    /// Node reached by following `segments` from the root, if any.
    pub fn find(&self, segments: &[String]) -> Option<&SourceNode> {
        let (first, rest) = segments.split_first()?;
        let mut node = self
            .roots
            .iter()
            .find(|(name, _)| name == first)
            .map(|(_, node)| node)?;
        for segment in rest {
            match node {
                SourceNode::Group { children } => {
                    node = children
                        .iter()
                        .find(|(name, _)| name == segment)
                        .map(|(_, child)| child)?;
                }
                SourceNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }
}

fn push_leaves<'a>(
    node: &'a SourceNode,
    path: CollectorPath,
    out: &mut Vec<(CollectorPath, &'a SourceLeaf)>,
) {
    match node {
        SourceNode::Leaf(leaf) => out.push((path, leaf)),
        SourceNode::Group { children } => {
            for (name, child) in children {
                push_leaves(child, path.child(name), out);
            }
        }
    }
}

fn node_name(key: &Value, parent: &str) -> Result<String, CollectError> {
    let name = key.as_str().ok_or_else(|| {
        CollectError::Config(format!("non-string source name under '{parent}'"))
    })?;
    if name.is_empty() || name.contains('.') || name.contains('/') {
        return Err(CollectError::Config(format!(
            "invalid source name '{name}' under '{parent}'"
        )));
    }
    Ok(name.to_string())
}

fn parse_node(value: &Value, path: &[String]) -> Result<SourceNode, CollectError> {
    let dotted = path.join(".");
    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(CollectError::Config(format!(
                "source '{dotted}' must be a mapping"
            )))
        }
    };

    let is_leaf = mapping
        .keys()
        .any(|k| matches!(k.as_str(), Some(key) if LEAF_KEYS.contains(&key)));

    if is_leaf {
        parse_leaf(mapping, &dotted).map(SourceNode::Leaf)
    } else {
        let mut children = Vec::new();
        for (key, child) in mapping {
            let name = node_name(key, &dotted)?;
            let mut child_path = path.to_vec();
            child_path.push(name.clone());
            children.push((name, parse_node(child, &child_path)?));
        }
        if children.is_empty() {
            return Err(CollectError::Config(format!(
                "source '{dotted}' defines neither commands nor sub-sources"
            )));
        }
        Ok(SourceNode::Group { children })
    }
}

fn parse_leaf(mapping: &serde_yaml::Mapping, dotted: &str) -> Result<SourceLeaf, CollectError> {
    let mut leaf = SourceLeaf::default();

    for (key, value) in mapping {
        let key = node_name(key, dotted)?;
        match key.as_str() {
            "collect" => leaf.collect = optional_command(value, dotted, "collect")?,
            "collectack" => leaf.collectack = optional_command(value, dotted, "collectack")?,
            "postcollect" => leaf.postcollect = command_list(value, dotted)?,
            other => {
                // A leaf carrying children would silently shadow them, so
                // the mixed shape is rejected outright.
                return Err(CollectError::Config(format!(
                    "source '{dotted}' mixes commands with sub-source '{other}'"
                )));
            }
        }
    }

    if leaf.collect.is_none() && leaf.postcollect.is_empty() {
        return Err(CollectError::Config(format!(
            "source '{dotted}' has neither collect nor postcollect, nothing to do"
        )));
    }

    for template in leaf
        .collect
        .iter()
        .chain(leaf.postcollect.iter())
        .chain(leaf.collectack.iter())
    {
        check_template(template).map_err(|reason| {
            CollectError::Config(format!("source '{dotted}': {reason} in `{template}`"))
        })?;
    }

    Ok(leaf)
}

fn optional_command(
    value: &Value,
    dotted: &str,
    field: &str,
) -> Result<Option<String>, CollectError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(CollectError::Config(format!(
            "source '{dotted}': '{field}' must be a string"
        ))),
    }
}

fn command_list(value: &Value, dotted: &str) -> Result<Vec<String>, CollectError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Sequence(seq) => {
            let mut commands = Vec::new();
            for item in seq {
                match item.as_str() {
                    Some(s) if !s.trim().is_empty() => commands.push(s.to_string()),
                    _ => {
                        return Err(CollectError::Config(format!(
                            "source '{dotted}': 'postcollect' list items must be \
                             non-empty strings"
                        )))
                    }
                }
            }
            Ok(commands)
        }
        _ => Err(CollectError::Config(format!(
            "source '{dotted}': 'postcollect' must be a string or a list of strings"
        ))),
    }
}
