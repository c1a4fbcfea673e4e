//! GraphML reader for knowledge-graph snapshots
//!
//! Only the subset written by graph libraries for property graphs is
//! understood: `<key>` declarations with typed attributes and optional
//! defaults, `<node>`/`<edge>` elements and their `<data>` children.
//! Nested graphs and hyperedges are ignored.

use crate::JsonMap;
use crate::error::{MigrationError, MigrationResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// A node and its declared properties
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Node id
    pub id: String,
    /// Typed `<data>` values keyed by attribute name
    pub properties: JsonMap,
}

/// An edge and its declared properties
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Typed `<data>` values keyed by attribute name
    pub properties: JsonMap,
}

/// In-memory graph, nodes and edges in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDocument {
    /// `edgedefault="directed"` on the graph element
    pub directed: bool,
    /// Nodes
    pub nodes: Vec<GraphNode>,
    /// Edges
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyDomain {
    Node,
    Edge,
    Other,
    All,
}

impl KeyDomain {
    fn parse(raw: &str) -> Self {
        match raw {
            "node" => Self::Node,
            "edge" => Self::Edge,
            "all" => Self::All,
            _ => Self::Other,
        }
    }

    fn covers(self, other: Self) -> bool {
        self == Self::All || self == other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrType {
    String,
    Int,
    Float,
    Boolean,
}

impl AttrType {
    fn parse(raw: &str) -> Self {
        match raw {
            "int" | "long" => Self::Int,
            "float" | "double" => Self::Float,
            "boolean" => Self::Boolean,
            _ => Self::String,
        }
    }

    /// Typed JSON value; unparsable input falls back to the raw string
    fn convert(self, raw: &str) -> Value {
        let trimmed = raw.trim();
        let typed = match self {
            Self::String => None,
            Self::Int => trimmed.parse::<i64>().ok().map(Value::from),
            Self::Float => trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            Self::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
        };
        typed.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

#[derive(Debug, Clone)]
struct KeyDef {
    domain: KeyDomain,
    name: String,
    kind: AttrType,
    default: Option<Value>,
}

enum Element {
    Node(GraphNode),
    Edge(GraphEdge),
}

impl Element {
    fn properties_mut(&mut self) -> &mut JsonMap {
        match self {
            Self::Node(node) => &mut node.properties,
            Self::Edge(edge) => &mut edge.properties,
        }
    }
}

struct Parser<'p> {
    path: &'p Path,
    keys: HashMap<String, KeyDef>,
    key_order: Vec<String>,
    graph: GraphDocument,
    current: Option<Element>,
    /// Key id and accumulated text of an open `<data>`
    data: Option<(String, String)>,
    /// Key id and accumulated text of an open `<default>`
    default: Option<(String, String)>,
    open_key: Option<String>,
}

impl GraphDocument {
    /// Read and parse a GraphML file
    pub fn from_path(path: &Path) -> MigrationResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Parse GraphML text; `path` is only used in errors
    pub fn parse(content: &str, path: &Path) -> MigrationResult<Self> {
        let mut parser = Parser {
            path,
            keys: HashMap::new(),
            key_order: Vec::new(),
            graph: Self::default(),
            current: None,
            data: None,
            default: None,
            open_key: None,
        };
        parser.run(content)?;
        Ok(parser.graph)
    }
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> MigrationError {
        MigrationError::Graph {
            path: self.path.to_path_buf(),
            message: message.into(),
        }
    }

    fn attr(&self, element: &BytesStart<'_>, name: &str) -> MigrationResult<Option<String>> {
        let attr = element
            .try_get_attribute(name)
            .map_err(|e| self.error(format!("bad attribute {name}: {e}")))?;
        attr.map(|a| {
            a.unescape_value()
                .map(|v| v.into_owned())
                .map_err(|e| self.error(format!("bad attribute {name}: {e}")))
        })
        .transpose()
    }

    fn required_attr(&self, element: &BytesStart<'_>, name: &str) -> MigrationResult<String> {
        let tag = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
        self.attr(element, name)?
            .ok_or_else(|| self.error(format!("<{tag}> without {name} attribute")))
    }

    fn run(&mut self, content: &str) -> MigrationResult<()> {
        let mut reader = Reader::from_str(content);
        loop {
            let event = reader
                .read_event()
                .map_err(|e| self.error(format!("at byte {}: {e}", reader.buffer_position())))?;
            match event {
                Event::Start(e) => self.open(&e, false)?,
                Event::Empty(e) => self.open(&e, true)?,
                Event::End(e) => self.close(e.local_name().as_ref())?,
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| self.error(e.to_string()))?;
                    self.push_text(&text);
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    self.push_text(&text);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if self.current.is_some() {
            return Err(self.error("unexpected end of document inside element"));
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        if let Some((_, buf)) = self.data.as_mut() {
            buf.push_str(text);
        } else if let Some((_, buf)) = self.default.as_mut() {
            buf.push_str(text);
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> MigrationResult<()> {
        match e.local_name().as_ref() {
            b"graph" => {
                self.graph.directed = self.attr(e, "edgedefault")?.as_deref() == Some("directed");
            }
            b"key" => {
                let id = self.required_attr(e, "id")?;
                let domain = KeyDomain::parse(self.attr(e, "for")?.as_deref().unwrap_or("all"));
                let name = self.attr(e, "attr.name")?.unwrap_or_else(|| id.clone());
                let kind = AttrType::parse(self.attr(e, "attr.type")?.as_deref().unwrap_or("string"));
                if !self.keys.contains_key(&id) {
                    self.key_order.push(id.clone());
                }
                self.keys.insert(
                    id.clone(),
                    KeyDef {
                        domain,
                        name,
                        kind,
                        default: None,
                    },
                );
                if !empty {
                    self.open_key = Some(id);
                }
            }
            b"default" => {
                if let Some(key) = self.open_key.clone() {
                    if empty {
                        self.set_default(&key, "");
                    } else {
                        self.default = Some((key, String::new()));
                    }
                }
            }
            b"node" => {
                let node = GraphNode {
                    id: self.required_attr(e, "id")?,
                    properties: JsonMap::new(),
                };
                self.current = Some(Element::Node(node));
                if empty {
                    self.finish_element();
                }
            }
            b"edge" => {
                let edge = GraphEdge {
                    source: self.required_attr(e, "source")?,
                    target: self.required_attr(e, "target")?,
                    properties: JsonMap::new(),
                };
                self.current = Some(Element::Edge(edge));
                if empty {
                    self.finish_element();
                }
            }
            b"data" => {
                let key = self.required_attr(e, "key")?;
                if empty {
                    self.store_data(&key, "");
                } else {
                    self.data = Some((key, String::new()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> MigrationResult<()> {
        match name {
            b"key" => self.open_key = None,
            b"default" => {
                if let Some((key, text)) = self.default.take() {
                    self.set_default(&key, &text);
                }
            }
            b"data" => {
                if let Some((key, text)) = self.data.take() {
                    self.store_data(&key, &text);
                }
            }
            b"node" | b"edge" => {
                if self.current.is_none() {
                    return Err(self.error("closing tag without open node or edge"));
                }
                self.finish_element();
            }
            _ => {}
        }
        Ok(())
    }

    fn set_default(&mut self, key: &str, raw: &str) {
        if let Some(def) = self.keys.get_mut(key) {
            def.default = Some(def.kind.convert(raw));
        }
    }

    fn store_data(&mut self, key: &str, raw: &str) {
        let (name, value) = match self.keys.get(key) {
            Some(def) => (def.name.clone(), def.kind.convert(raw)),
            None => {
                tracing::warn!(path = ?self.path, key = %key, "GraphML data with undeclared key");
                (key.to_string(), Value::String(raw.to_string()))
            }
        };
        match self.current.as_mut() {
            Some(element) => {
                element.properties_mut().insert(name, value);
            }
            // Graph-level data is not migrated.
            None => {}
        }
    }

    fn finish_element(&mut self) {
        let Some(mut element) = self.current.take() else {
            return;
        };
        let domain = match element {
            Element::Node(_) => KeyDomain::Node,
            Element::Edge(_) => KeyDomain::Edge,
        };
        for key in &self.key_order {
            let Some(def) = self.keys.get(key) else {
                continue;
            };
            if let Some(default) = def.default.as_ref().filter(|_| def.domain.covers(domain)) {
                element
                    .properties_mut()
                    .entry(def.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        match element {
            Element::Node(node) => self.graph.nodes.push(node),
            Element::Edge(edge) => self.graph.edges.push(edge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='utf-8'?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="node" attr.name="entity_type" attr.type="string">
    <default>UNKNOWN</default>
  </key>
  <key id="d1" for="node" attr.name="description" attr.type="string"/>
  <key id="d2" for="edge" attr.name="weight" attr.type="double"/>
  <key id="d3" for="edge" attr.name="keywords" attr.type="string"/>
  <key id="d4" for="node" attr.name="rank" attr.type="long"/>
  <graph edgedefault="undirected">
    <node id="Alice">
      <data key="d0">person</data>
      <data key="d1">Works at &amp; leads the lab</data>
      <data key="d4">3</data>
    </node>
    <node id="Lab"/>
    <edge source="Alice" target="Lab">
      <data key="d2">1.5</data>
      <data key="d3">works_at</data>
    </edge>
    <edge source="Alice" target="Ghost"/>
  </graph>
</graphml>"#;

    #[test]
    fn parses_nodes_edges_and_types() {
        let graph = GraphDocument::parse(SAMPLE, Path::new("g.graphml")).expect("parse");
        assert!(!graph.directed);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 2);

        let alice = &graph.nodes[0];
        assert_eq!(alice.id, "Alice");
        assert_eq!(
            Value::Object(alice.properties.clone()),
            json!({
                "entity_type": "person",
                "description": "Works at & leads the lab",
                "rank": 3
            })
        );

        let edge = &graph.edges[0];
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("Alice", "Lab"));
        assert_eq!(edge.properties.get("weight"), Some(&json!(1.5)));
        assert_eq!(edge.properties.get("keywords"), Some(&json!("works_at")));
    }

    #[test]
    fn defaults_fill_missing_node_data() {
        let graph = GraphDocument::parse(SAMPLE, Path::new("g.graphml")).expect("parse");
        let lab = &graph.nodes[1];
        assert_eq!(lab.properties.get("entity_type"), Some(&json!("UNKNOWN")));
        assert!(graph.edges[1].properties.get("entity_type").is_none());
    }

    #[test]
    fn dangling_edges_are_kept() {
        let graph = GraphDocument::parse(SAMPLE, Path::new("g.graphml")).expect("parse");
        assert_eq!(graph.edges[1].target, "Ghost");
        assert!(graph.nodes.iter().all(|n| n.id != "Ghost"));
    }

    #[test]
    fn unparsable_typed_values_stay_strings() {
        assert_eq!(AttrType::Int.convert("abc"), json!("abc"));
        assert_eq!(AttrType::Boolean.convert("True"), json!(true));
        assert_eq!(AttrType::Float.convert("2"), json!(2.0));
    }

    #[test]
    fn node_without_id_is_an_error() {
        let err = GraphDocument::parse(
            r#"<graphml><graph><node><data key="x">1</data></node></graph></graphml>"#,
            Path::new("bad.graphml"),
        )
        .expect_err("missing id");
        assert!(matches!(err, MigrationError::Graph { .. }));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = GraphDocument::parse("<graphml><graph><node id=\"a\">", Path::new("cut.graphml"))
            .expect_err("truncated");
        assert!(matches!(err, MigrationError::Graph { .. }));
    }
}
