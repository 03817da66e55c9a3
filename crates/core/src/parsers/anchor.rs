//! `anchor.xml`: metric tree, regions, call tree and system tree.

use std::collections::BTreeMap;
use std::fmt::Display;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use crate::model::{
    CallNode, Location, LocationGroup, Metric, MetricType, ParameterValue, Profile, Region,
    SystemTreeNode,
};

#[derive(Debug, Error)]
pub enum AnchorParseError {
    #[error("anchor is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("<{element}> is missing required child or attribute `{name}`")]
    Missing { element: &'static str, name: &'static str },
    #[error("<{element}> has invalid `{name}` value `{value}`")]
    InvalidAttribute {
        element: &'static str,
        name: &'static str,
        value: String,
    },
    #[error("unexpected anchor structure: {0}")]
    Structure(String),
}

fn xml_error(e: impl Display) -> AnchorParseError {
    AnchorParseError::Xml(e.to_string())
}

/// Minimal element tree; anchors are small enough to hold in memory whole.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, AnchorParseError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            ..Self::default()
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child called `name`, empty if absent.
    fn child_text(&self, name: &str) -> String {
        self.child(name).map(|c| c.text.clone()).unwrap_or_default()
    }

    fn required_attr(&self, element: &'static str, name: &'static str) -> Result<&str, AnchorParseError> {
        self.attr(name)
            .ok_or(AnchorParseError::Missing { element, name })
    }

    fn parsed_attr<T: std::str::FromStr>(
        &self,
        element: &'static str,
        name: &'static str,
    ) -> Result<T, AnchorParseError> {
        let raw = self.required_attr(element, name)?;
        raw.trim()
            .parse()
            .map_err(|_| AnchorParseError::InvalidAttribute {
                element,
                name,
                value: raw.to_string(),
            })
    }

    fn required_child(&self, element: &'static str, name: &'static str) -> Result<&Element, AnchorParseError> {
        self.child(name)
            .ok_or(AnchorParseError::Missing { element, name })
    }
}

fn build_tree(xml: &str) -> Result<Element, AnchorParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(ref e) => stack.push(Element::from_start(e)?),
            Event::Empty(ref e) => {
                let element = Element::from_start(e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| AnchorParseError::Xml("unbalanced end tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&e.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(AnchorParseError::Xml(format!("{} unclosed elements", stack.len())));
    }
    root.ok_or_else(|| AnchorParseError::Structure("empty document".into()))
}

fn parse_metric(node: &Element) -> Result<Metric, AnchorParseError> {
    let raw_type = node.required_attr("metric", "type")?;
    let metric_type: MetricType = raw_type
        .parse()
        .map_err(|value| AnchorParseError::InvalidAttribute {
            element: "metric",
            name: "type",
            value,
        })?;
    let mut metric = Metric::new(
        node.parsed_attr("metric", "id")?,
        node.child_text("uniq_name"),
        metric_type,
        node.child_text("dtype"),
    );
    metric.display_name = node.child_text("disp_name");
    metric.description = node.child_text("descr");
    metric.units = node.child_text("uom");
    metric.url = node.child_text("url");
    metric.children = node
        .children_named("metric")
        .map(parse_metric)
        .collect::<Result<_, _>>()?;
    Ok(metric)
}

fn parse_region(node: &Element) -> Result<Region, AnchorParseError> {
    Ok(Region {
        id: node.parsed_attr("region", "id")?,
        begin: node.parsed_attr("region", "begin")?,
        end: node.parsed_attr("region", "end")?,
        name: node.child_text("name"),
        mangled_name: node.child_text("mangled_name"),
        paradigm: node.child_text("paradigm"),
        role: node.child_text("role"),
        url: node.child_text("url"),
        description: node.child_text("descr"),
        module: node.attr("mod").map(str::to_string),
    })
}

fn parameter_value(partype: Option<&str>, raw: &str) -> ParameterValue {
    match partype {
        Some("numeric") => raw
            .trim()
            .parse::<i64>()
            .map(ParameterValue::Int)
            .or_else(|_| raw.trim().parse::<f64>().map(ParameterValue::Float))
            .unwrap_or_else(|_| ParameterValue::Text(raw.to_string())),
        Some("string") => ParameterValue::Text(raw.to_string()),
        other => {
            tracing::warn!("unknown cnode parameter type {other:?}, keeping `{raw}` as text");
            ParameterValue::Text(raw.to_string())
        }
    }
}

fn parse_cnode(node: &Element) -> Result<CallNode, AnchorParseError> {
    let mut cnode = CallNode::new(
        node.parsed_attr("cnode", "id")?,
        node.parsed_attr("cnode", "calleeId")?,
    );
    cnode.children = node
        .children_named("cnode")
        .map(parse_cnode)
        .collect::<Result<_, _>>()?;
    for parameter in node.children_named("parameter") {
        let key = parameter.required_attr("parameter", "parkey")?;
        let raw = parameter.attr("parvalue").unwrap_or_default();
        cnode
            .parameters
            .insert(key.to_string(), parameter_value(parameter.attr("partype"), raw));
    }
    Ok(cnode)
}

fn parse_location(node: &Element) -> Result<Location, AnchorParseError> {
    Ok(Location {
        id: node.parsed_attr("location", "Id")?,
        name: node.child_text("name"),
        rank: node.child_text("rank"),
        kind: node.child_text("type"),
    })
}

fn parse_location_group(node: &Element) -> Result<LocationGroup, AnchorParseError> {
    Ok(LocationGroup {
        id: node.parsed_attr("locationgroup", "Id")?,
        name: node.child_text("name"),
        rank: node.child_text("rank"),
        kind: node.child_text("type"),
        groups: node
            .children_named("locationgroup")
            .map(parse_location_group)
            .collect::<Result<_, _>>()?,
        locations: node
            .children_named("location")
            .map(parse_location)
            .collect::<Result<_, _>>()?,
    })
}

fn parse_attrs(node: &Element) -> BTreeMap<String, String> {
    node.children_named("attr")
        .filter_map(|a| Some((a.attr("key")?.to_string(), a.attr("value")?.to_string())))
        .collect()
}

fn parse_system_tree_node(node: &Element) -> Result<SystemTreeNode, AnchorParseError> {
    Ok(SystemTreeNode {
        id: node.parsed_attr("systemtreenode", "Id")?,
        class: node.attr("class").unwrap_or_default().to_string(),
        name: node.child_text("name"),
        attrs: parse_attrs(node),
        children: node
            .children_named("systemtreenode")
            .map(parse_system_tree_node)
            .collect::<Result<_, _>>()?,
        location_groups: node
            .children_named("locationgroup")
            .map(parse_location_group)
            .collect::<Result<_, _>>()?,
    })
}

/// Parse an uncompressed `anchor.xml` into a [`Profile`].
pub fn parse_anchor(data: &[u8]) -> Result<Profile, AnchorParseError> {
    let root = build_tree(std::str::from_utf8(data)?)?;

    let metrics = root
        .required_child("cube", "metrics")?
        .children_named("metric")
        .map(parse_metric)
        .collect::<Result<Vec<_>, _>>()?;

    let program = root.required_child("cube", "program")?;
    let regions = program
        .children_named("region")
        .map(parse_region)
        .collect::<Result<Vec<_>, _>>()?;
    let cnodes = program
        .children_named("cnode")
        .map(parse_cnode)
        .collect::<Result<Vec<_>, _>>()?;
    if cnodes.len() != 1 {
        return Err(AnchorParseError::Structure(format!(
            "expected one root call node, found {}",
            cnodes.len()
        )));
    }

    let system_tree_nodes = root
        .required_child("cube", "system")?
        .children_named("systemtreenode")
        .map(parse_system_tree_node)
        .collect::<Result<Vec<_>, _>>()?;
    if system_tree_nodes.len() != 1 {
        return Err(AnchorParseError::Structure(format!(
            "expected one top-level system tree node, found {}",
            system_tree_nodes.len()
        )));
    }

    tracing::debug!(
        "anchor: {} metrics, {} regions, {} locations",
        metrics.len(),
        regions.len(),
        system_tree_nodes[0].all_locations().len()
    );
    Ok(Profile::new(
        parse_attrs(&root),
        metrics,
        regions,
        cnodes,
        system_tree_nodes,
    ))
}
