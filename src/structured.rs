//! Structured-content helpers for XML and JSON fields.
//!
//! XML is parsed into a [`serde_json::Value`] tree so both formats share one
//! projection routine. The tree follows the common "xml2js" layout:
//!
//! - the root element becomes a single-key object;
//! - child elements are collected into arrays under their tag name;
//! - attributes live under `"$"`, mixed text under `"_"`;
//! - an element with only text (no attributes, no children) is a string.
//!
//! A projection path is a dotted key list (`order.customer.name`). Numeric
//! segments index arrays; any other segment applied to an array descends
//! into its first element. A path that hits a missing key resolves to
//! nothing and is dropped from the output.

use serde_json::{Map, Value};

use crate::error::ExtractError;

/// Parse an XML document into a JSON value tree.
pub fn xml_to_value(xml: &str) -> Result<Value, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(Frame::open(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let frame = Frame::open(&e)?;
                close_frame(frame, &mut stack, &mut root);
            }
            Ok(Event::End(_)) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| ExtractError::Xml("unbalanced end tag".to_string()))?;
                close_frame(frame, &mut stack, &mut root);
            }
            Ok(Event::Text(t)) => {
                if let Some(frame) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| ExtractError::Xml(e.to_string()))?;
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ExtractError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| ExtractError::Xml("document has no root element".to_string()))
}

struct Frame {
    name: String,
    attrs: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(e: &quick_xml::events::BytesStart<'_>) -> Result<Self, ExtractError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = Map::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| ExtractError::Xml(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| ExtractError::Xml(err.to_string()))?;
            attrs.insert(key, Value::String(value.into_owned()));
        }
        Ok(Self {
            name,
            attrs,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn into_value(self) -> Value {
        let text = self.text.trim().to_string();
        if self.attrs.is_empty() && self.children.is_empty() {
            return Value::String(text);
        }
        let mut obj = Map::new();
        if !self.attrs.is_empty() {
            obj.insert("$".to_string(), Value::Object(self.attrs));
        }
        if !text.is_empty() {
            obj.insert("_".to_string(), Value::String(text));
        }
        obj.extend(self.children);
        Value::Object(obj)
    }
}

fn close_frame(frame: Frame, stack: &mut [Frame], root: &mut Option<Value>) {
    let name = frame.name.clone();
    let value = frame.into_value();
    match stack.last_mut() {
        Some(parent) => {
            let slot = parent
                .children
                .entry(name)
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = slot {
                items.push(value);
            }
        }
        None => {
            let mut obj = Map::new();
            obj.insert(name, value);
            *root = Some(Value::Object(obj));
        }
    }
}

/// Walk a dotted path through `value`.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = step(current, part)?;
    }
    match current {
        Value::Null => None,
        other => Some(other),
    }
}

fn step<'a>(value: &'a Value, part: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(part),
        Value::Array(items) => match part.parse::<usize>() {
            Ok(idx) => items.get(idx),
            Err(_) => step(items.first()?, part),
        },
        _ => None,
    }
}

/// Render a resolved value as index text. Empty results count as absent.
pub fn render_value(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(render_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Bool(false) => return None,
        other => other.to_string(),
    };
    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

/// Resolve every path and join the surviving values with a space.
pub fn project(value: &Value, paths: &[String]) -> String {
    paths
        .iter()
        .filter_map(|path| resolve_path(value, path))
        .filter_map(render_value)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ORDER: &str = r#"<?xml version="1.0"?>
        <order id="7">
            <customer><name>Ada</name><city>London</city></customer>
            <item>Widget</item>
            <item>Gadget</item>
            <note>rush <![CDATA[& fragile]]></note>
        </order>"#;

    #[test]
    fn xml_tree_layout() {
        let v = xml_to_value(ORDER).unwrap();
        assert_eq!(v["order"]["$"]["id"], "7");
        assert_eq!(v["order"]["customer"][0]["name"][0], "Ada");
        assert_eq!(v["order"]["item"], json!(["Widget", "Gadget"]));
    }

    #[test]
    fn xml_projection_drops_missing_paths() {
        let v = xml_to_value(ORDER).unwrap();
        let paths = vec![
            "order.customer.name".to_string(),
            "order.customer.phone".to_string(),
            "order.item".to_string(),
            "order.item.1".to_string(),
        ];
        assert_eq!(project(&v, &paths), "Ada Widget,Gadget Gadget");
    }

    #[test]
    fn json_projection() {
        let v = json!({"title": "Q3 report", "meta": {"pages": 12, "draft": false}});
        let paths = vec![
            "title".to_string(),
            "meta.pages".to_string(),
            "meta.draft".to_string(),
            "missing".to_string(),
        ];
        assert_eq!(project(&v, &paths), "Q3 report 12");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(matches!(
            xml_to_value("<a><b></a>"),
            Err(ExtractError::Xml(_))
        ));
        assert!(matches!(xml_to_value("   "), Err(ExtractError::Xml(_))));
    }

    #[test]
    fn empty_elements_become_empty_strings() {
        let v = xml_to_value("<root><flag/></root>").unwrap();
        assert_eq!(v["root"]["flag"], json!([""]));
    }
}
