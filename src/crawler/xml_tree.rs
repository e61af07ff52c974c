use anyhow::anyhow;
use quick_xml::{
    escape::resolve_predefined_entity,
    events::{BytesStart, Event},
    name::{Namespace, ResolveResult},
    NsReader,
};

/// An XML element with its resolved namespace, attributes, text and children.
///
/// `text` is `None` when the element contains no character data at all, mirroring an empty
/// element in the document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn is(&self, namespace: Option<&str>, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == namespace
    }

    /// First direct child without namespace named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.is(None, name))
    }

    /// First descendant in document order with the given namespace and local name.
    pub fn descendant(&self, namespace: Option<&str>, name: &str) -> Option<&XmlElement> {
        self.descendants(namespace, name).into_iter().next()
    }

    /// All descendants in document order with the given namespace and local name.
    pub fn descendants(&self, namespace: Option<&str>, name: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(element) = stack.pop() {
            if element.is(namespace, name) {
                found.push(element);
            }
            stack.extend(element.children.iter().rev());
        }
        found
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse a whole document into its root element.
pub fn parse(xml: &[u8]) -> anyhow::Result<XmlElement> {
    let mut reader = NsReader::from_reader(xml);
    let mut open_elements: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        let namespace = match resolved {
            ResolveResult::Bound(Namespace(namespace)) => {
                Some(String::from_utf8_lossy(namespace).into_owned())
            }
            _ => None,
        };
        match event {
            Event::Start(start) => {
                open_elements.push(element_from_start(&reader, namespace, &start)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&reader, namespace, &start)?;
                close_element(&mut open_elements, &mut root, element)?;
            }
            Event::End(_) => {
                let element = open_elements
                    .pop()
                    .ok_or_else(|| anyhow!("Unexpected closing tag"))?;
                close_element(&mut open_elements, &mut root, element)?;
            }
            Event::Text(text) => append_text(&mut open_elements, &reader.decoder().decode(&text)?),
            Event::CData(data) => append_text(&mut open_elements, &reader.decoder().decode(&data)?),
            Event::GeneralRef(reference) => {
                let resolved = match reference.resolve_char_ref()? {
                    Some(character) => character.to_string(),
                    None => {
                        let name = reference.decode()?;
                        resolve_predefined_entity(&name)
                            .map(str::to_owned)
                            .ok_or_else(|| anyhow!("Unknown entity &{};", name))?
                    }
                };
                append_text(&mut open_elements, &resolved);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open_elements.is_empty() {
        return Err(anyhow!("Unclosed element <{}>", open_elements[open_elements.len() - 1].name));
    }
    root.ok_or_else(|| anyhow!("XML document has no root element"))
}

fn element_from_start(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart,
) -> anyhow::Result<XmlElement> {
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .decode_and_unescape_value(reader.decoder())?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        ..Default::default()
    })
}

fn close_element(
    open_elements: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> anyhow::Result<()> {
    match open_elements.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(anyhow!("Document has more than one root element")),
    }
    Ok(())
}

/// Character data outside the root element (whitespace between prolog and root) is dropped.
fn append_text(open_elements: &mut [XmlElement], text: &str) {
    if let Some(element) = open_elements.last_mut() {
        element.text.get_or_insert_with(String::new).push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::parse;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:gdacs="http://www.gdacs.org" xmlns:geo="http://www.w3.org/2003/01/geo/wgs84_pos#" version="2.0">
  <channel>
    <title>GDACS &amp; friends</title>
    <item>
      <description><![CDATA[<b>bold</b> text]]></description>
      <gdacs:severity unit="km/h" value="120">Wind &#38; rain</gdacs:severity>
      <gdacs:resource><gdacs:severity value="nested"/></gdacs:resource>
      <empty/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_resolves_namespaces_and_text() {
        let root = parse(DOCUMENT.as_bytes()).unwrap();
        assert_eq!(root.name, "rss");
        assert_eq!(root.attribute("version"), Some("2.0"));

        let channel = root.child("channel").unwrap();
        assert_eq!(channel.child("title").unwrap().text.as_deref(), Some("GDACS & friends"));

        let item = root.descendant(None, "item").unwrap();
        assert_eq!(
            item.child("description").unwrap().text.as_deref(),
            Some("<b>bold</b> text")
        );
        let severity = item.descendant(Some("http://www.gdacs.org"), "severity").unwrap();
        assert_eq!(severity.attribute("unit"), Some("km/h"));
        assert_eq!(severity.text.as_deref(), Some("Wind & rain"));
        assert_eq!(
            item.descendants(Some("http://www.gdacs.org"), "severity").len(),
            2
        );
        assert_eq!(item.child("empty").unwrap().text, None);
    }

    #[test]
    fn test_namespace_must_match() {
        let root = parse(DOCUMENT.as_bytes()).unwrap();
        let item = root.descendant(None, "item").unwrap();
        assert!(item.descendant(None, "severity").is_none());
        assert!(item.child("severity").is_none());
    }

    #[test]
    fn test_text_is_decoded_not_replaced() {
        let root = parse("<country>Côte d’Ivoire</country>".as_bytes()).unwrap();
        assert_eq!(root.text.as_deref(), Some("Côte d’Ivoire"));
        assert!(parse(b"<country>C\xf4te</country>").is_err());
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(parse(b"<rss><channel></rss>").is_err());
        assert!(parse(b"<rss><channel>").is_err());
        assert!(parse(b"").is_err());
    }
}
