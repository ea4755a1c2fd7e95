//! Labeling-config schema index.
//!
//! A Label Studio project ships an XML labeling config that declares which
//! control tags produce annotations (`<RectangleLabels>`, `<Choices>`, ...)
//! and which object tags they apply to (`<Image>`, `<Text>`, ...). The same
//! JSON result shape means different things depending on the configured tag
//! type, so the config is parsed once into a lookup from
//! `(from_name, to_name)` to a typed [`SchemaEntry`], and every raw result is
//! resolved through that index before any emission happens.

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::Node;

use crate::error::ConvertError;

/// The kind of annotation a control tag produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
    /// Classification choices (`<Choices>`).
    Choices,
    /// Percent-space bounding boxes (`<RectangleLabels>`).
    Rectangle,
    /// Percent-space polygons (`<PolygonLabels>`).
    Polygon,
    /// RLE-compressed brush masks (`<BrushLabels>`).
    BrushMask,
    /// Labeled text spans (`<Labels>`).
    Labels,
}

impl TagKind {
    fn from_tag_name(name: &str) -> Option<Self> {
        match name {
            "Choices" => Some(TagKind::Choices),
            "RectangleLabels" => Some(TagKind::Rectangle),
            "PolygonLabels" => Some(TagKind::Polygon),
            "BrushLabels" => Some(TagKind::BrushMask),
            "Labels" => Some(TagKind::Labels),
            _ => None,
        }
    }

    /// Human-readable name used in messages and reports.
    pub fn name(&self) -> &'static str {
        match self {
            TagKind::Choices => "choices",
            TagKind::Rectangle => "rectanglelabels",
            TagKind::Polygon => "polygonlabels",
            TagKind::BrushMask => "brushlabels",
            TagKind::Labels => "labels",
        }
    }
}

/// One annotation-producing control tag from the labeling config.
#[derive(Clone, Debug)]
pub struct SchemaEntry {
    /// `name` attribute of the control tag.
    pub from_name: String,
    /// `toName` attribute: the object tag the control annotates.
    pub to_name: String,
    /// What kind of annotation this tag produces.
    pub kind: TagKind,
    /// `value` attributes of the child `<Label>`/`<Choice>` elements.
    pub labels: BTreeSet<String>,
    /// Task-data field the annotated object reads from (`<Image value="$image"/>`).
    pub data_key: Option<String>,
    /// Nesting depth in the config; deeper entries win `from_name` collisions.
    depth: usize,
}

/// Lookup table from `(from_name, to_name)` to schema entries.
#[derive(Clone, Debug, Default)]
pub struct SchemaIndex {
    entries: Vec<SchemaEntry>,
    by_names: BTreeMap<(String, String), usize>,
}

impl SchemaIndex {
    /// Parse a labeling config and build the index.
    ///
    /// Fails with [`ConvertError::Config`] when the XML is malformed or a
    /// recognized control tag is missing its `name`/`toName` attributes.
    /// Unrecognized tags are logged and skipped; display-only tags are common
    /// in real configs.
    pub fn build(config_xml: &str) -> Result<Self, ConvertError> {
        let document = roxmltree::Document::parse(config_xml)
            .map_err(|source| ConvertError::Config(source.to_string()))?;

        let mut object_values: BTreeMap<String, String> = BTreeMap::new();
        collect_object_values(document.root_element(), &mut object_values);

        let mut index = SchemaIndex::default();
        collect_control_tags(document.root_element(), 0, &object_values, &mut index)?;

        if index.entries.is_empty() {
            log::warn!("labeling config declares no annotation-producing control tags");
        }

        Ok(index)
    }

    /// Resolve a raw result's `(from_name, to_name)` pair to a schema entry.
    pub fn lookup(&self, from_name: &str, to_name: &str) -> Option<&SchemaEntry> {
        self.by_names
            .get(&(from_name.to_string(), to_name.to_string()))
            .map(|&idx| &self.entries[idx])
    }

    /// All entries, in document order.
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// All entries of one kind, in document order.
    pub fn entries_of_kind(&self, kind: TagKind) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }

    fn insert(&mut self, entry: SchemaEntry) {
        let key = (entry.from_name.clone(), entry.to_name.clone());
        match self.by_names.get(&key) {
            // Same (from, to) pair declared twice: the deeper-nested tag is
            // the more specific one and wins.
            Some(&existing) => {
                if self.entries[existing].depth < entry.depth {
                    self.entries[existing] = entry;
                }
            }
            None => {
                self.entries.push(entry);
                self.by_names.insert(key, self.entries.len() - 1);
            }
        }
    }
}

/// Object tags whose `value` attribute names the task-data field they render.
const OBJECT_TAGS: &[&str] = &["Image", "Text", "HyperText", "Audio", "TimeSeries"];

fn collect_object_values(node: Node<'_, '_>, out: &mut BTreeMap<String, String>) {
    for child in node.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        if OBJECT_TAGS.contains(&tag) {
            if let (Some(name), Some(value)) = (child.attribute("name"), child.attribute("value")) {
                let key = value.strip_prefix('$').unwrap_or(value);
                out.insert(name.to_string(), key.to_string());
            }
        }
        collect_object_values(child, out);
    }
}

fn collect_control_tags(
    node: Node<'_, '_>,
    depth: usize,
    object_values: &BTreeMap<String, String>,
    index: &mut SchemaIndex,
) -> Result<(), ConvertError> {
    for child in node.children().filter(Node::is_element) {
        let tag = child.tag_name().name();

        if let Some(kind) = TagKind::from_tag_name(tag) {
            let from_name = child.attribute("name").ok_or_else(|| {
                ConvertError::Config(format!("<{tag}> is missing the 'name' attribute"))
            })?;
            let to_name = child.attribute("toName").ok_or_else(|| {
                ConvertError::Config(format!("<{tag} name=\"{from_name}\"> is missing 'toName'"))
            })?;

            let labels = child
                .children()
                .filter(Node::is_element)
                .filter(|label| matches!(label.tag_name().name(), "Label" | "Choice"))
                .filter_map(|label| label.attribute("value"))
                .map(ToString::to_string)
                .collect();

            index.insert(SchemaEntry {
                from_name: from_name.to_string(),
                to_name: to_name.to_string(),
                kind,
                labels,
                data_key: object_values.get(to_name).cloned(),
                depth,
            });
        } else if !OBJECT_TAGS.contains(&tag)
            && child.attribute("name").is_some()
            && child.attribute("toName").is_some()
        {
            // Looks like a control tag but is not one we emit for
            // (e.g. <TextArea>, <Rating>).
            log::warn!("ignoring unsupported control tag <{tag}> in labeling config");
        }

        collect_control_tags(child, depth + 1, object_values, index)?;
    }

    Ok(())
}
