//! DataTypeTemplates tables
//!
//! The four keyed tables of the `DataTypeTemplates` section. LNodeType,
//! DOType and DAType hold element definitions consumed during expansion;
//! EnumType entries are resolved straight into ordinal to label maps.

use std::collections::HashMap;

use scout_model::EnumMap;

use crate::xml::XmlElement;

/// A `DA` or `BDA` definition
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub name: String,
    /// Functional constraint; BDAs inherit theirs from the enclosing DA
    pub fc: Option<String>,
    pub b_type: String,
    /// Referenced DAType (for `Struct`) or EnumType (for `Enum`)
    pub type_id: Option<String>,
}

impl AttributeDef {
    fn from_element(element: &XmlElement) -> Self {
        Self {
            name: element.attr_or_empty("name").to_string(),
            fc: element.attr("fc").map(str::to_string),
            b_type: element.attr_or_empty("bType").to_string(),
            type_id: element.attr("type").map(str::to_string),
        }
    }

    pub fn is_struct(&self) -> bool {
        self.b_type == "Struct"
    }
}

/// An entry of a DOType, kept in document order
#[derive(Debug, Clone, PartialEq)]
pub enum DoEntry {
    Attribute(AttributeDef),
    SubObject { name: String, type_id: String },
}

/// A `DO` reference inside an LNodeType
#[derive(Debug, Clone, PartialEq)]
pub struct DataObjectRef {
    pub name: String,
    pub type_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LNodeType {
    pub id: String,
    pub ln_class: String,
    pub data_objects: Vec<DataObjectRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoType {
    pub id: String,
    pub cdc: String,
    pub entries: Vec<DoEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaType {
    pub id: String,
    pub attributes: Vec<AttributeDef>,
}

/// The DataTypeTemplates section, keyed by template id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTypeTemplates {
    pub lnode_types: HashMap<String, LNodeType>,
    pub do_types: HashMap<String, DoType>,
    pub da_types: HashMap<String, DaType>,
    pub enum_types: HashMap<String, EnumMap>,
}

impl DataTypeTemplates {
    /// Build the tables from the document root
    ///
    /// A document without a DataTypeTemplates section yields empty tables.
    pub fn from_root(root: &XmlElement) -> Self {
        match root.child("DataTypeTemplates") {
            Some(section) => Self::from_section(section),
            None => Self::default(),
        }
    }

    fn from_section(section: &XmlElement) -> Self {
        let mut templates = Self::default();

        for element in &section.children {
            let Some(id) = element.attr("id") else {
                continue;
            };
            let id = id.to_string();

            match element.name.as_str() {
                "LNodeType" => {
                    let data_objects = element
                        .children_named("DO")
                        .map(|d| DataObjectRef {
                            name: d.attr_or_empty("name").to_string(),
                            type_id: d.attr_or_empty("type").to_string(),
                        })
                        .collect();
                    templates.lnode_types.insert(
                        id.clone(),
                        LNodeType {
                            id,
                            ln_class: element.attr_or_empty("lnClass").to_string(),
                            data_objects,
                        },
                    );
                }
                "DOType" => {
                    let entries = element
                        .children
                        .iter()
                        .filter_map(|c| match c.name.as_str() {
                            "DA" => Some(DoEntry::Attribute(AttributeDef::from_element(c))),
                            "SDO" => Some(DoEntry::SubObject {
                                name: c.attr_or_empty("name").to_string(),
                                type_id: c.attr_or_empty("type").to_string(),
                            }),
                            _ => None,
                        })
                        .collect();
                    templates.do_types.insert(
                        id.clone(),
                        DoType {
                            id,
                            cdc: element.attr_or_empty("cdc").to_string(),
                            entries,
                        },
                    );
                }
                "DAType" => {
                    let attributes = element
                        .children_named("BDA")
                        .map(AttributeDef::from_element)
                        .collect();
                    templates
                        .da_types
                        .insert(id.clone(), DaType { id, attributes });
                }
                "EnumType" => {
                    let map = element
                        .children_named("EnumVal")
                        .filter_map(|v| {
                            let ord = v.attr("ord")?.trim().parse::<i32>().ok()?;
                            Some((ord, v.text.clone()))
                        })
                        .collect::<EnumMap>();
                    templates.enum_types.insert(id, map);
                }
                _ => {}
            }
        }

        templates
    }

    /// Enum map for a `type` id, if the id names an EnumType
    pub fn enum_map(&self, type_id: &str) -> Option<&EnumMap> {
        self.enum_types.get(type_id)
    }

    pub fn len(&self) -> usize {
        self.lnode_types.len() + self.do_types.len() + self.da_types.len() + self.enum_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
