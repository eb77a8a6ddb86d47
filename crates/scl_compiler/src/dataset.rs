//! DataSet membership
//!
//! DataSets are declared inside a logical node and referenced by name from
//! ReportControl/GSEControl blocks, frequently from a sibling of the LN0 that
//! declares them.

use crate::xml::XmlElement;

/// One `FCDA` member of a DataSet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FcdaRef {
    pub ld_inst: String,
    pub prefix: String,
    pub ln_class: String,
    pub ln_inst: String,
    pub do_name: String,
    pub da_name: String,
    pub fc: String,
}

impl FcdaRef {
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            ld_inst: element.attr_or_empty("ldInst").to_string(),
            prefix: element.attr_or_empty("prefix").to_string(),
            ln_class: element.attr_or_empty("lnClass").to_string(),
            ln_inst: element.attr_or_empty("lnInst").to_string(),
            do_name: element.attr_or_empty("doName").to_string(),
            da_name: element.attr_or_empty("daName").to_string(),
            fc: element.attr_or_empty("fc").to_string(),
        }
    }

    pub fn ln_name(&self) -> String {
        format!("{}{}{}", self.prefix, self.ln_class, self.ln_inst)
    }

    /// `doName[.daName]`
    pub fn data_attribute(&self) -> String {
        if self.da_name.is_empty() {
            self.do_name.clone()
        } else {
            format!("{}.{}", self.do_name, self.da_name)
        }
    }

    /// Display label: `ldInst/LN.do.da [FC]`
    pub fn label(&self) -> String {
        let reference = format!("{}.{} [{}]", self.ln_name(), self.data_attribute(), self.fc);
        if self.ld_inst.is_empty() {
            reference
        } else {
            format!("{}/{}", self.ld_inst, reference)
        }
    }
}

/// A resolved DataSet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSetDef {
    pub name: String,
    pub members: Vec<FcdaRef>,
}

impl DataSetDef {
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            name: element.attr_or_empty("name").to_string(),
            members: element
                .children_named("FCDA")
                .map(FcdaRef::from_element)
                .collect(),
        }
    }
}

/// Resolve a DataSet by name against the owning LN, then against LN0
pub fn resolve_dataset(ln: &XmlElement, ln0: Option<&XmlElement>, name: &str) -> Option<DataSetDef> {
    if name.is_empty() {
        return None;
    }
    let lookup = |owner: &XmlElement| {
        owner
            .children_named("DataSet")
            .find(|ds| ds.attr("name") == Some(name))
            .map(DataSetDef::from_element)
    };
    lookup(ln).or_else(|| ln0.and_then(lookup))
}

/// LN0 and LN elements of a logical device, in document order
pub fn logical_nodes(ld: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    ld.children
        .iter()
        .filter(|c| c.name == "LN0" || c.name == "LN")
}

/// Full LN name: `prefix + lnClass + inst`
pub fn ln_name(ln: &XmlElement) -> String {
    format!(
        "{}{}{}",
        ln.attr_or_empty("prefix"),
        ln.attr_or_empty("lnClass"),
        ln.attr_or_empty("inst")
    )
}
