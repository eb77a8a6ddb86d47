//! Structure expansion
//!
//! Expands an IED element into the signal tree:
//! IED → LDevice → LN → DO → SDO* → DA → BDA*, resolving every type id
//! against the DataTypeTemplates tables. Terminal scalar attributes become
//! signals addressed `ldInst/LN.DO[.SDO]*.DA[.BDA]*`.

use scout_model::{AccessMode, Node, Signal, SignalType};
use tracing::{debug, warn};

use crate::communication::find_gse;
use crate::dataset::{logical_nodes, ln_name, resolve_dataset, DataSetDef};
use crate::templates::{AttributeDef, DataTypeTemplates, DoEntry};
use crate::xml::XmlElement;

/// Root name when the file is missing or unreadable
pub const ERROR_NO_SCD: &str = "Error_No_SCD";
/// Root name when the document holds no matching IED
pub const IED_NOT_FOUND: &str = "IED_Not_Found";
/// Root name when the document is not well-formed SCL
pub const ERROR_SCD_PARSE: &str = "Error_SCD_Parse";

/// Nesting limit for DO/SDO/DA/BDA expansion; deeper chains are cyclic
const MAX_DEPTH: usize = 16;

/// Functional constraints whose attributes are writable
const WRITABLE_FCS: &[&str] = &["CO", "SP", "SE", "CF", "DC", "SV"];

/// IEDs declared at the top level of an SCL document
pub fn ied_elements(root: &XmlElement) -> Vec<&XmlElement> {
    root.children_named("IED").collect()
}

/// Pick the IED to expand
///
/// Exact name match when a name is given. Otherwise the first IED that
/// actually contains LDevices, falling back to the first IED present.
pub fn select_ied<'a>(root: &'a XmlElement, ied_name: Option<&str>) -> Option<&'a XmlElement> {
    let ieds = ied_elements(root);
    match ied_name {
        Some(name) => ieds.into_iter().find(|ied| ied.attr("name") == Some(name)),
        None => ieds
            .iter()
            .find(|ied| ied.has_descendant("LDevice"))
            .or(ieds.first())
            .copied(),
    }
}

/// Build the signal tree of one IED
pub fn build_structure(root: &XmlElement, templates: &DataTypeTemplates, ied_name: Option<&str>) -> Node {
    if root.name != "SCL" {
        warn!("Document root is <{}>, not <SCL>", root.name);
        return Node::error(ERROR_SCD_PARSE);
    }

    let Some(ied) = select_ied(root, ied_name) else {
        warn!("IED not found: {}", ied_name.unwrap_or("<first>"));
        return Node::error(IED_NOT_FOUND);
    };

    let ied_name = ied.attr_or_empty("name");
    let description = ied.attr("desc").unwrap_or("Offline IED from SCL");
    let mut ied_node = Node::new(ied_name, description);

    let expander = Expander { templates };

    for ap in ied.children_named("AccessPoint") {
        let ap_name = ap.attr("name");
        for ld in ap.descendants_named("LDevice") {
            ied_node
                .children
                .push(expander.logical_device(root, ied_name, ap_name, ld));
        }
    }

    debug!(
        "Expanded IED {}: {} logical devices, {} signals",
        ied_name,
        ied_node.children.len(),
        ied_node.signal_count()
    );
    ied_node
}

struct Expander<'t> {
    templates: &'t DataTypeTemplates,
}

impl Expander<'_> {
    fn logical_device(&self, root: &XmlElement, ied_name: &str, ap_name: Option<&str>, ld: &XmlElement) -> Node {
        let ld_inst = ld.attr_or_empty("inst");
        let mut ld_node = Node::new(format!("{}{}", ied_name, ld_inst), "Logical Device");
        let ln0 = ld.child("LN0");

        for ln in logical_nodes(ld) {
            let name = ln_name(ln);
            let ln_class = ln.attr_or_empty("lnClass");
            let mut ln_node = Node::new(name.clone(), format!("{} Node", ln_class));

            if let Some(ln_type) = ln.attr("lnType") {
                self.expand_ln_type(&mut ln_node, ln_type, &format!("{}/{}", ld_inst, name));
            }

            let datasets: Vec<Node> = ln
                .children_named("DataSet")
                .map(|ds| dataset_node(&DataSetDef::from_element(ds)))
                .collect();
            if !datasets.is_empty() {
                let mut branch = Node::new("DataSets", "Container");
                branch.children = datasets;
                ln_node.children.push(branch);
            }

            let reports: Vec<Node> = ln
                .children_named("ReportControl")
                .map(|rpt| report_node(rpt, ln, ln0))
                .collect();
            if !reports.is_empty() {
                let mut branch = Node::new("Reports", "Container");
                branch.children = reports;
                ln_node.children.push(branch);
            }

            let gooses: Vec<Node> = ln
                .children_named("GSEControl")
                .map(|gse| {
                    let comm = find_gse(root, ied_name, ap_name, ld_inst, gse.attr_or_empty("name"));
                    goose_node(gse, comm, ln, ln0)
                })
                .collect();
            if !gooses.is_empty() {
                let mut branch = Node::new("GOOSE", "Container");
                branch.children = gooses;
                ln_node.children.push(branch);
            }

            ld_node.children.push(ln_node);
        }

        ld_node
    }

    fn expand_ln_type(&self, ln_node: &mut Node, ln_type: &str, path: &str) {
        let Some(lnode_type) = self.templates.lnode_types.get(ln_type) else {
            debug!("LNodeType {} not found for {}", ln_type, path);
            return;
        };

        for data_object in &lnode_type.data_objects {
            let do_path = format!("{}.{}", path, data_object.name);
            let mut do_node = Node::new(data_object.name.clone(), "Data Object");
            self.expand_do_type(&mut do_node, &data_object.type_id, &do_path, 1);
            ln_node.children.push(do_node);
        }
    }

    fn expand_do_type(&self, node: &mut Node, type_id: &str, path: &str, depth: usize) {
        if depth > MAX_DEPTH {
            warn!("Template nesting exceeds {} levels at {}, truncating", MAX_DEPTH, path);
            return;
        }
        let Some(do_type) = self.templates.do_types.get(type_id) else {
            debug!("DOType {} not found for {}", type_id, path);
            return;
        };

        for entry in &do_type.entries {
            match entry {
                DoEntry::Attribute(da) => {
                    let fc = da.fc.as_deref().unwrap_or("");
                    self.expand_attribute(node, da, fc, path, depth + 1);
                }
                DoEntry::SubObject { name, type_id } => {
                    let mut sdo_node = Node::new(name.clone(), "Sub Data Object");
                    self.expand_do_type(&mut sdo_node, type_id, &format!("{}.{}", path, name), depth + 1);
                    node.children.push(sdo_node);
                }
            }
        }
    }

    fn expand_attribute(&self, parent: &mut Node, attr: &AttributeDef, fc: &str, path: &str, depth: usize) {
        let address = format!("{}.{}", path, attr.name);

        if !attr.is_struct() {
            parent.signals.push(self.make_signal(attr, fc, address));
            return;
        }

        let mut branch = Node::new(attr.name.clone(), format!("FC={} Type=Struct", fc));
        if depth > MAX_DEPTH {
            warn!("Template nesting exceeds {} levels at {}, truncating", MAX_DEPTH, address);
        } else if let Some(da_type) = attr
            .type_id
            .as_deref()
            .and_then(|id| self.templates.da_types.get(id))
        {
            for bda in &da_type.attributes {
                let bda_fc = bda.fc.as_deref().unwrap_or(fc);
                self.expand_attribute(&mut branch, bda, bda_fc, &address, depth + 1);
            }
        }

        // A struct that expands to nothing is kept as a single leaf
        if branch.is_empty() {
            parent.signals.push(self.make_signal(attr, fc, address));
        } else {
            parent.children.push(branch);
        }
    }

    fn make_signal(&self, attr: &AttributeDef, fc: &str, address: String) -> Signal {
        let mut signal = Signal::new(attr.name.clone(), address)
            .with_fc(fc)
            .with_type(classify(&attr.b_type, fc, &attr.name))
            .with_access(access_for_fc(fc))
            .with_description(format!("FC={} Type={}", fc, attr.b_type));

        if let Some(map) = attr
            .type_id
            .as_deref()
            .and_then(|id| self.templates.enum_map(id))
        {
            signal = signal.with_enum_map(map.clone());
        }
        signal
    }
}

/// Signal type from basic type, FC and attribute name
pub fn classify(b_type: &str, fc: &str, name: &str) -> SignalType {
    if fc == "CO" {
        return SignalType::Command;
    }
    match b_type {
        "BOOLEAN" => SignalType::Binary,
        "Dbpos" => SignalType::DoubleBinary,
        "Timestamp" => SignalType::Timestamp,
        "Enum" => SignalType::State,
        t if t.starts_with("INT") && matches!(name, "actVal" | "frVal") => SignalType::Counter,
        _ => SignalType::Analog,
    }
}

pub fn access_for_fc(fc: &str) -> AccessMode {
    if WRITABLE_FCS.contains(&fc) {
        AccessMode::ReadWrite
    } else {
        AccessMode::ReadOnly
    }
}

fn dataset_node(ds: &DataSetDef) -> Node {
    let mut node = Node::new(ds.name.clone(), "Type=DataSet");
    node.children = ds
        .members
        .iter()
        .map(|m| Node::new(m.label(), "Type=FCDA"))
        .collect();
    node
}

fn detail(name: &str, value: &str) -> Node {
    Node::new(name, value)
}

fn report_node(rpt: &XmlElement, ln: &XmlElement, ln0: Option<&XmlElement>) -> Node {
    let rpt_id = rpt.attr_or_empty("rptID");
    let dataset = rpt.attr_or_empty("datSet");
    let buffered = rpt.attr("buffered").unwrap_or("false");

    let mut node = Node::new(
        rpt.attr_or_empty("name"),
        format!("RptID={} DataSet={} Buf={} Type=Report", rpt_id, dataset, buffered),
    );
    node.children.push(detail("RptID", rpt_id));
    node.children.push(detail("DataSet", dataset));
    node.children.push(detail("Buffered", buffered));
    node.children.push(detail("BufTime", rpt.attr("bufTime").unwrap_or("0")));
    node.children.push(detail("IntgPd", rpt.attr("intgPd").unwrap_or("0")));
    if let Some(ds) = resolve_dataset(ln, ln0, dataset) {
        node.children.push(dataset_node(&ds));
    }
    node
}

fn goose_node(gse: &XmlElement, comm: Option<&XmlElement>, ln: &XmlElement, ln0: Option<&XmlElement>) -> Node {
    let app_id = gse.attr_or_empty("appID");
    let dataset = gse.attr_or_empty("datSet");

    let mut node = Node::new(
        gse.attr_or_empty("name"),
        format!("AppID={} DataSet={} Type=GOOSE", app_id, dataset),
    );
    node.children.push(detail("AppID", app_id));
    node.children.push(detail("DataSet", dataset));
    node.children.push(detail("ConfRev", gse.attr_or_empty("confRev")));
    if let Some(comm) = comm {
        for timer in ["MinTime", "MaxTime"] {
            if let Some(t) = comm.child(timer) {
                node.children.push(detail(timer, t.text.trim()));
            }
        }
    }
    if let Some(ds) = resolve_dataset(ln, ln0, dataset) {
        node.children.push(dataset_node(&ds));
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SAMPLE;
    use crate::xml::XmlDocument;

    fn structure(ied: Option<&str>) -> Node {
        let doc = XmlDocument::parse_str(SAMPLE).unwrap();
        let templates = DataTypeTemplates::from_root(&doc.root);
        build_structure(&doc.root, &templates, ied)
    }

    #[test]
    fn test_end_to_end_enum_signal() {
        let root = structure(Some("IED1"));
        assert_eq!(root.name, "IED1");
        assert_eq!(root.children.len(), 1);
        assert!(root.children[0].name.contains("LD1"));

        let stval = root.find_signal("LD1/XCBR1.Beh.stVal").unwrap();
        let map = stval.enum_map.as_ref().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&1], "ON");
        assert_eq!(stval.signal_type, SignalType::State);
        assert_eq!(stval.fc, "ST");
        assert_eq!(stval.description.as_deref(), Some("FC=ST Type=Enum"));
    }

    #[test]
    fn test_nested_ied_is_not_selected() {
        let doc = XmlDocument::parse_str(
            r#"<SCL>
                <Private><IED name="GHOST"><AccessPoint name="S1"><Server><LDevice inst="LD1"/></Server></AccessPoint></IED></Private>
                <IED name="REAL"/>
            </SCL>"#,
        )
        .unwrap();

        assert_eq!(ied_elements(&doc.root).len(), 1);
        assert_eq!(select_ied(&doc.root, None).and_then(|ied| ied.attr("name")), Some("REAL"));
        assert!(select_ied(&doc.root, Some("GHOST")).is_none());
    }

    #[test]
    fn test_default_ied_skips_empty() {
        let root = structure(None);
        assert_eq!(root.name, "IED1");
    }

    #[test]
    fn test_unknown_ied() {
        let root = structure(Some("NOPE"));
        assert_eq!(root.name, IED_NOT_FOUND);
        assert!(root.is_error());
    }

    #[test]
    fn test_struct_expansion_and_collapse() {
        let root = structure(Some("IED1"));

        let ctl_val = root.find_signal("LD1/XCBR1.Pos.Oper.ctlVal").unwrap();
        assert_eq!(ctl_val.fc, "CO");
        assert_eq!(ctl_val.signal_type, SignalType::Command);
        assert_eq!(ctl_val.access, AccessMode::ReadWrite);

        let or_cat = root.find_signal("LD1/XCBR1.Pos.Oper.origin.orCat").unwrap();
        assert_eq!(or_cat.enum_map.as_ref().unwrap()[&2], "station-control");

        // Unresolvable struct collapses to a leaf
        let pulse = root.find_signal("LD1/XCBR1.Pos.pulse").unwrap();
        assert_eq!(pulse.access, AccessMode::ReadWrite);

        let ld = &root.children[0];
        let xcbr = ld.find_child("XCBR1").unwrap();
        let pos = xcbr.find_child("Pos").unwrap();
        assert!(pos.find_child("Oper").is_some());
        assert!(pos.find_child("pulse").is_none());
    }

    #[test]
    fn test_cyclic_sdo_is_truncated() {
        let root = structure(Some("IED1"));
        let xcbr = root.children[0].find_child("XCBR1").unwrap();
        let mut depth = 0;
        let mut node = xcbr.find_child("Loop").unwrap();
        while let Some(next) = node.find_child("again") {
            node = next;
            depth += 1;
        }
        assert!(depth > 0 && depth <= MAX_DEPTH);
    }

    #[test]
    fn test_control_blocks_resolve_ln0_dataset() {
        let root = structure(Some("IED1"));
        let ld = &root.children[0];

        let lln0 = ld.find_child("LLN0").unwrap();
        assert_eq!(lln0.find_child("DataSets").unwrap().children.len(), 1);

        let gcb = lln0.find_child("GOOSE").unwrap().find_child("GCB1").unwrap();
        assert_eq!(gcb.find_child("MinTime").unwrap().description, "4");
        assert_eq!(gcb.find_child("ConfRev").unwrap().description, "3");

        let rcb2 = ld
            .find_child("XCBR1")
            .unwrap()
            .find_child("Reports")
            .unwrap()
            .find_child("RCB2")
            .unwrap();
        let ds = rcb2.find_child("DS1").unwrap();
        assert_eq!(ds.children[0].name, "LD1/XCBR1.Pos.stVal [ST]");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("BOOLEAN", "ST", "stVal"), SignalType::Binary);
        assert_eq!(classify("BOOLEAN", "CO", "ctlVal"), SignalType::Command);
        assert_eq!(classify("INT32", "ST", "actVal"), SignalType::Counter);
        assert_eq!(classify("FLOAT32", "MX", "f"), SignalType::Analog);
        assert_eq!(access_for_fc("MX"), AccessMode::ReadOnly);
        assert_eq!(access_for_fc("SP"), AccessMode::ReadWrite);
    }
}
