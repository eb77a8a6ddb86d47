//! GOOSE publisher/subscriber map
//!
//! Publishers come from every GSEControl, keyed by (IED, access point,
//! LDevice, control block) and cross-referenced with the Communication
//! section. Subscribers come from GOOSE `ExtRef` entries under LN `Inputs`.

use serde::Serialize;

use crate::communication::{address_params, find_connected_ap, find_gse};
use crate::dataset::{logical_nodes, ln_name, resolve_dataset, FcdaRef};
use crate::structure::ied_elements;
use crate::xml::XmlElement;

/// One row of the GOOSE export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GooseRow {
    #[serde(rename = "Item")]
    pub item: usize,
    #[serde(rename = "Subnetwork Name")]
    pub subnetwork: String,
    #[serde(rename = "Source IED Name")]
    pub source_ied: String,
    #[serde(rename = "Source AP")]
    pub source_ap: String,
    #[serde(rename = "Source LDevice")]
    pub source_ldevice: String,
    #[serde(rename = "Source IP Address")]
    pub source_ip: String,
    #[serde(rename = "Source Subnet")]
    pub source_subnet: String,
    #[serde(rename = "Source MAC Address")]
    pub source_mac: String,
    #[serde(rename = "Source VLAN-ID")]
    pub source_vlan_id: String,
    #[serde(rename = "Source APPID")]
    pub source_app_id: String,
    #[serde(rename = "Source MinTime")]
    pub source_min_time: String,
    #[serde(rename = "Source MaxTime")]
    pub source_max_time: String,
    #[serde(rename = "Source DataSet")]
    pub source_dataset: String,
    #[serde(rename = "DataSet Size")]
    pub dataset_size: usize,
    #[serde(rename = "Source ConfRev")]
    pub source_conf_rev: String,
    #[serde(rename = "Source ControlBlock")]
    pub source_control_block: String,
    #[serde(rename = "Source LogicalNode")]
    pub source_logical_node: String,
    #[serde(rename = "Source DataAttribute")]
    pub source_data_attribute: String,
    #[serde(rename = "Source Tag")]
    pub source_tag: String,
    #[serde(rename = "Destination IED Name")]
    pub destination_ied: String,
    #[serde(rename = "Destination AP")]
    pub destination_ap: String,
    #[serde(rename = "Destination LDevice")]
    pub destination_ldevice: String,
    #[serde(rename = "Destination IP Address")]
    pub destination_ip: String,
    #[serde(rename = "Destination Subnet")]
    pub destination_subnet: String,
    #[serde(rename = "Destination MAC Address")]
    pub destination_mac: String,
    #[serde(rename = "Destination LogicalNode")]
    pub destination_logical_node: String,
    #[serde(rename = "Destination ServiceType")]
    pub destination_service_type: String,
    #[serde(rename = "Destination Tag")]
    pub destination_tag: String,
}

/// A GSEControl with its resolved DataSet and communication parameters
#[derive(Debug, Clone, Default)]
struct Publisher {
    ied: String,
    ap: String,
    ld_inst: String,
    cb_name: String,
    ln: String,
    dataset: String,
    members: Vec<FcdaRef>,
    conf_rev: String,
    subnetwork: String,
    ip: String,
    subnet: String,
    mac: String,
    vlan_id: String,
    app_id: String,
    min_time: String,
    max_time: String,
}

impl Publisher {
    fn row(&self) -> GooseRow {
        GooseRow {
            subnetwork: self.subnetwork.clone(),
            source_ied: self.ied.clone(),
            source_ap: self.ap.clone(),
            source_ldevice: self.ld_inst.clone(),
            source_ip: self.ip.clone(),
            source_subnet: self.subnet.clone(),
            source_mac: self.mac.clone(),
            source_vlan_id: self.vlan_id.clone(),
            source_app_id: self.app_id.clone(),
            source_min_time: self.min_time.clone(),
            source_max_time: self.max_time.clone(),
            source_dataset: self.dataset.clone(),
            dataset_size: self.members.len(),
            source_conf_rev: self.conf_rev.clone(),
            source_control_block: self.cb_name.clone(),
            source_logical_node: self.ln.clone(),
            ..Default::default()
        }
    }

    fn matches(&self, ied: &str, ld_inst: &str, cb_name: &str) -> bool {
        self.ied == ied && self.ld_inst == ld_inst && self.cb_name == cb_name
    }

    /// Whether the DataSet carries the referenced data (no control block named)
    fn publishes(&self, ext_ref: &XmlElement) -> bool {
        self.members.iter().any(|m| {
            m.ld_inst == ext_ref.attr_or_empty("ldInst")
                && m.ln_class == ext_ref.attr_or_empty("lnClass")
                && m.ln_inst == ext_ref.attr_or_empty("lnInst")
                && m.do_name == ext_ref.attr_or_empty("doName")
        })
    }
}

/// Every logical node of every IED with its IED, access point and LDevice
fn each_ln(root: &XmlElement) -> Vec<(&str, &str, &XmlElement, &XmlElement)> {
    let mut out = Vec::new();
    for ied in ied_elements(root) {
        let ied_name = ied.attr_or_empty("name");
        for ap in ied.children_named("AccessPoint") {
            let ap_name = ap.attr_or_empty("name");
            for ld in ap.descendants_named("LDevice") {
                for ln in logical_nodes(ld) {
                    out.push((ied_name, ap_name, ld, ln));
                }
            }
        }
    }
    out
}

fn text_of(element: Option<&XmlElement>, name: &str) -> String {
    element
        .and_then(|e| e.child(name))
        .map(|e| e.text.trim().to_string())
        .unwrap_or_default()
}

fn publishers(root: &XmlElement) -> Vec<Publisher> {
    let mut out = Vec::new();

    for (ied, ap, ld, ln) in each_ln(root) {
        let ld_inst = ld.attr_or_empty("inst");
        let ln0 = ld.child("LN0");

        for gse in ln.children_named("GSEControl") {
            let cb_name = gse.attr_or_empty("name");
            let dataset = gse.attr_or_empty("datSet");
            let members = resolve_dataset(ln, ln0, dataset)
                .map(|ds| ds.members)
                .unwrap_or_default();

            let (subnetwork, ap_params) = match find_connected_ap(root, ied, Some(ap)) {
                Some((net, cap)) => (net.to_string(), address_params(cap.child("Address"))),
                None => (String::new(), Default::default()),
            };
            let comm = find_gse(root, ied, Some(ap), ld_inst, cb_name);
            let gse_params = address_params(comm.and_then(|g| g.child("Address")));
            let param = |key: &str| gse_params.get(key).cloned().unwrap_or_default();

            out.push(Publisher {
                ied: ied.to_string(),
                ap: ap.to_string(),
                ld_inst: ld_inst.to_string(),
                cb_name: cb_name.to_string(),
                ln: ln_name(ln),
                dataset: dataset.to_string(),
                members,
                conf_rev: gse.attr_or_empty("confRev").to_string(),
                subnetwork,
                ip: ap_params.get("IP").cloned().unwrap_or_default(),
                subnet: ap_params.get("IP-SUBNET").cloned().unwrap_or_default(),
                mac: param("MAC-Address"),
                vlan_id: param("VLAN-ID"),
                app_id: param("APPID"),
                min_time: text_of(comm, "MinTime"),
                max_time: text_of(comm, "MaxTime"),
            });
        }
    }

    out
}

/// Build the GOOSE map
///
/// One row per GOOSE subscription joined to its publisher. A document that
/// defines GOOSE control blocks but no subscribers yields one row per
/// published DataSet member instead, so the export is never empty.
pub fn extract_goose_map(root: &XmlElement) -> Vec<GooseRow> {
    let publishers = publishers(root);
    let mut rows = Vec::new();

    for (ied, ap, ld, ln) in each_ln(root) {
        for ext_ref in ln
            .children_named("Inputs")
            .flat_map(|inputs| inputs.children_named("ExtRef"))
            .filter(|e| e.attr("serviceType") == Some("GOOSE"))
        {
            let src_ied = ext_ref.attr_or_empty("iedName");
            let src_ld = ext_ref
                .attr("srcLDInst")
                .unwrap_or_else(|| ext_ref.attr_or_empty("ldInst"));
            let publisher = match ext_ref.attr("srcCBName") {
                Some(cb) => publishers.iter().find(|p| p.matches(src_ied, src_ld, cb)),
                None => publishers
                    .iter()
                    .find(|p| p.ied == src_ied && p.publishes(ext_ref)),
            };

            let mut row = publisher.map(Publisher::row).unwrap_or_else(|| GooseRow {
                source_ied: src_ied.to_string(),
                source_ldevice: src_ld.to_string(),
                source_control_block: ext_ref.attr_or_empty("srcCBName").to_string(),
                ..Default::default()
            });

            let source_ln = format!(
                "{}{}{}",
                ext_ref.attr_or_empty("prefix"),
                ext_ref.attr_or_empty("lnClass"),
                ext_ref.attr_or_empty("lnInst")
            );
            let fcda = FcdaRef {
                ld_inst: ext_ref.attr_or_empty("ldInst").to_string(),
                do_name: ext_ref.attr_or_empty("doName").to_string(),
                da_name: ext_ref.attr_or_empty("daName").to_string(),
                ..Default::default()
            };
            row.source_logical_node = source_ln.clone();
            row.source_data_attribute = fcda.data_attribute();
            row.source_tag = format!("{}{}/{}.{}", src_ied, fcda.ld_inst, source_ln, fcda.data_attribute());

            let dest = find_connected_ap(root, ied, Some(ap))
                .map(|(_, cap)| address_params(cap.child("Address")))
                .unwrap_or_default();
            row.destination_ied = ied.to_string();
            row.destination_ap = ap.to_string();
            row.destination_ldevice = ld.attr_or_empty("inst").to_string();
            row.destination_ip = dest.get("IP").cloned().unwrap_or_default();
            row.destination_subnet = dest.get("IP-SUBNET").cloned().unwrap_or_default();
            row.destination_mac = dest.get("MAC-Address").cloned().unwrap_or_default();
            row.destination_logical_node = ln_name(ln);
            row.destination_service_type = "GOOSE".to_string();
            row.destination_tag = ext_ref
                .attr("intAddr")
                .or_else(|| ext_ref.attr("desc"))
                .unwrap_or("")
                .to_string();

            rows.push(row);
        }
    }

    if rows.is_empty() {
        for publisher in &publishers {
            if publisher.members.is_empty() {
                rows.push(publisher.row());
                continue;
            }
            for member in &publisher.members {
                let mut row = publisher.row();
                row.source_logical_node = member.ln_name();
                row.source_data_attribute = member.data_attribute();
                row.source_tag = format!(
                    "{}{}/{}.{}",
                    publisher.ied,
                    member.ld_inst,
                    member.ln_name(),
                    member.data_attribute()
                );
                rows.push(row);
            }
        }
    }

    for (index, row) in rows.iter_mut().enumerate() {
        row.item = index + 1;
    }
    rows
}
