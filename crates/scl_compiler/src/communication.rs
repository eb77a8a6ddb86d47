//! Communication section
//!
//! Network addressing of IEDs, read from SubNetwork/ConnectedAP entries.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::structure::ied_elements;
use crate::xml::XmlElement;

/// Address used for IEDs without a Communication entry
pub const DEFAULT_IP: &str = "127.0.0.1";
/// MMS port
pub const DEFAULT_PORT: &str = "102";

/// Network addressing of one IED access point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IedInfo {
    pub name: String,
    pub access_point: String,
    pub subnetwork: String,
    pub ip: String,
    pub port: String,
    pub subnet_mask: Option<String>,
    pub gateway: Option<String>,
    pub vlan_id: Option<String>,
    pub vlan_priority: Option<String>,
    pub mac_address: Option<String>,
    pub app_id: Option<String>,
}

impl IedInfo {
    fn loopback(name: &str, access_point: &str) -> Self {
        Self {
            name: name.to_string(),
            access_point: access_point.to_string(),
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT.to_string(),
            ..Default::default()
        }
    }
}

/// `<P type="...">` values of an `<Address>` element
pub(crate) fn address_params(address: Option<&XmlElement>) -> HashMap<String, String> {
    let Some(address) = address else {
        return HashMap::new();
    };
    address
        .children_named("P")
        .filter_map(|p| Some((p.attr("type")?.to_string(), p.text.trim().to_string())))
        .collect()
}

/// ConnectedAP elements with their SubNetwork name
pub(crate) fn connected_aps(root: &XmlElement) -> Vec<(&str, &XmlElement)> {
    let Some(communication) = root.child("Communication") else {
        return Vec::new();
    };
    communication
        .children_named("SubNetwork")
        .flat_map(|net| {
            let net_name = net.attr_or_empty("name");
            net.children_named("ConnectedAP").map(move |ap| (net_name, ap))
        })
        .collect()
}

/// ConnectedAP for an IED, optionally restricted to one access point
pub(crate) fn find_connected_ap<'a>(
    root: &'a XmlElement,
    ied: &str,
    access_point: Option<&str>,
) -> Option<(&'a str, &'a XmlElement)> {
    connected_aps(root).into_iter().find(|(_, cap)| {
        cap.attr("iedName") == Some(ied)
            && access_point.is_none_or(|ap| cap.attr("apName") == Some(ap))
    })
}

/// GSE communication block of a GOOSE control block
pub(crate) fn find_gse<'a>(
    root: &'a XmlElement,
    ied: &str,
    access_point: Option<&str>,
    ld_inst: &str,
    cb_name: &str,
) -> Option<&'a XmlElement> {
    connected_aps(root)
        .into_iter()
        .filter(|(_, cap)| {
            cap.attr("iedName") == Some(ied)
                && access_point.is_none_or(|ap| cap.attr("apName") == Some(ap))
        })
        .find_map(|(_, cap)| {
            cap.children_named("GSE")
                .find(|g| g.attr("ldInst") == Some(ld_inst) && g.attr("cbName") == Some(cb_name))
        })
}

/// Read the addressing of every IED
///
/// One entry per (IED, access point) pair of the Communication section, then
/// a loopback entry for every IED the section does not mention.
pub fn extract_ieds_info(root: &XmlElement) -> Vec<IedInfo> {
    let mut ieds = Vec::new();
    let mut seen_pairs = HashSet::new();
    let mut seen_ieds = HashSet::new();

    for (net_name, cap) in connected_aps(root) {
        let Some(ied_name) = cap.attr("iedName") else {
            continue;
        };
        let ap_name = cap.attr_or_empty("apName");
        if !seen_pairs.insert((ied_name.to_string(), ap_name.to_string())) {
            continue;
        }
        seen_ieds.insert(ied_name.to_string());

        let params = address_params(cap.child("Address"));
        let fallback = stream_params(cap);
        let lookup = |key: &str| {
            params
                .get(key)
                .or_else(|| fallback.get(key))
                .filter(|v| !v.is_empty())
                .cloned()
        };

        ieds.push(IedInfo {
            name: ied_name.to_string(),
            access_point: ap_name.to_string(),
            subnetwork: net_name.to_string(),
            ip: params
                .get("IP")
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| DEFAULT_IP.to_string()),
            port: params
                .get("PORT")
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| DEFAULT_PORT.to_string()),
            subnet_mask: params.get("IP-SUBNET").cloned(),
            gateway: params.get("IP-GATEWAY").cloned(),
            vlan_id: lookup("VLAN-ID"),
            vlan_priority: lookup("VLAN-PRIORITY"),
            mac_address: lookup("MAC-Address"),
            app_id: lookup("APPID"),
        });
    }

    for ied in ied_elements(root) {
        let Some(name) = ied.attr("name") else {
            continue;
        };
        if seen_ieds.contains(name) {
            continue;
        }
        let ap = ied
            .child("AccessPoint")
            .and_then(|ap| ap.attr("name"))
            .unwrap_or("");
        ieds.push(IedInfo::loopback(name, ap));
    }

    ieds
}

/// First-found parameters of the GSE/SMV blocks under a ConnectedAP
fn stream_params(cap: &XmlElement) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for block in cap
        .children
        .iter()
        .filter(|c| c.name == "GSE" || c.name == "SMV")
    {
        for (key, value) in address_params(block.child("Address")) {
            merged.entry(key).or_insert(value);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    const SCL: &str = r#"
        <SCL>
          <Communication>
            <SubNetwork name="StationBus">
              <ConnectedAP iedName="IED1" apName="S1">
                <Address>
                  <P type="IP">10.0.0.5</P>
                  <P type="IP-SUBNET">255.255.255.0</P>
                  <P type="IP-GATEWAY">10.0.0.1</P>
                </Address>
                <GSE ldInst="LD1" cbName="GCB1">
                  <Address>
                    <P type="MAC-Address">01-0C-CD-01-00-01</P>
                    <P type="APPID">0001</P>
                    <P type="VLAN-ID">00A</P>
                    <P type="VLAN-PRIORITY">4</P>
                  </Address>
                </GSE>
              </ConnectedAP>
            </SubNetwork>
          </Communication>
          <IED name="IED1"><AccessPoint name="S1"/></IED>
          <IED name="IED2"><AccessPoint name="P1"/></IED>
        </SCL>"#;

    #[test]
    fn test_extract_with_gse_fallback() {
        let doc = XmlDocument::parse_str(SCL).unwrap();
        let ieds = extract_ieds_info(&doc.root);
        assert_eq!(ieds.len(), 2);

        let ied1 = &ieds[0];
        assert_eq!(ied1.name, "IED1");
        assert_eq!(ied1.subnetwork, "StationBus");
        assert_eq!(ied1.ip, "10.0.0.5");
        assert_eq!(ied1.port, DEFAULT_PORT);
        assert_eq!(ied1.subnet_mask.as_deref(), Some("255.255.255.0"));
        assert_eq!(ied1.gateway.as_deref(), Some("10.0.0.1"));
        assert_eq!(ied1.vlan_id.as_deref(), Some("00A"));
        assert_eq!(ied1.mac_address.as_deref(), Some("01-0C-CD-01-00-01"));
        assert_eq!(ied1.app_id.as_deref(), Some("0001"));
    }

    #[test]
    fn test_ied_without_communication_defaults_to_loopback() {
        let doc = XmlDocument::parse_str(SCL).unwrap();
        let ieds = extract_ieds_info(&doc.root);

        let ied2 = &ieds[1];
        assert_eq!(ied2.name, "IED2");
        assert_eq!(ied2.access_point, "P1");
        assert_eq!(ied2.ip, DEFAULT_IP);
        assert_eq!(ied2.vlan_id, None);
    }

    #[test]
    fn test_find_gse() {
        let doc = XmlDocument::parse_str(SCL).unwrap();
        assert!(find_gse(&doc.root, "IED1", None, "LD1", "GCB1").is_some());
        assert!(find_gse(&doc.root, "IED1", Some("S2"), "LD1", "GCB1").is_none());
        assert!(find_gse(&doc.root, "IED2", None, "LD1", "GCB1").is_none());
    }
}
